//! # Retry Executor
//!
//! Retry-with-exponential-backoff around caller-supplied operations, plus the
//! structured error handlers the submission path routes failures through.
//!
//! Only error kinds the caller explicitly allow-lists are retried; everything
//! else propagates immediately. The final failing attempt is logged as a
//! permanent failure before the error is re-raised.

use crate::config::RetryConfig;
use crate::error::{ErrorKind, PipelineError, Result};
use crate::logging;
use crate::queue::FallbackQueue;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Structured error detail returned to the request layer.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub context: serde_json::Value,
}

/// How a storage failure was ultimately disposed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueHandoff {
    /// The payload was durably queued for later replay.
    Queued,
}

/// Retry policy: explicit, injectable, no implicit decorator wrapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base(),
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Delay slept after the failure of attempt `attempt` (0-indexed):
    /// `backoff_base * backoff_multiplier^attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff_base
            .mul_f64(self.backoff_multiplier.powi(attempt as i32))
    }

    /// Execute `operation`, retrying failures whose kind is in
    /// `retryable_kinds` with exponential backoff. The backoff wait is an
    /// async sleep, so unrelated concurrent work keeps running, and the
    /// future can be cancelled between attempts.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        mut operation: F,
        retryable_kinds: &[ErrorKind],
        operation_name: &str,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        // Hand-built policies may carry max_attempts = 0; run at least once.
        let max_attempts = self.max_attempts.max(1);
        for attempt in 0..max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !retryable_kinds.contains(&e.kind()) {
                        return Err(e);
                    }
                    if attempt + 1 == max_attempts {
                        self.log_permanent_failure(&e, operation_name, attempt + 1);
                        return Err(e);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        operation = %operation_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        unreachable!("retry loop returns on the final attempt")
    }

    /// Blocking variant for synchronous call sites. Sleeps on the current
    /// thread; there is no mid-sleep cancellation.
    pub fn execute_with_retry_blocking<T, F>(
        &self,
        mut operation: F,
        retryable_kinds: &[ErrorKind],
        operation_name: &str,
    ) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        for attempt in 0..max_attempts {
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !retryable_kinds.contains(&e.kind()) {
                        return Err(e);
                    }
                    if attempt + 1 == max_attempts {
                        self.log_permanent_failure(&e, operation_name, attempt + 1);
                        return Err(e);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        operation = %operation_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying after backoff"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
        unreachable!("retry loop returns on the final attempt")
    }

    fn log_permanent_failure(&self, error: &PipelineError, operation_name: &str, attempts: u32) {
        tracing::error!(
            operation = %operation_name,
            attempts = attempts,
            error_kind = ?error.kind(),
            error = %error,
            "CRITICAL: permanent failure after exhausting retry attempts"
        );
    }
}

/// Build the structured report for a validation failure. Validation errors
/// are caller-fixable and are never retried.
pub fn handle_validation_error(error: &PipelineError, context: serde_json::Value) -> ErrorReport {
    let context_str = context.to_string();
    logging::log_error(
        "retry",
        "handle_validation_error",
        &error.to_string(),
        Some(&context_str),
    );
    ErrorReport {
        kind: error.kind(),
        message: error.to_string(),
        context,
    }
}

/// Route a storage failure to the fallback queue when one is available.
///
/// Returns `Ok(Queued)` once the payload is durably queued; without a queue
/// (or when queueing itself fails) the original error is surfaced so no
/// submission silently disappears.
pub async fn handle_storage_error(
    error: PipelineError,
    payload: serde_json::Value,
    queue: Option<&dyn FallbackQueue>,
) -> Result<QueueHandoff> {
    logging::log_error("retry", "handle_storage_error", &error.to_string(), None);

    let Some(queue) = queue else {
        return Err(error);
    };

    match queue.enqueue(payload).await {
        Ok(()) => Ok(QueueHandoff::Queued),
        Err(queue_error) => {
            tracing::error!(
                error = %queue_error,
                "CRITICAL: failed to queue operation after storage failure"
            );
            Err(error)
        }
    }
}
