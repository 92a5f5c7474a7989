//! # Pipeline Error Taxonomy
//!
//! Tagged error union for the ingestion pipeline. Callers branch on
//! [`ErrorKind`] rather than downcasting, which keeps retry allow-lists and
//! fallback routing explicit at every call site.
//!
//! The taxonomy mirrors how failures are handled downstream:
//! - `Validation` and `StorageIntegrity` are caller-fixable and never retried
//! - `TransientStorage` is retried with backoff, then queued
//! - `Classifier` degrades to a default theme and never aborts a submission

use serde::Serialize;

/// Error type for every fallible operation in the pipeline core.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Input failed validation; `field` names the offending field.
    #[error("validation failed for field '{field}': {message}")]
    Validation { field: String, message: String },

    /// A foreign key or unique constraint was breached. Never retried.
    #[error("storage integrity violation: {0}")]
    StorageIntegrity(String),

    /// Connection/timeout-class storage failure. Retried, then queued.
    #[error("transient storage failure: {0}")]
    TransientStorage(String),

    /// The external theme classifier failed.
    #[error("classifier failure: {0}")]
    Classifier(String),

    /// The fallback queue itself failed (lock timeout, I/O error).
    #[error("fallback queue failure: {0}")]
    Queue(String),

    /// A payload could not be encoded or decoded.
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Discriminant of [`PipelineError`], used for retry allow-lists and for the
/// structured error reports handed to the request layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    StorageIntegrity,
    TransientStorage,
    Classifier,
    Queue,
    Serialization,
    Configuration,
}

impl PipelineError {
    /// Convenience constructor for field-level validation failures.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation { .. } => ErrorKind::Validation,
            PipelineError::StorageIntegrity(_) => ErrorKind::StorageIntegrity,
            PipelineError::TransientStorage(_) => ErrorKind::TransientStorage,
            PipelineError::Classifier(_) => ErrorKind::Classifier,
            PipelineError::Queue(_) => ErrorKind::Queue,
            PipelineError::Serialization(_) => ErrorKind::Serialization,
            PipelineError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Whether the retry executor may re-attempt this failure by default.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientStorage)
    }
}

/// SQLSTATE class 23 covers every integrity-constraint violation.
const INTEGRITY_SQLSTATE_CLASS: &str = "23";

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                if db
                    .code()
                    .is_some_and(|code| code.starts_with(INTEGRITY_SQLSTATE_CLASS))
                {
                    PipelineError::StorageIntegrity(db.to_string())
                } else {
                    PipelineError::TransientStorage(err.to_string())
                }
            }
            // Connection, pool, protocol and I/O failures are all candidates
            // for recovery on a later attempt.
            _ => PipelineError::TransientStorage(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
