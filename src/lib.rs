#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Participa Core
//!
//! Resilient data pipeline for a citizen-participation platform.
//!
//! ## Overview
//!
//! This crate ingests citizen submissions (interactions with legislative
//! bills, and proposals for new legislation), persists them transactionally
//! in PostgreSQL, and serves the derived dashboard views. The defining
//! requirement is resilience: submissions must survive storage outages and
//! classifier outages without data loss.
//!
//! ## Architecture
//!
//! Every submission follows the same path: validate, classify (proposals
//! only), persist with retry, and on transient storage exhaustion hand the
//! payload to a durable file-backed fallback queue for later replay. The
//! dashboard side computes legislative gap metrics per theme, inclusion
//! group and city, fronted by a short-TTL in-memory cache.
//!
//! ## Module Organization
//!
//! - [`models`] - Data layer: citizens, bills, interactions, proposals, gap metrics
//! - [`validation`] - Payload validation with field-level rejection detail
//! - [`processor`] - Transactional validation and persistence engine
//! - [`classifier`] - Theme classifier seam and degradation policy
//! - [`queue`] - Durable JSONL fallback queue with bounded drain
//! - [`retry`] - Retry executor with exponential backoff and error handlers
//! - [`calculator`] - Legislative gap metrics across three segment axes
//! - [`cache`] - TTL read-through cache cells for the dashboard
//! - [`service`] - Composition root wiring the pipeline together
//! - [`database`] - Pool construction and schema bootstrap
//! - [`config`] - Configuration with environment overrides
//! - [`error`] - Structured error taxonomy
//! - [`logging`] - Structured tracing setup and logging helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use participa_core::config::PipelineConfig;
//! use participa_core::queue::FileFallbackQueue;
//! use participa_core::service::PipelineService;
//! use participa_core::{classifier, database};
//! use std::sync::Arc;
//!
//! # struct NoopClassifier;
//! # #[async_trait::async_trait]
//! # impl classifier::ThemeClassifier for NoopClassifier {
//! #     async fn classify(&self, _: &str) -> participa_core::Result<classifier::Classification> {
//! #         Ok(classifier::Classification::degraded())
//! #     }
//! # }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::from_env()?;
//! let pool = database::connect_lazy(&config)?;
//! database::bootstrap_schema(&pool).await?;
//!
//! let queue = Arc::new(FileFallbackQueue::new(
//!     config.queue_path.clone(),
//!     config.queue_lock_timeout(),
//! ));
//! let classifier = Arc::new(NoopClassifier);
//! let service = PipelineService::new(pool, queue, classifier, &config);
//!
//! let summary = service.dashboard_summary().await?;
//! println!("citizens so far: {}", summary.total_citizens);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Pure logic (validation, backoff schedules, gap math, cache expiry, queue
//! file handling) is covered without a database:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod cache;
pub mod calculator;
pub mod classifier;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod service;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use calculator::{GapCalculator, GapReport, GapSegment};
pub use classifier::{Classification, ThemeClassifier, DEFAULT_THEME, REVIEW_CONFIDENCE_THRESHOLD};
pub use config::{PipelineConfig, RetryConfig};
pub use error::{ErrorKind, PipelineError, Result};
pub use processor::Processor;
pub use queue::{DrainReport, FallbackQueue, FileFallbackQueue, QueueEntry, QueueItemProcessor};
pub use retry::{ErrorReport, QueueHandoff, RetryPolicy};
pub use service::{
    CacheKey, DashboardSummary, PipelineService, ProposalDigest, QueuedOperation,
    SubmissionOutcome,
};
pub use validation::{CitizenRef, InteractionPayload, ProposalPayload};
