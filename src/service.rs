//! # Pipeline Service
//!
//! Composition root tying the processor, retry executor, fallback queue, gap
//! calculator and sync cache together behind the operations the thin request
//! layer calls. Instances are explicitly constructed and dependency-injected;
//! there is no module-level mutable state.
//!
//! Submission guarantee: every path ends in a persisted record, a structured
//! error or a queued acknowledgment. No submission silently disappears.

use crate::cache::TtlCell;
use crate::calculator::{GapCalculator, GapReport};
use crate::classifier::{Classification, ThemeClassifier};
use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PipelineError, Result};
use crate::models::{Citizen, Interaction, Proposal, TrendPoint};
use crate::processor::Processor;
use crate::queue::{DrainReport, FallbackQueue, QueueEntry, QueueItemProcessor};
use crate::retry::{self, QueueHandoff, RetryPolicy};
use crate::validation::{self, InteractionPayload, ProposalPayload};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Only `TransientStorage` failures are worth re-attempting on the
/// submission path.
const RETRYABLE_SUBMISSION_KINDS: &[ErrorKind] = &[ErrorKind::TransientStorage];

/// Largest window served by `interaction_trend`.
const MAX_TREND_DAYS: u32 = 90;

/// Largest result set served by `popular_proposals`; also the size of the
/// cached digest list.
const MAX_POPULAR_LIMIT: usize = 100;

/// Display excerpts are truncated to this many characters.
const DIGEST_EXCERPT_CHARS: usize = 100;

/// Result of a submission that did not fail outright.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionOutcome<T> {
    /// The record is durable; its fields equal the submitted fields.
    Persisted(T),
    /// Primary storage was unavailable; the payload is durably queued for
    /// replay.
    Queued,
}

/// Operation envelope written to the fallback queue, replayed by the drain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "payload", rename_all = "snake_case")]
pub enum QueuedOperation {
    Interaction(InteractionPayload),
    Proposal(ProposalPayload),
}

/// Dashboard KPI block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_citizens: i64,
    pub total_interactions: i64,
    pub total_proposals: i64,
    /// `(proposals + interactions) / citizens * 100`.
    pub engagement_rate: f64,
    pub interactions_last_week: i64,
    pub refreshed_at: NaiveDateTime,
}

/// Trimmed proposal view for the dashboard's recent-proposals panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalDigest {
    pub proposal_id: i64,
    pub citizen_id: i64,
    pub excerpt: String,
    pub primary_theme: Option<String>,
    pub confidence: Option<f64>,
    pub city: String,
    pub inclusion_group: Option<String>,
    pub occurred_at: NaiveDateTime,
}

/// Cache slots exposed for explicit invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey {
    Summary,
    GapMetrics,
    PopularProposals,
}

/// The pipeline's composition root.
pub struct PipelineService<Q: FallbackQueue> {
    pool: PgPool,
    processor: Processor,
    calculator: GapCalculator,
    queue: Arc<Q>,
    classifier: Arc<dyn ThemeClassifier>,
    retry: RetryPolicy,
    cache_ttl: Duration,
    summary_cache: TtlCell<DashboardSummary>,
    gap_cache: TtlCell<GapReport>,
    proposals_cache: TtlCell<Vec<ProposalDigest>>,
}

impl<Q: FallbackQueue> PipelineService<Q> {
    pub fn new(
        pool: PgPool,
        queue: Arc<Q>,
        classifier: Arc<dyn ThemeClassifier>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            processor: Processor::new(pool.clone()),
            calculator: GapCalculator::new(pool.clone()),
            pool,
            queue,
            classifier,
            retry: RetryPolicy::from_config(&config.retry),
            cache_ttl: config.cache_ttl(),
            summary_cache: TtlCell::new(),
            gap_cache: TtlCell::new(),
            proposals_cache: TtlCell::new(),
        }
    }

    /// Submit a citizen interaction. Transient storage failures are retried
    /// with backoff and then routed to the fallback queue.
    pub async fn submit_interaction(
        &self,
        payload: InteractionPayload,
    ) -> Result<SubmissionOutcome<Interaction>> {
        validation::validate_interaction(&payload)?;

        let result = self
            .retry
            .execute_with_retry(
                || self.processor.process_interaction(&payload),
                RETRYABLE_SUBMISSION_KINDS,
                "submit_interaction",
            )
            .await;

        match result {
            Ok(interaction) => Ok(SubmissionOutcome::Persisted(interaction)),
            Err(e) if e.kind() == ErrorKind::TransientStorage => {
                let envelope = serde_json::to_value(QueuedOperation::Interaction(payload))?;
                retry::handle_storage_error(e, envelope, Some(self.queue.as_ref()))
                    .await
                    .map(|QueueHandoff::Queued| SubmissionOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }

    /// Submit a citizen proposal. The classifier collaborator is consulted
    /// first; a classifier failure degrades to the default theme and routes
    /// the proposal to manual review instead of aborting.
    pub async fn submit_proposal(
        &self,
        payload: ProposalPayload,
    ) -> Result<SubmissionOutcome<Proposal>> {
        validation::validate_proposal(&payload)?;
        let payload = self.classify_proposal(payload).await;

        let result = self
            .retry
            .execute_with_retry(
                || self.processor.process_proposal(&payload),
                RETRYABLE_SUBMISSION_KINDS,
                "submit_proposal",
            )
            .await;

        match result {
            Ok(proposal) => Ok(SubmissionOutcome::Persisted(proposal)),
            Err(e) if e.kind() == ErrorKind::TransientStorage => {
                let envelope = serde_json::to_value(QueuedOperation::Proposal(payload))?;
                retry::handle_storage_error(e, envelope, Some(self.queue.as_ref()))
                    .await
                    .map(|QueueHandoff::Queued| SubmissionOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }

    /// Attach classification fields to a proposal payload. Payloads arriving
    /// with a theme already attached (queued replays, manual ingestion) are
    /// left untouched.
    async fn classify_proposal(&self, mut payload: ProposalPayload) -> ProposalPayload {
        if payload.primary_theme.is_some() {
            return payload;
        }

        let content = payload.content.as_deref().unwrap_or("");
        let classification = match self.classifier.classify(content).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(
                    error = %e,
                    "Classifier unavailable, degrading to default theme and manual review"
                );
                Classification::degraded()
            }
        };

        payload.primary_theme = Some(classification.primary_theme.clone());
        payload.secondary_themes = Some(classification.secondary_themes.clone());
        payload.confidence = Some(classification.confidence);
        if payload.status.is_none() {
            payload.status = Some(classification.implied_status());
        }
        payload
    }

    /// Replay queued operations through the processor. Called by the
    /// background drain once storage recovers.
    pub async fn drain_fallback_queue(&self, max_attempts: u32) -> Result<DrainReport> {
        let replay = QueueReplay {
            processor: &self.processor,
        };
        self.queue.drain(&replay, max_attempts).await
    }

    pub async fn queue_len(&self) -> Result<usize> {
        self.queue.len().await
    }

    pub async fn peek_queue(&self, limit: usize) -> Result<Vec<QueueEntry>> {
        self.queue.peek(limit).await
    }

    /// Three-axis gap report, served through the TTL cache.
    pub async fn gap_metrics(&self) -> Result<GapReport> {
        self.gap_cache
            .get_with(self.cache_ttl, || self.calculator.compute_report())
            .await
    }

    /// Recompute the gap report, persist the snapshot table and refresh the
    /// in-memory cache in one pass.
    pub async fn snapshot_gap_metrics(&self) -> Result<GapReport> {
        let report = self.calculator.snapshot_to_cache().await?;
        self.gap_cache.store(report.clone());
        Ok(report)
    }

    /// Dashboard KPI block, served through the TTL cache.
    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        self.summary_cache
            .get_with(self.cache_ttl, || self.load_summary())
            .await
    }

    /// Daily interaction counts over the trailing `days` window. Days with
    /// zero interactions are omitted, not zero-filled.
    pub async fn interaction_trend(&self, days: u32) -> Result<Vec<TrendPoint>> {
        if days == 0 || days > MAX_TREND_DAYS {
            return Err(PipelineError::validation(
                "days",
                format!("must be between 1 and {MAX_TREND_DAYS}"),
            ));
        }

        let cutoff = Utc::now().naive_utc() - chrono::Duration::days(i64::from(days));
        Ok(Interaction::daily_counts(&self.pool, cutoff).await?)
    }

    /// Most recent proposals, newest first, served through the TTL cache.
    /// Ordered by insertion recency, not engagement.
    pub async fn popular_proposals(&self, limit: usize) -> Result<Vec<ProposalDigest>> {
        if limit == 0 || limit > MAX_POPULAR_LIMIT {
            return Err(PipelineError::validation(
                "limit",
                format!("must be between 1 and {MAX_POPULAR_LIMIT}"),
            ));
        }

        let mut digests = self
            .proposals_cache
            .get_with(self.cache_ttl, || self.load_recent_digests())
            .await?;
        digests.truncate(limit);
        Ok(digests)
    }

    /// Invalidate one cache slot, or all of them.
    pub fn clear_cache(&self, key: Option<CacheKey>) {
        match key {
            Some(CacheKey::Summary) => self.summary_cache.clear(),
            Some(CacheKey::GapMetrics) => self.gap_cache.clear(),
            Some(CacheKey::PopularProposals) => self.proposals_cache.clear(),
            None => {
                self.summary_cache.clear();
                self.gap_cache.clear();
                self.proposals_cache.clear();
            }
        }
    }

    async fn load_summary(&self) -> Result<DashboardSummary> {
        let total_citizens = Citizen::count(&self.pool).await?;
        let total_interactions = Interaction::count(&self.pool).await?;
        let total_proposals = Proposal::count(&self.pool).await?;

        let week_cutoff = Utc::now().naive_utc() - chrono::Duration::days(7);
        let interactions_last_week = Interaction::count_since(&self.pool, week_cutoff).await?;

        Ok(DashboardSummary {
            total_citizens,
            total_interactions,
            total_proposals,
            engagement_rate: engagement_rate(total_citizens, total_interactions, total_proposals),
            interactions_last_week,
            refreshed_at: Utc::now().naive_utc(),
        })
    }

    async fn load_recent_digests(&self) -> Result<Vec<ProposalDigest>> {
        let proposals = Proposal::recent(&self.pool, MAX_POPULAR_LIMIT as i64).await?;
        Ok(proposals.into_iter().map(digest_from).collect())
    }
}

/// Engagement rate KPI: `(proposals + interactions) / citizens * 100`, zero
/// when no citizens exist yet.
fn engagement_rate(citizens: i64, interactions: i64, proposals: i64) -> f64 {
    if citizens <= 0 {
        return 0.0;
    }
    (proposals + interactions) as f64 / citizens as f64 * 100.0
}

fn digest_from(proposal: Proposal) -> ProposalDigest {
    ProposalDigest {
        proposal_id: proposal.id,
        citizen_id: proposal.citizen_id,
        excerpt: proposal.content.chars().take(DIGEST_EXCERPT_CHARS).collect(),
        primary_theme: proposal.primary_theme,
        confidence: proposal.confidence,
        city: proposal.city,
        inclusion_group: proposal.inclusion_group,
        occurred_at: proposal.occurred_at,
    }
}

/// Adapter replaying queued envelopes through the processor.
struct QueueReplay<'a> {
    processor: &'a Processor,
}

#[async_trait]
impl QueueItemProcessor for QueueReplay<'_> {
    async fn process(&self, payload: serde_json::Value) -> Result<()> {
        let operation: QueuedOperation = serde_json::from_value(payload)?;
        match operation {
            QueuedOperation::Interaction(payload) => self
                .processor
                .process_interaction(&payload)
                .await
                .map(|_| ()),
            QueuedOperation::Proposal(payload) => {
                self.processor.process_proposal(&payload).await.map(|_| ())
            }
        }
    }
}
