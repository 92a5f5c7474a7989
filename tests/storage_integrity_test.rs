//! Database-backed integrity tests: referential-integrity rejection with no
//! partial writes, field round-trips through persistence, and idempotent
//! citizen creation under concurrency.
//!
//! These tests need a reachable PostgreSQL; they skip themselves when
//! neither `PARTICIPA_DATABASE_URL` nor `DATABASE_URL` is set.

use async_trait::async_trait;
use chrono::{Timelike, Utc};
use participa_core::classifier::{Classification, ThemeClassifier};
use participa_core::config::PipelineConfig;
use participa_core::database;
use participa_core::models::{ContentKind, InteractionKind, OpinionValue};
use participa_core::queue::FileFallbackQueue;
use participa_core::service::{PipelineService, SubmissionOutcome};
use participa_core::validation::{CitizenRef, InteractionPayload, ProposalPayload};
use participa_core::{ErrorKind, PipelineError, Result};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

struct ConfidentClassifier;

#[async_trait]
impl ThemeClassifier for ConfidentClassifier {
    async fn classify(&self, _content: &str) -> Result<Classification> {
        Ok(Classification {
            primary_theme: "Saúde".to_string(),
            secondary_themes: vec!["Assistência Social".to_string()],
            confidence: 0.91,
        })
    }
}

fn database_url() -> Option<String> {
    std::env::var("PARTICIPA_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}

static BOOTSTRAP: tokio::sync::Mutex<bool> = tokio::sync::Mutex::const_new(false);

/// Pool against the configured test database, with the schema applied
/// exactly once per test binary.
async fn test_pool() -> Option<PgPool> {
    let config = PipelineConfig {
        database_url: database_url()?,
        ..PipelineConfig::default()
    };
    let pool = database::connect(&config).await.expect("connect to test database");

    let mut bootstrapped = BOOTSTRAP.lock().await;
    if !*bootstrapped {
        database::bootstrap_schema(&pool).await.expect("bootstrap schema");
        *bootstrapped = true;
    }
    Some(pool)
}

fn service_on(pool: PgPool, dir: &tempfile::TempDir) -> PipelineService<FileFallbackQueue> {
    let config = PipelineConfig::default();
    let queue = Arc::new(FileFallbackQueue::new(
        dir.path().join("queue.jsonl"),
        config.queue_lock_timeout(),
    ));
    PipelineService::new(pool, queue, Arc::new(ConfidentClassifier), &config)
}

fn fresh_token(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Microsecond-truncated timestamp, matching TIMESTAMP column precision.
fn db_now() -> chrono::NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond((now.nanosecond() / 1_000) * 1_000).unwrap()
}

async fn citizen_rows_for(pool: &PgPool, token: &str) -> i64 {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM citizens WHERE identity_hash = $1")
            .bind(token)
            .fetch_one(pool)
            .await
            .unwrap();
    count
}

#[tokio::test]
async fn broken_bill_reference_rejected_with_no_partial_write() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: no test database configured");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let service = service_on(pool.clone(), &dir);
    let token = fresh_token("fk");

    let payload = InteractionPayload {
        citizen: Some(CitizenRef::Token(token.clone())),
        kind: Some(InteractionKind::View),
        bill_id: Some(9_123_456_789),
        occurred_at: Some(db_now()),
        ..Default::default()
    };

    let err = service.submit_interaction(payload).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageIntegrity);

    // The whole transaction rolled back: not even the citizen row survives.
    assert_eq!(citizen_rows_for(&pool, &token).await, 0);
    assert_eq!(service.queue_len().await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_citizen_id_is_a_validation_error() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: no test database configured");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let service = service_on(pool, &dir);

    let payload = InteractionPayload {
        citizen: Some(CitizenRef::Id(9_123_456_789)),
        kind: Some(InteractionKind::View),
        occurred_at: Some(db_now()),
        ..Default::default()
    };

    let err = service.submit_interaction(payload).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Validation { ref field, .. } if field == "citizen"
    ));
}

#[tokio::test]
async fn persisted_interaction_fields_equal_submitted() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: no test database configured");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let service = service_on(pool, &dir);
    let occurred_at = db_now();

    let payload = InteractionPayload {
        citizen: Some(CitizenRef::Token(fresh_token("rt"))),
        kind: Some(InteractionKind::Opinion),
        opinion: Some(OpinionValue::Against),
        content: Some("não resolve o problema do bairro".to_string()),
        metadata: Some(serde_json::json!({ "channel": "whatsapp" })),
        occurred_at: Some(occurred_at),
        ..Default::default()
    };

    let outcome = service.submit_interaction(payload).await.unwrap();
    let SubmissionOutcome::Persisted(interaction) = outcome else {
        panic!("expected a persisted interaction, got {outcome:?}");
    };

    assert_eq!(interaction.kind, "opinion");
    assert_eq!(interaction.opinion.as_deref(), Some("against"));
    assert_eq!(
        interaction.content.as_deref(),
        Some("não resolve o problema do bairro")
    );
    assert_eq!(interaction.metadata["channel"], "whatsapp");
    assert_eq!(interaction.occurred_at, occurred_at);
    assert_eq!(interaction.bill_id, None);
}

#[tokio::test]
async fn persisted_proposal_fields_equal_submitted() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: no test database configured");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let service = service_on(pool, &dir);
    let occurred_at = db_now();

    let payload = ProposalPayload {
        citizen: Some(CitizenRef::Token(fresh_token("rt"))),
        content: Some("ciclovia ligando o centro ao terminal".to_string()),
        content_kind: Some(ContentKind::Text),
        city: Some("Recife".to_string()),
        inclusion_group: Some("Periferia".to_string()),
        occurred_at: Some(occurred_at),
        ..Default::default()
    };

    let outcome = service.submit_proposal(payload).await.unwrap();
    let SubmissionOutcome::Persisted(proposal) = outcome else {
        panic!("expected a persisted proposal, got {outcome:?}");
    };

    assert_eq!(proposal.content, "ciclovia ligando o centro ao terminal");
    assert_eq!(proposal.content_kind, "text");
    assert_eq!(proposal.city, "Recife");
    assert_eq!(proposal.inclusion_group.as_deref(), Some("Periferia"));
    assert_eq!(proposal.occurred_at, occurred_at);
    // Classifier ran at 0.91 confidence: theme attached, no review detour.
    assert_eq!(proposal.primary_theme.as_deref(), Some("Saúde"));
    assert_eq!(proposal.confidence, Some(0.91));
    assert_eq!(proposal.status, "pending");
}

#[tokio::test]
async fn concurrent_first_submissions_create_one_citizen_row() {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: no test database configured");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(service_on(pool.clone(), &dir));
    let token = fresh_token("race");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            let payload = InteractionPayload {
                citizen: Some(CitizenRef::Token(token)),
                kind: Some(InteractionKind::View),
                occurred_at: Some(db_now()),
                ..Default::default()
            };
            service.submit_interaction(payload).await
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert!(matches!(outcome, SubmissionOutcome::Persisted(_)));
    }

    assert_eq!(citizen_rows_for(&pool, &token).await, 1);
}
