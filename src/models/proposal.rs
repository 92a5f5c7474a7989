//! # Proposal Model
//!
//! A citizen's proposal for new legislation, submitted as text or transcribed
//! audio. Theme fields come from the classifier collaborator; a confidence
//! below the review threshold parks the proposal in `needs_review`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

/// How the proposal content arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    TranscribedAudio,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::TranscribedAudio => "transcribed_audio",
        }
    }
}

/// Review status of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    NeedsReview,
    Approved,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::NeedsReview => "needs_review",
            ProposalStatus::Approved => "approved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Proposal {
    pub id: i64,
    pub citizen_id: i64,
    pub content: String,
    pub content_kind: String,
    pub audio_url: Option<String>,
    pub primary_theme: Option<String>,
    pub secondary_themes: Option<serde_json::Value>,
    pub confidence: Option<f64>,
    pub city: String,
    pub inclusion_group: Option<String>,
    pub status: String,
    pub duplicate_group: Option<i64>,
    pub occurred_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

/// New proposal for creation (without generated fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProposal {
    pub citizen_id: i64,
    pub content: String,
    pub content_kind: ContentKind,
    pub audio_url: Option<String>,
    pub primary_theme: Option<String>,
    pub secondary_themes: Option<serde_json::Value>,
    pub confidence: Option<f64>,
    pub city: String,
    pub inclusion_group: Option<String>,
    pub status: ProposalStatus,
    pub duplicate_group: Option<i64>,
    pub occurred_at: NaiveDateTime,
}

const PROPOSAL_COLUMNS: &str = "id, citizen_id, content, content_kind, audio_url, primary_theme, \
     secondary_themes, confidence, city, inclusion_group, status, duplicate_group, \
     occurred_at, created_at";

impl Proposal {
    /// Insert a new proposal inside the caller's transaction.
    pub async fn create(
        tx: &mut Transaction<'_, Postgres>,
        new_proposal: NewProposal,
    ) -> Result<Proposal, sqlx::Error> {
        sqlx::query_as::<_, Proposal>(&format!(
            r#"
            INSERT INTO proposals (citizen_id, content, content_kind, audio_url, primary_theme,
                                   secondary_themes, confidence, city, inclusion_group, status,
                                   duplicate_group, occurred_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            RETURNING {PROPOSAL_COLUMNS}
            "#
        ))
        .bind(new_proposal.citizen_id)
        .bind(&new_proposal.content)
        .bind(new_proposal.content_kind.as_str())
        .bind(&new_proposal.audio_url)
        .bind(&new_proposal.primary_theme)
        .bind(&new_proposal.secondary_themes)
        .bind(new_proposal.confidence)
        .bind(&new_proposal.city)
        .bind(&new_proposal.inclusion_group)
        .bind(new_proposal.status.as_str())
        .bind(new_proposal.duplicate_group)
        .bind(new_proposal.occurred_at)
        .fetch_one(&mut **tx)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM proposals")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Most recent proposals by insertion order, newest first.
    pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<Proposal>, sqlx::Error> {
        sqlx::query_as::<_, Proposal>(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM proposals ORDER BY id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Citizen demand per primary theme (proposals with a classified theme).
    pub async fn demand_by_theme(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT primary_theme, COUNT(*)
            FROM proposals
            WHERE primary_theme IS NOT NULL
            GROUP BY primary_theme
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// Citizen demand per inclusion group.
    pub async fn demand_by_group(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT inclusion_group, COUNT(*)
            FROM proposals
            WHERE inclusion_group IS NOT NULL
            GROUP BY inclusion_group
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// Citizen demand per city.
    pub async fn demand_by_city(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT city, COUNT(*)
            FROM proposals
            WHERE city IS NOT NULL
            GROUP BY city
            "#,
        )
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_wire_values() {
        assert_eq!(ContentKind::Text.as_str(), "text");
        assert_eq!(ContentKind::TranscribedAudio.as_str(), "transcribed_audio");
    }

    #[test]
    fn test_status_wire_values() {
        assert_eq!(ProposalStatus::Pending.as_str(), "pending");
        assert_eq!(ProposalStatus::NeedsReview.as_str(), "needs_review");
        assert_eq!(ProposalStatus::Approved.as_str(), "approved");
    }

    #[test]
    fn test_status_serde_matches_wire_values() {
        let status: ProposalStatus = serde_json::from_str("\"needs_review\"").unwrap();
        assert_eq!(status, ProposalStatus::NeedsReview);
    }
}
