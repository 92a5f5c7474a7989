//! # Interaction Model
//!
//! A citizen's interaction with the platform: an opinion on a bill, a view,
//! or a reaction. The citizen foreign key is required; the bill reference is
//! optional (views of non-bill content carry no bill id). Foreign keys must
//! resolve or the insert fails with no row created.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

/// Kind of citizen interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Opinion,
    View,
    Reaction,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Opinion => "opinion",
            InteractionKind::View => "view",
            InteractionKind::Reaction => "reaction",
        }
    }
}

/// Opinion value, required iff the interaction kind is `opinion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpinionValue {
    Favor,
    Against,
    Skip,
}

impl OpinionValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpinionValue::Favor => "favor",
            OpinionValue::Against => "against",
            OpinionValue::Skip => "skip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Interaction {
    pub id: i64,
    pub citizen_id: i64,
    pub bill_id: Option<i64>,
    pub kind: String,
    pub opinion: Option<String>,
    pub content: Option<String>,
    pub metadata: serde_json::Value,
    pub occurred_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

/// New interaction for creation (without generated fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInteraction {
    pub citizen_id: i64,
    pub bill_id: Option<i64>,
    pub kind: InteractionKind,
    pub opinion: Option<OpinionValue>,
    pub content: Option<String>,
    pub metadata: serde_json::Value,
    pub occurred_at: NaiveDateTime,
}

/// One day of interaction volume for the dashboard trend chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TrendPoint {
    pub day: chrono::NaiveDate,
    pub count: i64,
}

const INTERACTION_COLUMNS: &str =
    "id, citizen_id, bill_id, kind, opinion, content, metadata, occurred_at, created_at";

impl Interaction {
    /// Insert a new interaction inside the caller's transaction. A foreign
    /// key breach surfaces as a database error and leaves no row behind.
    pub async fn create(
        tx: &mut Transaction<'_, Postgres>,
        new_interaction: NewInteraction,
    ) -> Result<Interaction, sqlx::Error> {
        sqlx::query_as::<_, Interaction>(&format!(
            r#"
            INSERT INTO interactions (citizen_id, bill_id, kind, opinion, content, metadata, occurred_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING {INTERACTION_COLUMNS}
            "#
        ))
        .bind(new_interaction.citizen_id)
        .bind(new_interaction.bill_id)
        .bind(new_interaction.kind.as_str())
        .bind(new_interaction.opinion.map(|o| o.as_str()))
        .bind(&new_interaction.content)
        .bind(&new_interaction.metadata)
        .bind(new_interaction.occurred_at)
        .fetch_one(&mut **tx)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM interactions")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    pub async fn count_since(pool: &PgPool, cutoff: NaiveDateTime) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM interactions WHERE occurred_at >= $1")
                .bind(cutoff)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    /// Daily interaction counts since the cutoff, oldest day first. Days
    /// with no interactions produce no bucket.
    pub async fn daily_counts(
        pool: &PgPool,
        cutoff: NaiveDateTime,
    ) -> Result<Vec<TrendPoint>, sqlx::Error> {
        sqlx::query_as::<_, TrendPoint>(
            r#"
            SELECT occurred_at::date AS day, COUNT(*) AS count
            FROM interactions
            WHERE occurred_at >= $1
            GROUP BY occurred_at::date
            ORDER BY day
            "#,
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await
    }
}
