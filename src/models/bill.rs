//! # Legislative Bill Model
//!
//! Bills are populated out-of-band by the bill-ingestion collaborator and are
//! strictly read-only to this core. The gap calculator only ever counts bills
//! whose status is `in_progress`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// Lifecycle status of a legislative bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    InProgress,
    Approved,
    Rejected,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::InProgress => "in_progress",
            BillStatus::Approved => "approved",
            BillStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LegislativeBill {
    pub id: i64,
    pub external_id: String,
    pub title: String,
    pub summary: Option<String>,
    pub primary_theme: String,
    pub secondary_themes: Option<serde_json::Value>,
    pub city: Option<String>,
    pub status: String,
    pub source_url: Option<String>,
    pub created_at: NaiveDateTime,
}

impl LegislativeBill {
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<LegislativeBill>, sqlx::Error> {
        sqlx::query_as::<_, LegislativeBill>(
            r#"
            SELECT id, external_id, title, summary, primary_theme, secondary_themes,
                   city, status, source_url, created_at
            FROM legislative_bills
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Count of in-progress bills per primary theme.
    pub async fn in_progress_by_theme(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT primary_theme, COUNT(*)
            FROM legislative_bills
            WHERE status = $1 AND primary_theme IS NOT NULL
            GROUP BY primary_theme
            "#,
        )
        .bind(BillStatus::InProgress.as_str())
        .fetch_all(pool)
        .await
    }

    /// Count of in-progress bills per city.
    pub async fn in_progress_by_city(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT city, COUNT(*)
            FROM legislative_bills
            WHERE status = $1 AND city IS NOT NULL
            GROUP BY city
            "#,
        )
        .bind(BillStatus::InProgress.as_str())
        .fetch_all(pool)
        .await
    }
}
