//! # Gap Metric Cache Model
//!
//! Snapshot rows for the legislative gap metric, unique per
//! `(axis, segment_key)`. The gap calculator owns this table exclusively and
//! replaces the full set in one transaction per recompute, so readers never
//! observe a partially-updated cache.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

/// Segmentation axis for gap metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentAxis {
    Theme,
    Group,
    City,
}

impl SegmentAxis {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentAxis::Theme => "theme",
            SegmentAxis::Group => "group",
            SegmentAxis::City => "city",
        }
    }
}

/// Gap tier classification.
///
/// High ≥ 70%, Medium 40–69%, Low < 40%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapTier {
    High,
    Medium,
    Low,
}

impl GapTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapTier::High => "high",
            GapTier::Medium => "medium",
            GapTier::Low => "low",
        }
    }

    /// Classify a gap percentage into its tier.
    pub fn classify(gap_pct: f64) -> GapTier {
        if gap_pct >= 70.0 {
            GapTier::High
        } else if gap_pct >= 40.0 {
            GapTier::Medium
        } else {
            GapTier::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GapMetric {
    pub id: i64,
    pub axis: String,
    pub segment_key: String,
    pub demand_count: i64,
    pub bill_count: i64,
    pub gap_pct: f64,
    pub tier: String,
    pub computed_at: NaiveDateTime,
}

/// New gap metric row for the snapshot insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGapMetric {
    pub axis: SegmentAxis,
    pub segment_key: String,
    pub demand_count: i64,
    pub bill_count: i64,
    pub gap_pct: f64,
    pub tier: GapTier,
}

impl GapMetric {
    /// Replace the entire snapshot with `metrics`, inside the caller's
    /// transaction. Callers pass all three axes so the swap is atomic.
    pub async fn replace_all(
        tx: &mut Transaction<'_, Postgres>,
        metrics: &[NewGapMetric],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM gap_metrics")
            .execute(&mut **tx)
            .await?;

        for metric in metrics {
            sqlx::query(
                r#"
                INSERT INTO gap_metrics (axis, segment_key, demand_count, bill_count,
                                         gap_pct, tier, computed_at)
                VALUES ($1, $2, $3, $4, $5, $6, NOW())
                "#,
            )
            .bind(metric.axis.as_str())
            .bind(&metric.segment_key)
            .bind(metric.demand_count)
            .bind(metric.bill_count)
            .bind(metric.gap_pct)
            .bind(metric.tier.as_str())
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Read the current snapshot, all axes, in insertion order.
    pub async fn fetch_all(pool: &PgPool) -> Result<Vec<GapMetric>, sqlx::Error> {
        sqlx::query_as::<_, GapMetric>(
            r#"
            SELECT id, axis, segment_key, demand_count, bill_count, gap_pct, tier, computed_at
            FROM gap_metrics
            ORDER BY id
            "#,
        )
        .fetch_all(pool)
        .await
    }
}
