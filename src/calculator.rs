//! # Gap Metrics Calculator
//!
//! Computes the legislative gap metric: the percentage by which citizen
//! demand on a topic exceeds active legislative bills on that topic.
//!
//! `gap = max(0, (demand - bills) / demand * 100)`, rounded to 2 decimals.
//!
//! Theme and city segments sort descending by gap; group segments sort
//! descending by demand. Bills are not segmented by inclusion group, so every
//! observed group reports a 100% gap. That is a limitation of the bill data,
//! not a defect, and the asymmetric sort order is intentional.

use crate::error::Result;
use crate::models::{GapMetric, GapTier, LegislativeBill, NewGapMetric, Proposal, SegmentAxis};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::info;

/// One segment of the gap report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapSegment {
    pub key: String,
    pub demand: i64,
    pub bills: i64,
    pub gap_pct: f64,
    pub tier: GapTier,
}

/// The three-axis gap report served to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapReport {
    pub by_theme: Vec<GapSegment>,
    pub by_group: Vec<GapSegment>,
    pub by_city: Vec<GapSegment>,
    pub computed_at: NaiveDateTime,
}

/// Gap percentage for one segment, clamped non-negative and rounded to two
/// decimals.
pub fn gap_percentage(demand: i64, bills: i64) -> f64 {
    if demand <= 0 {
        return 0.0;
    }
    let raw = (demand - bills) as f64 / demand as f64 * 100.0;
    round2(raw.max(0.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Join demand counts against bill counts and sort descending by gap.
fn build_segments(demand: Vec<(String, i64)>, bills: &HashMap<String, i64>) -> Vec<GapSegment> {
    let mut segments: Vec<GapSegment> = demand
        .into_iter()
        .map(|(key, demand_count)| {
            let bill_count = bills.get(&key).copied().unwrap_or(0);
            let gap_pct = gap_percentage(demand_count, bill_count);
            GapSegment {
                key,
                demand: demand_count,
                bills: bill_count,
                gap_pct,
                tier: GapTier::classify(gap_pct),
            }
        })
        .collect();

    segments.sort_by(|a, b| b.gap_pct.total_cmp(&a.gap_pct));
    segments
}

/// Group segments: no bill data exists per inclusion group, so the gap is
/// 100% wherever demand exists. Sorted descending by demand.
fn build_group_segments(demand: Vec<(String, i64)>) -> Vec<GapSegment> {
    let mut segments: Vec<GapSegment> = demand
        .into_iter()
        .map(|(key, demand_count)| {
            let gap_pct = if demand_count > 0 { 100.0 } else { 0.0 };
            GapSegment {
                key,
                demand: demand_count,
                bills: 0,
                gap_pct,
                tier: GapTier::classify(gap_pct),
            }
        })
        .collect();

    segments.sort_by(|a, b| b.demand.cmp(&a.demand));
    segments
}

/// Sole owner of the `gap_metrics` snapshot table.
pub struct GapCalculator {
    pool: PgPool,
}

impl GapCalculator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gap segments per primary theme, descending by gap.
    pub async fn gap_by_theme(&self) -> Result<Vec<GapSegment>> {
        let demand = Proposal::demand_by_theme(&self.pool).await?;
        let bills: HashMap<String, i64> = LegislativeBill::in_progress_by_theme(&self.pool)
            .await?
            .into_iter()
            .collect();
        Ok(build_segments(demand, &bills))
    }

    /// Gap segments per inclusion group, descending by demand.
    pub async fn gap_by_group(&self) -> Result<Vec<GapSegment>> {
        let demand = Proposal::demand_by_group(&self.pool).await?;
        Ok(build_group_segments(demand))
    }

    /// Gap segments per city, descending by gap.
    pub async fn gap_by_city(&self) -> Result<Vec<GapSegment>> {
        let demand = Proposal::demand_by_city(&self.pool).await?;
        let bills: HashMap<String, i64> = LegislativeBill::in_progress_by_city(&self.pool)
            .await?
            .into_iter()
            .collect();
        Ok(build_segments(demand, &bills))
    }

    /// Compute the full three-axis report from committed storage.
    pub async fn compute_report(&self) -> Result<GapReport> {
        let by_theme = self.gap_by_theme().await?;
        let by_group = self.gap_by_group().await?;
        let by_city = self.gap_by_city().await?;

        info!(
            themes = by_theme.len(),
            groups = by_group.len(),
            cities = by_city.len(),
            "Computed gap report"
        );

        Ok(GapReport {
            by_theme,
            by_group,
            by_city,
            computed_at: Utc::now().naive_utc(),
        })
    }

    /// Recompute and persist the snapshot. All three axes are replaced in
    /// one transaction, so a partially-updated cache is never visible.
    pub async fn snapshot_to_cache(&self) -> Result<GapReport> {
        let report = self.compute_report().await?;

        let mut rows = Vec::new();
        for (axis, segments) in [
            (SegmentAxis::Theme, &report.by_theme),
            (SegmentAxis::Group, &report.by_group),
            (SegmentAxis::City, &report.by_city),
        ] {
            for segment in segments {
                rows.push(NewGapMetric {
                    axis,
                    segment_key: segment.key.clone(),
                    demand_count: segment.demand,
                    bill_count: segment.bills,
                    gap_pct: segment.gap_pct,
                    tier: segment.tier,
                });
            }
        }

        let mut tx = self.pool.begin().await?;
        match GapMetric::replace_all(&mut tx, &rows).await {
            Ok(()) => {
                tx.commit().await?;
                info!(rows = rows.len(), "Gap metrics snapshot saved");
                Ok(report)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e.into())
            }
        }
    }

    /// Read the persisted snapshot rows, all axes.
    pub async fn load_cached_metrics(&self) -> Result<Vec<GapMetric>> {
        Ok(GapMetric::fetch_all(&self.pool).await?)
    }
}
