//! # Classifier Collaborator Interface
//!
//! The text-classification service lives outside this core; this module
//! defines the seam it plugs into and the degradation policy applied when it
//! fails. A classifier outage never aborts a submission: the proposal is
//! filed under the default theme and parked for manual review.

use crate::error::Result;
use crate::models::ProposalStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Classifications below this confidence route the proposal to manual review.
pub const REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Theme assigned when the classifier is unavailable or unsure.
pub const DEFAULT_THEME: &str = "Outros";

/// Canonical theme list shared with the classifier collaborator.
pub const THEMES: &[&str] = &[
    "Saúde",
    "Educação",
    "Transporte",
    "Segurança",
    "Meio Ambiente",
    "Habitação",
    "Cultura",
    "Esporte",
    "Assistência Social",
    "Infraestrutura",
    "Outros",
];

/// Result of classifying a proposal's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub primary_theme: String,
    /// Up to two secondary themes.
    pub secondary_themes: Vec<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Classification {
    /// Placeholder classification used when the classifier fails.
    pub fn degraded() -> Self {
        Self {
            primary_theme: DEFAULT_THEME.to_string(),
            secondary_themes: Vec::new(),
            confidence: 0.0,
        }
    }

    /// Proposal status implied by this classification.
    pub fn implied_status(&self) -> ProposalStatus {
        if self.confidence < REVIEW_CONFIDENCE_THRESHOLD {
            ProposalStatus::NeedsReview
        } else {
            ProposalStatus::Pending
        }
    }
}

/// Seam for the external theme classifier.
#[async_trait]
pub trait ThemeClassifier: Send + Sync {
    /// Classify proposal content into a primary theme, secondary themes and
    /// a confidence score.
    async fn classify(&self, content: &str) -> Result<Classification>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_confidence_implies_review() {
        let classification = Classification {
            primary_theme: "Educação".to_string(),
            secondary_themes: vec![],
            confidence: 0.42,
        };
        assert_eq!(classification.implied_status(), ProposalStatus::NeedsReview);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let classification = Classification {
            primary_theme: "Saúde".to_string(),
            secondary_themes: vec![],
            confidence: REVIEW_CONFIDENCE_THRESHOLD,
        };
        assert_eq!(classification.implied_status(), ProposalStatus::Pending);
    }

    #[test]
    fn test_degraded_classification() {
        let degraded = Classification::degraded();
        assert_eq!(degraded.primary_theme, DEFAULT_THEME);
        assert_eq!(degraded.implied_status(), ProposalStatus::NeedsReview);
    }

    #[test]
    fn test_default_theme_is_canonical() {
        assert!(THEMES.contains(&DEFAULT_THEME));
    }
}
