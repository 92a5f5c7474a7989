//! # Submission Payload Validation
//!
//! Inbound payloads and the pure validation rules applied before any storage
//! work. Every rejection is a [`PipelineError::Validation`] naming the
//! offending field, so the request layer can return field-level detail.
//!
//! Payloads are fully serializable: the same structs travel through the
//! fallback queue and replay unchanged.

use crate::error::{PipelineError, Result};
use crate::models::{ContentKind, InteractionKind, OpinionValue, ProposalStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Reference to a citizen: either an existing numeric id or an opaque hashed
/// identity token. A numeric id must already exist; a token is get-or-created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CitizenRef {
    Id(i64),
    Token(String),
}

/// Inbound interaction submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionPayload {
    pub citizen: Option<CitizenRef>,
    pub kind: Option<InteractionKind>,
    pub opinion: Option<OpinionValue>,
    pub bill_id: Option<i64>,
    pub content: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub occurred_at: Option<NaiveDateTime>,
}

/// Inbound proposal submission. The classification fields are attached by
/// the service after consulting the classifier collaborator, so a queued
/// payload replays without re-classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalPayload {
    pub citizen: Option<CitizenRef>,
    pub content: Option<String>,
    pub content_kind: Option<ContentKind>,
    pub audio_url: Option<String>,
    pub city: Option<String>,
    pub inclusion_group: Option<String>,
    pub primary_theme: Option<String>,
    pub secondary_themes: Option<Vec<String>>,
    pub confidence: Option<f64>,
    pub status: Option<ProposalStatus>,
    pub duplicate_group: Option<i64>,
    pub occurred_at: Option<NaiveDateTime>,
}

fn required<'a, T>(value: &'a Option<T>, field: &str) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| PipelineError::validation(field, "missing required field"))
}

/// Validate an interaction payload.
///
/// Requires a citizen reference, a kind and an event timestamp; an opinion
/// value is required exactly when the kind is `opinion`.
pub fn validate_interaction(payload: &InteractionPayload) -> Result<()> {
    required(&payload.citizen, "citizen")?;
    let kind = required(&payload.kind, "kind")?;
    required(&payload.occurred_at, "occurred_at")?;

    if *kind == InteractionKind::Opinion && payload.opinion.is_none() {
        return Err(PipelineError::validation(
            "opinion",
            "required when kind is 'opinion'",
        ));
    }

    Ok(())
}

/// Validate a proposal payload.
///
/// Requires a citizen reference, non-empty content, a content kind, a city
/// and an event timestamp.
pub fn validate_proposal(payload: &ProposalPayload) -> Result<()> {
    required(&payload.citizen, "citizen")?;
    let content = required(&payload.content, "content")?;
    required(&payload.content_kind, "content_kind")?;
    required(&payload.city, "city")?;
    required(&payload.occurred_at, "occurred_at")?;

    if content.trim().is_empty() {
        return Err(PipelineError::validation("content", "cannot be empty"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn valid_interaction() -> InteractionPayload {
        InteractionPayload {
            citizen: Some(CitizenRef::Id(1)),
            kind: Some(InteractionKind::Opinion),
            opinion: Some(OpinionValue::Favor),
            bill_id: Some(42),
            content: None,
            metadata: None,
            occurred_at: Some(Utc::now().naive_utc()),
        }
    }

    fn valid_proposal() -> ProposalPayload {
        ProposalPayload {
            citizen: Some(CitizenRef::Token("hash_abc".to_string())),
            content: Some("precisamos de mais creches".to_string()),
            content_kind: Some(ContentKind::Text),
            city: Some("João Pessoa".to_string()),
            occurred_at: Some(Utc::now().naive_utc()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_interaction_passes() {
        assert!(validate_interaction(&valid_interaction()).is_ok());
    }

    #[test]
    fn test_interaction_missing_citizen() {
        let mut payload = valid_interaction();
        payload.citizen = None;
        let err = validate_interaction(&payload).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation { ref field, .. } if field == "citizen"
        ));
    }

    #[test]
    fn test_interaction_missing_timestamp() {
        let mut payload = valid_interaction();
        payload.occurred_at = None;
        let err = validate_interaction(&payload).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation { ref field, .. } if field == "occurred_at"
        ));
    }

    #[test]
    fn test_opinion_required_for_opinion_kind() {
        let mut payload = valid_interaction();
        payload.opinion = None;
        let err = validate_interaction(&payload).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation { ref field, .. } if field == "opinion"
        ));
    }

    #[test]
    fn test_opinion_not_required_for_view() {
        let mut payload = valid_interaction();
        payload.kind = Some(InteractionKind::View);
        payload.opinion = None;
        assert!(validate_interaction(&payload).is_ok());
    }

    #[test]
    fn test_valid_proposal_passes() {
        assert!(validate_proposal(&valid_proposal()).is_ok());
    }

    #[test]
    fn test_proposal_blank_content_rejected() {
        let mut payload = valid_proposal();
        payload.content = Some("   ".to_string());
        let err = validate_proposal(&payload).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation { ref field, .. } if field == "content"
        ));
    }

    #[test]
    fn test_proposal_missing_city() {
        let mut payload = valid_proposal();
        payload.city = None;
        let err = validate_proposal(&payload).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation { ref field, .. } if field == "city"
        ));
    }

    #[test]
    fn test_citizen_ref_deserializes_both_shapes() {
        let by_id: CitizenRef = serde_json::from_str("123").unwrap();
        assert_eq!(by_id, CitizenRef::Id(123));

        let by_token: CitizenRef = serde_json::from_str("\"hash_9f2c\"").unwrap();
        assert_eq!(by_token, CitizenRef::Token("hash_9f2c".to_string()));
    }

    #[test]
    fn test_payload_survives_queue_round_trip() {
        let payload = valid_proposal();
        let line = serde_json::to_string(&payload).unwrap();
        let restored: ProposalPayload = serde_json::from_str(&line).unwrap();
        assert_eq!(restored.content, payload.content);
        assert_eq!(restored.citizen, payload.citizen);
    }
}
