//! # Validation & Persistence Engine
//!
//! Validates inbound payloads, resolves citizen identities idempotently and
//! writes interaction/proposal rows transactionally. The state machine per
//! submission is Validate → Resolve-Citizen → Persist → Commit | Rollback:
//! any referential-integrity violation rolls the whole transaction back, so a
//! failed submission never leaves a partial write behind.
//!
//! A record returned from this engine is fully durable and its fields equal
//! every field supplied in the request.

use crate::error::{PipelineError, Result};
use crate::logging;
use crate::models::{
    Citizen, Interaction, NewCitizen, NewInteraction, NewProposal, Proposal, ProposalStatus,
};
use crate::validation::{self, CitizenRef, InteractionPayload, ProposalPayload};
use sqlx::{PgPool, Postgres, Transaction};

/// City recorded for a citizen created from a bare token with no city hint.
const UNKNOWN_CITY: &str = "Unknown";

/// The pipeline's only writer for citizens, interactions and proposals.
pub struct Processor {
    pool: PgPool,
}

impl Processor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Validate and persist a citizen interaction.
    pub async fn process_interaction(&self, payload: &InteractionPayload) -> Result<Interaction> {
        validation::validate_interaction(payload)?;

        let mut tx = self.pool.begin().await?;
        let result = self.persist_interaction(&mut tx, payload).await;

        match result {
            Ok(interaction) => {
                tx.commit().await?;
                logging::log_pipeline_operation(
                    "process_interaction",
                    "interaction",
                    Some(interaction.id),
                    "persisted",
                    Some(&interaction.kind),
                );
                Ok(interaction)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    /// Validate and persist a citizen proposal. Classification fields are
    /// expected to be attached to the payload already (by the service or by
    /// a queued replay).
    pub async fn process_proposal(&self, payload: &ProposalPayload) -> Result<Proposal> {
        validation::validate_proposal(payload)?;

        let mut tx = self.pool.begin().await?;
        let result = self.persist_proposal(&mut tx, payload).await;

        match result {
            Ok(proposal) => {
                tx.commit().await?;
                logging::log_pipeline_operation(
                    "process_proposal",
                    "proposal",
                    Some(proposal.id),
                    "persisted",
                    Some(&proposal.city),
                );
                Ok(proposal)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    /// Resolve a citizen reference inside the caller's transaction.
    ///
    /// A numeric id must already exist; it is never fabricated into a new
    /// row. An opaque token is get-or-created idempotently, with a creation
    /// race resolving to the surviving row.
    pub async fn resolve_citizen(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reference: &CitizenRef,
        city_hint: Option<&str>,
        group_hint: Option<&str>,
    ) -> Result<Citizen> {
        match reference {
            CitizenRef::Id(id) => Citizen::find_by_id(tx, *id)
                .await?
                .ok_or_else(|| {
                    PipelineError::validation("citizen", format!("citizen with id {id} not found"))
                }),
            CitizenRef::Token(identity_hash) => {
                let new_citizen = NewCitizen {
                    identity_hash: identity_hash.clone(),
                    city: city_hint.unwrap_or(UNKNOWN_CITY).to_string(),
                    inclusion_group: group_hint.map(str::to_string),
                    interest_themes: serde_json::json!([]),
                };
                Ok(Citizen::get_or_create(tx, new_citizen).await?)
            }
        }
    }

    async fn persist_interaction(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payload: &InteractionPayload,
    ) -> Result<Interaction> {
        // Missing required fields surface as validation errors, never panics.
        let citizen_ref = payload
            .citizen
            .as_ref()
            .ok_or_else(|| PipelineError::validation("citizen", "missing required field"))?;
        let kind = payload
            .kind
            .ok_or_else(|| PipelineError::validation("kind", "missing required field"))?;
        let occurred_at = payload
            .occurred_at
            .ok_or_else(|| PipelineError::validation("occurred_at", "missing required field"))?;

        let citizen = self.resolve_citizen(tx, citizen_ref, None, None).await?;

        let new_interaction = NewInteraction {
            citizen_id: citizen.id,
            bill_id: payload.bill_id,
            kind,
            opinion: payload.opinion,
            content: payload.content.clone(),
            metadata: payload
                .metadata
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
            occurred_at,
        };

        Ok(Interaction::create(tx, new_interaction).await?)
    }

    async fn persist_proposal(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payload: &ProposalPayload,
    ) -> Result<Proposal> {
        let citizen_ref = payload
            .citizen
            .as_ref()
            .ok_or_else(|| PipelineError::validation("citizen", "missing required field"))?;
        let content = payload
            .content
            .clone()
            .ok_or_else(|| PipelineError::validation("content", "missing required field"))?;
        let content_kind = payload
            .content_kind
            .ok_or_else(|| PipelineError::validation("content_kind", "missing required field"))?;
        let city = payload
            .city
            .clone()
            .ok_or_else(|| PipelineError::validation("city", "missing required field"))?;
        let occurred_at = payload
            .occurred_at
            .ok_or_else(|| PipelineError::validation("occurred_at", "missing required field"))?;

        let citizen = self
            .resolve_citizen(
                tx,
                citizen_ref,
                Some(&city),
                payload.inclusion_group.as_deref(),
            )
            .await?;

        let new_proposal = NewProposal {
            citizen_id: citizen.id,
            content,
            content_kind,
            audio_url: payload.audio_url.clone(),
            primary_theme: payload.primary_theme.clone(),
            secondary_themes: payload
                .secondary_themes
                .as_ref()
                .map(|themes| serde_json::json!(themes)),
            confidence: payload.confidence,
            city,
            inclusion_group: payload.inclusion_group.clone(),
            status: payload.status.unwrap_or(ProposalStatus::Pending),
            duplicate_group: payload.duplicate_group,
            occurred_at,
        };

        Ok(Proposal::create(tx, new_proposal).await?)
    }
}
