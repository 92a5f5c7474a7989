//! # Data Layer
//!
//! SQLx-backed models for the participation pipeline. The processor is the
//! only writer for citizens, interactions and proposals; the gap calculator
//! owns the `gap_metrics` snapshot table; legislative bills are read-only
//! here and populated by the bill-ingestion collaborator.

pub mod bill;
pub mod citizen;
pub mod gap_metric;
pub mod interaction;
pub mod proposal;

// Re-export core models for easy access
pub use bill::{BillStatus, LegislativeBill};
pub use citizen::{Citizen, NewCitizen};
pub use gap_metric::{GapMetric, GapTier, NewGapMetric, SegmentAxis};
pub use interaction::{Interaction, InteractionKind, NewInteraction, OpinionValue, TrendPoint};
pub use proposal::{ContentKind, NewProposal, Proposal, ProposalStatus};
