//! Reconciliation engine
//!
//! The webhook processing pipeline, leaf-first:
//!
//! ```text
//! raw webhook body
//!     │
//!     ├─ normalizer   → canonical ShipmentEvent / RefundEvent
//!     ├─ resolver     → matching Order / ReturnRequest (or clean miss)
//!     ├─ translator   → canonical status pair for the carrier code
//!     ├─ transition   → validated, idempotent state change
//!     └─ refund       → return→refund saga on the `received` transition
//!
//! stuck               → offline divergence scan over the same state
//! ```
//!
//! Errors that are part of normal operation (unmatchable record, unmapped
//! status code) are modeled as values, not `Err`: the resolver returns
//! `Ok(None)` and the translator returns an `Unmapped` branch. [`ReconError`]
//! covers the genuinely exceptional cases.

pub mod normalizer;
pub mod refund;
pub mod resolver;
pub mod stuck;
pub mod transition;
pub mod translator;

pub use normalizer::{NormalizationError, normalize_refund, normalize_shipment};
pub use refund::{RefundOrchestrator, RefundRunOutcome};
pub use resolver::IdentifierResolver;
pub use stuck::{StuckEntity, StuckEntityDetector, StuckPriority, StuckReport};
pub use transition::{ReturnOutcome, TransitionEngine, TransitionOutcome};
pub use translator::{ReturnTranslation, ShipmentTranslation, translate_return_label, translate_shipment_code};

use thiserror::Error;

use crate::db::repository::RepoError;

/// Failures the pipeline cannot absorb as ordinary outcomes
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("Normalization failed: {0}")]
    Normalization(#[from] NormalizationError),

    #[error("Transition conflict on {reference}: {detail}")]
    /// The record kept moving under the engine across retries;
    /// the original state is preserved
    TransitionConflict { reference: String, detail: String },

    #[error("External call failed: {0}")]
    ExternalCall(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl From<RepoError> for ReconError {
    fn from(err: RepoError) -> Self {
        ReconError::Persistence(err.to_string())
    }
}
