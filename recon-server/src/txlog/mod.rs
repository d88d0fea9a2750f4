//! Transaction Log
//!
//! Append-only structured record of every transition and automation
//! outcome: order creation, payment capture, shipment attach/failure,
//! refund initiation/success/failure, cancellation, manual-intervention
//! flags, rejected webhooks.
//!
//! Logging is best-effort relative to the primary state mutation: a
//! storage failure is reported via `tracing::error!` and never aborts the
//! operation that triggered it. Writes flow through an mpsc channel to a
//! background worker so callers never block on the database.

pub mod service;
pub mod storage;
pub mod types;

pub use service::{TransactionLogger, spawn};
pub use storage::TxLogStorage;
pub use types::{TxEntry, TxLevel, TxListResponse, TxQuery, TxType};
