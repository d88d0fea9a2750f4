//! API Routing Module
//!
//! # Structure
//!
//! - [`health`] - liveness probe
//! - [`webhooks`] - carrier/gateway inbound push endpoints
//! - [`orders`] - order ingestion and read access
//! - [`returns`] - return ingestion and read access
//! - [`admin`] - resync, refunds, stuck report, transaction log

pub mod admin;
pub mod health;
pub mod orders;
pub mod returns;
pub mod webhooks;

// Re-export common types for handlers
pub use crate::utils::{AppResponse, AppResult};
