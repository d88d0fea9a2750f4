//! Core Module
//!
//! - [`config`] - environment-driven configuration
//! - [`state`] - shared server state (db, clients, transaction log)
//! - [`server`] - HTTP server assembly and lifecycle

pub mod config;
pub mod server;
pub mod state;

pub use config::Config;
pub use server::Server;
pub use state::ServerState;
