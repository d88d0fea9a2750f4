//! Aurum Recon Server — order/return reconciliation engine
//!
//! # Architecture overview
//!
//! Keeps internally-owned order/return records consistent with two
//! external, asynchronous sources of truth — a payment gateway and a
//! shipping carrier — that push state via webhooks with inconsistent
//! payload shapes, at-least-once delivery, and no ordering guarantee.
//!
//! # Module structure
//!
//! ```text
//! recon-server/src/
//! ├── core/          # config, state, HTTP server
//! ├── api/           # HTTP routes and handlers (webhooks, admin)
//! ├── recon/         # normalizer, resolver, translator, transition
//! │                  # engine, refund orchestrator, stuck detector
//! ├── txlog/         # append-only transaction log
//! ├── carrier/       # carrier tracking client (auth token cache)
//! ├── gateway/       # payment gateway refund client
//! ├── db/            # embedded SurrealDB + repositories
//! └── utils/         # errors, logging
//! ```

pub mod api;
pub mod carrier;
pub mod core;
pub mod db;
pub mod gateway;
pub mod recon;
pub mod txlog;
pub mod utils;

// Re-export public types
pub use crate::core::{Config, Server, ServerState};
pub use crate::recon::{
    IdentifierResolver, RefundOrchestrator, StuckEntityDetector, TransitionEngine,
};
pub use crate::txlog::TransactionLogger;
pub use crate::utils::{AppError, AppResponse, AppResult};

/// Load `.env` and initialize logging. Call once, before `Config::from_env`.
pub fn setup_environment() {
    dotenv::dotenv().ok();
    let log_level = std::env::var("LOG_LEVEL").ok();
    let log_dir = std::env::var("LOG_DIR").ok();
    utils::init_logger(log_level.as_deref(), log_dir.as_deref());
}

pub fn print_banner() {
    println!(
        r#"
    ___
   /   | __  __________  ______ ___
  / /| |/ / / / ___/ / / / __ `__ \
 / ___ / /_/ / /  / /_/ / / / / / /
/_/  |_\__,_/_/   \__,_/_/ /_/ /_/
         r e c o n
    "#
    );
}
