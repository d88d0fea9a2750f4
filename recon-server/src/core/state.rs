//! Server state — shared references for all handlers
//!
//! `ServerState` is cloned into every request (`Arc` fields make that
//! cheap). Handlers build the engine pieces they need from it per
//! request; nothing holds record state across requests.

use std::sync::Arc;

use surrealdb::Surreal;
use surrealdb::engine::local::Db;

use crate::carrier::{CarrierApi, CarrierClient};
use crate::core::Config;
use crate::db;
use crate::gateway::{GatewayClient, RefundGateway};
use crate::txlog::{self, TransactionLogger};
use crate::utils::AppError;

/// Shared server state
///
/// | Field | Description |
/// |-------|-------------|
/// | config | Configuration (immutable after boot) |
/// | db | Embedded SurrealDB handle |
/// | tx_log | Transaction logger (mpsc-backed, best-effort) |
/// | carrier | Carrier tracking client (manual resync) |
/// | gateway | Refund gateway client |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub db: Surreal<Db>,
    pub tx_log: TransactionLogger,
    pub carrier: Arc<dyn CarrierApi>,
    pub gateway: Arc<dyn RefundGateway>,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// Open the database, start the transaction-log worker, and build
    /// the external clients.
    pub async fn initialize(config: &Config) -> Result<Self, AppError> {
        let data_dir = std::path::Path::new(&config.data_dir);
        std::fs::create_dir_all(data_dir)
            .map_err(|e| AppError::internal(format!("Failed to create data dir: {e}")))?;

        let db = db::connect(data_dir).await?;
        let (tx_log, _worker) = txlog::spawn(db.clone());

        let carrier = CarrierClient::new(&config.carrier, config.external_timeout_ms)
            .map_err(|e| AppError::internal(e.to_string()))?;
        let gateway = GatewayClient::new(&config.gateway, config.external_timeout_ms)
            .map_err(|e| AppError::internal(e.to_string()))?;

        Ok(Self {
            config: config.clone(),
            db,
            tx_log,
            carrier: Arc::new(carrier),
            gateway: Arc::new(gateway),
        })
    }

    /// State over an in-memory database with injected clients — used by
    /// handler tests.
    pub async fn for_tests(
        carrier: Arc<dyn CarrierApi>,
        gateway: Arc<dyn RefundGateway>,
    ) -> Result<Self, AppError> {
        let db = db::connect_memory().await?;
        let (tx_log, _worker) = txlog::spawn(db.clone());
        Ok(Self {
            config: Config::with_overrides("/tmp/aurum-test", 0),
            db,
            tx_log,
            carrier,
            gateway,
        })
    }
}
