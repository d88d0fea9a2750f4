//! Transaction log types

use serde::{Deserialize, Serialize};

/// Severity of a logged transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxLevel {
    Info,
    Warn,
    Error,
}

/// Transaction type (enum, not free text)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    // ═══ Order lifecycle ═══
    OrderCreated,
    PaymentCaptured,
    OrderCancelled,

    // ═══ Shipment ═══
    /// First carrier identifier attached to an order
    ShipmentAttached,
    /// Carrier pull/push could not be reconciled
    ShipmentSyncFailed,

    // ═══ Returns / refunds ═══
    ReturnCreated,
    RefundInitiated,
    RefundSucceeded,
    RefundFailed,

    // ═══ Containment ═══
    ManualInterventionFlagged,
    WebhookRejected,
}

impl std::fmt::Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One transaction log entry (immutable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxEntry {
    /// Unix milliseconds
    pub timestamp: i64,
    pub level: TxLevel,
    pub tx_type: TxType,
    /// Order/return number the entry is about ("-" for unattributable events)
    pub reference: String,
    pub message: String,
    /// Structured detail (JSON)
    pub payload: serde_json::Value,
}

/// Query parameters for the admin transactions endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TxQuery {
    /// Start time (unix ms, inclusive)
    pub from: Option<i64>,
    /// End time (unix ms, inclusive)
    pub to: Option<i64>,
    pub tx_type: Option<TxType>,
    pub reference: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Paged response
#[derive(Debug, Serialize)]
pub struct TxListResponse {
    pub items: Vec<TxEntry>,
    pub total: u64,
}
