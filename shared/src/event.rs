//! Normalized webhook events
//!
//! Ephemeral structures produced by the event normalizer from raw carrier
//! and gateway webhook bodies. Fields absent in the source payload stay
//! `None` — they are never defaulted to a valid-looking value, because a
//! fabricated identifier or timestamp would corrupt resolution and dedup
//! downstream.

use serde::{Deserialize, Serialize};

/// Declared origin of a webhook body, chosen by the receiving endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookSource {
    CarrierShipment,
    CarrierReturn,
    GatewayRefund,
}

/// One scan line from a carrier payload, pre-normalization.
///
/// `date` keeps the carrier's raw string; parsing happens in the
/// normalizer so the fallback (event-level timestamp) can be applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingScan {
    pub date: Option<String>,
    pub activity: Option<String>,
    pub location: Option<String>,
    pub status_code: Option<i64>,
}

/// Canonical shipment event — superset of every carrier payload shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentEvent {
    /// Declared source endpoint (shipment vs. return push)
    pub source: Option<WebhookSource>,
    pub shipment_id: Option<String>,
    pub carrier_order_id: Option<String>,
    pub awb: Option<String>,
    /// Our order/return number, when the carrier echoes the composite
    /// channel identifier back (`<number>_<suffix>`)
    pub order_number_hint: Option<String>,
    pub status_code: Option<i64>,
    pub status_label: Option<String>,
    /// Event-level timestamp, unix milliseconds
    pub timestamp: Option<i64>,
    pub location: Option<String>,
    pub courier_name: Option<String>,
    /// Estimated delivery date as reported
    pub etd: Option<String>,
    pub scans: Vec<TrackingScan>,
}

impl ShipmentEvent {
    /// Whether the event carries anything the resolver can match on
    pub fn has_any_identifier(&self) -> bool {
        self.shipment_id.is_some()
            || self.awb.is_some()
            || self.carrier_order_id.is_some()
            || self.order_number_hint.is_some()
    }
}

/// What the gateway says happened to a refund
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundEventKind {
    /// `refund.processed` — money left the gateway
    Processed,
    /// `refund.failed` — initiation or settlement failed
    Failed,
}

/// Canonical refund event from the payment gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundEvent {
    pub kind: RefundEventKind,
    /// Gateway refund ID (matches `RefundDetails::transaction_id`)
    pub refund_id: String,
    /// Gateway payment ID the refund belongs to
    pub payment_id: Option<String>,
    /// Raw gateway status string, kept for logging
    pub gateway_status: String,
    pub speed: Option<String>,
}
