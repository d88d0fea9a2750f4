//! Carrier API client
//!
//! Outbound side of the carrier integration: authenticated tracking
//! queries used by the manual-resync path. The inbound side (webhook
//! pushes) never touches this module.
//!
//! [`CarrierApi`] is the seam — the HTTP client implements it for
//! production, tests substitute a canned implementation.

pub mod client;

pub use client::CarrierClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CarrierError {
    #[error("Carrier auth failed: {0}")]
    Auth(String),

    #[error("Carrier request failed: {0}")]
    Http(String),

    #[error("Carrier returned HTTP {0}")]
    Status(u16),

    #[error("Carrier response was not decodable: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for CarrierError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CarrierError::Http(format!("timeout: {err}"))
        } else {
            CarrierError::Http(err.to_string())
        }
    }
}

/// Tracking queries against the carrier, by identifier specificity.
///
/// Each call returns the carrier's raw JSON body: the caller feeds it
/// through the same normalizer the webhook path uses, so push and pull
/// share one translation table.
#[async_trait]
pub trait CarrierApi: Send + Sync {
    async fn track_by_shipment_id(&self, shipment_id: &str)
    -> Result<serde_json::Value, CarrierError>;

    async fn track_by_carrier_order_id(
        &self,
        carrier_order_id: &str,
    ) -> Result<serde_json::Value, CarrierError>;

    async fn track_by_awb(&self, awb: &str) -> Result<serde_json::Value, CarrierError>;
}
