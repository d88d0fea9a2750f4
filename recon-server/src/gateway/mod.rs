//! Payment gateway client
//!
//! Refund issuance against the payment gateway. [`RefundGateway`] is the
//! seam the refund orchestrator depends on; tests substitute mock
//! implementations to exercise the containment paths.

pub mod client;

pub use client::GatewayClient;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Http(String),

    #[error("Gateway returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Gateway response was not decodable: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Http(format!("timeout: {err}"))
        } else {
            GatewayError::Http(err.to_string())
        }
    }
}

/// What the gateway reports back for a created refund
#[derive(Debug, Clone)]
pub struct GatewayRefund {
    /// Gateway refund ID — becomes `RefundDetails::transaction_id`
    pub refund_id: String,
    /// Gateway status string (`processed`, `pending`, ...)
    pub status: String,
}

/// Refund issuance seam.
///
/// Initiation only: confirmation (or failure) arrives independently via
/// the gateway's webhook, and the engine must tolerate either order.
#[async_trait]
pub trait RefundGateway: Send + Sync {
    async fn create_refund(
        &self,
        payment_id: &str,
        amount: Decimal,
        speed: Option<&str>,
    ) -> Result<GatewayRefund, GatewayError>;
}
