//! Gateway HTTP client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;

use super::{GatewayError, GatewayRefund, RefundGateway};
use crate::core::config::GatewayConfig;

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    status: String,
}

/// HTTP client for the payment gateway's refund API (basic-auth key pair)
pub struct GatewayClient {
    http: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig, timeout_ms: u64) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| GatewayError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }
}

/// The gateway bills in minor currency units (paise).
fn to_minor_units(amount: Decimal) -> Result<i64, GatewayError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| GatewayError::Http(format!("refund amount out of range: {amount}")))
}

#[async_trait]
impl RefundGateway for GatewayClient {
    async fn create_refund(
        &self,
        payment_id: &str,
        amount: Decimal,
        speed: Option<&str>,
    ) -> Result<GatewayRefund, GatewayError> {
        let mut body = serde_json::json!({ "amount": to_minor_units(amount)? });
        if let Some(speed) = speed {
            body["speed"] = serde_json::Value::String(speed.to_string());
        }

        let resp = self
            .http
            .post(format!("{}/v1/payments/{payment_id}/refund", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let refund: RefundResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(GatewayRefund {
            refund_id: refund.id,
            status: refund.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_rupees_to_paise() {
        assert_eq!(to_minor_units(Decimal::new(49900, 2)).unwrap(), 49900);
        assert_eq!(to_minor_units(Decimal::new(1, 0)).unwrap(), 100);
        assert_eq!(to_minor_units(Decimal::new(10505, 3)).unwrap(), 1051);
    }
}
