//! Carrier HTTP client
//!
//! Bearer-token auth with a short-TTL in-process cache. The cache is the
//! only global mutable state in the system; it is safe to recompute on
//! any node, so losing it costs one extra login call.
//!
//! No lock is held across an await: the token is read under the lock,
//! the lock is dropped, and a fresh login (when needed) writes back
//! afterwards. Two racing logins are harmless — last write wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;

use super::{CarrierApi, CarrierError};
use crate::core::config::CarrierConfig;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    /// Unix milliseconds
    expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// HTTP client for the carrier's external API
pub struct CarrierClient {
    http: Client,
    base_url: String,
    email: String,
    password: String,
    token_ttl_ms: i64,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl CarrierClient {
    /// Build the client with the configured bounded timeout.
    ///
    /// The timeout applies to every request, auth-token calls included.
    pub fn new(config: &CarrierConfig, timeout_ms: u64) -> Result<Self, CarrierError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| CarrierError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            password: config.password.clone(),
            token_ttl_ms: config.token_ttl_ms,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Cached token if still fresh, otherwise a fresh login.
    async fn auth_token(&self) -> Result<String, CarrierError> {
        let now = shared::util::now_millis();
        if let Some(cached) = self.token.read().as_ref()
            && cached.expires_at > now
        {
            return Ok(cached.token.clone());
        }

        let resp = self
            .http
            .post(format!("{}/v1/external/auth/login", self.base_url))
            .json(&serde_json::json!({
                "email": self.email,
                "password": self.password,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(CarrierError::Auth(format!(
                "login returned HTTP {}",
                resp.status().as_u16()
            )));
        }

        let login: LoginResponse = resp
            .json()
            .await
            .map_err(|e| CarrierError::Decode(e.to_string()))?;

        *self.token.write() = Some(CachedToken {
            token: login.token.clone(),
            expires_at: now + self.token_ttl_ms,
        });
        tracing::debug!("Carrier auth token refreshed");
        Ok(login.token)
    }

    /// Drop the cached token (after a 401 from the carrier).
    fn invalidate_token(&self) {
        *self.token.write() = None;
    }

    /// GET a tracking path, re-authenticating once on 401.
    async fn tracked_get(&self, path: &str) -> Result<serde_json::Value, CarrierError> {
        for attempt in 0..2 {
            let token = self.auth_token().await?;
            let resp = self
                .http
                .get(format!("{}{path}", self.base_url))
                .bearer_auth(&token)
                .send()
                .await?;

            let status = resp.status();
            if status == reqwest::StatusCode::UNAUTHORIZED && attempt == 0 {
                tracing::debug!("Carrier rejected token, re-authenticating");
                self.invalidate_token();
                continue;
            }
            if !status.is_success() {
                return Err(CarrierError::Status(status.as_u16()));
            }
            return resp
                .json()
                .await
                .map_err(|e| CarrierError::Decode(e.to_string()));
        }
        Err(CarrierError::Auth("token rejected twice".into()))
    }
}

#[async_trait]
impl CarrierApi for CarrierClient {
    async fn track_by_shipment_id(
        &self,
        shipment_id: &str,
    ) -> Result<serde_json::Value, CarrierError> {
        self.tracked_get(&format!(
            "/v1/external/courier/track/shipment/{shipment_id}"
        ))
        .await
    }

    async fn track_by_carrier_order_id(
        &self,
        carrier_order_id: &str,
    ) -> Result<serde_json::Value, CarrierError> {
        self.tracked_get(&format!(
            "/v1/external/courier/track/order/{carrier_order_id}"
        ))
        .await
    }

    async fn track_by_awb(&self, awb: &str) -> Result<serde_json::Value, CarrierError> {
        self.tracked_get(&format!("/v1/external/courier/track/awb/{awb}"))
            .await
    }
}
