//! Webhook API Module
//!
//! Inbound push endpoints for the carrier and the payment gateway.
//!
//! Contract asymmetry, imposed by the external systems:
//! - Carrier endpoints answer **200 always**, even on signature or
//!   processing failure (`{"success": false}`) — anything else triggers
//!   carrier-side retry storms.
//! - The gateway endpoint answers 401 on a bad signature; the gateway
//!   tolerates non-200 and retries sensibly.

mod handler;
pub mod signature;

use axum::{Router, routing::post};

use crate::core::ServerState;

/// Webhook router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/webhooks", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/carrier/shipment", post(handler::carrier_shipment))
        .route("/carrier/return", post(handler::carrier_return))
        .route("/gateway/refund", post(handler::gateway_refund))
}
