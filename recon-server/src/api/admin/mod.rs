//! Admin API Module
//!
//! Operator surface: manual tracking resync, refund
//! initiation/eligibility, the stuck-entity report, and transaction-log
//! review. Unlike the webhook endpoints these speak normal HTTP errors.

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Admin router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/admin", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/orders/{order_number}/resync", post(handler::resync_order))
        .route(
            "/returns/{return_number}/refund-eligibility",
            get(handler::refund_eligibility),
        )
        .route("/returns/{return_number}/refund", post(handler::initiate_refund))
        .route("/reports/stuck", get(handler::stuck_report))
        .route("/transactions", get(handler::transactions))
}
