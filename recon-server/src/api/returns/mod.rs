//! Return API Module
//!
//! Customer-initiated returns enter the engine here; everything after
//! `requested` is driven by carrier webhooks and the refund orchestrator.

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Return router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/returns", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::create))
        .route("/{return_number}", get(handler::get_by_number))
}
