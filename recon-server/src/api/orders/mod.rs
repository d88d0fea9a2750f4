//! Order API Module
//!
//! The seam through which the storefront hands orders to the engine at
//! checkout, plus read access and the note trail. Status mutations never
//! happen here — they belong to the transition engine.

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::create))
        .route("/{order_number}", get(handler::get_by_number))
        .route("/{order_number}/notes", post(handler::add_note))
}
