//! Order API handlers

use axum::{
    Json,
    extract::{Path, State},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use shared::models::{AdminNote, Order, PaymentMethod};
use shared::util::now_millis;

use crate::core::ServerState;
use crate::db::repository::{OrderRepository, RepoError};
use crate::txlog::TxType;
use crate::utils::{AppError, AppResult};

/// Shipment identifiers known at creation time (storefront may book the
/// shipment before handing the order over)
#[derive(Debug, Deserialize, Default)]
pub struct ShipmentInput {
    pub shipment_id: Option<String>,
    pub carrier_order_id: Option<String>,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 64))]
    pub order_number: String,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    /// Gateway payment ID (online payments)
    pub payment_id: Option<String>,
    pub customer_name: Option<String>,
    #[validate(email)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub shipment: Option<ShipmentInput>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddNoteRequest {
    #[validate(length(min = 1, max = 2000))]
    pub note: String,
    #[validate(length(min = 1, max = 64))]
    pub author: String,
}

/// Register an order with the reconciliation engine (pending, unpaid).
pub async fn create(
    State(state): State<ServerState>,
    Json(req): Json<CreateOrderRequest>,
) -> AppResult<Json<Order>> {
    req.validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let mut order = Order::new(
        req.order_number.clone(),
        req.amount,
        req.payment_method,
        now_millis(),
    );
    order.payment_id = req.payment_id;
    order.customer_name = req.customer_name;
    order.customer_email = req.customer_email;
    if let Some(shipment) = req.shipment {
        order.shipping.shipment_id = shipment.shipment_id;
        order.shipping.carrier_order_id = shipment.carrier_order_id;
        order.shipping.awb_code = shipment.awb_code;
        order.shipping.courier_name = shipment.courier_name;
    }

    let repo = OrderRepository::new(state.db.clone());
    let created = repo.create(&order).await.map_err(|e| match e {
        RepoError::Duplicate(msg) => AppError::Conflict(msg),
        other => AppError::database(other.to_string()),
    })?;

    state.tx_log.info(
        TxType::OrderCreated,
        &created.order_number,
        "Order registered",
        serde_json::json!({
            "payment_method": created.payment_method,
            "amount": created.amount,
        }),
    );

    Ok(Json(created))
}

/// Fetch one order with its tracking history and note trail.
pub async fn get_by_number(
    State(state): State<ServerState>,
    Path(order_number): Path<String>,
) -> AppResult<Json<Order>> {
    let repo = OrderRepository::new(state.db.clone());
    let order = repo
        .find_by_order_number(&order_number)
        .await
        .map_err(|e| AppError::database(e.to_string()))?
        .ok_or_else(|| AppError::not_found(format!("Order {order_number} not found")))?;
    Ok(Json(order))
}

/// Append to the order's note trail.
pub async fn add_note(
    State(state): State<ServerState>,
    Path(order_number): Path<String>,
    Json(req): Json<AddNoteRequest>,
) -> AppResult<Json<Order>> {
    req.validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let repo = OrderRepository::new(state.db.clone());
    // existence check first so a typo'd number 404s instead of silently
    // updating nothing
    repo.find_by_order_number(&order_number)
        .await
        .map_err(|e| AppError::database(e.to_string()))?
        .ok_or_else(|| AppError::not_found(format!("Order {order_number} not found")))?;

    repo.append_admin_note(
        &order_number,
        AdminNote {
            note: req.note,
            author: req.author,
            timestamp: now_millis(),
        },
    )
    .await
    .map_err(|e| AppError::database(e.to_string()))?;

    let order = repo
        .find_by_order_number(&order_number)
        .await
        .map_err(|e| AppError::database(e.to_string()))?
        .ok_or_else(|| AppError::not_found(format!("Order {order_number} not found")))?;
    Ok(Json(order))
}
