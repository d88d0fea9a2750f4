//! Return API handlers

use axum::{
    Json,
    extract::{Path, State},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use shared::models::{BankDetails, ItemCondition, OrderStatus, ReturnItem, ReturnRequest};
use shared::util::{now_millis, reference_number};

use crate::core::ServerState;
use crate::db::repository::{OrderRepository, RepoError, ReturnRepository};
use crate::txlog::TxType;
use crate::utils::{AppError, AppResult};

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ReturnItemInput {
    #[validate(length(min = 1, max = 64))]
    pub product_id: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    pub item_condition: ItemCondition,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReturnRequest {
    #[validate(length(min = 1, max = 64))]
    pub order_number: String,
    #[validate(nested, length(min = 1))]
    pub items: Vec<ReturnItemInput>,
    /// Defaults to the order's full amount
    pub refund_amount: Option<Decimal>,
    /// Payout particulars for COD orders
    pub bank: Option<BankDetails>,
}

/// Open a return for a delivered order.
pub async fn create(
    State(state): State<ServerState>,
    Json(req): Json<CreateReturnRequest>,
) -> AppResult<Json<ReturnRequest>> {
    req.validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let orders = OrderRepository::new(state.db.clone());
    let order = orders
        .find_by_order_number(&req.order_number)
        .await
        .map_err(|e| AppError::database(e.to_string()))?
        .ok_or_else(|| AppError::not_found(format!("Order {} not found", req.order_number)))?;

    if order.status != OrderStatus::Delivered {
        return Err(AppError::BusinessRule(format!(
            "Returns require a delivered order; {} is {}",
            order.order_number, order.status
        )));
    }

    let returns = ReturnRepository::new(state.db.clone());
    if returns
        .find_by_order_number(&order.order_number)
        .await
        .map_err(|e| AppError::database(e.to_string()))?
        .is_some()
    {
        return Err(AppError::Conflict(format!(
            "Order {} already has a return",
            order.order_number
        )));
    }

    let items: Vec<ReturnItem> = req
        .items
        .into_iter()
        .map(|i| ReturnItem {
            product_id: i.product_id,
            quantity: i.quantity,
            reason: i.reason,
            item_condition: i.item_condition,
        })
        .collect();

    let mut ret = ReturnRequest::new(
        reference_number("RET"),
        order.order_number.clone(),
        items,
        req.refund_amount.unwrap_or(order.amount),
        now_millis(),
    );
    ret.refund.bank = req.bank;

    let created = returns.create(&ret).await.map_err(|e| match e {
        RepoError::Duplicate(msg) => AppError::Conflict(msg),
        other => AppError::database(other.to_string()),
    })?;

    state.tx_log.info(
        TxType::ReturnCreated,
        &created.return_number,
        "Return requested",
        serde_json::json!({
            "order_number": created.order_number,
            "refund_amount": created.refund.amount,
        }),
    );

    Ok(Json(created))
}

/// Fetch one return with its transition history and note trail.
pub async fn get_by_number(
    State(state): State<ServerState>,
    Path(return_number): Path<String>,
) -> AppResult<Json<ReturnRequest>> {
    let repo = ReturnRepository::new(state.db.clone());
    let ret = repo
        .find_by_return_number(&return_number)
        .await
        .map_err(|e| AppError::database(e.to_string()))?
        .ok_or_else(|| AppError::not_found(format!("Return {return_number} not found")))?;
    Ok(Json(ret))
}
