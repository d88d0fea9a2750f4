//! Admin API handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use shared::event::WebhookSource;
use shared::models::{Order, OrderStatus, ReturnStatus, ShippingStatus, TransitionActor};
use shared::util::now_millis;

use crate::core::ServerState;
use crate::db::repository::{OrderRepository, ReturnRepository};
use crate::recon::{
    RefundOrchestrator, RefundRunOutcome, StuckEntityDetector, StuckReport, TransitionEngine,
    normalize_shipment,
};
use crate::recon::refund::RefundEligibility;
use crate::txlog::{TxListResponse, TxQuery, TxType};
use crate::utils::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct ResyncResponse {
    pub order_number: String,
    /// Identifier used for the carrier pull
    pub queried_by: &'static str,
    pub updated: bool,
    pub status: OrderStatus,
    pub shipping_status: ShippingStatus,
    pub appended_entries: usize,
}

/// `POST /api/admin/orders/{order_number}/resync`
///
/// Forces a fresh pull from the carrier's query API, trying identifiers
/// in the resolver's priority order (shipment ID → carrier order ID →
/// AWB), and feeds the result through the same normalizer and transition
/// engine the webhook path uses.
pub async fn resync_order(
    State(state): State<ServerState>,
    Path(order_number): Path<String>,
) -> AppResult<Json<ResyncResponse>> {
    let orders = OrderRepository::new(state.db.clone());
    let order = orders
        .find_by_order_number(&order_number)
        .await
        .map_err(|e| AppError::database(e.to_string()))?
        .ok_or_else(|| AppError::not_found(format!("Order {order_number} not found")))?;

    let (queried_by, raw) = pull_tracking(&state, &order).await?;

    let event = normalize_shipment(WebhookSource::CarrierShipment, &raw).map_err(|e| {
        state.tx_log.error(
            TxType::ShipmentSyncFailed,
            &order_number,
            format!("Carrier resync response not normalizable: {e}"),
            raw.clone(),
        );
        AppError::upstream(format!("Carrier response not normalizable: {e}"))
    })?;

    let engine = TransitionEngine::new(state.db.clone(), state.tx_log.clone());
    let outcome = engine
        .apply_shipment_event(order, &event)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    Ok(Json(ResyncResponse {
        order_number,
        queried_by,
        updated: outcome.updated,
        status: outcome.status,
        shipping_status: outcome.shipping_status,
        appended_entries: outcome.appended_entries,
    }))
}

/// Carrier pull using the most specific identifier the order has.
async fn pull_tracking(
    state: &ServerState,
    order: &Order,
) -> AppResult<(&'static str, serde_json::Value)> {
    let result = if let Some(shipment_id) = order.shipping.shipment_id.as_deref() {
        ("shipment_id", state.carrier.track_by_shipment_id(shipment_id).await)
    } else if let Some(carrier_order_id) = order.shipping.carrier_order_id.as_deref() {
        (
            "carrier_order_id",
            state.carrier.track_by_carrier_order_id(carrier_order_id).await,
        )
    } else if let Some(awb) = order.shipping.awb_code.as_deref() {
        ("awb", state.carrier.track_by_awb(awb).await)
    } else {
        return Err(AppError::BusinessRule(format!(
            "Order {} has no carrier identifiers to query by",
            order.order_number
        )));
    };

    match result {
        (queried_by, Ok(raw)) => Ok((queried_by, raw)),
        (queried_by, Err(e)) => {
            state.tx_log.error(
                TxType::ShipmentSyncFailed,
                &order.order_number,
                format!("Carrier pull by {queried_by} failed: {e}"),
                serde_json::json!({ "queried_by": queried_by }),
            );
            Err(AppError::upstream(e.to_string()))
        }
    }
}

/// `GET /api/admin/returns/{return_number}/refund-eligibility`
pub async fn refund_eligibility(
    State(state): State<ServerState>,
    Path(return_number): Path<String>,
) -> AppResult<Json<RefundEligibility>> {
    ensure_return_exists(&state, &return_number).await?;
    let orchestrator =
        RefundOrchestrator::new(state.db.clone(), state.gateway.clone(), state.tx_log.clone());
    let eligibility = orchestrator
        .eligibility(&return_number)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(eligibility))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ManualRefundRequest {
    /// Admin user recorded as the transition actor
    #[validate(length(min = 1, max = 64))]
    pub admin: String,
}

#[derive(Debug, Serialize)]
pub struct ManualRefundResponse {
    pub return_number: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
}

/// `POST /api/admin/returns/{return_number}/refund`
///
/// Manual refund initiation. A return held at `inspected` (flagged
/// items) is approved here by a named admin; the saga then runs exactly
/// as the automated path does.
pub async fn initiate_refund(
    State(state): State<ServerState>,
    Path(return_number): Path<String>,
    Json(req): Json<ManualRefundRequest>,
) -> AppResult<Json<ManualRefundResponse>> {
    req.validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let returns = ReturnRepository::new(state.db.clone());
    let ret = returns
        .find_by_return_number(&return_number)
        .await
        .map_err(|e| AppError::database(e.to_string()))?
        .ok_or_else(|| AppError::not_found(format!("Return {return_number} not found")))?;

    let actor = TransitionActor::Admin(req.admin);

    // a human approving a flagged inspection is the one manual hop
    if ret.status == ReturnStatus::Inspected {
        returns
            .advance_status(
                &return_number,
                ReturnStatus::Inspected,
                ReturnStatus::ApprovedRefund,
                actor.clone(),
                now_millis(),
            )
            .await
            .map_err(|e| AppError::database(e.to_string()))?;
    }

    let orchestrator =
        RefundOrchestrator::new(state.db.clone(), state.gateway.clone(), state.tx_log.clone());
    let outcome = orchestrator
        .initiate_refund(&return_number, actor)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    let response = match outcome {
        RefundRunOutcome::Completed { refund_id } => ManualRefundResponse {
            return_number,
            outcome: "completed".into(),
            refund_id: Some(refund_id),
        },
        RefundRunOutcome::GatewayFailed { reason } => {
            return Err(AppError::upstream(format!(
                "Refund gateway call failed: {reason}"
            )));
        }
        RefundRunOutcome::AlreadyInitiated => ManualRefundResponse {
            return_number,
            outcome: "already_initiated".into(),
            refund_id: None,
        },
        RefundRunOutcome::ManualPayoutRequired => ManualRefundResponse {
            return_number,
            outcome: "manual_payout_required".into(),
            refund_id: None,
        },
        RefundRunOutcome::NotEligible { status } => {
            return Err(AppError::BusinessRule(format!(
                "Return {return_number} is at `{status}` — not refundable from here"
            )));
        }
        RefundRunOutcome::HeldForInspection => ManualRefundResponse {
            return_number,
            outcome: "held_for_inspection".into(),
            refund_id: None,
        },
    };
    Ok(Json(response))
}

/// `GET /api/admin/reports/stuck` — the divergence report (read-only).
pub async fn stuck_report(State(state): State<ServerState>) -> AppResult<Json<StuckReport>> {
    let detector = StuckEntityDetector::new(state.db.clone(), state.config.stuck.clone());
    let report = detector
        .scan()
        .await
        .map_err(|e| AppError::database(e.to_string()))?;
    Ok(Json(report))
}

/// `GET /api/admin/transactions` — transaction log review.
pub async fn transactions(
    State(state): State<ServerState>,
    Query(query): Query<TxQuery>,
) -> AppResult<Json<TxListResponse>> {
    let page = state.tx_log.query(&query).await?;
    Ok(Json(page))
}

async fn ensure_return_exists(state: &ServerState, return_number: &str) -> AppResult<()> {
    ReturnRepository::new(state.db.clone())
        .find_by_return_number(return_number)
        .await
        .map_err(|e| AppError::database(e.to_string()))?
        .ok_or_else(|| AppError::not_found(format!("Return {return_number} not found")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::{CarrierApi, CarrierError};
    use crate::gateway::{GatewayError, GatewayRefund, RefundGateway};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use shared::models::PaymentMethod;
    use std::sync::Arc;

    /// Carrier that answers every query with a delivered payload
    struct DeliveredCarrier;
    #[async_trait]
    impl CarrierApi for DeliveredCarrier {
        async fn track_by_shipment_id(
            &self,
            shipment_id: &str,
        ) -> Result<serde_json::Value, CarrierError> {
            Ok(serde_json::json!({
                "shipment_id": shipment_id,
                "tracking_data": {
                    "shipment_status": 7,
                    "current_status": "Delivered",
                    "scan": [{ "date": "14 10 2025 10:00:00", "location": "Mumbai" }]
                }
            }))
        }
        async fn track_by_carrier_order_id(
            &self,
            _: &str,
        ) -> Result<serde_json::Value, CarrierError> {
            Err(CarrierError::Status(404))
        }
        async fn track_by_awb(&self, _: &str) -> Result<serde_json::Value, CarrierError> {
            Err(CarrierError::Status(404))
        }
    }

    struct OkGateway;
    #[async_trait]
    impl RefundGateway for OkGateway {
        async fn create_refund(
            &self,
            _: &str,
            _: Decimal,
            _: Option<&str>,
        ) -> Result<GatewayRefund, GatewayError> {
            Ok(GatewayRefund {
                refund_id: "rfnd_admin_1".into(),
                status: "processed".into(),
            })
        }
    }

    async fn state() -> ServerState {
        ServerState::for_tests(Arc::new(DeliveredCarrier), Arc::new(OkGateway))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn resync_pulls_and_applies_through_the_engine() {
        let state = state().await;
        let orders = OrderRepository::new(state.db.clone());
        let mut order = Order::new("AUR-1", Decimal::ONE, PaymentMethod::Cod, 0);
        order.status = OrderStatus::Shipped;
        order.shipping.status = ShippingStatus::Shipped;
        order.shipping.shipment_id = Some("S1".into());
        orders.create(&order).await.unwrap();

        let resp = resync_order(State(state), Path("AUR-1".into()))
            .await
            .unwrap();
        assert_eq!(resp.0.queried_by, "shipment_id");
        assert!(resp.0.updated);
        assert_eq!(resp.0.status, OrderStatus::Delivered);
        assert_eq!(resp.0.appended_entries, 1);
    }

    #[tokio::test]
    async fn resync_without_identifiers_is_rejected() {
        let state = state().await;
        let orders = OrderRepository::new(state.db.clone());
        orders
            .create(&Order::new("AUR-1", Decimal::ONE, PaymentMethod::Cod, 0))
            .await
            .unwrap();

        let err = resync_order(State(state), Path("AUR-1".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));
    }

    #[tokio::test]
    async fn manual_refund_approves_inspected_return() {
        let state = state().await;
        let orders = OrderRepository::new(state.db.clone());
        let returns = ReturnRepository::new(state.db.clone());

        let mut order = Order::new("AUR-1", Decimal::new(49900, 2), PaymentMethod::Online, 0);
        order.payment_id = Some("pay_1".into());
        orders.create(&order).await.unwrap();

        let mut ret = shared::models::ReturnRequest::new(
            "RET1",
            "AUR-1",
            vec![],
            Decimal::new(49900, 2),
            0,
        );
        ret.status = ReturnStatus::Inspected;
        returns.create(&ret).await.unwrap();

        let resp = initiate_refund(
            State(state),
            Path("RET1".into()),
            Json(ManualRefundRequest {
                admin: "maya".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.0.outcome, "completed");
        assert_eq!(resp.0.refund_id.as_deref(), Some("rfnd_admin_1"));

        let stored = returns.find_by_return_number("RET1").await.unwrap().unwrap();
        assert_eq!(stored.status, ReturnStatus::Completed);
        // the approval hop carries the admin's name
        assert!(stored.status_history.iter().any(|t| matches!(
            &t.actor,
            TransitionActor::Admin(name) if name == "maya"
        )));
    }
}
