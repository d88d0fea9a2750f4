//! State Machine / Transition Engine
//!
//! Validates and applies status transitions driven by canonical events.
//!
//! # Write discipline
//!
//! The decision is computed against a fetched snapshot, but the write is
//! a conditional update whose predicate re-checks the snapshot's status.
//! If a concurrent delivery moved the record first, the write misses, the
//! record is refetched and the decision is recomputed — up to
//! [`MAX_WRITE_ATTEMPTS`] times. Either the full update lands or none of
//! it does; there is no partial write to roll back.
//!
//! # Idempotency
//!
//! Tracking entries are deduped on `(timestamp, status_code)` before the
//! write and unioned inside it. Re-applying an already-seen event decides
//! "nothing to do" and never touches the store. Re-applying the current
//! status may still refresh secondary fields (courier name, ETD).

use std::collections::HashSet;

use shared::event::ShipmentEvent;
use shared::models::{
    Order, OrderStatus, PaymentMethod, PaymentStatus, ReturnRequest, ReturnStatus, ShippingStatus,
    TrackingEntry, TransitionActor,
};
use shared::util::{now_millis, parse_carrier_datetime};

use surrealdb::Surreal;
use surrealdb::engine::local::Db;

use super::translator::{ReturnTranslation, ShipmentTranslation, translate_return_label, translate_shipment_code};
use super::ReconError;
use crate::db::repository::{OrderRepository, ReturnRepository, ShipmentUpdate};
use crate::txlog::{TransactionLogger, TxType};

/// Bounded retries for a conditional write before reporting a conflict
const MAX_WRITE_ATTEMPTS: usize = 3;

/// What applying a shipment event did to an order
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    /// Whether anything was written
    pub updated: bool,
    pub status: OrderStatus,
    pub shipping_status: ShippingStatus,
    /// Tracking entries appended by this application
    pub appended_entries: usize,
    /// COD auto-pay fired
    pub payment_captured: bool,
    /// The event carried a status code the table does not know
    pub translation_gap: bool,
}

/// What applying a return event did to a return
#[derive(Debug, Clone)]
pub struct ReturnOutcome {
    pub updated: bool,
    pub status: ReturnStatus,
    /// The transition INTO `received` happened — the refund
    /// orchestrator's only trigger
    pub reached_received: bool,
    pub translation_gap: bool,
}

/// Everything one event application decided, before the write
struct Decision {
    status: OrderStatus,
    shipping_status: ShippingStatus,
    payment_status: Option<PaymentStatus>,
    entries: Vec<TrackingEntry>,
    adopt_shipment_id: Option<String>,
    adopt_carrier_order_id: Option<String>,
    adopt_awb: Option<String>,
    courier_name: Option<String>,
    etd: Option<String>,
    translation_gap: bool,
    shipment_attached: bool,
    needs_write: bool,
}

pub struct TransitionEngine {
    orders: OrderRepository,
    returns: ReturnRepository,
    tx_log: TransactionLogger,
}

impl TransitionEngine {
    pub fn new(db: Surreal<Db>, tx_log: TransactionLogger) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            returns: ReturnRepository::new(db),
            tx_log,
        }
    }

    /// Apply a canonical shipment event to an order.
    pub async fn apply_shipment_event(
        &self,
        mut order: Order,
        event: &ShipmentEvent,
    ) -> Result<TransitionOutcome, ReconError> {
        for _attempt in 0..MAX_WRITE_ATTEMPTS {
            let decision = decide(&order, event);

            if decision.translation_gap {
                tracing::info!(
                    order_number = %order.order_number,
                    status_code = event.status_code.unwrap_or(-1),
                    "Unmapped carrier status code — history recorded, status untouched"
                );
            }

            if !decision.needs_write {
                return Ok(TransitionOutcome {
                    updated: false,
                    status: order.status,
                    shipping_status: order.shipping.status,
                    appended_entries: 0,
                    payment_captured: false,
                    translation_gap: decision.translation_gap,
                });
            }

            let update = ShipmentUpdate {
                expected_status: order.status,
                status: decision.status,
                shipping_status: decision.shipping_status,
                payment_status: decision.payment_status,
                shipment_id: decision.adopt_shipment_id.clone(),
                carrier_order_id: decision.adopt_carrier_order_id.clone(),
                awb_code: decision.adopt_awb.clone(),
                courier_name: decision.courier_name.clone(),
                etd: decision.etd.clone(),
                entries: decision.entries.clone(),
                now: now_millis(),
            };

            match self
                .orders
                .apply_shipment_update(&order.order_number, update)
                .await?
            {
                Some(updated) => {
                    self.log_order_effects(&order, &decision);
                    return Ok(TransitionOutcome {
                        updated: true,
                        status: updated.status,
                        shipping_status: updated.shipping.status,
                        appended_entries: decision.entries.len(),
                        payment_captured: decision.payment_status == Some(PaymentStatus::Paid),
                        translation_gap: decision.translation_gap,
                    });
                }
                None => {
                    // the order moved under us — refetch and re-decide
                    order = self
                        .orders
                        .find_by_order_number(&order.order_number)
                        .await?
                        .ok_or_else(|| ReconError::Persistence(format!(
                            "order {} vanished mid-transition",
                            order.order_number
                        )))?;
                }
            }
        }

        Err(ReconError::TransitionConflict {
            reference: order.order_number.clone(),
            detail: format!("order kept moving across {MAX_WRITE_ATTEMPTS} attempts"),
        })
    }

    fn log_order_effects(&self, order: &Order, decision: &Decision) {
        if decision.payment_status == Some(PaymentStatus::Paid) {
            self.tx_log.info(
                TxType::PaymentCaptured,
                &order.order_number,
                "COD payment confirmed by delivery",
                serde_json::json!({ "method": "cod" }),
            );
        }
        if decision.status == OrderStatus::Cancelled && order.status != OrderStatus::Cancelled {
            self.tx_log.info(
                TxType::OrderCancelled,
                &order.order_number,
                "Order cancelled by carrier event",
                serde_json::json!({ "previous_status": order.status }),
            );
        }
        if decision.shipment_attached {
            self.tx_log.info(
                TxType::ShipmentAttached,
                &order.order_number,
                "Carrier identifiers attached from event",
                serde_json::json!({
                    "shipment_id": decision.adopt_shipment_id,
                    "awb": decision.adopt_awb,
                }),
            );
        }
    }

    /// Apply a canonical return-shipment event to a return.
    pub async fn apply_return_event(
        &self,
        mut ret: ReturnRequest,
        event: &ShipmentEvent,
    ) -> Result<ReturnOutcome, ReconError> {
        // adopt return-shipment identifiers as they first appear
        if (ret.shipping.shipment_id.is_none() && event.shipment_id.is_some())
            || (ret.shipping.awb_code.is_none() && event.awb.is_some())
        {
            self.returns
                .attach_shipment_identifiers(
                    &ret.return_number,
                    event.shipment_id.clone(),
                    event.awb.clone(),
                    event.courier_name.clone(),
                    now_millis(),
                )
                .await?;
        }

        let Some(label) = event.status_label.as_deref() else {
            return Ok(ReturnOutcome {
                updated: false,
                status: ret.status,
                reached_received: false,
                translation_gap: false,
            });
        };

        let target = match translate_return_label(label) {
            ReturnTranslation::Mapped(target) => target,
            ReturnTranslation::Unmapped => {
                tracing::info!(
                    return_number = %ret.return_number,
                    label,
                    "Unmapped carrier return status — status untouched"
                );
                return Ok(ReturnOutcome {
                    updated: false,
                    status: ret.status,
                    reached_received: false,
                    translation_gap: true,
                });
            }
        };

        for _attempt in 0..MAX_WRITE_ATTEMPTS {
            if !ret.status.can_advance_to(target) {
                // already there, or a regression the machine forbids
                return Ok(ReturnOutcome {
                    updated: false,
                    status: ret.status,
                    reached_received: false,
                    translation_gap: false,
                });
            }

            match self
                .returns
                .advance_status(
                    &ret.return_number,
                    ret.status,
                    target,
                    TransitionActor::SystemAutomation,
                    now_millis(),
                )
                .await?
            {
                Some(updated) => {
                    if target == ReturnStatus::PickupFailed {
                        self.tx_log.error(
                            TxType::ManualInterventionFlagged,
                            &ret.return_number,
                            "Return pickup failed — manual action required",
                            serde_json::json!({ "label": label }),
                        );
                    }
                    return Ok(ReturnOutcome {
                        updated: true,
                        status: updated.status,
                        reached_received: target == ReturnStatus::Received,
                        translation_gap: false,
                    });
                }
                None => {
                    ret = self
                        .returns
                        .find_by_return_number(&ret.return_number)
                        .await?
                        .ok_or_else(|| ReconError::Persistence(format!(
                            "return {} vanished mid-transition",
                            ret.return_number
                        )))?;
                }
            }
        }

        Err(ReconError::TransitionConflict {
            reference: ret.return_number.clone(),
            detail: format!("return kept moving across {MAX_WRITE_ATTEMPTS} attempts"),
        })
    }
}

/// Pure decision: what this event changes on this order.
fn decide(order: &Order, event: &ShipmentEvent) -> Decision {
    let translation = match event.status_code {
        Some(code) => translate_shipment_code(code),
        None => ShipmentTranslation::Unmapped,
    };
    // a gap is an *unknown* code, not an absent one
    let translation_gap =
        event.status_code.is_some() && translation == ShipmentTranslation::Unmapped;

    let (status, shipping_status) = match translation {
        ShipmentTranslation::Mapped { shipping, order: target } => (
            if order.status.can_advance_to(target) {
                target
            } else {
                order.status
            },
            if order.shipping.status.can_advance_to(shipping) {
                shipping
            } else {
                order.shipping.status
            },
        ),
        ShipmentTranslation::Unmapped => (order.status, order.shipping.status),
    };

    // COD auto-pay: delivery confirmation is payment confirmation
    let payment_status = (status == OrderStatus::Delivered
        && order.payment_method == PaymentMethod::Cod
        && order.payment_status != PaymentStatus::Paid)
        .then_some(PaymentStatus::Paid);

    let entries = build_entries(order, event);

    // identifiers are adopted only when missing — an event never
    // overwrites an identifier the order already has
    let adopt_shipment_id = order
        .shipping
        .shipment_id
        .is_none()
        .then(|| event.shipment_id.clone())
        .flatten();
    let adopt_carrier_order_id = order
        .shipping
        .carrier_order_id
        .is_none()
        .then(|| event.carrier_order_id.clone())
        .flatten();
    let adopt_awb = order
        .shipping
        .awb_code
        .is_none()
        .then(|| event.awb.clone())
        .flatten();
    let shipment_attached = !order.has_shipment_identifier()
        && (adopt_shipment_id.is_some() || adopt_awb.is_some() || adopt_carrier_order_id.is_some());

    // secondary fields refresh freely (the carrier's word is current)
    let courier_changed = event.courier_name.is_some()
        && event.courier_name != order.shipping.courier_name;
    let etd_changed = event.etd.is_some() && event.etd != order.shipping.etd;

    let needs_write = status != order.status
        || shipping_status != order.shipping.status
        || payment_status.is_some()
        || !entries.is_empty()
        || adopt_shipment_id.is_some()
        || adopt_carrier_order_id.is_some()
        || adopt_awb.is_some()
        || courier_changed
        || etd_changed;

    Decision {
        status,
        shipping_status,
        payment_status,
        entries,
        adopt_shipment_id,
        adopt_carrier_order_id,
        adopt_awb,
        courier_name: event.courier_name.clone(),
        etd: event.etd.clone(),
        translation_gap,
        shipment_attached,
        needs_write,
    }
}

/// Tracking entries this event contributes, deduped against the order's
/// history and within the batch.
///
/// An entry needs a timestamp and a status code to satisfy the dedup
/// invariant; scans lacking both inherit them from the event level, and
/// anything still incomplete is skipped rather than stamped with
/// invented values.
fn build_entries(order: &Order, event: &ShipmentEvent) -> Vec<TrackingEntry> {
    let mut seen: HashSet<(i64, i64)> = HashSet::new();
    let mut entries = Vec::new();

    let mut push = |entry: TrackingEntry| {
        let key = entry.dedupe_key();
        if !order.has_tracking_entry(key) && seen.insert(key) {
            entries.push(entry);
        }
    };

    for scan in &event.scans {
        let Some(timestamp) = scan
            .date
            .as_deref()
            .and_then(parse_carrier_datetime)
            .or(event.timestamp)
        else {
            continue;
        };
        let Some(status_code) = scan.status_code.or(event.status_code) else {
            continue;
        };
        push(TrackingEntry {
            activity: scan
                .activity
                .clone()
                .or_else(|| event.status_label.clone())
                .unwrap_or_default(),
            location: scan.location.clone().unwrap_or_default(),
            timestamp,
            status_code,
            status_label: event.status_label.clone().unwrap_or_default(),
        });
    }

    // event-level entry, when the push itself is timestamped
    if let (Some(timestamp), Some(status_code)) = (event.timestamp, event.status_code) {
        push(TrackingEntry {
            activity: event.status_label.clone().unwrap_or_default(),
            location: event.location.clone().unwrap_or_default(),
            timestamp,
            status_code,
            status_label: event.status_label.clone().unwrap_or_default(),
        });
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::event::TrackingScan;

    async fn engine() -> (TransitionEngine, OrderRepository, ReturnRepository) {
        let db = crate::db::connect_memory().await.unwrap();
        let (tx_log, _worker) = crate::txlog::spawn(db.clone());
        (
            TransitionEngine::new(db.clone(), tx_log),
            OrderRepository::new(db.clone()),
            ReturnRepository::new(db),
        )
    }

    fn cod_order_shipped(number: &str, shipment_id: &str) -> Order {
        let mut order = Order::new(number, Decimal::new(99900, 2), PaymentMethod::Cod, 1_000);
        order.status = OrderStatus::Shipped;
        order.shipping.status = ShippingStatus::Shipped;
        order.shipping.shipment_id = Some(shipment_id.into());
        order
    }

    fn delivered_event(shipment_id: &str) -> ShipmentEvent {
        ShipmentEvent {
            shipment_id: Some(shipment_id.into()),
            status_code: Some(7),
            status_label: Some("Delivered".into()),
            scans: vec![TrackingScan {
                date: Some("14 10 2025 10:00:00".into()),
                location: Some("Mumbai".into()),
                activity: None,
                status_code: None,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn delivery_event_advances_and_captures_cod_payment() {
        let (engine, orders, _) = engine().await;
        orders.create(&cod_order_shipped("AUR-1", "S1")).await.unwrap();
        let order = orders.find_by_order_number("AUR-1").await.unwrap().unwrap();

        let outcome = engine
            .apply_shipment_event(order, &delivered_event("S1"))
            .await
            .unwrap();

        assert!(outcome.updated);
        assert_eq!(outcome.status, OrderStatus::Delivered);
        assert_eq!(outcome.shipping_status, ShippingStatus::Delivered);
        assert_eq!(outcome.appended_entries, 1);
        assert!(outcome.payment_captured);

        let stored = orders.find_by_order_number("AUR-1").await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(stored.tracking_history.len(), 1);
        assert_eq!(stored.tracking_history[0].location, "Mumbai");
        assert_eq!(stored.tracking_history[0].status_code, 7);
    }

    #[tokio::test]
    async fn replaying_the_same_event_is_a_no_op() {
        let (engine, orders, _) = engine().await;
        orders.create(&cod_order_shipped("AUR-1", "S1")).await.unwrap();
        let order = orders.find_by_order_number("AUR-1").await.unwrap().unwrap();

        engine
            .apply_shipment_event(order, &delivered_event("S1"))
            .await
            .unwrap();
        let after_first = orders.find_by_order_number("AUR-1").await.unwrap().unwrap();

        let outcome = engine
            .apply_shipment_event(after_first.clone(), &delivered_event("S1"))
            .await
            .unwrap();
        assert!(!outcome.updated);
        assert_eq!(outcome.appended_entries, 0);

        let after_second = orders.find_by_order_number("AUR-1").await.unwrap().unwrap();
        assert_eq!(after_second.tracking_history.len(), 1);
        assert_eq!(after_second.status, after_first.status);
        assert_eq!(after_second.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn late_earlier_stage_event_records_history_without_regressing() {
        let (engine, orders, _) = engine().await;
        let mut order = cod_order_shipped("AUR-1", "S1");
        order.status = OrderStatus::Delivered;
        order.shipping.status = ShippingStatus::Delivered;
        order.payment_status = PaymentStatus::Paid;
        orders.create(&order).await.unwrap();
        let order = orders.find_by_order_number("AUR-1").await.unwrap().unwrap();

        // an out-of-order "shipped" event arriving after delivery
        let event = ShipmentEvent {
            shipment_id: Some("S1".into()),
            status_code: Some(6),
            status_label: Some("Shipped".into()),
            timestamp: Some(500_000),
            ..Default::default()
        };
        let outcome = engine.apply_shipment_event(order, &event).await.unwrap();

        assert!(outcome.updated); // history was written
        assert_eq!(outcome.status, OrderStatus::Delivered); // no regression
        assert_eq!(outcome.appended_entries, 1);

        let stored = orders.find_by_order_number("AUR-1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Delivered);
        assert_eq!(stored.tracking_history.len(), 1);
        assert_eq!(stored.tracking_history[0].status_code, 6);
    }

    #[tokio::test]
    async fn unmapped_code_updates_history_only() {
        let (engine, orders, _) = engine().await;
        orders.create(&cod_order_shipped("AUR-1", "S1")).await.unwrap();
        let order = orders.find_by_order_number("AUR-1").await.unwrap().unwrap();

        let event = ShipmentEvent {
            shipment_id: Some("S1".into()),
            status_code: Some(999),
            status_label: Some("Mystery Status".into()),
            timestamp: Some(700_000),
            ..Default::default()
        };
        let outcome = engine.apply_shipment_event(order, &event).await.unwrap();

        assert!(outcome.translation_gap);
        assert_eq!(outcome.status, OrderStatus::Shipped); // untouched
        assert_eq!(outcome.appended_entries, 1);

        let stored = orders.find_by_order_number("AUR-1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);
        assert_eq!(stored.tracking_history[0].status_code, 999);
    }

    #[tokio::test]
    async fn secondary_fields_refresh_without_status_change() {
        let (engine, orders, _) = engine().await;
        orders.create(&cod_order_shipped("AUR-1", "S1")).await.unwrap();
        let order = orders.find_by_order_number("AUR-1").await.unwrap().unwrap();

        // same status the order already has, but a new courier + ETD
        let event = ShipmentEvent {
            shipment_id: Some("S1".into()),
            status_code: Some(6),
            courier_name: Some("Delhivery".into()),
            etd: Some("2025-10-20".into()),
            ..Default::default()
        };
        let outcome = engine.apply_shipment_event(order, &event).await.unwrap();
        assert!(outcome.updated);
        assert_eq!(outcome.status, OrderStatus::Shipped);

        let stored = orders.find_by_order_number("AUR-1").await.unwrap().unwrap();
        assert_eq!(stored.shipping.courier_name.as_deref(), Some("Delhivery"));
        assert_eq!(stored.shipping.etd.as_deref(), Some("2025-10-20"));
    }

    #[tokio::test]
    async fn return_event_advances_to_received() {
        let (engine, _, returns) = engine().await;
        let ret = ReturnRequest::new("RET1", "AUR-1", vec![], Decimal::ONE, 1_000);
        returns.create(&ret).await.unwrap();
        let ret = returns.find_by_return_number("RET1").await.unwrap().unwrap();

        let pickup = ShipmentEvent {
            shipment_id: Some("RS1".into()),
            status_label: Some("Picked Up".into()),
            ..Default::default()
        };
        let outcome = engine.apply_return_event(ret, &pickup).await.unwrap();
        assert!(outcome.updated);
        assert_eq!(outcome.status, ReturnStatus::PickedUp);
        assert!(!outcome.reached_received);

        let ret = returns.find_by_return_number("RET1").await.unwrap().unwrap();
        // identifier adopted along the way
        assert_eq!(ret.shipping.shipment_id.as_deref(), Some("RS1"));

        let delivered = ShipmentEvent {
            shipment_id: Some("RS1".into()),
            status_label: Some("Delivered".into()),
            ..Default::default()
        };
        let outcome = engine.apply_return_event(ret, &delivered).await.unwrap();
        assert!(outcome.reached_received);
        assert_eq!(outcome.status, ReturnStatus::Received);
    }

    #[tokio::test]
    async fn return_event_with_unknown_label_is_flagged_not_applied() {
        let (engine, _, returns) = engine().await;
        let ret = ReturnRequest::new("RET1", "AUR-1", vec![], Decimal::ONE, 1_000);
        returns.create(&ret).await.unwrap();
        let ret = returns.find_by_return_number("RET1").await.unwrap().unwrap();

        let event = ShipmentEvent {
            status_label: Some("Quantum Superposition".into()),
            ..Default::default()
        };
        let outcome = engine.apply_return_event(ret, &event).await.unwrap();
        assert!(!outcome.updated);
        assert!(outcome.translation_gap);
        assert_eq!(outcome.status, ReturnStatus::Requested);
    }
}
