//! Stuck-Entity Detector
//!
//! Read-only scan over persisted orders/returns for divergence patterns
//! that mean automation silently stalled. Runs periodically or on demand
//! from the admin surface; never mutates state. Each match lands in a
//! fixed priority bucket with a human-readable remediation hint.

use serde::Serialize;

use shared::util::now_millis;

use surrealdb::Surreal;
use surrealdb::engine::local::Db;

use crate::core::config::StuckThresholds;
use crate::db::repository::{OrderRepository, RepoResult, ReturnRepository};

/// Admin notes carrying either marker flag the record for review
const NOTE_MARKERS: [&str; 2] = ["[urgent]", "[manual]"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StuckPriority {
    Critical,
    High,
    Medium,
}

/// One stalled record with its diagnosis
#[derive(Debug, Clone, Serialize)]
pub struct StuckEntity {
    /// "order" or "return"
    pub kind: &'static str,
    /// Order/return number
    pub reference: String,
    pub priority: StuckPriority,
    pub reason: String,
    /// What a human should do about it
    pub hint: String,
    /// Milliseconds since the record was last touched
    pub stale_for_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct StuckReport {
    /// Unix milliseconds
    pub generated_at: i64,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub entities: Vec<StuckEntity>,
}

pub struct StuckEntityDetector {
    orders: OrderRepository,
    returns: ReturnRepository,
    thresholds: StuckThresholds,
}

impl StuckEntityDetector {
    pub fn new(db: Surreal<Db>, thresholds: StuckThresholds) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            returns: ReturnRepository::new(db),
            thresholds,
        }
    }

    /// Run the full scan. Diagnostic only — no writes.
    pub async fn scan(&self) -> RepoResult<StuckReport> {
        let now = now_millis();
        let mut entities = Vec::new();

        // paid online, never shipped, past the threshold
        for order in self
            .orders
            .find_paid_unshipped(now - self.thresholds.unshipped_after_ms)
            .await?
        {
            entities.push(entity(
                "order",
                &order.order_number,
                StuckPriority::Critical,
                "online payment captured but no shipment was ever created",
                "create the shipment with the carrier, or cancel and refund",
                now - order.updated_at,
            ));
        }

        // paid but the order never left `pending`
        for order in self
            .orders
            .find_pending_paid(now - self.thresholds.pending_paid_after_ms)
            .await?
        {
            entities.push(entity(
                "order",
                &order.order_number,
                StuckPriority::High,
                "payment captured but the order is still pending",
                "check fulfilment; move the order to processing or refund",
                now - order.updated_at,
            ));
        }

        // cancelled recently with the money still captured
        for order in self
            .orders
            .find_cancelled_paid(now - self.thresholds.refund_lookback_ms)
            .await?
        {
            entities.push(entity(
                "order",
                &order.order_number,
                StuckPriority::Critical,
                "order cancelled while payment is still captured",
                "verify a refund was issued at the gateway",
                now - order.updated_at,
            ));
        }

        // refund automation failed and is waiting for a human
        for ret in self.returns.find_failed_refunds().await? {
            entities.push(entity(
                "return",
                &ret.return_number,
                StuckPriority::Critical,
                "refund automation failed — return held at approved_refund",
                "read the return's admin notes and re-initiate the refund",
                now - ret.updated_at,
            ));
        }

        // anything a human flagged by note marker
        for marker in NOTE_MARKERS {
            for order in self.orders.find_flagged(marker).await? {
                if entities
                    .iter()
                    .any(|e| e.kind == "order" && e.reference == order.order_number)
                {
                    continue; // already diagnosed with something stronger
                }
                entities.push(entity(
                    "order",
                    &order.order_number,
                    StuckPriority::Medium,
                    "flagged for manual attention in admin notes",
                    "review the note trail",
                    now - order.updated_at,
                ));
            }
        }

        let count = |p: StuckPriority| entities.iter().filter(|e| e.priority == p).count();
        Ok(StuckReport {
            generated_at: now,
            critical: count(StuckPriority::Critical),
            high: count(StuckPriority::High),
            medium: count(StuckPriority::Medium),
            entities,
        })
    }
}

fn entity(
    kind: &'static str,
    reference: &str,
    priority: StuckPriority,
    reason: &str,
    hint: &str,
    stale_for_ms: i64,
) -> StuckEntity {
    StuckEntity {
        kind,
        reference: reference.to_string(),
        priority,
        reason: reason.to_string(),
        hint: hint.to_string(),
        stale_for_ms,
    }
}

impl std::fmt::Debug for StuckEntityDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StuckEntityDetector")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::models::{
        AdminNote, Order, OrderStatus, PaymentMethod, PaymentStatus, ReturnStatus,
    };

    fn thresholds() -> StuckThresholds {
        StuckThresholds {
            unshipped_after_ms: 1_000,
            pending_paid_after_ms: 1_000,
            refund_lookback_ms: 1_000_000,
        }
    }

    async fn setup() -> (StuckEntityDetector, OrderRepository, ReturnRepository) {
        let db = crate::db::connect_memory().await.unwrap();
        (
            StuckEntityDetector::new(db.clone(), thresholds()),
            OrderRepository::new(db.clone()),
            ReturnRepository::new(db),
        )
    }

    #[tokio::test]
    async fn classifies_paid_unshipped_as_critical() {
        let (detector, orders, _) = setup().await;
        let mut order = Order::new("AUR-1", Decimal::ONE, PaymentMethod::Online, 0);
        order.status = OrderStatus::Processing;
        order.payment_status = PaymentStatus::Paid;
        orders.create(&order).await.unwrap();

        let report = detector.scan().await.unwrap();
        assert_eq!(report.critical, 1);
        assert_eq!(report.entities.len(), 1);
        assert_eq!(report.entities[0].reference, "AUR-1");
        assert_eq!(report.entities[0].priority, StuckPriority::Critical);
    }

    #[tokio::test]
    async fn classifies_pending_paid_and_cancelled_paid() {
        let (detector, orders, _) = setup().await;

        let mut pending = Order::new("AUR-1", Decimal::ONE, PaymentMethod::Online, 0);
        pending.payment_status = PaymentStatus::Paid;
        pending.shipping.shipment_id = Some("S1".into()); // not "unshipped"
        orders.create(&pending).await.unwrap();

        let mut cancelled = Order::new("AUR-2", Decimal::ONE, PaymentMethod::Online, 0);
        cancelled.status = OrderStatus::Cancelled;
        cancelled.payment_status = PaymentStatus::Paid;
        cancelled.shipping.shipment_id = Some("S2".into());
        cancelled.updated_at = now_millis();
        orders.create(&cancelled).await.unwrap();

        let report = detector.scan().await.unwrap();
        assert_eq!(report.high, 1);
        assert_eq!(report.critical, 1);
        let pending_hit = report
            .entities
            .iter()
            .find(|e| e.reference == "AUR-1")
            .unwrap();
        assert_eq!(pending_hit.priority, StuckPriority::High);
    }

    #[tokio::test]
    async fn failed_refund_and_flagged_note_are_surfaced() {
        let (detector, orders, returns) = setup().await;

        let mut ret = shared::models::ReturnRequest::new("RET1", "AUR-9", vec![], Decimal::ONE, 0);
        ret.status = ReturnStatus::ApprovedRefund;
        ret.refund.status = shared::models::RefundStatus::Failed;
        returns.create(&ret).await.unwrap();

        let mut flagged = Order::new("AUR-3", Decimal::ONE, PaymentMethod::Cod, 0);
        flagged.status = OrderStatus::Delivered;
        flagged.payment_status = PaymentStatus::Paid;
        orders.create(&flagged).await.unwrap();
        orders
            .append_admin_note(
                "AUR-3",
                AdminNote {
                    note: "[MANUAL] customer dispute open".into(),
                    author: "ops".into(),
                    timestamp: 0,
                },
            )
            .await
            .unwrap();

        let report = detector.scan().await.unwrap();
        let ret_hit = report.entities.iter().find(|e| e.kind == "return").unwrap();
        assert_eq!(ret_hit.priority, StuckPriority::Critical);
        assert_eq!(ret_hit.reference, "RET1");

        let note_hit = report
            .entities
            .iter()
            .find(|e| e.reference == "AUR-3")
            .unwrap();
        assert_eq!(note_hit.priority, StuckPriority::Medium);
    }

    #[tokio::test]
    async fn healthy_records_produce_an_empty_report() {
        let (detector, orders, _) = setup().await;
        let mut order = Order::new("AUR-1", Decimal::ONE, PaymentMethod::Cod, now_millis());
        order.status = OrderStatus::Delivered;
        order.payment_status = PaymentStatus::Paid;
        order.shipping.shipment_id = Some("S1".into());
        orders.create(&order).await.unwrap();

        let report = detector.scan().await.unwrap();
        assert!(report.entities.is_empty());
        assert_eq!(report.critical + report.high + report.medium, 0);
    }
}
