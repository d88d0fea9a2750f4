//! Order model
//!
//! An order is created at checkout (`pending`/unpaid) and from then on is
//! mutated only by the transition engine (carrier webhooks, manual resync)
//! or by admin note appends. Tracking history is append-only and deduped
//! on `(timestamp, status_code)`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical order status
///
/// Happy path: `pending → processing → shipped → delivered`.
/// `cancelled` is reachable from any non-terminal state,
/// `returned` only from `delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    /// Position in the fulfilment pipeline, used for the monotonicity
    /// guard: a webhook reporting an earlier-in-pipeline status than the
    /// current one is recorded in history but never regresses the field.
    pub fn pipeline_stage(self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Shipped => 2,
            OrderStatus::Delivered => 3,
            OrderStatus::Returned => 4,
            OrderStatus::Cancelled => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Returned
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Returns `false` for `self == next` (a no-op, not a transition).
    pub fn can_advance_to(self, next: OrderStatus) -> bool {
        if self == next {
            return false;
        }
        match next {
            OrderStatus::Cancelled => !self.is_terminal(),
            OrderStatus::Returned => self == OrderStatus::Delivered,
            _ => !self.is_terminal() && next.pipeline_stage() > self.pipeline_stage(),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        };
        f.write_str(s)
    }
}

/// Shipment-level status, nested under `shipping`.
///
/// May lag or lead the order status (e.g. an order can be `cancelled`
/// while the shipment is still physically `shipped`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl ShippingStatus {
    pub fn pipeline_stage(self) -> u8 {
        match self {
            ShippingStatus::Pending => 0,
            ShippingStatus::Processing => 1,
            ShippingStatus::Shipped => 2,
            ShippingStatus::Delivered => 3,
            ShippingStatus::Cancelled => 4,
        }
    }

    /// Same monotonicity rule as [`OrderStatus::can_advance_to`].
    pub fn can_advance_to(self, next: ShippingStatus) -> bool {
        self != next
            && !matches!(self, ShippingStatus::Delivered | ShippingStatus::Cancelled)
            && next.pipeline_stage() > self.pipeline_stage()
    }
}

/// How the customer pays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Captured through the payment gateway at checkout
    Online,
    /// Cash on delivery — payment is collected at the door, so delivery
    /// confirmation doubles as payment confirmation
    Cod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
    Failed,
}

/// One carrier scan event.
///
/// Uniqueness invariant: no two entries in an order's history share the
/// same `(timestamp, status_code)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub activity: String,
    pub location: String,
    /// Unix milliseconds
    pub timestamp: i64,
    pub status_code: i64,
    pub status_label: String,
}

impl TrackingEntry {
    /// Dedup key for the append-and-dedupe invariant
    pub fn dedupe_key(&self) -> (i64, i64) {
        (self.timestamp, self.status_code)
    }
}

/// Append-only human/system annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminNote {
    pub note: String,
    pub author: String,
    /// Unix milliseconds
    pub timestamp: i64,
}

/// Shipment identifiers and carrier-side state for one order.
///
/// All identifier fields are optional: an order has none until the
/// storefront books a shipment, and carrier webhooks may carry any subset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub status: ShippingStatus,
    /// Carrier shipment ID (most specific identifier)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<String>,
    /// Carrier's own order ID (distinct from our order number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_order_id: Option<String>,
    /// Air-waybill tracking code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awb_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courier_name: Option<String>,
    /// Estimated delivery date, as reported by the carrier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etd: Option<String>,
}

/// Order aggregate (persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Internal order number (unique, human-readable)
    pub order_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    pub amount: Decimal,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// Payment-gateway payment ID (online payments only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub shipping: ShippingInfo,
    pub tracking_history: Vec<TrackingEntry>,
    pub admin_notes: Vec<AdminNote>,
    /// Unix milliseconds
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// New order as created at checkout: pending, unpaid, no shipment.
    pub fn new(
        order_number: impl Into<String>,
        amount: Decimal,
        payment_method: PaymentMethod,
        now: i64,
    ) -> Self {
        Self {
            order_number: order_number.into(),
            customer_name: None,
            customer_email: None,
            amount,
            status: OrderStatus::Pending,
            payment_method,
            payment_status: PaymentStatus::Pending,
            payment_id: None,
            shipping: ShippingInfo::default(),
            tracking_history: Vec::new(),
            admin_notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether any carrier identifier is attached yet
    pub fn has_shipment_identifier(&self) -> bool {
        self.shipping.shipment_id.is_some()
            || self.shipping.awb_code.is_some()
            || self.shipping.carrier_order_id.is_some()
    }

    /// Whether the history already contains an entry with this dedup key
    pub fn has_tracking_entry(&self, key: (i64, i64)) -> bool {
        self.tracking_history.iter().any(|e| e.dedupe_key() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_monotonic() {
        assert!(OrderStatus::Pending.can_advance_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_advance_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_advance_to(OrderStatus::Delivered));
        // skipping a stage is allowed — webhooks arrive in any order
        assert!(OrderStatus::Pending.can_advance_to(OrderStatus::Delivered));
    }

    #[test]
    fn no_regression() {
        assert!(!OrderStatus::Delivered.can_advance_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Shipped.can_advance_to(OrderStatus::Processing));
        assert!(!OrderStatus::Shipped.can_advance_to(OrderStatus::Shipped));
    }

    #[test]
    fn cancelled_only_from_non_terminal() {
        assert!(OrderStatus::Pending.can_advance_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Shipped.can_advance_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_advance_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Returned.can_advance_to(OrderStatus::Cancelled));
    }

    #[test]
    fn returned_only_from_delivered() {
        assert!(OrderStatus::Delivered.can_advance_to(OrderStatus::Returned));
        assert!(!OrderStatus::Shipped.can_advance_to(OrderStatus::Returned));
        assert!(!OrderStatus::Cancelled.can_advance_to(OrderStatus::Returned));
    }

    #[test]
    fn cancelled_is_a_dead_end() {
        for next in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            assert!(!OrderStatus::Cancelled.can_advance_to(next));
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&OrderStatus::Delivered).unwrap();
        assert_eq!(json, r#""delivered""#);
    }

    #[test]
    fn tracking_dedupe_key() {
        let entry = TrackingEntry {
            activity: "Delivered".into(),
            location: "Mumbai".into(),
            timestamp: 1_000,
            status_code: 7,
            status_label: "Delivered".into(),
        };
        let mut order = Order::new("AUR-1", Decimal::ZERO, PaymentMethod::Cod, 0);
        assert!(!order.has_tracking_entry(entry.dedupe_key()));
        order.tracking_history.push(entry.clone());
        assert!(order.has_tracking_entry((1_000, 7)));
        assert!(!order.has_tracking_entry((1_000, 6)));
    }
}
