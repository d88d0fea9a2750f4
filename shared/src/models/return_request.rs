//! Return/refund model
//!
//! A return is tied 1:1 to a delivered order and moves through a strictly
//! ordered pipeline. Every transition records its actor so automation and
//! human actions are distinguishable in the history.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical return status, strictly ordered:
///
/// `requested → pickup_scheduled → picked_up → in_transit → received →
///  inspected → approved_refund → refund_processed → completed`
///
/// `cancelled` and `pickup_failed` are side-exits from any non-terminal
/// state. The only permitted regression is the refund retry path:
/// a `refund failed` gateway event moves `refund_processed` back to
/// `approved_refund` for reprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    #[default]
    Requested,
    PickupScheduled,
    PickedUp,
    InTransit,
    Received,
    Inspected,
    ApprovedRefund,
    RefundProcessed,
    Completed,
    Cancelled,
    PickupFailed,
}

impl ReturnStatus {
    /// Position in the strict ordering. Side-exits have no position.
    pub fn sequence(self) -> Option<u8> {
        match self {
            ReturnStatus::Requested => Some(0),
            ReturnStatus::PickupScheduled => Some(1),
            ReturnStatus::PickedUp => Some(2),
            ReturnStatus::InTransit => Some(3),
            ReturnStatus::Received => Some(4),
            ReturnStatus::Inspected => Some(5),
            ReturnStatus::ApprovedRefund => Some(6),
            ReturnStatus::RefundProcessed => Some(7),
            ReturnStatus::Completed => Some(8),
            ReturnStatus::Cancelled | ReturnStatus::PickupFailed => None,
        }
    }

    /// `completed` ends the pipeline; `cancelled` and `pickup_failed`
    /// require manual action and are equally final for automation.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReturnStatus::Completed | ReturnStatus::Cancelled | ReturnStatus::PickupFailed
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_advance_to(self, next: ReturnStatus) -> bool {
        if self == next || self.is_terminal() {
            return false;
        }
        match next {
            ReturnStatus::Cancelled | ReturnStatus::PickupFailed => true,
            // refund retry: initiation was recorded but confirmation failed
            ReturnStatus::ApprovedRefund if self == ReturnStatus::RefundProcessed => true,
            _ => match (self.sequence(), next.sequence()) {
                (Some(cur), Some(nxt)) => nxt > cur,
                _ => false,
            },
        }
    }
}

impl std::fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReturnStatus::Requested => "requested",
            ReturnStatus::PickupScheduled => "pickup_scheduled",
            ReturnStatus::PickedUp => "picked_up",
            ReturnStatus::InTransit => "in_transit",
            ReturnStatus::Received => "received",
            ReturnStatus::Inspected => "inspected",
            ReturnStatus::ApprovedRefund => "approved_refund",
            ReturnStatus::RefundProcessed => "refund_processed",
            ReturnStatus::Completed => "completed",
            ReturnStatus::Cancelled => "cancelled",
            ReturnStatus::PickupFailed => "pickup_failed",
        };
        f.write_str(s)
    }
}

/// Who performed a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum TransitionActor {
    /// The refund orchestrator / transition engine
    SystemAutomation,
    /// A named admin user
    Admin(String),
}

/// One recorded status transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnTransition {
    pub from: ReturnStatus,
    pub to: ReturnStatus,
    pub actor: TransitionActor,
    /// Unix milliseconds
    pub timestamp: i64,
}

/// Condition the customer declared per returned item.
///
/// Drives the auto-inspection decision: only `unused`/`lightly_used`
/// items may be refunded without a human look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    Unused,
    LightlyUsed,
    Damaged,
    Defective,
}

impl ItemCondition {
    pub fn auto_refundable(self) -> bool {
        matches!(self, ItemCondition::Unused | ItemCondition::LightlyUsed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnItem {
    pub product_id: String,
    pub quantity: u32,
    pub reason: String,
    pub item_condition: ItemCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    NotStarted,
    Processing,
    Processed,
    Failed,
}

/// Bank particulars for payout when no gateway payment exists (COD orders)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankDetails {
    pub account_holder: String,
    pub account_number: String,
    pub ifsc: String,
}

/// Refund state for one return.
///
/// Invariant: `transaction_id` is set if and only if
/// `status != not_started`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundDetails {
    pub status: RefundStatus,
    /// Gateway's refund ID, set on initiation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank: Option<BankDetails>,
    /// Gateway refund speed (`normal` / `optimum`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
}

impl RefundDetails {
    pub fn not_started(amount: Decimal) -> Self {
        Self {
            status: RefundStatus::NotStarted,
            transaction_id: None,
            amount,
            bank: None,
            speed: None,
        }
    }
}

/// Return shipment identifiers (separate shipment from the outbound one)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnShippingInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awb_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courier_name: Option<String>,
}

/// Return aggregate (persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub return_number: String,
    /// Order this return belongs to (1:1)
    pub order_number: String,
    pub status: ReturnStatus,
    pub items: Vec<ReturnItem>,
    pub refund: RefundDetails,
    pub shipping: ReturnShippingInfo,
    pub status_history: Vec<ReturnTransition>,
    pub admin_notes: Vec<AdminNote>,
    /// Unix milliseconds
    pub created_at: i64,
    pub updated_at: i64,
}

pub use super::order::AdminNote;

impl ReturnRequest {
    pub fn new(
        return_number: impl Into<String>,
        order_number: impl Into<String>,
        items: Vec<ReturnItem>,
        refund_amount: Decimal,
        now: i64,
    ) -> Self {
        Self {
            return_number: return_number.into(),
            order_number: order_number.into(),
            status: ReturnStatus::Requested,
            items,
            refund: RefundDetails::not_started(refund_amount),
            shipping: ReturnShippingInfo::default(),
            status_history: Vec::new(),
            admin_notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether every item passed the declared-condition check
    pub fn all_items_auto_refundable(&self) -> bool {
        self.items.iter().all(|i| i.item_condition.auto_refundable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_is_strictly_ordered() {
        assert!(ReturnStatus::Requested.can_advance_to(ReturnStatus::PickupScheduled));
        assert!(ReturnStatus::Received.can_advance_to(ReturnStatus::Inspected));
        // skipping forward is allowed
        assert!(ReturnStatus::PickedUp.can_advance_to(ReturnStatus::Received));
        // regression is not
        assert!(!ReturnStatus::Received.can_advance_to(ReturnStatus::InTransit));
        assert!(!ReturnStatus::Inspected.can_advance_to(ReturnStatus::Inspected));
    }

    #[test]
    fn refund_retry_is_the_only_regression() {
        assert!(ReturnStatus::RefundProcessed.can_advance_to(ReturnStatus::ApprovedRefund));
        assert!(!ReturnStatus::Completed.can_advance_to(ReturnStatus::ApprovedRefund));
        assert!(!ReturnStatus::Inspected.can_advance_to(ReturnStatus::Received));
    }

    #[test]
    fn side_exits_from_any_non_terminal() {
        assert!(ReturnStatus::Requested.can_advance_to(ReturnStatus::Cancelled));
        assert!(ReturnStatus::InTransit.can_advance_to(ReturnStatus::PickupFailed));
        assert!(!ReturnStatus::Completed.can_advance_to(ReturnStatus::Cancelled));
        assert!(!ReturnStatus::Cancelled.can_advance_to(ReturnStatus::PickupFailed));
    }

    #[test]
    fn item_condition_gates_automation() {
        let mut ret = ReturnRequest::new(
            "RET1",
            "AUR-1",
            vec![ReturnItem {
                product_id: "p1".into(),
                quantity: 1,
                reason: "size".into(),
                item_condition: ItemCondition::Unused,
            }],
            Decimal::new(49900, 2),
            0,
        );
        assert!(ret.all_items_auto_refundable());
        ret.items.push(ReturnItem {
            product_id: "p2".into(),
            quantity: 1,
            reason: "broken clasp".into(),
            item_condition: ItemCondition::Damaged,
        });
        assert!(!ret.all_items_auto_refundable());
    }
}
