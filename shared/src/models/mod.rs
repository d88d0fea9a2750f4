//! Canonical domain models
//!
//! - [`order`] - Order aggregate, order/shipping/payment status enums
//! - [`return_request`] - Return aggregate, return/refund status enums
//!
//! Orders and returns are the only persisted, mutable aggregates in the
//! system. Both are mutated exclusively through conditional updates issued
//! by the transition engine; these types carry the status machines the
//! engine enforces.

pub mod order;
pub mod return_request;

pub use order::{
    AdminNote, Order, OrderStatus, PaymentMethod, PaymentStatus, ShippingInfo, ShippingStatus,
    TrackingEntry,
};
pub use return_request::{
    BankDetails, ItemCondition, RefundDetails, RefundStatus, ReturnItem, ReturnRequest,
    ReturnShippingInfo, ReturnStatus, ReturnTransition, TransitionActor,
};
