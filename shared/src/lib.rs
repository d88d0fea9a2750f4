//! Shared types for the Aurum reconciliation engine
//!
//! Canonical domain types used across crates: order/return aggregates,
//! status enums, normalized webhook event structures, and time utilities.
//!
//! Everything in here is carrier- and gateway-agnostic. Translation from
//! carrier status codes and gateway payload shapes into these types lives
//! in `recon-server`.

pub mod event;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Event re-exports (for the webhook processing pipeline)
pub use event::{RefundEvent, RefundEventKind, ShipmentEvent, TrackingScan, WebhookSource};

// Model re-exports
pub use models::{
    AdminNote, ItemCondition, Order, OrderStatus, PaymentMethod, PaymentStatus, RefundDetails,
    RefundStatus, ReturnRequest, ReturnStatus, ShippingInfo, ShippingStatus, TrackingEntry,
    TransitionActor,
};
