//! Identifier Resolver
//!
//! Locates the Order or Return a canonical event belongs to, trying
//! candidate identifiers in fixed priority order: shipment ID → AWB →
//! carrier order ID → order-number prefix of the composite channel ID.
//!
//! Shipment ID is the most specific and least ambiguous identifier; the
//! order number extracted from a `_`-delimited composite is the least
//! reliable, so it goes last. First match wins.
//!
//! No match is a terminal `Ok(None)`, not an error: carriers routinely
//! push events for records created by test traffic or past integrations.

use shared::event::ShipmentEvent;
use shared::models::{Order, ReturnRequest};

use surrealdb::Surreal;
use surrealdb::engine::local::Db;

use crate::db::repository::{OrderRepository, RepoResult, ReturnRepository};

pub struct IdentifierResolver {
    orders: OrderRepository,
    returns: ReturnRepository,
}

/// `"AUR-123_1"` → `"AUR-123"` — the carrier stores our number inside a
/// composite channel identifier
fn number_prefix(hint: &str) -> Option<&str> {
    let prefix = hint.split('_').next().unwrap_or(hint).trim();
    (!prefix.is_empty()).then_some(prefix)
}

impl IdentifierResolver {
    pub fn new(db: Surreal<Db>) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            returns: ReturnRepository::new(db),
        }
    }

    /// Resolve the order a shipment event refers to.
    pub async fn resolve_order(&self, event: &ShipmentEvent) -> RepoResult<Option<Order>> {
        if let Some(shipment_id) = event.shipment_id.as_deref()
            && let Some(order) = self.orders.find_by_shipment_id(shipment_id).await?
        {
            return Ok(Some(order));
        }
        if let Some(awb) = event.awb.as_deref()
            && let Some(order) = self.orders.find_by_awb(awb).await?
        {
            return Ok(Some(order));
        }
        if let Some(carrier_order_id) = event.carrier_order_id.as_deref()
            && let Some(order) = self.orders.find_by_carrier_order_id(carrier_order_id).await?
        {
            return Ok(Some(order));
        }
        if let Some(prefix) = event.order_number_hint.as_deref().and_then(number_prefix)
            && let Some(order) = self.orders.find_by_order_number(prefix).await?
        {
            return Ok(Some(order));
        }

        tracing::info!(
            shipment_id = event.shipment_id.as_deref().unwrap_or("-"),
            awb = event.awb.as_deref().unwrap_or("-"),
            "No matching order for shipment event"
        );
        Ok(None)
    }

    /// Resolve the return a return-shipment event refers to.
    pub async fn resolve_return(&self, event: &ShipmentEvent) -> RepoResult<Option<ReturnRequest>> {
        if let Some(shipment_id) = event.shipment_id.as_deref()
            && let Some(ret) = self.returns.find_by_shipment_id(shipment_id).await?
        {
            return Ok(Some(ret));
        }
        if let Some(awb) = event.awb.as_deref()
            && let Some(ret) = self.returns.find_by_awb(awb).await?
        {
            return Ok(Some(ret));
        }
        if let Some(prefix) = event.order_number_hint.as_deref().and_then(number_prefix) {
            if let Some(ret) = self.returns.find_by_return_number(prefix).await? {
                return Ok(Some(ret));
            }
            // the composite sometimes carries the order number instead
            if let Some(ret) = self.returns.find_by_order_number(prefix).await? {
                return Ok(Some(ret));
            }
        }

        tracing::info!(
            shipment_id = event.shipment_id.as_deref().unwrap_or("-"),
            awb = event.awb.as_deref().unwrap_or("-"),
            "No matching return for return event"
        );
        Ok(None)
    }
}
