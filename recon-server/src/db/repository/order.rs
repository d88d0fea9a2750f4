//! Order Repository
//!
//! Lookups for the identifier resolver, conditional writes for the
//! transition engine, and the read-only scans the stuck-entity detector
//! runs. The engine's write method is a single `UPDATE ... WHERE`
//! statement: the expected current status travels in the predicate, so a
//! concurrent webhook that already moved the order makes the write a
//! clean miss instead of a lost update.

use shared::models::{AdminNote, Order, OrderStatus, PaymentStatus, ShippingStatus, TrackingEntry};

use super::{BaseRepository, RepoError, RepoResult};
use surrealdb::Surreal;
use surrealdb::engine::local::Db;

/// Everything one shipment event may change on an order.
///
/// Identifier/courier fields use null-coalescing in the update statement:
/// a `None` here means "keep whatever the record has", never "clear".
#[derive(Debug, Clone)]
pub struct ShipmentUpdate {
    /// Write-time guard: the status the order had when the engine decided
    pub expected_status: OrderStatus,
    pub status: OrderStatus,
    pub shipping_status: ShippingStatus,
    /// Set only by the COD auto-pay rule
    pub payment_status: Option<PaymentStatus>,
    pub shipment_id: Option<String>,
    pub carrier_order_id: Option<String>,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
    pub etd: Option<String>,
    /// Pre-deduped tracking entries to append
    pub entries: Vec<TrackingEntry>,
    pub now: i64,
}

#[derive(Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Surreal<Db>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn create(&self, order: &Order) -> RepoResult<Order> {
        let mut res = self
            .base
            .db()
            .query("CREATE order CONTENT $data")
            .bind(("data", order.clone()))
            .await?;
        let created: Vec<Order> = res.take(0)?;
        created
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::Duplicate(format!("order {}", order.order_number)))
    }

    pub async fn find_by_order_number(&self, order_number: &str) -> RepoResult<Option<Order>> {
        self.find_one("order_number", order_number).await
    }

    pub async fn find_by_shipment_id(&self, shipment_id: &str) -> RepoResult<Option<Order>> {
        self.find_one("shipping.shipment_id", shipment_id).await
    }

    pub async fn find_by_awb(&self, awb: &str) -> RepoResult<Option<Order>> {
        self.find_one("shipping.awb_code", awb).await
    }

    pub async fn find_by_carrier_order_id(&self, carrier_order_id: &str) -> RepoResult<Option<Order>> {
        self.find_one("shipping.carrier_order_id", carrier_order_id)
            .await
    }

    /// Lookup by gateway payment ID (refund webhook resolution).
    pub async fn find_by_payment_id(&self, payment_id: &str) -> RepoResult<Option<Order>> {
        self.find_one("payment_id", payment_id).await
    }

    async fn find_one(&self, field: &str, value: &str) -> RepoResult<Option<Order>> {
        let sql = format!("SELECT * FROM order WHERE {field} = $value LIMIT 1");
        let mut res = self
            .base
            .db()
            .query(sql)
            .bind(("value", value.to_string()))
            .await?;
        let orders: Vec<Order> = res.take(0)?;
        Ok(orders.into_iter().next())
    }

    /// Apply a shipment update conditionally.
    ///
    /// Returns the updated order, or `None` when the guard did not match
    /// (the order moved under us — caller refetches and re-decides).
    /// Tracking entries go through `array::union`, so replaying the same
    /// batch is harmless even if two deliveries race past the app-level
    /// dedup check.
    pub async fn apply_shipment_update(
        &self,
        order_number: &str,
        update: ShipmentUpdate,
    ) -> RepoResult<Option<Order>> {
        let mut res = self
            .base
            .db()
            .query(
                "UPDATE order SET
                    status = $status,
                    shipping.status = $shipping_status,
                    payment_status = $payment_status ?? payment_status,
                    shipping.shipment_id = $shipment_id ?? shipping.shipment_id,
                    shipping.carrier_order_id = $carrier_order_id ?? shipping.carrier_order_id,
                    shipping.awb_code = $awb_code ?? shipping.awb_code,
                    shipping.courier_name = $courier_name ?? shipping.courier_name,
                    shipping.etd = $etd ?? shipping.etd,
                    tracking_history = array::union(tracking_history, $entries),
                    updated_at = $now
                 WHERE order_number = $order_number AND status = $expected_status
                 RETURN AFTER",
            )
            .bind(("order_number", order_number.to_string()))
            .bind(("expected_status", update.expected_status))
            .bind(("status", update.status))
            .bind(("shipping_status", update.shipping_status))
            .bind(("payment_status", update.payment_status))
            .bind(("shipment_id", update.shipment_id))
            .bind(("carrier_order_id", update.carrier_order_id))
            .bind(("awb_code", update.awb_code))
            .bind(("courier_name", update.courier_name))
            .bind(("etd", update.etd))
            .bind(("entries", update.entries))
            .bind(("now", update.now))
            .await?;
        let updated: Vec<Order> = res.take(0)?;
        Ok(updated.into_iter().next())
    }

    /// Close the loop once the order's return completes:
    /// `delivered → returned`, payment marked refunded. Conditional on
    /// `delivered` — any other state is left for a human to reconcile.
    pub async fn mark_returned(&self, order_number: &str, now: i64) -> RepoResult<bool> {
        let mut res = self
            .base
            .db()
            .query(
                "UPDATE order SET
                    status = 'returned',
                    payment_status = 'refunded',
                    updated_at = $now
                 WHERE order_number = $order_number AND status = 'delivered'
                 RETURN AFTER",
            )
            .bind(("order_number", order_number.to_string()))
            .bind(("now", now))
            .await?;
        let updated: Vec<Order> = res.take(0)?;
        Ok(!updated.is_empty())
    }

    /// Append to the order's note trail (append-only, unconditional).
    pub async fn append_admin_note(&self, order_number: &str, note: AdminNote) -> RepoResult<()> {
        self.base
            .db()
            .query(
                "UPDATE order SET admin_notes += $note, updated_at = $now
                 WHERE order_number = $order_number",
            )
            .bind(("order_number", order_number.to_string()))
            .bind(("now", note.timestamp))
            .bind(("note", note))
            .await?;
        Ok(())
    }

    // ===== Stuck-entity detector scans (read-only) =====

    /// Online-paid orders with no shipment identifier, created before `cutoff`.
    pub async fn find_paid_unshipped(&self, cutoff: i64) -> RepoResult<Vec<Order>> {
        let mut res = self
            .base
            .db()
            .query(
                "SELECT * FROM order
                 WHERE payment_method = 'online'
                   AND payment_status = 'paid'
                   AND shipping.shipment_id IS NONE
                   AND shipping.awb_code IS NONE
                   AND shipping.carrier_order_id IS NONE
                   AND status NOT IN ['cancelled', 'returned', 'delivered']
                   AND created_at < $cutoff
                 ORDER BY created_at ASC",
            )
            .bind(("cutoff", cutoff))
            .await?;
        Ok(res.take(0)?)
    }

    /// Orders still `pending` despite a captured payment, created before `cutoff`.
    pub async fn find_pending_paid(&self, cutoff: i64) -> RepoResult<Vec<Order>> {
        let mut res = self
            .base
            .db()
            .query(
                "SELECT * FROM order
                 WHERE status = 'pending'
                   AND payment_status = 'paid'
                   AND created_at < $cutoff
                 ORDER BY created_at ASC",
            )
            .bind(("cutoff", cutoff))
            .await?;
        Ok(res.take(0)?)
    }

    /// Cancelled orders whose payment is still `paid`, touched since `since`.
    pub async fn find_cancelled_paid(&self, since: i64) -> RepoResult<Vec<Order>> {
        let mut res = self
            .base
            .db()
            .query(
                "SELECT * FROM order
                 WHERE status = 'cancelled'
                   AND payment_status = 'paid'
                   AND updated_at > $since
                 ORDER BY updated_at DESC",
            )
            .bind(("since", since))
            .await?;
        Ok(res.take(0)?)
    }

    /// Orders flagged by a human: any admin note containing `marker`
    /// (matched case-insensitively).
    pub async fn find_flagged(&self, marker: &str) -> RepoResult<Vec<Order>> {
        let mut res = self
            .base
            .db()
            .query(
                "SELECT * FROM order
                 WHERE array::len(admin_notes[WHERE string::contains(string::lowercase(note), $marker)]) > 0",
            )
            .bind(("marker", marker.to_lowercase()))
            .await?;
        Ok(res.take(0)?)
    }
}
