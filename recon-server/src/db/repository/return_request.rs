//! Return Repository
//!
//! Same conditional-write discipline as the order repository: status
//! advances carry the expected current status in the predicate, and the
//! refund-initiation write re-checks `transaction_id` absence so a refund
//! can never be issued twice even if two saga runs race.

use shared::models::{
    AdminNote, RefundStatus, ReturnRequest, ReturnStatus, ReturnTransition, TransitionActor,
};

use super::{BaseRepository, RepoError, RepoResult};
use surrealdb::Surreal;
use surrealdb::engine::local::Db;

#[derive(Clone)]
pub struct ReturnRepository {
    base: BaseRepository,
}

impl ReturnRepository {
    pub fn new(db: Surreal<Db>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn create(&self, ret: &ReturnRequest) -> RepoResult<ReturnRequest> {
        let mut res = self
            .base
            .db()
            .query("CREATE return_request CONTENT $data")
            .bind(("data", ret.clone()))
            .await?;
        let created: Vec<ReturnRequest> = res.take(0)?;
        created
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::Duplicate(format!("return {}", ret.return_number)))
    }

    pub async fn find_by_return_number(&self, return_number: &str) -> RepoResult<Option<ReturnRequest>> {
        self.find_one("return_number", return_number).await
    }

    pub async fn find_by_order_number(&self, order_number: &str) -> RepoResult<Option<ReturnRequest>> {
        self.find_one("order_number", order_number).await
    }

    pub async fn find_by_shipment_id(&self, shipment_id: &str) -> RepoResult<Option<ReturnRequest>> {
        self.find_one("shipping.shipment_id", shipment_id).await
    }

    pub async fn find_by_awb(&self, awb: &str) -> RepoResult<Option<ReturnRequest>> {
        self.find_one("shipping.awb_code", awb).await
    }

    /// Lookup by the gateway's refund ID (`refund.transaction_id`).
    pub async fn find_by_refund_transaction(&self, refund_id: &str) -> RepoResult<Option<ReturnRequest>> {
        self.find_one("refund.transaction_id", refund_id).await
    }

    async fn find_one(&self, field: &str, value: &str) -> RepoResult<Option<ReturnRequest>> {
        let sql = format!("SELECT * FROM return_request WHERE {field} = $value LIMIT 1");
        let mut res = self
            .base
            .db()
            .query(sql)
            .bind(("value", value.to_string()))
            .await?;
        let rows: Vec<ReturnRequest> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Advance the return's status conditionally, recording the actor.
    ///
    /// Returns the updated record, or `None` when the return was no longer
    /// at `from` (someone else moved it — the transition did not happen).
    pub async fn advance_status(
        &self,
        return_number: &str,
        from: ReturnStatus,
        to: ReturnStatus,
        actor: TransitionActor,
        now: i64,
    ) -> RepoResult<Option<ReturnRequest>> {
        let transition = ReturnTransition {
            from,
            to,
            actor,
            timestamp: now,
        };
        let mut res = self
            .base
            .db()
            .query(
                "UPDATE return_request SET
                    status = $to,
                    status_history += $transition,
                    updated_at = $now
                 WHERE return_number = $return_number AND status = $from
                 RETURN AFTER",
            )
            .bind(("return_number", return_number.to_string()))
            .bind(("from", from))
            .bind(("to", to))
            .bind(("transition", transition))
            .bind(("now", now))
            .await?;
        let rows: Vec<ReturnRequest> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Attach return-shipment identifiers as they become known
    /// (null-coalescing: `None` keeps the stored value).
    pub async fn attach_shipment_identifiers(
        &self,
        return_number: &str,
        shipment_id: Option<String>,
        awb_code: Option<String>,
        courier_name: Option<String>,
        now: i64,
    ) -> RepoResult<()> {
        self.base
            .db()
            .query(
                "UPDATE return_request SET
                    shipping.shipment_id = $shipment_id ?? shipping.shipment_id,
                    shipping.awb_code = $awb_code ?? shipping.awb_code,
                    shipping.courier_name = $courier_name ?? shipping.courier_name,
                    updated_at = $now
                 WHERE return_number = $return_number",
            )
            .bind(("return_number", return_number.to_string()))
            .bind(("shipment_id", shipment_id))
            .bind(("awb_code", awb_code))
            .bind(("courier_name", courier_name))
            .bind(("now", now))
            .await?;
        Ok(())
    }

    /// Record a successful refund initiation.
    ///
    /// The predicate re-checks that no transaction ID is present, which is
    /// the idempotency key for the whole refund saga: a second saga run
    /// (replayed webhook, racing admin click) misses and issues nothing.
    pub async fn record_refund_initiated(
        &self,
        return_number: &str,
        transaction_id: &str,
        status: RefundStatus,
        now: i64,
    ) -> RepoResult<Option<ReturnRequest>> {
        let mut res = self
            .base
            .db()
            .query(
                "UPDATE return_request SET
                    refund.status = $refund_status,
                    refund.transaction_id = $transaction_id,
                    updated_at = $now
                 WHERE return_number = $return_number
                   AND refund.transaction_id IS NONE
                 RETURN AFTER",
            )
            .bind(("return_number", return_number.to_string()))
            .bind(("transaction_id", transaction_id.to_string()))
            .bind(("refund_status", status))
            .bind(("now", now))
            .await?;
        let rows: Vec<ReturnRequest> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Record a refund failure: refund status flips to `failed`, an admin
    /// note lands on the trail, the return's own status is untouched.
    pub async fn record_refund_failure(
        &self,
        return_number: &str,
        note: AdminNote,
    ) -> RepoResult<()> {
        self.base
            .db()
            .query(
                "UPDATE return_request SET
                    refund.status = 'failed',
                    admin_notes += $note,
                    updated_at = $now
                 WHERE return_number = $return_number",
            )
            .bind(("return_number", return_number.to_string()))
            .bind(("now", note.timestamp))
            .bind(("note", note))
            .await?;
        Ok(())
    }

    /// Flip the refund status to `processed` once the gateway confirms.
    pub async fn mark_refund_confirmed(&self, return_number: &str, now: i64) -> RepoResult<()> {
        self.base
            .db()
            .query(
                "UPDATE return_request SET refund.status = 'processed', updated_at = $now
                 WHERE return_number = $return_number",
            )
            .bind(("return_number", return_number.to_string()))
            .bind(("now", now))
            .await?;
        Ok(())
    }

    pub async fn append_admin_note(&self, return_number: &str, note: AdminNote) -> RepoResult<()> {
        self.base
            .db()
            .query(
                "UPDATE return_request SET admin_notes += $note, updated_at = $now
                 WHERE return_number = $return_number",
            )
            .bind(("return_number", return_number.to_string()))
            .bind(("now", note.timestamp))
            .bind(("note", note))
            .await?;
        Ok(())
    }

    /// Returns whose refund automation failed and is waiting for a human.
    pub async fn find_failed_refunds(&self) -> RepoResult<Vec<ReturnRequest>> {
        let mut res = self
            .base
            .db()
            .query(
                "SELECT * FROM return_request
                 WHERE status = 'approved_refund' AND refund.status = 'failed'
                 ORDER BY updated_at ASC",
            )
            .await?;
        Ok(res.take(0)?)
    }
}
