//! Refund Orchestrator
//!
//! The return→refund saga: inspection check, refund-gateway call, state
//! advancement, failure containment. Triggered only on the transition
//! INTO `received`; the manual admin path re-enters the same saga from
//! `approved_refund`.
//!
//! # Containment rule
//!
//! A refund failure must never be silently swallowed as "done". On any
//! gateway failure the return stays at `approved_refund` with
//! `refund.status = failed` and an admin note carrying the reason — which
//! is exactly the divergence pattern the stuck-entity detector surfaces.
//!
//! # Decoupled confirmation
//!
//! Refund initiation (our API call) and refund confirmation (the
//! gateway's webhook) are independent events. Either may arrive, fail,
//! or repeat on its own; idempotency hangs off `refund.transaction_id`
//! presence, re-checked at write time.

use std::sync::Arc;

use shared::event::{RefundEvent, RefundEventKind};
use shared::models::{AdminNote, RefundStatus, ReturnRequest, ReturnStatus, TransitionActor};
use shared::util::now_millis;

use surrealdb::Surreal;
use surrealdb::engine::local::Db;

use super::ReconError;
use crate::db::repository::{OrderRepository, ReturnRepository};
use crate::gateway::RefundGateway;
use crate::txlog::{TransactionLogger, TxType};

/// Marker prepended to containment notes so `find_flagged` scans hit them
const URGENT_MARKER: &str = "[URGENT]";

/// How one orchestrator run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundRunOutcome {
    /// Refund issued; return advanced through `refund_processed` to `completed`
    Completed { refund_id: String },
    /// Flagged item conditions — stopped at `inspected` for manual approval
    HeldForInspection,
    /// Gateway call failed — return left at `approved_refund`, flagged
    GatewayFailed { reason: String },
    /// No gateway payment to refund against (COD order) — manual payout
    ManualPayoutRequired,
    /// A refund transaction already exists; nothing was issued
    AlreadyInitiated,
    /// The return was not in a state this entry point may act on
    NotEligible { status: ReturnStatus },
}

/// What a gateway refund webhook did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundWebhookOutcome {
    /// Confirmation landed; return is (or already was) completed
    Confirmed { return_number: String },
    /// `refund.failed` pushed the return back to `approved_refund`
    RetryScheduled { return_number: String },
    /// Failure reported for a return automation cannot regress — flagged
    FlaggedForManualReview { return_number: String },
    /// No matching return — logged and dropped
    Unmatched,
}

/// Eligibility report for the admin surface
#[derive(Debug, Clone, serde::Serialize)]
pub struct RefundEligibility {
    pub return_number: String,
    pub status: ReturnStatus,
    pub eligible: bool,
    pub auto_inspection_passed: bool,
    pub already_initiated: bool,
    pub has_gateway_payment: bool,
    pub reasons: Vec<String>,
}

pub struct RefundOrchestrator {
    orders: OrderRepository,
    returns: ReturnRepository,
    gateway: Arc<dyn RefundGateway>,
    tx_log: TransactionLogger,
}

impl RefundOrchestrator {
    pub fn new(db: Surreal<Db>, gateway: Arc<dyn RefundGateway>, tx_log: TransactionLogger) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            returns: ReturnRepository::new(db),
            gateway,
            tx_log,
        }
    }

    async fn fetch(&self, return_number: &str) -> Result<ReturnRequest, ReconError> {
        self.returns
            .find_by_return_number(return_number)
            .await?
            .ok_or_else(|| ReconError::Persistence(format!("return {return_number} not found")))
    }

    /// Automation entry point — fired on the `received` transition.
    ///
    /// Clean items: `received → inspected → approved_refund`, then the
    /// gateway call. Flagged items: stop at `inspected`.
    pub async fn run_auto_inspection(
        &self,
        return_number: &str,
    ) -> Result<RefundRunOutcome, ReconError> {
        let ret = self.fetch(return_number).await?;

        if ret.status != ReturnStatus::Received {
            return Ok(RefundRunOutcome::NotEligible { status: ret.status });
        }

        if !ret.all_items_auto_refundable() {
            let Some(inspected) = self
                .returns
                .advance_status(
                    return_number,
                    ReturnStatus::Received,
                    ReturnStatus::Inspected,
                    TransitionActor::SystemAutomation,
                    now_millis(),
                )
                .await?
            else {
                let current = self.fetch(return_number).await?;
                return Ok(RefundRunOutcome::NotEligible { status: current.status });
            };
            self.returns
                .append_admin_note(
                    return_number,
                    AdminNote {
                        note: "Auto-inspection stopped: item condition flagged, manual refund approval required".into(),
                        author: "system_automation".into(),
                        timestamp: now_millis(),
                    },
                )
                .await?;
            self.tx_log.info(
                TxType::ManualInterventionFlagged,
                return_number,
                "Return held at inspected — flagged item condition",
                serde_json::json!({ "status": inspected.status }),
            );
            return Ok(RefundRunOutcome::HeldForInspection);
        }

        // clean items: advance through inspection to refund approval
        for (from, to) in [
            (ReturnStatus::Received, ReturnStatus::Inspected),
            (ReturnStatus::Inspected, ReturnStatus::ApprovedRefund),
        ] {
            if self
                .returns
                .advance_status(
                    return_number,
                    from,
                    to,
                    TransitionActor::SystemAutomation,
                    now_millis(),
                )
                .await?
                .is_none()
            {
                // someone else is driving this return
                let current = self.fetch(return_number).await?;
                return Ok(RefundRunOutcome::NotEligible { status: current.status });
            }
        }

        self.initiate_refund(return_number, TransitionActor::SystemAutomation)
            .await
    }

    /// Issue the refund for a return standing at `approved_refund`.
    ///
    /// Shared by automation and the manual admin path; `actor` is
    /// recorded on the transitions it performs.
    pub async fn initiate_refund(
        &self,
        return_number: &str,
        actor: TransitionActor,
    ) -> Result<RefundRunOutcome, ReconError> {
        let ret = self.fetch(return_number).await?;

        if ret.status != ReturnStatus::ApprovedRefund {
            return Ok(RefundRunOutcome::NotEligible { status: ret.status });
        }
        if ret.refund.transaction_id.is_some() {
            return Ok(RefundRunOutcome::AlreadyInitiated);
        }

        let order = self
            .orders
            .find_by_order_number(&ret.order_number)
            .await?
            .ok_or_else(|| {
                ReconError::Persistence(format!("order {} for return {return_number} not found", ret.order_number))
            })?;

        let Some(payment_id) = order.payment_id.as_deref() else {
            self.returns
                .append_admin_note(
                    return_number,
                    AdminNote {
                        note: format!(
                            "{URGENT_MARKER} No gateway payment on order {} — refund must be paid out manually via bank details",
                            ret.order_number
                        ),
                        author: "system_automation".into(),
                        timestamp: now_millis(),
                    },
                )
                .await?;
            self.tx_log.info(
                TxType::ManualInterventionFlagged,
                return_number,
                "Refund requires manual payout (no gateway payment)",
                serde_json::json!({ "order_number": ret.order_number }),
            );
            return Ok(RefundRunOutcome::ManualPayoutRequired);
        };

        self.tx_log.info(
            TxType::RefundInitiated,
            return_number,
            "Refund initiated at gateway",
            serde_json::json!({
                "payment_id": payment_id,
                "amount": ret.refund.amount,
            }),
        );

        // the gateway call holds no record state; idempotency is
        // re-checked at write time below
        match self
            .gateway
            .create_refund(payment_id, ret.refund.amount, ret.refund.speed.as_deref())
            .await
        {
            Ok(refund) => {
                let recorded = self
                    .returns
                    .record_refund_initiated(
                        return_number,
                        &refund.refund_id,
                        RefundStatus::Processed,
                        now_millis(),
                    )
                    .await?;
                if recorded.is_none() {
                    // a concurrent run initiated first; it owns the advance
                    tracing::warn!(
                        %return_number,
                        refund_id = %refund.refund_id,
                        "Refund initiation raced — write-time check declined this one"
                    );
                    return Ok(RefundRunOutcome::AlreadyInitiated);
                }

                // advance to refund_processed, then completed; a miss here
                // is tolerated — the confirmation webhook covers the rest
                for (from, to) in [
                    (ReturnStatus::ApprovedRefund, ReturnStatus::RefundProcessed),
                    (ReturnStatus::RefundProcessed, ReturnStatus::Completed),
                ] {
                    self.returns
                        .advance_status(return_number, from, to, actor.clone(), now_millis())
                        .await?;
                }

                self.close_out_order(&ret.order_number).await?;

                self.tx_log.info(
                    TxType::RefundSucceeded,
                    return_number,
                    "Refund processed and return completed",
                    serde_json::json!({
                        "refund_id": refund.refund_id,
                        "gateway_status": refund.status,
                    }),
                );
                Ok(RefundRunOutcome::Completed {
                    refund_id: refund.refund_id,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                // the single most important containment rule: the return
                // stays at approved_refund and a human can see why
                self.returns
                    .record_refund_failure(
                        return_number,
                        AdminNote {
                            note: format!("{URGENT_MARKER} Refund gateway call failed: {reason}"),
                            author: "system_automation".into(),
                            timestamp: now_millis(),
                        },
                    )
                    .await?;
                self.tx_log.error(
                    TxType::RefundFailed,
                    return_number,
                    "Refund gateway call failed — return held at approved_refund",
                    serde_json::json!({ "reason": reason }),
                );
                Ok(RefundRunOutcome::GatewayFailed { reason })
            }
        }
    }

    /// Handle a gateway refund webhook (`refund.processed` / `refund.failed`).
    ///
    /// Confirmation and failure arrive independently of the initiation
    /// call; this is the second trigger of the decoupled pair.
    pub async fn apply_gateway_refund_event(
        &self,
        event: &RefundEvent,
    ) -> Result<RefundWebhookOutcome, ReconError> {
        let ret = match self.resolve_refund_target(event).await? {
            Some(ret) => ret,
            None => {
                tracing::info!(
                    refund_id = %event.refund_id,
                    payment_id = event.payment_id.as_deref().unwrap_or("-"),
                    "Refund event matched no return"
                );
                return Ok(RefundWebhookOutcome::Unmatched);
            }
        };
        let return_number = ret.return_number.clone();

        match event.kind {
            RefundEventKind::Processed => {
                self.returns
                    .mark_refund_confirmed(&return_number, now_millis())
                    .await?;
                // finish whatever initiation didn't: either hop may
                // already be done, a miss is a no-op
                for (from, to) in [
                    (ReturnStatus::ApprovedRefund, ReturnStatus::RefundProcessed),
                    (ReturnStatus::RefundProcessed, ReturnStatus::Completed),
                ] {
                    self.returns
                        .advance_status(
                            &return_number,
                            from,
                            to,
                            TransitionActor::SystemAutomation,
                            now_millis(),
                        )
                        .await?;
                }
                self.close_out_order(&ret.order_number).await?;
                self.tx_log.info(
                    TxType::RefundSucceeded,
                    &return_number,
                    "Gateway confirmed refund",
                    serde_json::json!({ "refund_id": event.refund_id }),
                );
                Ok(RefundWebhookOutcome::Confirmed { return_number })
            }
            RefundEventKind::Failed => {
                self.returns
                    .record_refund_failure(
                        &return_number,
                        AdminNote {
                            note: format!(
                                "{URGENT_MARKER} Gateway reported refund {} failed ({})",
                                event.refund_id, event.gateway_status
                            ),
                            author: "system_automation".into(),
                            timestamp: now_millis(),
                        },
                    )
                    .await?;
                self.tx_log.error(
                    TxType::RefundFailed,
                    &return_number,
                    "Gateway reported refund failure",
                    serde_json::json!({
                        "refund_id": event.refund_id,
                        "gateway_status": event.gateway_status,
                    }),
                );

                if ret.status == ReturnStatus::RefundProcessed {
                    // the explicit retry regression: back to approved_refund
                    // so the saga can reprocess
                    self.returns
                        .advance_status(
                            &return_number,
                            ReturnStatus::RefundProcessed,
                            ReturnStatus::ApprovedRefund,
                            TransitionActor::SystemAutomation,
                            now_millis(),
                        )
                        .await?;
                    Ok(RefundWebhookOutcome::RetryScheduled { return_number })
                } else if ret.status == ReturnStatus::ApprovedRefund {
                    Ok(RefundWebhookOutcome::RetryScheduled { return_number })
                } else {
                    // completed (or elsewhere) — automation must not
                    // regress it, a human decides
                    self.tx_log.error(
                        TxType::ManualInterventionFlagged,
                        &return_number,
                        "Refund failure reported for a settled return",
                        serde_json::json!({ "status": ret.status }),
                    );
                    Ok(RefundWebhookOutcome::FlaggedForManualReview { return_number })
                }
            }
        }
    }

    /// `delivered → returned` + payment refunded on the parent order.
    /// A miss (order not delivered) is left alone for the stuck report.
    async fn close_out_order(&self, order_number: &str) -> Result<(), ReconError> {
        if !self.orders.mark_returned(order_number, now_millis()).await? {
            tracing::debug!(
                order_number,
                "Order not in delivered state — skipped returned/refunded close-out"
            );
        }
        Ok(())
    }

    async fn resolve_refund_target(
        &self,
        event: &RefundEvent,
    ) -> Result<Option<ReturnRequest>, ReconError> {
        if let Some(ret) = self
            .returns
            .find_by_refund_transaction(&event.refund_id)
            .await?
        {
            return Ok(Some(ret));
        }
        // initiation may not have been recorded (e.g. crash between the
        // gateway call and the write) — fall back to the payment ID
        if let Some(payment_id) = event.payment_id.as_deref()
            && let Some(order) = self.orders.find_by_payment_id(payment_id).await?
            && let Some(ret) = self
                .returns
                .find_by_order_number(&order.order_number)
                .await?
        {
            return Ok(Some(ret));
        }
        Ok(None)
    }

    /// Read-only eligibility check for the admin surface.
    pub async fn eligibility(&self, return_number: &str) -> Result<RefundEligibility, ReconError> {
        let ret = self.fetch(return_number).await?;
        let order = self.orders.find_by_order_number(&ret.order_number).await?;

        let auto_inspection_passed = ret.all_items_auto_refundable();
        let already_initiated = ret.refund.transaction_id.is_some();
        let has_gateway_payment = order
            .as_ref()
            .is_some_and(|o| o.payment_id.is_some());

        let mut reasons = Vec::new();
        if !matches!(
            ret.status,
            ReturnStatus::Received | ReturnStatus::Inspected | ReturnStatus::ApprovedRefund
        ) {
            reasons.push(format!("return is at `{}`", ret.status));
        }
        if !auto_inspection_passed {
            reasons.push("item condition flagged — needs manual approval".into());
        }
        if already_initiated {
            reasons.push("refund already initiated".into());
        }
        if !has_gateway_payment {
            reasons.push("no gateway payment — manual payout via bank details".into());
        }

        Ok(RefundEligibility {
            return_number: ret.return_number,
            status: ret.status,
            eligible: reasons.is_empty(),
            auto_inspection_passed,
            already_initiated,
            has_gateway_payment,
            reasons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, GatewayRefund};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use shared::models::{
        ItemCondition, Order, OrderStatus, PaymentMethod, PaymentStatus, ReturnItem,
    };

    struct MockGateway {
        fail: bool,
    }

    #[async_trait]
    impl RefundGateway for MockGateway {
        async fn create_refund(
            &self,
            _payment_id: &str,
            _amount: Decimal,
            _speed: Option<&str>,
        ) -> Result<GatewayRefund, GatewayError> {
            if self.fail {
                Err(GatewayError::Rejected {
                    status: 502,
                    body: "upstream unavailable".into(),
                })
            } else {
                Ok(GatewayRefund {
                    refund_id: "rfnd_mock_1".into(),
                    status: "processed".into(),
                })
            }
        }
    }

    async fn setup(fail: bool) -> (RefundOrchestrator, OrderRepository, ReturnRepository) {
        let db = crate::db::connect_memory().await.unwrap();
        let (tx_log, _worker) = crate::txlog::spawn(db.clone());
        let orchestrator = RefundOrchestrator::new(
            db.clone(),
            Arc::new(MockGateway { fail }),
            tx_log,
        );
        (
            orchestrator,
            OrderRepository::new(db.clone()),
            ReturnRepository::new(db),
        )
    }

    fn item(condition: ItemCondition) -> ReturnItem {
        ReturnItem {
            product_id: "pendant-03".into(),
            quantity: 1,
            reason: "changed mind".into(),
            item_condition: condition,
        }
    }

    async fn seed(
        orders: &OrderRepository,
        returns: &ReturnRepository,
        condition: ItemCondition,
        status: ReturnStatus,
    ) {
        let mut order = Order::new("AUR-1", Decimal::new(49900, 2), PaymentMethod::Online, 0);
        order.payment_id = Some("pay_77".into());
        order.status = OrderStatus::Delivered;
        order.payment_status = PaymentStatus::Paid;
        orders.create(&order).await.unwrap();

        let mut ret =
            ReturnRequest::new("RET1", "AUR-1", vec![item(condition)], Decimal::new(49900, 2), 0);
        ret.status = status;
        returns.create(&ret).await.unwrap();
    }

    #[tokio::test]
    async fn clean_return_auto_completes_with_transaction_id() {
        let (orchestrator, orders, returns) = setup(false).await;
        seed(&orders, &returns, ItemCondition::Unused, ReturnStatus::Received).await;

        let outcome = orchestrator.run_auto_inspection("RET1").await.unwrap();
        assert_eq!(
            outcome,
            RefundRunOutcome::Completed {
                refund_id: "rfnd_mock_1".into()
            }
        );

        let ret = returns.find_by_return_number("RET1").await.unwrap().unwrap();
        assert_eq!(ret.status, ReturnStatus::Completed);
        assert_eq!(ret.refund.status, RefundStatus::Processed);
        assert_eq!(ret.refund.transaction_id.as_deref(), Some("rfnd_mock_1"));
        // the whole chain was automation-driven
        assert!(
            ret.status_history
                .iter()
                .all(|t| t.actor == TransitionActor::SystemAutomation)
        );
        assert_eq!(ret.status_history.len(), 4);

        // the parent order closes out with the return
        let order = orders.find_by_order_number("AUR-1").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Returned);
        assert_eq!(order.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn gateway_failure_is_contained_at_approved_refund() {
        let (orchestrator, orders, returns) = setup(true).await;
        seed(&orders, &returns, ItemCondition::Unused, ReturnStatus::Received).await;

        let outcome = orchestrator.run_auto_inspection("RET1").await.unwrap();
        assert!(matches!(outcome, RefundRunOutcome::GatewayFailed { .. }));

        let ret = returns.find_by_return_number("RET1").await.unwrap().unwrap();
        // never marked done
        assert_eq!(ret.status, ReturnStatus::ApprovedRefund);
        assert_eq!(ret.refund.status, RefundStatus::Failed);
        assert_eq!(ret.refund.transaction_id, None);
        // exactly one note, carrying the reason
        assert_eq!(ret.admin_notes.len(), 1);
        assert!(ret.admin_notes[0].note.contains("upstream unavailable"));
        assert!(ret.admin_notes[0].note.starts_with(URGENT_MARKER));
    }

    #[tokio::test]
    async fn flagged_items_stop_at_inspected() {
        let (orchestrator, orders, returns) = setup(false).await;
        seed(&orders, &returns, ItemCondition::Damaged, ReturnStatus::Received).await;

        let outcome = orchestrator.run_auto_inspection("RET1").await.unwrap();
        assert_eq!(outcome, RefundRunOutcome::HeldForInspection);

        let ret = returns.find_by_return_number("RET1").await.unwrap().unwrap();
        assert_eq!(ret.status, ReturnStatus::Inspected);
        assert_eq!(ret.refund.status, RefundStatus::NotStarted);
        assert_eq!(ret.refund.transaction_id, None);
    }

    #[tokio::test]
    async fn second_initiation_is_declined() {
        let (orchestrator, orders, returns) = setup(false).await;
        seed(&orders, &returns, ItemCondition::Unused, ReturnStatus::ApprovedRefund).await;
        returns
            .record_refund_initiated("RET1", "rfnd_earlier", RefundStatus::Processed, 0)
            .await
            .unwrap();

        let outcome = orchestrator
            .initiate_refund("RET1", TransitionActor::Admin("maya".into()))
            .await
            .unwrap();
        assert_eq!(outcome, RefundRunOutcome::AlreadyInitiated);

        let ret = returns.find_by_return_number("RET1").await.unwrap().unwrap();
        assert_eq!(ret.refund.transaction_id.as_deref(), Some("rfnd_earlier"));
    }

    #[tokio::test]
    async fn cod_return_requires_manual_payout() {
        let (orchestrator, orders, returns) = setup(false).await;
        // COD order — no gateway payment id
        let order = Order::new("AUR-1", Decimal::ONE, PaymentMethod::Cod, 0);
        orders.create(&order).await.unwrap();
        let mut ret = ReturnRequest::new("RET1", "AUR-1", vec![item(ItemCondition::Unused)], Decimal::ONE, 0);
        ret.status = ReturnStatus::ApprovedRefund;
        returns.create(&ret).await.unwrap();

        let outcome = orchestrator
            .initiate_refund("RET1", TransitionActor::SystemAutomation)
            .await
            .unwrap();
        assert_eq!(outcome, RefundRunOutcome::ManualPayoutRequired);

        let ret = returns.find_by_return_number("RET1").await.unwrap().unwrap();
        assert_eq!(ret.status, ReturnStatus::ApprovedRefund);
        assert_eq!(ret.admin_notes.len(), 1);
    }

    #[tokio::test]
    async fn refund_failed_webhook_regresses_for_retry() {
        let (orchestrator, orders, returns) = setup(false).await;
        seed(&orders, &returns, ItemCondition::Unused, ReturnStatus::RefundProcessed).await;
        returns
            .record_refund_initiated("RET1", "rfnd_9", RefundStatus::Processed, 0)
            .await
            .unwrap();

        let event = RefundEvent {
            kind: RefundEventKind::Failed,
            refund_id: "rfnd_9".into(),
            payment_id: Some("pay_77".into()),
            gateway_status: "failed".into(),
            speed: None,
        };
        let outcome = orchestrator.apply_gateway_refund_event(&event).await.unwrap();
        assert_eq!(
            outcome,
            RefundWebhookOutcome::RetryScheduled {
                return_number: "RET1".into()
            }
        );

        let ret = returns.find_by_return_number("RET1").await.unwrap().unwrap();
        assert_eq!(ret.status, ReturnStatus::ApprovedRefund);
        assert_eq!(ret.refund.status, RefundStatus::Failed);
        assert!(!ret.admin_notes.is_empty());
    }

    #[tokio::test]
    async fn refund_processed_webhook_completes_the_return() {
        let (orchestrator, orders, returns) = setup(false).await;
        seed(&orders, &returns, ItemCondition::Unused, ReturnStatus::RefundProcessed).await;
        returns
            .record_refund_initiated("RET1", "rfnd_9", RefundStatus::Processing, 0)
            .await
            .unwrap();

        let event = RefundEvent {
            kind: RefundEventKind::Processed,
            refund_id: "rfnd_9".into(),
            payment_id: None,
            gateway_status: "processed".into(),
            speed: None,
        };
        let outcome = orchestrator.apply_gateway_refund_event(&event).await.unwrap();
        assert_eq!(
            outcome,
            RefundWebhookOutcome::Confirmed {
                return_number: "RET1".into()
            }
        );

        let ret = returns.find_by_return_number("RET1").await.unwrap().unwrap();
        assert_eq!(ret.status, ReturnStatus::Completed);
        assert_eq!(ret.refund.status, RefundStatus::Processed);
    }

    #[tokio::test]
    async fn unmatched_refund_event_is_dropped() {
        let (orchestrator, _, _) = setup(false).await;
        let event = RefundEvent {
            kind: RefundEventKind::Processed,
            refund_id: "rfnd_ghost".into(),
            payment_id: Some("pay_ghost".into()),
            gateway_status: "processed".into(),
            speed: None,
        };
        let outcome = orchestrator.apply_gateway_refund_event(&event).await.unwrap();
        assert_eq!(outcome, RefundWebhookOutcome::Unmatched);
    }
}
