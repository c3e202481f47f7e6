//! Reconciles gateway payment confirmation with the order record.

use tracing::{error, info, instrument, warn};

use localmart_core::{OrderId, PaymentIntentId};

use super::PaymentError;
use crate::db::{MarkPaidOutcome, OrderStore};
use crate::stripe::{GatewayError, PaymentGateway};

/// Result of a successful confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// The order was marked paid by this call.
    Confirmed,
    /// The order was already paid by this same intent; nothing was written.
    AlreadyConfirmed,
}

impl ConfirmationOutcome {
    /// Whether an earlier call had already confirmed the order.
    #[must_use]
    pub const fn already_confirmed(self) -> bool {
        matches!(self, Self::AlreadyConfirmed)
    }
}

/// Marks orders paid once the gateway reports their payment succeeded.
pub struct PaymentConfirmationReconciler<'a> {
    gateway: &'a dyn PaymentGateway,
    orders: &'a dyn OrderStore,
}

impl<'a> PaymentConfirmationReconciler<'a> {
    /// Create a new reconciler.
    #[must_use]
    pub const fn new(gateway: &'a dyn PaymentGateway, orders: &'a dyn OrderStore) -> Self {
        Self { gateway, orders }
    }

    /// Confirm `order_id` as paid by `payment_intent_id`.
    ///
    /// The order is written only when the gateway reports the intent as
    /// `succeeded` and the order is not yet paid. Replaying a confirmation
    /// with the same intent succeeds without writing.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Gateway` if the intent cannot be retrieved or
    /// the gateway answers with a different intent.
    /// Returns `PaymentError::PaymentNotSuccessful` if the intent has not
    /// succeeded; the order is untouched.
    /// Returns `PaymentError::AlreadyPaid` if a different intent already paid
    /// the order.
    /// Returns `PaymentError::OrderUpdateFailedAfterPayment` if the payment
    /// succeeded but the order could not be marked paid.
    #[instrument(skip(self), fields(payment_intent_id = %payment_intent_id, order_id = %order_id))]
    pub async fn confirm(
        &self,
        payment_intent_id: &PaymentIntentId,
        order_id: OrderId,
    ) -> Result<ConfirmationOutcome, PaymentError> {
        let intent = self
            .gateway
            .retrieve_payment_intent(payment_intent_id)
            .await?;

        if intent.id != *payment_intent_id {
            error!(returned = %intent.id, "Gateway returned a different payment intent");
            return Err(GatewayError::WrongRecord {
                requested: payment_intent_id.to_string(),
                returned: intent.id.to_string(),
            }
            .into());
        }

        if !intent.status.is_succeeded() {
            info!(status = %intent.status, "Payment not yet successful; order untouched");
            return Err(PaymentError::PaymentNotSuccessful {
                status: intent.status,
            });
        }

        let outcome = match self.orders.mark_paid(order_id, payment_intent_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Payment captured but order update failed");
                return Err(PaymentError::OrderUpdateFailedAfterPayment {
                    payment_intent_id: payment_intent_id.clone(),
                    order_id,
                    reason: e.to_string(),
                });
            }
        };

        match outcome {
            MarkPaidOutcome::Updated => {
                info!("Order marked paid");
                Ok(ConfirmationOutcome::Confirmed)
            }
            MarkPaidOutcome::AlreadyPaid {
                payment_intent_id: Some(existing),
            } if existing == *payment_intent_id => {
                info!("Order already confirmed by this payment");
                Ok(ConfirmationOutcome::AlreadyConfirmed)
            }
            MarkPaidOutcome::AlreadyPaid {
                payment_intent_id: existing,
            } => {
                warn!(
                    existing_payment_intent_id = ?existing.as_ref().map(PaymentIntentId::as_str),
                    "Order already paid by a different payment; possible double charge"
                );
                Err(PaymentError::AlreadyPaid { order_id, existing })
            }
            MarkPaidOutcome::NotFound => {
                error!("Payment captured for an order that does not exist");
                Err(PaymentError::OrderUpdateFailedAfterPayment {
                    payment_intent_id: payment_intent_id.clone(),
                    order_id,
                    reason: "order not found".to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use localmart_core::{OrderStatus, PaymentIntentStatus, PaymentStatus};

    use super::*;
    use crate::testing::{FakeGateway, MemoryStore};

    fn intent_id(id: &str) -> PaymentIntentId {
        PaymentIntentId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_succeeded_intent_marks_order_paid() {
        let gateway = FakeGateway::new();
        let store = MemoryStore::new();
        let order_id = store.add_order(None);
        gateway.set_intent_status("pi_ok", PaymentIntentStatus::Succeeded);

        let outcome = PaymentConfirmationReconciler::new(&gateway, &store)
            .confirm(&intent_id("pi_ok"), order_id)
            .await
            .unwrap();

        assert_eq!(outcome, ConfirmationOutcome::Confirmed);
        let order = store.order(order_id).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.payment_intent_id, Some(intent_id("pi_ok")));
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let gateway = FakeGateway::new();
        let store = MemoryStore::new();
        let order_id = store.add_order(None);
        gateway.set_intent_status("pi_ok", PaymentIntentStatus::Succeeded);
        let reconciler = PaymentConfirmationReconciler::new(&gateway, &store);

        reconciler.confirm(&intent_id("pi_ok"), order_id).await.unwrap();
        let after_first = store.order(order_id).unwrap();

        for _ in 0..3 {
            let outcome = reconciler
                .confirm(&intent_id("pi_ok"), order_id)
                .await
                .unwrap();
            assert!(outcome.already_confirmed());
        }

        assert_eq!(store.order(order_id).unwrap(), after_first);
        assert_eq!(store.writes().mark_paid, 1);
    }

    #[tokio::test]
    async fn test_processing_intent_never_touches_order() {
        let gateway = FakeGateway::new();
        let store = MemoryStore::new();
        let order_id = store.add_order(None);
        let before = store.order(order_id).unwrap();
        gateway.set_intent_status("pi_wait", PaymentIntentStatus::Processing);

        let err = PaymentConfirmationReconciler::new(&gateway, &store)
            .confirm(&intent_id("pi_wait"), order_id)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PaymentError::PaymentNotSuccessful {
                status: PaymentIntentStatus::Processing
            }
        ));
        assert_eq!(store.writes().mark_paid, 0);
        assert_eq!(store.order(order_id).unwrap(), before);
    }

    #[tokio::test]
    async fn test_different_intent_rejected_as_already_paid() {
        let gateway = FakeGateway::new();
        let store = MemoryStore::new();
        let order_id = store.add_order(None);
        gateway.set_intent_status("pi_first", PaymentIntentStatus::Succeeded);
        gateway.set_intent_status("pi_second", PaymentIntentStatus::Succeeded);
        let reconciler = PaymentConfirmationReconciler::new(&gateway, &store);

        reconciler
            .confirm(&intent_id("pi_first"), order_id)
            .await
            .unwrap();
        let err = reconciler
            .confirm(&intent_id("pi_second"), order_id)
            .await
            .unwrap_err();

        match err {
            PaymentError::AlreadyPaid { existing, .. } => {
                assert_eq!(existing, Some(intent_id("pi_first")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            store.order(order_id).unwrap().payment_intent_id,
            Some(intent_id("pi_first"))
        );
    }

    #[tokio::test]
    async fn test_store_failure_after_success_is_inconsistency() {
        let gateway = FakeGateway::new();
        let store = MemoryStore::new();
        let order_id = store.add_order(None);
        gateway.set_intent_status("pi_ok", PaymentIntentStatus::Succeeded);
        store.fail_mark_paid();

        let err = PaymentConfirmationReconciler::new(&gateway, &store)
            .confirm(&intent_id("pi_ok"), order_id)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PaymentError::OrderUpdateFailedAfterPayment { .. }
        ));
        assert_eq!(err.kind(), super::super::ErrorKind::Inconsistency);
    }

    #[tokio::test]
    async fn test_missing_order_after_success_is_inconsistency() {
        let gateway = FakeGateway::new();
        let store = MemoryStore::new();
        gateway.set_intent_status("pi_ok", PaymentIntentStatus::Succeeded);

        let err = PaymentConfirmationReconciler::new(&gateway, &store)
            .confirm(&intent_id("pi_ok"), OrderId::random())
            .await
            .unwrap_err();

        match err {
            PaymentError::OrderUpdateFailedAfterPayment { reason, .. } => {
                assert_eq!(reason, "order not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_intent_served_under_another_id_is_rejected() {
        let gateway = FakeGateway::new();
        let store = MemoryStore::new();
        let order_id = store.add_order(None);
        gateway.set_intent_status("pi_paid_elsewhere", PaymentIntentStatus::Succeeded);
        gateway.serve_intent_as("pi_requested", "pi_paid_elsewhere");

        let err = PaymentConfirmationReconciler::new(&gateway, &store)
            .confirm(&intent_id("pi_requested"), order_id)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PaymentError::Gateway(GatewayError::WrongRecord { .. })
        ));
        assert_eq!(store.writes().mark_paid, 0);
        assert!(!store.order(order_id).unwrap().is_paid());
    }

    #[tokio::test]
    async fn test_unknown_intent_is_gateway_error() {
        let gateway = FakeGateway::new();
        let store = MemoryStore::new();
        let order_id = store.add_order(None);

        let err = PaymentConfirmationReconciler::new(&gateway, &store)
            .confirm(&intent_id("pi_missing"), order_id)
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Gateway(_)));
        assert_eq!(store.writes().mark_paid, 0);
    }
}
