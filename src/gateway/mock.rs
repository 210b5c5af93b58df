//! In-process gateway for tests and development.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::provider::PaymentGateway;
use super::types::{
    ChargeRequest, GatewayError, GatewayRefund, GatewayTransfer, PaymentIntent, TransferRequest,
};

/// Gateway that settles everything locally.
///
/// Created intents, refunds and transfers are kept in concurrent maps so
/// tests can assert against them. Failure injection covers both arms of the
/// error taxonomy: a budget of transient failures and a reject-all switch.
#[derive(Default)]
pub struct MockGateway {
    intents: DashMap<String, PaymentIntent>,
    refunds: DashMap<String, GatewayRefund>,
    transfers: DashMap<String, GatewayTransfer>,
    counter: AtomicU64,
    retryable_budget: AtomicU32,
    reject_all: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` calls fail with a retryable error.
    pub fn inject_retryable_failures(&self, count: u32) {
        self.retryable_budget.store(count, Ordering::SeqCst);
    }

    /// Every call is rejected until switched off.
    pub fn reject_everything(&self, reject: bool) {
        self.reject_all.store(reject, Ordering::SeqCst);
    }

    pub fn intent(&self, id: &str) -> Option<PaymentIntent> {
        self.intents.get(id).map(|entry| entry.clone())
    }

    pub fn refund(&self, id: &str) -> Option<GatewayRefund> {
        self.refunds.get(id).map(|entry| entry.clone())
    }

    pub fn transfer(&self, id: &str) -> Option<GatewayTransfer> {
        self.transfers.get(id).map(|entry| entry.clone())
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}_mock_{}", prefix, n)
    }

    fn check_injected_failure(&self, operation: &str) -> Result<(), GatewayError> {
        if self.reject_all.load(Ordering::SeqCst) {
            return Err(GatewayError::Permanent {
                message: format!("{} rejected by mock", operation),
            });
        }
        let drained = self
            .retryable_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if drained {
            return Err(GatewayError::Retryable {
                message: format!("{} failed transiently in mock", operation),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_payment_intent(
        &self,
        request: ChargeRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        self.check_injected_failure("create_payment_intent")?;
        let id = self.next_id("pi");
        let intent = PaymentIntent {
            client_secret: format!("{}_secret_{}", id, Uuid::new_v4().simple()),
            id: id.clone(),
            amount_cents: request.amount_cents,
            currency: request.currency,
            status: "requires_confirmation".to_string(),
        };
        self.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn cancel_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        self.check_injected_failure("cancel_payment_intent")?;
        let mut entry = self.intents.get_mut(payment_intent_id).ok_or_else(|| {
            GatewayError::Permanent {
                message: format!("no such payment intent {}", payment_intent_id),
            }
        })?;
        entry.status = "canceled".to_string();
        Ok(entry.clone())
    }

    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount_cents: i64,
        _reverse_transfer: bool,
    ) -> Result<GatewayRefund, GatewayError> {
        self.check_injected_failure("create_refund")?;
        if !self.intents.contains_key(payment_intent_id) {
            return Err(GatewayError::Permanent {
                message: format!("no such payment intent {}", payment_intent_id),
            });
        }
        let id = self.next_id("re");
        let refund = GatewayRefund {
            id: id.clone(),
            amount_cents,
            status: "succeeded".to_string(),
        };
        self.refunds.insert(id, refund.clone());
        Ok(refund)
    }

    async fn create_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<GatewayTransfer, GatewayError> {
        self.check_injected_failure("create_transfer")?;
        let id = self.next_id("tr");
        let transfer = GatewayTransfer {
            id: id.clone(),
            amount_cents: request.amount_cents,
            currency: request.currency,
        };
        self.transfers.insert(id, transfer.clone());
        Ok(transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charge(amount_cents: i64) -> ChargeRequest {
        ChargeRequest {
            amount_cents,
            currency: "usd".to_string(),
            description: "test charge".to_string(),
            application_fee_cents: None,
            destination_account: None,
            metadata: Vec::new(),
        }
    }

    #[tokio::test]
    async fn intents_get_unique_ids_and_are_queryable() {
        let gateway = MockGateway::new();
        let first = gateway.create_payment_intent(charge(1500)).await.unwrap();
        let second = gateway.create_payment_intent(charge(2500)).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(gateway.intent(&first.id).unwrap().amount_cents, 1500);
    }

    #[tokio::test]
    async fn cancelled_intents_flip_status() {
        let gateway = MockGateway::new();
        let intent = gateway.create_payment_intent(charge(1500)).await.unwrap();
        let cancelled = gateway.cancel_payment_intent(&intent.id).await.unwrap();
        assert_eq!(cancelled.status, "canceled");
        assert_eq!(gateway.intent(&intent.id).unwrap().status, "canceled");
    }

    #[tokio::test]
    async fn refund_of_unknown_intent_is_rejected() {
        let gateway = MockGateway::new();
        let err = gateway
            .create_refund("pi_missing", 100, true)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Permanent { .. }));
    }

    #[tokio::test]
    async fn injected_transient_failures_drain() {
        let gateway = MockGateway::new();
        gateway.inject_retryable_failures(2);
        for _ in 0..2 {
            let err = gateway.create_payment_intent(charge(100)).await.unwrap_err();
            assert!(matches!(err, GatewayError::Retryable { .. }));
        }
        assert!(gateway.create_payment_intent(charge(100)).await.is_ok());
    }

    #[tokio::test]
    async fn reject_all_switch() {
        let gateway = MockGateway::new();
        gateway.reject_everything(true);
        let err = gateway.create_payment_intent(charge(100)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Permanent { .. }));
        gateway.reject_everything(false);
        assert!(gateway.create_payment_intent(charge(100)).await.is_ok());
    }
}
