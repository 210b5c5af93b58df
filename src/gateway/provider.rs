//! Gateway port the settlement engine talks to.

use async_trait::async_trait;

use super::types::{
    ChargeRequest, GatewayError, GatewayRefund, GatewayTransfer, PaymentIntent, TransferRequest,
};

/// External payment provider operations.
///
/// Implementations must be safe to call concurrently. They return
/// `GatewayError` rather than `AppError` so callers can decide whether a
/// retryable failure gets another attempt or surfaces.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider name for logs and the readiness probe.
    fn name(&self) -> &'static str;

    /// Authorizes a charge and returns the intent the client confirms.
    async fn create_payment_intent(
        &self,
        request: ChargeRequest,
    ) -> Result<PaymentIntent, GatewayError>;

    /// Cancels an intent that was never confirmed. Fails permanently once
    /// the intent reached a terminal state at the provider.
    async fn cancel_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, GatewayError>;

    /// Refunds part or all of a settled charge. `reverse_transfer` also
    /// pulls the refunded share back from a destination account when the
    /// charge was split at the gateway.
    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount_cents: i64,
        reverse_transfer: bool,
    ) -> Result<GatewayRefund, GatewayError>;

    /// Moves an instructor's accrued payouts to their account.
    async fn create_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<GatewayTransfer, GatewayError>;
}
