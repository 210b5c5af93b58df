//! Service layer for business logic operations.
//!
//! Services coordinate between the stores, the payment gateway and the
//! handlers; all multi-store flows (booking sagas, webhook settlement,
//! payout batches) live here.

mod booking_service;
pub mod commission;
mod credit_service;
mod payout_service;
mod settlement_service;

pub use booking_service::{BookingConfirmation, BookingService, CancellationOutcome};
pub use commission::CommissionSchedule;
pub use credit_service::{CreditAudit, CreditService, PurchaseCheckout};
pub use payout_service::{PayoutBatchSummary, PayoutService};
pub use settlement_service::{SettlementService, WebhookDisposition};

use std::sync::Arc;

use crate::gateway::{PaymentGateway, RetryPolicy};
use crate::stores::Stores;

/// Aggregates all services for convenient access.
///
/// This struct is designed to be used as Axum application state.
/// Cloning is cheap since stores and the gateway sit behind `Arc`.
#[derive(Clone)]
pub struct Services {
    pub bookings: BookingService,
    pub credits: CreditService,
    pub settlement: SettlementService,
    pub payouts: PayoutService,
}

impl Services {
    /// Wires every service to the same stores and gateway.
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        schedule: CommissionSchedule,
        retry: RetryPolicy,
        currency: String,
    ) -> Self {
        Self {
            bookings: BookingService::new(
                stores.clone(),
                gateway.clone(),
                schedule,
                retry.clone(),
                currency.clone(),
            ),
            credits: CreditService::new(stores.clone(), gateway.clone(), retry.clone(), currency),
            settlement: SettlementService::new(stores.clone()),
            payouts: PayoutService::new(stores, gateway, retry),
        }
    }
}
