//! Instructor payout batching.
//!
//! Payout rows accrue one per settled booking and stay `pending` until a
//! batch run groups them per instructor, issues one gateway transfer per
//! group and marks the rows `processing`. The transfer's own webhook
//! confirmation flips them to `paid` or `failed`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppResult;
use crate::gateway::{GatewayError, PaymentGateway, RetryPolicy, TransferRequest, with_retries};
use crate::models::InstructorPayout;
use crate::stores::Stores;

/// Counters from one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PayoutBatchSummary {
    /// Gateway transfers issued.
    pub batches: usize,
    /// Payout rows moved to `processing`.
    pub payouts: usize,
    pub transferred_cents: i64,
}

#[derive(Clone)]
pub struct PayoutService {
    stores: Stores,
    gateway: Arc<dyn PaymentGateway>,
    retry: RetryPolicy,
    /// Serializes batch runs; rows are claimed only after the transfer
    /// succeeds, so two concurrent runs could transfer the same group twice.
    batch_lock: Arc<Mutex<()>>,
}

impl PayoutService {
    pub fn new(stores: Stores, gateway: Arc<dyn PaymentGateway>, retry: RetryPolicy) -> Self {
        Self {
            stores,
            gateway,
            retry,
            batch_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn list_for_instructor(
        &self,
        instructor_id: Uuid,
    ) -> AppResult<Vec<InstructorPayout>> {
        self.stores.settlement.list_payouts(instructor_id).await
    }

    /// Transfers everything currently owed, one gateway transfer per
    /// instructor and currency. A failed transfer leaves its group pending
    /// for the next run. When a previous run is still in flight the tick is
    /// skipped.
    pub async fn run_payout_batch(&self) -> AppResult<PayoutBatchSummary> {
        let _running = match self.batch_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("previous payout batch still running, skipping this tick");
                return Ok(PayoutBatchSummary::default());
            }
        };

        let pending = self.stores.settlement.pending_payouts().await?;
        let mut groups: BTreeMap<(Uuid, String), Vec<InstructorPayout>> = BTreeMap::new();
        for payout in pending {
            groups
                .entry((payout.instructor_id, payout.currency.clone()))
                .or_default()
                .push(payout);
        }

        let mut summary = PayoutBatchSummary::default();
        for ((instructor_id, currency), group) in groups {
            let total: i64 = group.iter().map(|p| p.amount_cents).sum();
            if total <= 0 {
                // Fully reversed accruals; nothing to transfer.
                tracing::debug!(%instructor_id, rows = group.len(), "skipping zero-amount payout group");
                continue;
            }

            let request = TransferRequest {
                destination_account: instructor_id.to_string(),
                amount_cents: total,
                currency: currency.clone(),
                description: format!("payout for {} settled bookings", group.len()),
            };
            let transfer = match with_retries(&self.retry, "create_transfer", || {
                self.gateway.create_transfer(request.clone())
            })
            .await
            {
                Ok(transfer) => transfer,
                Err(error @ GatewayError::Retryable { .. }) => {
                    tracing::warn!(
                        %instructor_id,
                        %error,
                        "transfer attempt budget spent, payouts stay pending"
                    );
                    continue;
                }
                Err(error) => {
                    tracing::error!(
                        %instructor_id,
                        %error,
                        "transfer rejected, payouts stay pending"
                    );
                    continue;
                }
            };

            let ids: Vec<Uuid> = group.iter().map(|p| p.id).collect();
            let moved = self
                .stores
                .settlement
                .mark_payouts_processing(&ids, &transfer.id)
                .await?;
            if moved != ids.len() {
                tracing::warn!(
                    %instructor_id,
                    transfer_id = %transfer.id,
                    expected = ids.len(),
                    moved,
                    "some payouts left the batch while the transfer was created"
                );
            }
            tracing::info!(
                %instructor_id,
                transfer_id = %transfer.id,
                payouts = moved,
                amount_cents = total,
                "payout batch transferred"
            );
            summary.batches += 1;
            summary.payouts += moved;
            summary.transferred_cents += total;
        }
        Ok(summary)
    }
}
