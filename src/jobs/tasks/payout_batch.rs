//! Scheduled instructor payout batch.

use async_trait::async_trait;

use crate::error::AppResult;
use crate::jobs::tasks::ScheduledTask;
use crate::services::PayoutService;

/// Transfers all pending instructor payouts on each tick.
pub struct PayoutBatchTask {
    payouts: PayoutService,
}

impl PayoutBatchTask {
    pub fn new(payouts: PayoutService) -> Self {
        Self { payouts }
    }
}

#[async_trait]
impl ScheduledTask for PayoutBatchTask {
    fn name(&self) -> &'static str {
        "payout_batch"
    }

    async fn run(&self) -> AppResult<()> {
        let summary = self.payouts.run_payout_batch().await?;
        if summary.batches > 0 {
            tracing::info!(
                batches = summary.batches,
                payouts = summary.payouts,
                transferred_cents = summary.transferred_cents,
                "payout batch complete"
            );
        }
        Ok(())
    }
}
