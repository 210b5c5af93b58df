//! Recurring task implementations.

mod payout_batch;
mod reservation_sweep;

pub use payout_batch::PayoutBatchTask;
pub use reservation_sweep::ReservationSweepTask;

use async_trait::async_trait;

use crate::error::AppResult;

/// One recurring unit of work driven by the scheduler.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &'static str;

    async fn run(&self) -> AppResult<()>;
}
