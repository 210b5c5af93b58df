//! Recurring background work: payout batches and reservation expiry.

pub mod scheduler;
pub mod tasks;

pub use scheduler::JobScheduler;
pub use tasks::{PayoutBatchTask, ReservationSweepTask, ScheduledTask};

use std::sync::Arc;

use crate::config::settings::JobsConfig;
use crate::error::AppResult;
use crate::gateway::{PaymentGateway, RetryPolicy};
use crate::services::Services;
use crate::stores::Stores;

/// Builds the scheduler, registers the recurring jobs and starts it.
pub async fn start(
    config: &JobsConfig,
    services: &Services,
    stores: &Stores,
    gateway: Arc<dyn PaymentGateway>,
    retry: RetryPolicy,
) -> AppResult<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    scheduler
        .register(
            &config.payout_schedule,
            Arc::new(PayoutBatchTask::new(services.payouts.clone())),
        )
        .await?;
    scheduler
        .register(
            &config.sweep_schedule,
            Arc::new(ReservationSweepTask::new(
                stores.clone(),
                gateway,
                retry,
                config.reservation_ttl_minutes,
            )),
        )
        .await?;
    scheduler.start().await?;
    tracing::info!(
        payout_schedule = %config.payout_schedule,
        sweep_schedule = %config.sweep_schedule,
        reservation_ttl_minutes = config.reservation_ttl_minutes,
        "job scheduler started"
    );
    Ok(scheduler)
}
