//! Wrapper around tokio-cron-scheduler for the recurring jobs.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler as TokioCronScheduler};

use crate::error::{AppError, AppResult};
use crate::jobs::tasks::ScheduledTask;

/// Owns the cron runtime; tasks are registered before `start`.
pub struct JobScheduler {
    scheduler: Arc<Mutex<TokioCronScheduler>>,
}

impl JobScheduler {
    pub async fn new() -> AppResult<Self> {
        let scheduler = TokioCronScheduler::new()
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })?;
        Ok(Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
        })
    }

    /// Registers `task` on a cron schedule. A failing run is logged and the
    /// next tick fires regardless.
    pub async fn register(&self, schedule: &str, task: Arc<dyn ScheduledTask>) -> AppResult<()> {
        let cron_job = Job::new_async(schedule, move |_uuid, _lock| {
            let task = Arc::clone(&task);
            Box::pin(async move {
                tracing::debug!(job = task.name(), "scheduled job starting");
                if let Err(error) = task.run().await {
                    tracing::error!(job = task.name(), %error, "scheduled job failed");
                }
            })
        })
        .map_err(|e| AppError::BadRequest {
            message: format!("Invalid cron expression: {}", e),
        })?;

        self.scheduler
            .lock()
            .await
            .add(cron_job)
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })?;

        Ok(())
    }

    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .lock()
            .await
            .start()
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })?;
        Ok(())
    }

    /// Stop the scheduler gracefully.
    pub async fn stop(&self) -> AppResult<()> {
        self.scheduler
            .lock()
            .await
            .shutdown()
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })?;
        Ok(())
    }
}
