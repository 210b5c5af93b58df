//! Server module for managing HTTP server lifecycle
//!
//! This module handles server initialization, startup, and graceful shutdown.

use crate::api::routes::create_router;
use crate::config::{Environment, StoreBackend, settings::Settings};
use crate::db::run_pending_migrations;
use crate::jobs;
use crate::state::AppState;
use tokio::net::TcpListener;
use tokio::signal;

/// HTTP server manager
pub struct Server {
    settings: Settings,
}

impl Server {
    /// Create a new server with the given settings
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Start the server and run until shutdown signal
    ///
    /// This method:
    /// 1. Logs startup information
    /// 2. Runs pending migrations when configured to
    /// 3. Builds application state (stores, gateway, services)
    /// 4. Starts the background job scheduler when enabled
    /// 5. Binds to the configured address and serves until shutdown
    ///
    /// # Errors
    /// - Database pool or migration errors
    /// - Address binding errors
    /// - Server runtime errors
    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!(
            app_name = %self.settings.application.name,
            app_version = %self.settings.application.version,
            environment = %Environment::from_env().as_str(),
            "Application starting"
        );

        tracing::info!(
            host = %self.settings.server.host,
            port = %self.settings.server.port,
            request_timeout = %self.settings.server.request_timeout,
            keep_alive_timeout = %self.settings.server.keep_alive_timeout,
            "Server configuration loaded"
        );

        tracing::info!(
            store_backend = ?self.settings.store.backend,
            gateway_backend = ?self.settings.gateway.backend,
            currency = %self.settings.gateway.currency,
            commission_default_bps = %self.settings.commission.default_rate_bps,
            "Engine configuration loaded"
        );

        if self.settings.store.backend == StoreBackend::Postgres {
            tracing::info!(
                max_connections = %self.settings.database.max_connections,
                min_connections = %self.settings.database.min_connections,
                connection_timeout = %self.settings.database.connection_timeout,
                "Database configuration loaded"
            );

            if self.settings.database.auto_migrate {
                let applied = run_pending_migrations(&self.settings.database.url).await?;
                if applied.is_empty() {
                    tracing::info!("Database schema is up to date");
                } else {
                    tracing::info!(count = applied.len(), "Applied pending migrations");
                }
            }
        }

        let settings = self.settings.clone();
        let state = AppState::build(settings).await?;
        tracing::info!("Application state created");

        // The scheduler handle must stay alive for the jobs to fire.
        let _scheduler = if self.settings.jobs.enabled {
            Some(
                jobs::start(
                    &self.settings.jobs,
                    &state.services,
                    &state.stores,
                    state.gateway.clone(),
                    self.settings.gateway.retry.retry_policy(),
                )
                .await?,
            )
        } else {
            tracing::info!("Background jobs are disabled");
            None
        };

        let router = create_router(state);
        tracing::info!("Router configured");

        let address = self.settings.server.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!(error = %e, address = %address, "Failed to bind to address");
            anyhow::anyhow!("Failed to bind to {}: {}", address, e)
        })?;

        tracing::info!(address = %address, "Server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
///
/// This function returns when either signal is received, allowing
/// the server to perform graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
