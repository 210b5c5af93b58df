//! Application state for Axum handlers.
//!
//! Everything handlers touch (stores, gateway, services, the webhook
//! signature verifier) is injected through this struct; there are no
//! process-wide singletons. Cloning is cheap since stores, the gateway
//! and settings sit behind `Arc`.

use std::sync::Arc;

use crate::config::{GatewayBackend, Settings, StoreBackend};
use crate::db::establish_async_connection_pool;
use crate::error::AppResult;
use crate::gateway::signature::SignatureVerifier;
use crate::gateway::{HttpGateway, MockGateway, PaymentGateway};
use crate::services::{CommissionSchedule, Services};
use crate::stores::Stores;

/// Application state containing all shared services and resources.
#[derive(Clone)]
pub struct AppState {
    /// Loaded and validated configuration
    pub settings: Arc<Settings>,
    /// Storage ports, shared with the background jobs
    pub stores: Stores,
    /// Payment gateway port, shared with the background jobs
    pub gateway: Arc<dyn PaymentGateway>,
    /// All business logic services
    pub services: Services,
    /// Webhook signature verifier for the gateway endpoint
    pub signature: SignatureVerifier,
}

impl AppState {
    /// Builds the state from validated settings: selects the storage
    /// backend, the gateway backend and wires the services.
    ///
    /// # Errors
    /// - `AppError::ConnectionPool` when the Postgres pool cannot be built
    /// - `AppError::Validation` when the commission schedule is malformed
    pub async fn build(settings: Settings) -> AppResult<Self> {
        let stores = match settings.store.backend {
            StoreBackend::Memory => Stores::memory(),
            StoreBackend::Postgres => {
                let pool = establish_async_connection_pool(&settings.database).await?;
                Stores::postgres(pool)
            }
        };

        let gateway: Arc<dyn PaymentGateway> = match settings.gateway.backend {
            GatewayBackend::Mock => Arc::new(MockGateway::new()),
            GatewayBackend::Http => Arc::new(HttpGateway::new(
                settings.gateway.base_url.clone(),
                settings.gateway.secret_key.clone(),
            )),
        };

        Self::assemble(settings, stores, gateway)
    }

    /// Wires the services over explicit stores and gateway. Tests use
    /// this to drop in the in-memory backend and the mock gateway.
    pub fn assemble(
        settings: Settings,
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
    ) -> AppResult<Self> {
        let schedule = CommissionSchedule::from_config(&settings.commission)?;
        let services = Services::new(
            stores.clone(),
            gateway.clone(),
            schedule,
            settings.gateway.retry.retry_policy(),
            settings.gateway.currency.clone(),
        );
        let signature = SignatureVerifier::new(
            settings.gateway.webhook_secret.clone(),
            settings.gateway.signature_tolerance_secs,
        );
        Ok(Self {
            settings: Arc::new(settings),
            stores,
            gateway,
            services,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_defaults_to_memory_and_mock() {
        let state = AppState::build(Settings::default()).await.unwrap();
        assert_eq!(state.settings.store.backend, StoreBackend::Memory);

        // The memory backend answers the readiness ping without any
        // external dependency.
        state.stores.settlement.ping().await.unwrap();
    }
}
