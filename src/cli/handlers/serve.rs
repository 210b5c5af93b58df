//! Serve command handler
//!
//! Handles the serve command including dry-run validation and server startup.

use crate::config::StoreBackend;
use crate::config::settings::Settings;
use crate::error::AppResult;
use crate::services::CommissionSchedule;

/// Handler for the serve command
pub struct ServeCommandHandler {
    config: Settings,
}

impl ServeCommandHandler {
    /// Create a new serve command handler
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Execute the serve command with optional dry-run support
    ///
    /// # Arguments
    /// * `dry_run` - If true, validates configuration and exits without starting server
    ///
    /// # Errors
    /// - Configuration validation errors
    pub async fn execute(&self, dry_run: bool) -> AppResult<()> {
        if dry_run {
            self.validate_only()
        } else {
            // The actual server startup happens in main.rs
            Ok(())
        }
    }

    /// Validate configuration without starting the server
    pub fn validate_only(&self) -> AppResult<()> {
        self.config.validate()?;

        // Compiles the commission schedule so out-of-range override rates
        // surface before deployment.
        CommissionSchedule::from_config(&self.config.commission)?;

        println!("✓ Configuration is valid");
        println!("✓ Server would bind to: {}", self.config.server.address());
        match self.config.store.backend {
            StoreBackend::Memory => {
                println!("✓ Store backend: memory (state is lost on shutdown)");
            }
            StoreBackend::Postgres => {
                println!("✓ Store backend: postgres, database URL is configured");
            }
        }
        println!(
            "✓ Payment gateway backend: {:?}, currency: {}",
            self.config.gateway.backend, self.config.gateway.currency
        );
        println!(
            "✓ Commission schedule is valid: default {} bps, {} instructor override(s)",
            self.config.commission.default_rate_bps,
            self.config.commission.overrides.len()
        );
        println!("✓ Logger configuration is valid");

        println!("Dry run completed successfully - configuration is ready for deployment");
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &Settings {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serve_handler_new() {
        let config = Settings::default();
        let handler = ServeCommandHandler::new(config.clone());
        assert_eq!(handler.config(), &config);
    }

    #[tokio::test]
    async fn test_serve_handler_dry_run() {
        let handler = ServeCommandHandler::new(Settings::default());

        let result = handler.execute(true).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_serve_handler_dry_run_invalid_config() {
        let mut config = Settings::default();
        config.server.port = 0;
        let handler = ServeCommandHandler::new(config);

        let result = handler.execute(true).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_serve_handler_dry_run_rejects_bad_commission() {
        let mut config = Settings::default();
        config.commission.default_rate_bps = 20_000;
        let handler = ServeCommandHandler::new(config);

        let result = handler.execute(true).await;
        assert!(result.is_err());
    }
}
