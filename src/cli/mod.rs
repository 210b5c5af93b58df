//! CLI module for studiopay
//!
//! This module provides command-line interface functionality including:
//! - Argument parsing with clap
//! - Configuration merging (CLI args + config files)
//! - Command execution and validation
//! - Command handlers for serve and migrate operations

pub mod config_merger;
pub mod executor;
pub mod handlers;
pub mod parser;
pub mod validation;

// Re-export public types for convenience
pub use config_merger::ConfigurationMerger;
pub use executor::execute_command;
pub use parser::{Cli, Commands, Environment, LogLevel};

use crate::config::settings::Settings;
use crate::error::AppResult;
use crate::logger::init_logger;

/// Load and merge configuration from CLI arguments
///
/// This function handles the complete configuration loading process:
/// 1. Apply the `--env` override so the loader picks the right file layer
/// 2. Load base configuration from files
/// 3. Merge CLI argument overrides
/// 4. Validate the final configuration
///
/// # Errors
/// Returns error if configuration loading, merging, or validation fails
pub fn load_and_merge_config(cli: &Cli) -> AppResult<Settings> {
    if let Some(ref env) = cli.env {
        let env: crate::config::Environment = env.clone().into();
        // The loader and the startup banner both read STUDIOPAY_APP_ENV, so
        // the override has to land in the process environment.
        unsafe {
            std::env::set_var(crate::config::Environment::ENV_VAR, env.as_str());
        }
    }

    let merger = ConfigurationMerger::from_config_path(cli.config.as_ref())?;
    let settings = merger.merge_cli_args(cli)?;
    Ok(settings)
}

/// Initialize logger from settings
///
/// # Errors
/// Returns error if the logger configuration is invalid or the global
/// subscriber fails to install
pub fn init_logger_from_settings(settings: &Settings) -> AppResult<()> {
    let logger_config = settings.logger.clone().into_logger_config()?;
    init_logger(logger_config)?;
    Ok(())
}
