//! StudioPay Library
//!
//! Core library modules for the StudioPay settlement engine.

use shadow_rs::shadow;
shadow!(build);

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod logger;
pub mod models;
pub mod schema;
pub mod server;
pub mod services;
pub mod state;
pub mod stores;

pub use state::AppState;

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}
