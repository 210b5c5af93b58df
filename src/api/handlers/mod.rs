//! HTTP request handlers for API endpoints.
//!
//! This module contains all request handlers organized by resource type.

pub mod bookings;
pub mod credit_packs;
pub mod credits;
pub mod health;
pub mod payouts;
pub mod webhooks;
