//! HTTP API layer.
//!
//! Contains route definitions, request handlers, DTOs and middleware for
//! the booking, credits, payout, webhook and health endpoints.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod routes;

mod doc;
