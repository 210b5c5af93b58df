//! Router configuration for the API.
//!
//! This module provides centralized route registration and middleware
//! configuration for the application.

use axum::{Router, middleware};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::doc::ApiDoc;
use crate::api::handlers;
use crate::api::middleware::{logging_middleware, request_id_middleware};
use crate::state::AppState;

/// Creates the main application router with all routes and middleware.
///
/// # Middleware Order
/// Middleware is applied in reverse order of declaration (last added runs
/// first): request ID assignment, then logging, then CORS and response
/// compression around the outside.
///
/// # Routes
/// - `/api/bookings` - Booking creation, lookup and cancellation
/// - `/api/credit-packs` - Pack catalog and purchases
/// - `/api/credits` - Balance, ledger history and audit
/// - `/api/payouts` - Instructor payout listing
/// - `/api/webhooks` - Signed gateway events
/// - `/api/health` - Health probes
/// - `/docs` - Swagger UI over the generated OpenAPI document
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/bookings", handlers::bookings::booking_routes())
        .nest("/credit-packs", handlers::credit_packs::credit_pack_routes())
        .nest("/credits", handlers::credits::credit_routes())
        .nest("/payouts", handlers::payouts::payout_routes())
        .nest("/webhooks", handlers::webhooks::webhook_routes())
        .merge(handlers::health::health_routes());

    Router::new()
        .nest("/api", api_routes)
        .merge(SwaggerUi::new("/docs").url("/docs/openapi.json", ApiDoc::openapi()))
        // Middleware is applied in reverse order - last added runs first
        // So logging runs after request_id has set the ID
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .with_state(state)
}
