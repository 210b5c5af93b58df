//! Error handler for converting AppError to HTTP responses.
//!
//! Implements IntoResponse for AppError with the status mapping the
//! whole API shares. Internal failure details (anyhow sources, gateway
//! payloads) never reach the response body; they are logged server-side
//! where the error originated.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::api::dto::ErrorResponse;
use crate::error::AppError;

impl IntoResponse for AppError {
    /// Converts an AppError into an HTTP response.
    ///
    /// # Status Code Mapping
    /// - NotFound → 404
    /// - Duplicate, ClassFull, ReconciliationConflict → 409
    /// - Validation, BadRequest → 400
    /// - UnprocessableContent → 422
    /// - InsufficientCredits → 402
    /// - GatewayPermanent, PaymentFailed → 502
    /// - GatewayRetryable, ConnectionPool → 503
    /// - CompensationFailure, Database, Configuration, Internal → 500
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::NotFound {
                entity,
                field,
                value,
            } => (
                StatusCode::NOT_FOUND,
                ErrorResponse::not_found_error(entity, field, value),
            ),
            AppError::Duplicate {
                entity,
                field,
                value,
            } => (
                StatusCode::CONFLICT,
                ErrorResponse::duplicate_error(entity, field, value),
            ),
            AppError::Validation { field, reason } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::validation_error(field, reason),
            ),
            AppError::BadRequest { message } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("BAD_REQUEST", message),
            ),
            AppError::UnprocessableContent { message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new("UNPROCESSABLE_CONTENT", message),
            ),
            AppError::InsufficientCredits {
                required,
                available,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                ErrorResponse::new(
                    "INSUFFICIENT_CREDITS",
                    &format!(
                        "Insufficient credits: required {}, available {}",
                        required, available
                    ),
                )
                .with_details(json!({
                    "required": required,
                    "available": available
                })),
            ),
            AppError::ClassFull { class_id } => (
                StatusCode::CONFLICT,
                ErrorResponse::new(
                    "CLASS_FULL",
                    "The class has no remaining seats for the requested attendee count",
                )
                .with_details(json!({
                    "class_id": class_id
                })),
            ),
            AppError::GatewayRetryable { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new(
                    "GATEWAY_UNAVAILABLE",
                    "The payment gateway is temporarily unavailable",
                ),
            ),
            AppError::GatewayPermanent { message } => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new("PAYMENT_REJECTED", message),
            ),
            AppError::PaymentFailed { message } => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new("PAYMENT_FAILED", message),
            ),
            AppError::ReconciliationConflict { message } => (
                StatusCode::CONFLICT,
                ErrorResponse::new("RECONCILIATION_CONFLICT", message),
            ),
            AppError::CompensationFailure { context, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(
                    "COMPENSATION_FAILURE",
                    "A payment step could not be rolled back; the booking needs manual review",
                )
                .with_details(json!({
                    "context": context
                })),
            ),
            AppError::Database { operation, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(
                    "DATABASE_ERROR",
                    &format!("Database operation failed: {}", operation),
                )
                .with_details(json!({
                    "operation": operation
                })),
            ),
            AppError::Configuration { key, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(
                    "CONFIGURATION_ERROR",
                    &format!("Configuration error: {}", key),
                )
                .with_details(json!({
                    "key": key
                })),
            ),
            AppError::ConnectionPool { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("SERVICE_UNAVAILABLE", "Database connection unavailable"),
            ),
            AppError::Internal { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("INTERNAL_ERROR", "An internal error occurred"),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Maps an AppError variant to its corresponding HTTP status code.
pub fn error_to_status_code(error: &AppError) -> StatusCode {
    match error {
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Duplicate { .. } => StatusCode::CONFLICT,
        AppError::Validation { .. } => StatusCode::BAD_REQUEST,
        AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        AppError::UnprocessableContent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
        AppError::ClassFull { .. } => StatusCode::CONFLICT,
        AppError::GatewayRetryable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AppError::GatewayPermanent { .. } => StatusCode::BAD_GATEWAY,
        AppError::PaymentFailed { .. } => StatusCode::BAD_GATEWAY,
        AppError::ReconciliationConflict { .. } => StatusCode::CONFLICT,
        AppError::CompensationFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::ConnectionPool { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
