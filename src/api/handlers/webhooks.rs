//! Payment gateway webhook handler.
//!
//! Deliveries are verified against the signature header before the body
//! is parsed. Every verified delivery is answered 200, including
//! replays, unhandled event types and reconciliation conflicts; only a
//! storage failure surfaces so the provider redelivers.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde_json::Value as JsonValue;

use crate::api::doc::WEBHOOK_TAG;
use crate::api::dto::{ErrorResponse, WebhookAck};
use crate::error::AppError;
use crate::gateway::GatewayEvent;
use crate::gateway::signature::SIGNATURE_HEADER;
use crate::state::AppState;

/// Creates webhook routes.
///
/// Routes:
/// - POST /gateway - Signed settlement events from the payment provider
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/gateway", post(receive_gateway_event))
}

/// POST /api/webhooks/gateway - Receive a signed settlement event
///
/// The raw body is required for digest verification, so the payload is
/// taken as bytes and parsed only after the signature checks out.
#[utoipa::path(
    post,
    path = "/webhooks/gateway",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Delivery acknowledged", body = WebhookAck),
        (status = 400, description = "Bad signature or malformed payload", body = ErrorResponse),
        (status = 500, description = "Persistence failed; provider should redeliver", body = ErrorResponse)
    ),
    tag = WEBHOOK_TAG
)]
pub async fn receive_gateway_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest {
            message: format!("missing {} header", SIGNATURE_HEADER),
        })?;
    state.signature.verify(header, &body)?;

    let payload: JsonValue =
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest {
            message: format!("malformed webhook payload: {}", e),
        })?;
    let event: GatewayEvent =
        serde_json::from_value(payload.clone()).map_err(|e| AppError::BadRequest {
            message: format!("unrecognized webhook event shape: {}", e),
        })?;

    let disposition = state.services.settlement.process_event(event, payload).await?;
    Ok(Json(WebhookAck::from(disposition)))
}
