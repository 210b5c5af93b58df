//! Gateway-facing request and response types.

use serde::Deserialize;
use thiserror::Error;

use crate::error::AppError;

/// Failure taxonomy for gateway calls.
///
/// `Retryable` covers outages the next attempt may not hit (network errors,
/// 5xx, rate limits). `Permanent` is the gateway refusing the request
/// itself; retrying the same request cannot succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("retryable gateway failure: {message}")]
    Retryable { message: String },

    #[error("gateway rejected the request: {message}")]
    Permanent { message: String },
}

impl GatewayError {
    /// Error to surface once the retry budget is spent.
    pub fn into_exhausted(self) -> AppError {
        match self {
            GatewayError::Retryable { message } => AppError::PaymentFailed { message },
            GatewayError::Permanent { message } => AppError::GatewayPermanent { message },
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Retryable { message } => AppError::GatewayRetryable { message },
            GatewayError::Permanent { message } => AppError::GatewayPermanent { message },
        }
    }
}

/// Charge authorization request.
///
/// `destination_account` and `application_fee_cents` carry the commission
/// split to gateways that settle the instructor's share directly.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub application_fee_cents: Option<i64>,
    pub destination_account: Option<String>,
    pub metadata: Vec<(String, String)>,
}

/// A created payment intent. The client secret goes back to the caller so
/// their payment page can confirm the charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRefund {
    pub id: String,
    pub amount_cents: i64,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub destination_account: String,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayTransfer {
    pub id: String,
    pub amount_cents: i64,
    pub currency: String,
}

/// Webhook event envelope as the provider delivers it.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: GatewayEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEventData {
    pub object: GatewayObject,
}

/// The object inside an event. Fields are optional because different event
/// types carry different shapes; the reconciler picks what it needs.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayObject {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub failure_message: Option<String>,
    #[serde(default)]
    pub refunds: Option<RefundList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundList {
    pub data: Vec<RefundObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundObject {
    pub id: String,
    pub amount: i64,
}
