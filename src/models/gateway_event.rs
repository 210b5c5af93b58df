//! Durable log of gateway webhook deliveries.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// One webhook delivery, keyed by the provider's event id.
///
/// The unique `provider_event_id` is the first idempotency layer: replays of
/// an already-recorded event short-circuit before any settlement runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEventRecord {
    pub id: Uuid,
    pub provider_event_id: String,
    pub event_type: String,
    pub gateway_payment_id: Option<String>,
    pub payload: JsonValue,
    pub processed: bool,
    pub error: Option<String>,
    pub received_at: Timestamp,
    pub processed_at: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct NewGatewayEventRecord {
    pub provider_event_id: String,
    pub event_type: String,
    pub gateway_payment_id: Option<String>,
    pub payload: JsonValue,
}
