//! Error response DTOs.

use serde::Serialize;
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

/// Standard error response format.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable machine-readable error code
    #[schema(example = "CLASS_FULL")]
    pub code: String,
    /// Human-readable description of the failure
    pub message: String,
    /// Optional structured context for the error
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<JsonValue>,
    /// Request ID for log correlation, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// Creates a new error response with code and message.
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
            request_id: None,
        }
    }

    /// Adds structured details to the error response.
    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }

    /// Adds request ID to the error response for correlation.
    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    /// Creates a validation error response for a specific field.
    pub fn validation_error(field: &str, reason: &str) -> Self {
        Self::new(
            "VALIDATION_ERROR",
            &format!("Validation failed for {}: {}", field, reason),
        )
        .with_details(serde_json::json!({ "field": field, "reason": reason }))
    }

    /// Creates a not-found error response for an entity lookup.
    pub fn not_found_error(entity: &str, field: &str, value: &str) -> Self {
        Self::new(
            "NOT_FOUND",
            &format!("{} with {}={} was not found", entity, field, value),
        )
        .with_details(serde_json::json!({ "entity": entity, "field": field, "value": value }))
    }

    /// Creates a duplicate-entry error response.
    pub fn duplicate_error(entity: &str, field: &str, value: &str) -> Self {
        Self::new(
            "DUPLICATE_ENTRY",
            &format!("{}.{} = '{}' already exists", entity, field, value),
        )
        .with_details(serde_json::json!({ "entity": entity, "field": field, "value": value }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_serialization_skips_empty_fields() {
        let response = ErrorResponse::new("BAD_REQUEST", "Invalid input");
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["code"], "BAD_REQUEST");
        assert_eq!(json["message"], "Invalid input");
        assert!(json.get("details").is_none());
        assert!(json.get("request_id").is_none());
    }

    #[test]
    fn test_error_response_with_details_and_request_id() {
        let response = ErrorResponse::validation_error("attendee_count", "must be at least 1")
            .with_request_id("req-123");
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["details"]["field"], "attendee_count");
        assert_eq!(json["request_id"], "req-123");
    }

    #[test]
    fn test_not_found_error_carries_lookup_context() {
        let response = ErrorResponse::not_found_error("booking", "id", "b-1");
        assert_eq!(response.code, "NOT_FOUND");
        assert_eq!(
            response.details.unwrap()["entity"],
            serde_json::json!("booking")
        );
    }
}
