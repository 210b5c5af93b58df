//! Booking-related DTOs for API requests and responses.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::api::dto::format_timestamp;
use crate::models::{Booking, BookingStatus, PaymentMethod};
use crate::services::{BookingConfirmation, CancellationOutcome};

/// Request body for creating a booking.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateBookingRequest {
    /// The member placing the booking
    pub user_id: Uuid,

    /// The class session to book
    pub class_id: Uuid,

    /// Seats to reserve; every seat is priced and reserved together
    #[validate(range(min = 1, max = 20, message = "Attendee count must be between 1 and 20"))]
    #[schema(minimum = 1, maximum = 20, example = 1)]
    pub attendee_count: i32,

    /// How the booking is paid
    pub payment_method: PaymentMethod,
}

/// Request body for cancelling a booking.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct CancelBookingRequest {
    /// Optional free-text reason recorded with the cancellation
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    #[schema(max_length = 500)]
    pub reason: Option<String>,
}

/// Query parameters for listing a member's bookings.
#[derive(Debug, Deserialize, IntoParams, Validate)]
pub struct BookingListQuery {
    /// The member whose bookings to list
    pub user_id: Uuid,

    /// Page number (1-based)
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "Page must be at least 1"))]
    #[param(minimum = 1, example = 1)]
    pub page: i64,

    /// Number of items per page (max 100)
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100, message = "Page size must be between 1 and 100"))]
    #[param(minimum = 1, maximum = 100, example = 20)]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl BookingListQuery {
    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

/// Full booking detail.
#[derive(Debug, Serialize, ToSchema)]
pub struct BookingResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub class_id: Uuid,
    pub attendee_count: i32,
    pub status: BookingStatus,
    pub payment_method: PaymentMethod,
    /// Gross price in minor currency units; zero for credits bookings
    pub amount_cents: i64,
    /// Platform share of the gross
    pub commission_cents: i64,
    /// Instructor share of the gross
    pub payout_cents: i64,
    /// Credits debited; zero for card and wallet bookings
    pub credits_used: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_payment_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            user_id: booking.user_id,
            class_id: booking.class_id,
            attendee_count: booking.attendee_count,
            status: booking.status,
            payment_method: booking.payment_method,
            amount_cents: booking.amount_cents,
            commission_cents: booking.commission_cents,
            payout_cents: booking.payout_cents,
            credits_used: booking.credits_used,
            gateway_payment_id: booking.gateway_payment_id,
            created_at: format_timestamp(booking.created_at),
            updated_at: format_timestamp(booking.updated_at),
        }
    }
}

/// Response for a newly created booking. Card and wallet bookings carry
/// the client secret the payment page confirms; credits bookings are
/// already confirmed.
#[derive(Debug, Serialize, ToSchema)]
pub struct BookingCreatedResponse {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub booking: BookingResponse,
}

impl From<BookingConfirmation> for BookingCreatedResponse {
    fn from(confirmation: BookingConfirmation) -> Self {
        Self {
            booking_id: confirmation.booking.id,
            status: confirmation.booking.status,
            client_secret: confirmation.client_secret,
            booking: confirmation.booking.into(),
        }
    }
}

/// Response for a cancelled booking with whichever refund leg applied.
#[derive(Debug, Serialize, ToSchema)]
pub struct CancellationResponse {
    pub booking: BookingResponse,
    /// Credits returned to the member's balance
    pub refunded_credits: i64,
    /// Minor currency units refunded through the gateway
    pub refunded_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_refund_id: Option<String>,
}

impl From<CancellationOutcome> for CancellationResponse {
    fn from(outcome: CancellationOutcome) -> Self {
        Self {
            booking: outcome.booking.into(),
            refunded_credits: outcome.refunded_credits,
            refunded_cents: outcome.refunded_cents,
            gateway_refund_id: outcome.gateway_refund_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::Timestamp;

    fn booking() -> Booking {
        Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            class_id: Uuid::new_v4(),
            attendee_count: 2,
            status: BookingStatus::Confirmed,
            payment_method: PaymentMethod::Card,
            amount_cents: 5000,
            commission_cents: 750,
            payout_cents: 4250,
            credits_used: 0,
            gateway_payment_id: Some("pi_123".to_string()),
            created_at: Timestamp::UNIX_EPOCH,
            updated_at: Timestamp::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_create_booking_request_validation() {
        let valid = CreateBookingRequest {
            user_id: Uuid::new_v4(),
            class_id: Uuid::new_v4(),
            attendee_count: 3,
            payment_method: PaymentMethod::Credits,
        };
        assert!(valid.validate().is_ok());

        let zero_attendees = CreateBookingRequest {
            attendee_count: 0,
            ..valid
        };
        assert!(zero_attendees.validate().is_err());
    }

    #[test]
    fn test_booking_response_formats_timestamps() {
        let response = BookingResponse::from(booking());
        assert_eq!(response.created_at, "1970-01-01T00:00:00.000Z");
        assert_eq!(response.payout_cents, 4250);
    }

    #[test]
    fn test_created_response_propagates_client_secret() {
        let confirmation = BookingConfirmation {
            booking: booking(),
            client_secret: Some("pi_123_secret".to_string()),
        };
        let response = BookingCreatedResponse::from(confirmation);
        assert_eq!(response.client_secret.as_deref(), Some("pi_123_secret"));
        assert_eq!(response.booking_id, response.booking.id);
    }

    #[test]
    fn test_booking_list_query_offset() {
        let query = BookingListQuery {
            user_id: Uuid::new_v4(),
            page: 3,
            page_size: 20,
        };
        assert_eq!(query.offset(), 40);
        assert_eq!(query.limit(), 20);
    }
}
