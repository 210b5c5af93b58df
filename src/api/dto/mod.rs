//! Data transfer objects for API requests and responses.

mod booking;
mod credit_pack;
mod credits;
mod error;
mod payout;
mod webhook;

pub use booking::{
    BookingCreatedResponse, BookingListQuery, BookingResponse, CancelBookingRequest,
    CancellationResponse, CreateBookingRequest,
};
pub use credit_pack::{
    CreditPackResponse, PurchaseCheckoutResponse, PurchasePackRequest, PurchaseResponse,
};
pub use credits::{AuditResponse, BalanceResponse, TransactionQuery, TransactionResponse, UserQuery};
pub use error::ErrorResponse;
pub use payout::{PayoutQuery, PayoutResponse};
pub use webhook::WebhookAck;

use jiff::Timestamp;

/// Timestamps cross the API as UTC strings with millisecond precision,
/// e.g. `2025-01-15T09:30:00.000Z`.
pub(crate) fn format_timestamp(timestamp: Timestamp) -> String {
    timestamp.strftime("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp_millisecond_precision() {
        let ts: Timestamp = "2025-01-15T09:30:00.123456Z".parse().unwrap();
        assert_eq!(format_timestamp(ts), "2025-01-15T09:30:00.123Z");
    }
}
