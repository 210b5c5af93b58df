//! Booking entity and its status machine.

use diesel::deserialize::{self, FromSql};
use diesel::pg::Pg;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

/// Booking lifecycle state. Stored as lowercase text.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    utoipa::ToSchema,
    AsExpression,
    FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Seat reserved, payment not settled yet. Card bookings start here.
    Pending,
    /// Payment settled; the seat is kept.
    Confirmed,
    /// Released before the class ran (payment failure, expiry or user cancel).
    Cancelled,
    /// The class ran with this booking confirmed.
    Completed,
    /// Cancelled after settlement with money or credits returned.
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::Refunded => "refunded",
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Completed | BookingStatus::Refunded
        )
    }
}

impl diesel::query_builder::QueryId for BookingStatus {
    type QueryId = BookingStatus;
    const HAS_STATIC_QUERY_ID: bool = false;
}

impl ToSql<Text, Pg> for BookingStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<Text, Pg> for BookingStatus {
    fn from_sql(
        bytes: <Pg as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        match s.as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            "refunded" => Ok(BookingStatus::Refunded),
            _ => Err(format!("Unrecognized booking status: {}", s).into()),
        }
    }
}

/// How the booking was paid. Stored as lowercase text. `Wallet` routes
/// through the card gateway with a different funding source.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    utoipa::ToSchema,
    AsExpression,
    FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Credits,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Credits => "credits",
            PaymentMethod::Wallet => "wallet",
        }
    }

    /// Both card and wallet settle asynchronously through the gateway.
    pub fn uses_gateway(&self) -> bool {
        matches!(self, PaymentMethod::Card | PaymentMethod::Wallet)
    }
}

impl diesel::query_builder::QueryId for PaymentMethod {
    type QueryId = PaymentMethod;
    const HAS_STATIC_QUERY_ID: bool = false;
}

impl ToSql<Text, Pg> for PaymentMethod {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<Text, Pg> for PaymentMethod {
    fn from_sql(
        bytes: <Pg as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        match s.as_str() {
            "card" => Ok(PaymentMethod::Card),
            "credits" => Ok(PaymentMethod::Credits),
            "wallet" => Ok(PaymentMethod::Wallet),
            _ => Err(format!("Unrecognized payment method: {}", s).into()),
        }
    }
}

/// A seat (or several) held by one user in one class session.
///
/// Money fields are integer minor units. `commission_cents + payout_cents ==
/// amount_cents` holds for every settled card booking; credits bookings carry
/// `credits_used` instead and keep the money fields zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub class_id: Uuid,
    pub attendee_count: i32,
    pub status: BookingStatus,
    pub payment_method: PaymentMethod,
    pub amount_cents: i64,
    pub commission_cents: i64,
    pub payout_cents: i64,
    pub credits_used: i64,
    pub gateway_payment_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields the caller supplies when creating a booking. The id comes from
/// the coordinator so the credits spend can reference the booking before
/// its row exists; the store assigns timestamps.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub class_id: Uuid,
    pub attendee_count: i32,
    pub payment_method: PaymentMethod,
    pub amount_cents: i64,
    pub commission_cents: i64,
    pub payout_cents: i64,
    pub credits_used: i64,
    pub gateway_payment_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_final() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::Refunded.is_terminal());
    }

    #[test]
    fn gateway_methods() {
        assert!(PaymentMethod::Card.uses_gateway());
        assert!(PaymentMethod::Wallet.uses_gateway());
        assert!(!PaymentMethod::Credits.uses_gateway());
    }

    #[test]
    fn status_round_trips_through_json() {
        let json = serde_json::to_string(&BookingStatus::Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");
        let back: BookingStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BookingStatus::Confirmed);
    }
}
