//! Payment records mirroring gateway charge state.

use diesel::deserialize::{self, FromSql};
use diesel::pg::Pg;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

/// Gateway charge lifecycle. Stored as lowercase text.
///
/// Transitions are monotonic: once a record reaches `Succeeded`, `Failed` or
/// `Refunded`, replayed events must not move it backwards. The only step out
/// of a settled state is `Succeeded` to `Refunded`.
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
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// The charge has reached an outcome; success and failure events for it
    /// are replays.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Succeeded | PaymentStatus::Failed | PaymentStatus::Refunded
        )
    }

    /// Whether moving to `next` respects the monotonic machine.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        match (self, next) {
            (PaymentStatus::Pending, PaymentStatus::Processing)
            | (PaymentStatus::Pending, PaymentStatus::Succeeded)
            | (PaymentStatus::Pending, PaymentStatus::Failed)
            | (PaymentStatus::Processing, PaymentStatus::Succeeded)
            | (PaymentStatus::Processing, PaymentStatus::Failed)
            | (PaymentStatus::Succeeded, PaymentStatus::Refunded) => true,
            _ => false,
        }
    }
}

impl diesel::query_builder::QueryId for PaymentStatus {
    type QueryId = PaymentStatus;
    const HAS_STATIC_QUERY_ID: bool = false;
}

impl ToSql<Text, Pg> for PaymentStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<Text, Pg> for PaymentStatus {
    fn from_sql(
        bytes: <Pg as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        match s.as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(format!("Unrecognized payment status: {}", s).into()),
        }
    }
}

/// Local mirror of one gateway charge or refund.
///
/// `amount_cents` is signed: charges are positive, refund rows negative.
/// A refund row carries the gateway refund id in `gateway_payment_id` and
/// points at the same booking as the charge it reverses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub gateway_payment_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub gateway_payment_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_states_reject_regression() {
        assert!(!PaymentStatus::Succeeded.can_transition_to(PaymentStatus::Processing));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Succeeded));
        assert!(!PaymentStatus::Refunded.can_transition_to(PaymentStatus::Succeeded));
    }

    #[test]
    fn refund_only_follows_success() {
        assert!(PaymentStatus::Succeeded.can_transition_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Processing.can_transition_to(PaymentStatus::Refunded));
    }

    #[test]
    fn processing_settles_either_way() {
        assert!(PaymentStatus::Processing.can_transition_to(PaymentStatus::Succeeded));
        assert!(PaymentStatus::Processing.can_transition_to(PaymentStatus::Failed));
    }
}
