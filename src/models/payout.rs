//! Instructor payout accruals.

use diesel::deserialize::{self, FromSql};
use diesel::pg::Pg;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

/// Payout lifecycle. Stored as lowercase text.
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
pub enum PayoutStatus {
    /// Accrued at settlement, waiting for the next transfer batch.
    Pending,
    /// Included in a gateway transfer that has not confirmed yet.
    Processing,
    Paid,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Paid => "paid",
            PayoutStatus::Failed => "failed",
        }
    }
}

impl diesel::query_builder::QueryId for PayoutStatus {
    type QueryId = PayoutStatus;
    const HAS_STATIC_QUERY_ID: bool = false;
}

impl ToSql<Text, Pg> for PayoutStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<Text, Pg> for PayoutStatus {
    fn from_sql(
        bytes: <Pg as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        match s.as_str() {
            "pending" => Ok(PayoutStatus::Pending),
            "processing" => Ok(PayoutStatus::Processing),
            "paid" => Ok(PayoutStatus::Paid),
            "failed" => Ok(PayoutStatus::Failed),
            _ => Err(format!("Unrecognized payout status: {}", s).into()),
        }
    }
}

/// One instructor's share of one settled booking.
///
/// Rows accrue per booking so the amount owed stays derivable from the
/// bookings table; the transfer batch groups them per instructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorPayout {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PayoutStatus,
    pub gateway_transfer_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct NewInstructorPayout {
    pub instructor_id: Uuid,
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
}
