//! Instructor payout DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::api::dto::format_timestamp;
use crate::models::{InstructorPayout, PayoutStatus};

/// Query parameter selecting the instructor whose payouts to list.
#[derive(Debug, Deserialize, IntoParams)]
pub struct PayoutQuery {
    /// The instructor whose payouts to list
    pub instructor_id: Uuid,
}

/// One accrued payout row. Rows accrue per settled booking and are
/// swept into gateway transfers by the payout batch.
#[derive(Debug, Serialize, ToSchema)]
pub struct PayoutResponse {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PayoutStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_transfer_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<InstructorPayout> for PayoutResponse {
    fn from(payout: InstructorPayout) -> Self {
        Self {
            id: payout.id,
            instructor_id: payout.instructor_id,
            booking_id: payout.booking_id,
            amount_cents: payout.amount_cents,
            currency: payout.currency,
            status: payout.status,
            gateway_transfer_id: payout.gateway_transfer_id,
            created_at: format_timestamp(payout.created_at),
            updated_at: format_timestamp(payout.updated_at),
        }
    }
}
