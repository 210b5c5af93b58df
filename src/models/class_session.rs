//! Class session entity: the thing people book seats in.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One scheduled class with bounded capacity.
///
/// `current_participants <= max_participants` is enforced by the store, not
/// by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSession {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub name: String,
    /// Card price per seat in minor units.
    pub price_cents: i64,
    /// Credit price per seat when credit payment is allowed.
    pub credit_cost: i64,
    pub allow_credit_payment: bool,
    pub max_participants: i32,
    pub current_participants: i32,
    pub starts_at: Timestamp,
    /// Full-refund window for cancellations, in hours before start.
    pub cancel_window_hours: i32,
    /// Refund percentage granted at the edge of the window.
    pub refund_percent: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ClassSession {
    pub fn seats_left(&self) -> i32 {
        self.max_participants - self.current_participants
    }
}

/// Fields supplied when scheduling a session.
#[derive(Debug, Clone)]
pub struct NewClassSession {
    pub instructor_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub credit_cost: i64,
    pub allow_credit_payment: bool,
    pub max_participants: i32,
    pub starts_at: Timestamp,
    pub cancel_window_hours: i32,
    pub refund_percent: i32,
}
