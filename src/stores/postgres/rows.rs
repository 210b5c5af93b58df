//! Row structs diesel maps for the PostgreSQL backend.
//!
//! Timestamps cross the boundary as `jiff_diesel` wrappers; everything above
//! this module works with plain `jiff::Timestamp`. The `From` impls here are
//! the only place the two meet.

use diesel::prelude::*;
use jiff_diesel::Timestamp as DbTimestamp;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::{
    Booking, BookingStatus, ClassSession, CreditBalance, CreditPack, CreditPackPurchase,
    CreditTransaction, CreditTransactionKind, GatewayEventRecord, InstructorPayout,
    NewClassSession, NewCreditPackPurchase, NewGatewayEventRecord, NewInstructorPayout,
    PaymentMethod, PaymentRecord, PaymentStatus, PayoutStatus, PurchaseStatus,
};
use crate::schema::{
    bookings, class_sessions, credit_balances, credit_pack_purchases, credit_packs,
    credit_transactions, gateway_events, instructor_payouts, payments,
};

pub(super) fn to_db(ts: jiff::Timestamp) -> DbTimestamp {
    ts.into()
}

fn from_db(ts: DbTimestamp) -> jiff::Timestamp {
    ts.into()
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = credit_balances)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BalanceRow {
    pub user_id: Uuid,
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub last_activity_at: DbTimestamp,
}

impl From<BalanceRow> for CreditBalance {
    fn from(row: BalanceRow) -> Self {
        Self {
            user_id: row.user_id,
            balance: row.balance,
            total_earned: row.total_earned,
            total_spent: row.total_spent,
            last_activity_at: from_db(row.last_activity_at),
        }
    }
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = credit_transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: CreditTransactionKind,
    pub amount: i64,
    pub balance_after: i64,
    pub reference_type: String,
    pub reference_id: String,
    pub description: String,
    pub created_at: DbTimestamp,
}

impl From<TransactionRow> for CreditTransaction {
    fn from(row: TransactionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind,
            amount: row.amount,
            balance_after: row.balance_after,
            reference_type: row.reference_type,
            reference_id: row.reference_id,
            description: row.description,
            created_at: from_db(row.created_at),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = credit_transactions)]
pub struct NewTransactionRow {
    pub user_id: Uuid,
    pub kind: CreditTransactionKind,
    pub amount: i64,
    pub balance_after: i64,
    pub reference_type: String,
    pub reference_id: String,
    pub description: String,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = class_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SessionRow {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub credit_cost: i64,
    pub allow_credit_payment: bool,
    pub max_participants: i32,
    pub current_participants: i32,
    pub starts_at: DbTimestamp,
    pub cancel_window_hours: i32,
    pub refund_percent: i32,
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
}

impl From<SessionRow> for ClassSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            instructor_id: row.instructor_id,
            name: row.name,
            price_cents: row.price_cents,
            credit_cost: row.credit_cost,
            allow_credit_payment: row.allow_credit_payment,
            max_participants: row.max_participants,
            current_participants: row.current_participants,
            starts_at: from_db(row.starts_at),
            cancel_window_hours: row.cancel_window_hours,
            refund_percent: row.refund_percent,
            created_at: from_db(row.created_at),
            updated_at: from_db(row.updated_at),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = class_sessions)]
pub struct NewSessionRow {
    pub instructor_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub credit_cost: i64,
    pub allow_credit_payment: bool,
    pub max_participants: i32,
    pub starts_at: DbTimestamp,
    pub cancel_window_hours: i32,
    pub refund_percent: i32,
}

impl From<NewClassSession> for NewSessionRow {
    fn from(session: NewClassSession) -> Self {
        Self {
            instructor_id: session.instructor_id,
            name: session.name,
            price_cents: session.price_cents,
            credit_cost: session.credit_cost,
            allow_credit_payment: session.allow_credit_payment,
            max_participants: session.max_participants,
            starts_at: to_db(session.starts_at),
            cancel_window_hours: session.cancel_window_hours,
            refund_percent: session.refund_percent,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = bookings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BookingRow {
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
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            class_id: row.class_id,
            attendee_count: row.attendee_count,
            status: row.status,
            payment_method: row.payment_method,
            amount_cents: row.amount_cents,
            commission_cents: row.commission_cents,
            payout_cents: row.payout_cents,
            credits_used: row.credits_used,
            gateway_payment_id: row.gateway_payment_id,
            created_at: from_db(row.created_at),
            updated_at: from_db(row.updated_at),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bookings)]
pub struct NewBookingRow {
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
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentRow {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub gateway_payment_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
}

impl From<PaymentRow> for PaymentRecord {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: row.id,
            booking_id: row.booking_id,
            user_id: row.user_id,
            gateway_payment_id: row.gateway_payment_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: row.status,
            failure_reason: row.failure_reason,
            created_at: from_db(row.created_at),
            updated_at: from_db(row.updated_at),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = payments)]
pub struct NewPaymentRow {
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub gateway_payment_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
}

#[derive(Debug, Queryable, Selectable, Insertable, Clone)]
#[diesel(table_name = credit_packs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PackRow {
    pub id: Uuid,
    pub name: String,
    pub credit_amount: i64,
    pub bonus_credits: i64,
    pub price_cents: i64,
    pub active: bool,
    pub created_at: DbTimestamp,
}

impl From<PackRow> for CreditPack {
    fn from(row: PackRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            credit_amount: row.credit_amount,
            bonus_credits: row.bonus_credits,
            price_cents: row.price_cents,
            active: row.active,
            created_at: from_db(row.created_at),
        }
    }
}

impl From<CreditPack> for PackRow {
    fn from(pack: CreditPack) -> Self {
        Self {
            id: pack.id,
            name: pack.name,
            credit_amount: pack.credit_amount,
            bonus_credits: pack.bonus_credits,
            price_cents: pack.price_cents,
            active: pack.active,
            created_at: to_db(pack.created_at),
        }
    }
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = credit_pack_purchases)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PurchaseRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pack_id: Uuid,
    pub credits: i64,
    pub amount_cents: i64,
    pub status: PurchaseStatus,
    pub gateway_payment_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
}

impl From<PurchaseRow> for CreditPackPurchase {
    fn from(row: PurchaseRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            pack_id: row.pack_id,
            credits: row.credits,
            amount_cents: row.amount_cents,
            status: row.status,
            gateway_payment_id: row.gateway_payment_id,
            failure_reason: row.failure_reason,
            created_at: from_db(row.created_at),
            updated_at: from_db(row.updated_at),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = credit_pack_purchases)]
pub struct NewPurchaseRow {
    pub user_id: Uuid,
    pub pack_id: Uuid,
    pub credits: i64,
    pub amount_cents: i64,
    pub status: PurchaseStatus,
    pub gateway_payment_id: Option<String>,
}

impl From<NewCreditPackPurchase> for NewPurchaseRow {
    fn from(purchase: NewCreditPackPurchase) -> Self {
        Self {
            user_id: purchase.user_id,
            pack_id: purchase.pack_id,
            credits: purchase.credits,
            amount_cents: purchase.amount_cents,
            status: PurchaseStatus::Pending,
            gateway_payment_id: purchase.gateway_payment_id,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = instructor_payouts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PayoutRow {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PayoutStatus,
    pub gateway_transfer_id: Option<String>,
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
}

impl From<PayoutRow> for InstructorPayout {
    fn from(row: PayoutRow) -> Self {
        Self {
            id: row.id,
            instructor_id: row.instructor_id,
            booking_id: row.booking_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: row.status,
            gateway_transfer_id: row.gateway_transfer_id,
            created_at: from_db(row.created_at),
            updated_at: from_db(row.updated_at),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = instructor_payouts)]
pub struct NewPayoutRow {
    pub instructor_id: Uuid,
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PayoutStatus,
}

impl From<NewInstructorPayout> for NewPayoutRow {
    fn from(payout: NewInstructorPayout) -> Self {
        Self {
            instructor_id: payout.instructor_id,
            booking_id: payout.booking_id,
            amount_cents: payout.amount_cents,
            currency: payout.currency,
            status: PayoutStatus::Pending,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = gateway_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EventRow {
    pub id: Uuid,
    pub provider_event_id: String,
    pub event_type: String,
    pub gateway_payment_id: Option<String>,
    pub payload: JsonValue,
    pub processed: bool,
    pub error: Option<String>,
    pub received_at: DbTimestamp,
    pub processed_at: Option<DbTimestamp>,
}

impl From<EventRow> for GatewayEventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            provider_event_id: row.provider_event_id,
            event_type: row.event_type,
            gateway_payment_id: row.gateway_payment_id,
            payload: row.payload,
            processed: row.processed,
            error: row.error,
            received_at: from_db(row.received_at),
            processed_at: row.processed_at.map(from_db),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = gateway_events)]
pub struct NewEventRow {
    pub provider_event_id: String,
    pub event_type: String,
    pub gateway_payment_id: Option<String>,
    pub payload: JsonValue,
}

impl From<NewGatewayEventRecord> for NewEventRow {
    fn from(event: NewGatewayEventRecord) -> Self {
        Self {
            provider_event_id: event.provider_event_id,
            event_type: event.event_type,
            gateway_payment_id: event.gateway_payment_id,
            payload: event.payload,
        }
    }
}
