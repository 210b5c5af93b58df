//! Storage ports and their backends.
//!
//! Services talk to these traits only; `Stores` bundles one object per
//! concern so handlers and jobs can share them through `AppState`. Two
//! backends exist: an in-memory store for tests and development, and a
//! PostgreSQL store for production. The backend is chosen from
//! configuration at startup.
//!
//! Balance and seat-count mutations go through atomic conditional updates
//! inside the backend. No caller may read a value, decide, and write it
//! back.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgBookingStore, PgCapacityStore, PgLedgerStore, PgPackStore, PgSettlementStore};

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    Booking, ClassSession, CreditBalance, CreditPack, CreditPackPurchase, CreditTransaction,
    CreditTransactionKind, GatewayEventRecord, InstructorPayout, LedgerEntry, NewBooking,
    NewClassSession, NewCreditPackPurchase, NewGatewayEventRecord, NewPaymentRecord, PaymentRecord,
};

pub(crate) fn require_positive(field: &str, amount: i64) -> AppResult<()> {
    if amount <= 0 {
        return Err(AppError::Validation {
            field: field.to_string(),
            reason: format!("must be positive, got {}", amount),
        });
    }
    Ok(())
}

/// Result of an idempotent settlement operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The transition ran; `reference` is the booking or purchase it touched.
    Applied { reference: Uuid },
    /// The target was already in a terminal state. Replays land here.
    AlreadySettled,
}

/// Refund leg of a user-initiated cancellation.
#[derive(Debug, Clone, PartialEq)]
pub enum CancellationRefund {
    /// Outside the refund window; seats are released, nothing is returned.
    None,
    Credits {
        amount: i64,
    },
    Card {
        refund_id: String,
        refund_cents: i64,
    },
}

/// Credit ledger operations.
///
/// Every balance mutation appends a transaction row in the same atomic
/// operation, so replaying the log always reproduces the balance.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current balance; users without ledger activity read as zero.
    async fn balance(&self, user_id: Uuid) -> AppResult<CreditBalance>;

    /// Atomic conditional debit of `entry.amount` credits.
    ///
    /// Fails `InsufficientCredits` without writing anything when the balance
    /// is short. A replay carrying an already-recorded reference returns the
    /// existing transaction without debiting again.
    async fn spend(&self, entry: LedgerEntry) -> AppResult<CreditTransaction>;

    /// Atomic credit of `entry.amount` under the given kind.
    ///
    /// Never fails on balance. Idempotent per `(kind, reference)`; replays
    /// return the existing transaction. Refund grants pass
    /// `CreditTransactionKind::Refund`.
    async fn grant(
        &self,
        kind: CreditTransactionKind,
        entry: LedgerEntry,
    ) -> AppResult<CreditTransaction>;

    /// Transaction history, newest first.
    async fn transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<CreditTransaction>>;

    /// Balance recomputed by summing the transaction log. Used by the audit
    /// endpoint to cross-check the materialized value.
    async fn replayed_balance(&self, user_id: Uuid) -> AppResult<i64>;
}

/// Class session catalog and seat accounting.
#[async_trait]
pub trait CapacityStore: Send + Sync {
    async fn get_session(&self, id: Uuid) -> AppResult<ClassSession>;

    async fn insert_session(&self, session: NewClassSession) -> AppResult<ClassSession>;

    /// Sessions starting at or after `from`, soonest first.
    async fn list_upcoming(&self, from: Timestamp) -> AppResult<Vec<ClassSession>>;

    /// Atomically takes `count` seats. Fails `ClassFull` when fewer are
    /// free, without changing anything.
    async fn reserve_seats(&self, class_id: Uuid, count: i32) -> AppResult<ClassSession>;

    /// Returns `count` seats. Floors at zero rather than erroring if the
    /// counter is somehow short.
    async fn release_seats(&self, class_id: Uuid, count: i32) -> AppResult<()>;
}

/// Booking rows and the payment rows tied to them.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Inserts a confirmed credits booking. The credits were spent and the
    /// seats reserved before this call.
    async fn create_confirmed_credits(&self, booking: NewBooking) -> AppResult<Booking>;

    /// Inserts a pending card booking plus its processing payment record in
    /// one local transaction.
    async fn create_pending_card(
        &self,
        booking: NewBooking,
        payment: NewPaymentRecord,
    ) -> AppResult<(Booking, PaymentRecord)>;

    async fn get(&self, id: Uuid) -> AppResult<Booking>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Booking>>;

    /// Pending card bookings created before `cutoff`, with their charge
    /// rows. Feeds the reservation sweeper.
    async fn stale_pending(&self, cutoff: Timestamp)
    -> AppResult<Vec<(Booking, PaymentRecord)>>;
}

/// Credit pack catalog and purchase records.
#[async_trait]
pub trait PackStore: Send + Sync {
    async fn get_pack(&self, id: Uuid) -> AppResult<CreditPack>;

    async fn list_active_packs(&self) -> AppResult<Vec<CreditPack>>;

    async fn insert_pack(&self, pack: CreditPack) -> AppResult<CreditPack>;

    /// Inserts a pending purchase after the gateway intent was created.
    async fn create_pending_purchase(
        &self,
        purchase: NewCreditPackPurchase,
    ) -> AppResult<CreditPackPurchase>;

    async fn list_purchases_for_user(&self, user_id: Uuid)
    -> AppResult<Vec<CreditPackPurchase>>;
}

/// Settlement transitions driven by gateway events, plus payout accruals
/// and the webhook event log.
///
/// Each `settle_*` method is one local storage transaction and is
/// idempotent: replays and out-of-order terminal events return
/// `AlreadySettled` without mutating anything.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Charge succeeded: payment `succeeded`, booking `confirmed`, payout
    /// accrued for the instructor.
    async fn settle_card_success(&self, gateway_payment_id: &str) -> AppResult<SettlementOutcome>;

    /// Charge failed: payment `failed`, booking `cancelled`, seats released.
    async fn settle_card_failure(
        &self,
        gateway_payment_id: &str,
        reason: &str,
    ) -> AppResult<SettlementOutcome>;

    /// Gateway-driven refund: negative payment row, proportional payout
    /// reversal; a full refund also flips the booking to `refunded` and
    /// releases its seats.
    async fn settle_refund(
        &self,
        gateway_payment_id: &str,
        refund_id: &str,
        refunded_cents: i64,
    ) -> AppResult<SettlementOutcome>;

    /// Pack charge succeeded: purchase `completed` and credits granted in
    /// the same transaction.
    async fn settle_purchase_success(
        &self,
        gateway_payment_id: &str,
    ) -> AppResult<SettlementOutcome>;

    async fn settle_purchase_failure(
        &self,
        gateway_payment_id: &str,
        reason: &str,
    ) -> AppResult<SettlementOutcome>;

    /// User-initiated cancellation: booking `cancelled`, seats released and
    /// the refund leg applied, all in one transaction. Rejects bookings that
    /// are not `confirmed`.
    async fn settle_cancellation(
        &self,
        booking_id: Uuid,
        refund: CancellationRefund,
    ) -> AppResult<Booking>;

    /// Payouts awaiting the next transfer batch.
    async fn pending_payouts(&self) -> AppResult<Vec<InstructorPayout>>;

    /// Stamps the given payouts `processing` under the created transfer.
    async fn mark_payouts_processing(&self, ids: &[Uuid], transfer_id: &str) -> AppResult<usize>;

    /// Transfer outcome: every payout under `transfer_id` in `processing`
    /// moves to `paid` or `failed`. Returns how many rows moved.
    async fn settle_transfer(&self, transfer_id: &str, succeeded: bool) -> AppResult<usize>;

    async fn list_payouts(&self, instructor_id: Uuid) -> AppResult<Vec<InstructorPayout>>;

    /// Records a webhook delivery. Returns `None` when the provider event id
    /// was seen before; settlement must then be skipped.
    async fn record_event(
        &self,
        event: NewGatewayEventRecord,
    ) -> AppResult<Option<GatewayEventRecord>>;

    async fn mark_event_processed(&self, id: Uuid) -> AppResult<()>;

    async fn mark_event_failed(&self, id: Uuid, error: &str) -> AppResult<()>;

    /// Storage reachability for the readiness probe.
    async fn ping(&self) -> AppResult<()>;
}

/// One store object per concern, shared through `AppState`.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn LedgerStore>,
    pub capacity: Arc<dyn CapacityStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub packs: Arc<dyn PackStore>,
    pub settlement: Arc<dyn SettlementStore>,
}

impl Stores {
    /// All concerns backed by one shared in-memory state.
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            ledger: store.clone(),
            capacity: store.clone(),
            bookings: store.clone(),
            packs: store.clone(),
            settlement: store,
        }
    }

    /// PostgreSQL-backed stores sharing one connection pool.
    pub fn postgres(pool: AsyncDbPool) -> Self {
        Self {
            ledger: Arc::new(PgLedgerStore::new(pool.clone())),
            capacity: Arc::new(PgCapacityStore::new(pool.clone())),
            bookings: Arc::new(PgBookingStore::new(pool.clone())),
            packs: Arc::new(PgPackStore::new(pool.clone())),
            settlement: Arc::new(PgSettlementStore::new(pool)),
        }
    }
}
