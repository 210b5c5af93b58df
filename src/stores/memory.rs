//! In-memory backend for tests and development.
//!
//! All state lives behind a single async mutex and every operation is one
//! critical section with no await points inside, which gives the same
//! atomicity the SQL backend gets from conditional updates and local
//! transactions.

use std::collections::HashMap;

use async_trait::async_trait;
use jiff::Timestamp;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    BookingStore, CancellationRefund, CapacityStore, LedgerStore, PackStore, SettlementOutcome,
    SettlementStore, require_positive,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    Booking, BookingStatus, ClassSession, CreditBalance, CreditPack, CreditPackPurchase,
    CreditTransaction, CreditTransactionKind, GatewayEventRecord, InstructorPayout, LedgerEntry,
    LedgerReference, NewBooking, NewClassSession, NewCreditPackPurchase, NewGatewayEventRecord,
    NewInstructorPayout, NewPaymentRecord, PaymentRecord, PaymentStatus, PayoutStatus,
    PurchaseStatus,
};
use crate::services::commission;

#[derive(Default)]
struct MemoryState {
    balances: HashMap<Uuid, CreditBalance>,
    transactions: Vec<CreditTransaction>,
    sessions: HashMap<Uuid, ClassSession>,
    bookings: HashMap<Uuid, Booking>,
    payments: HashMap<Uuid, PaymentRecord>,
    packs: HashMap<Uuid, CreditPack>,
    purchases: HashMap<Uuid, CreditPackPurchase>,
    payouts: HashMap<Uuid, InstructorPayout>,
    events: HashMap<Uuid, GatewayEventRecord>,
}

/// Shared state behind every port trait.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn find_reference(
    state: &MemoryState,
    user_id: Uuid,
    kind: CreditTransactionKind,
    reference: &LedgerReference,
) -> Option<CreditTransaction> {
    state
        .transactions
        .iter()
        .find(|t| {
            t.user_id == user_id
                && t.kind == kind
                && t.reference_type == reference.reference_type
                && t.reference_id == reference.reference_id
        })
        .cloned()
}

fn spend_locked(state: &mut MemoryState, entry: &LedgerEntry) -> AppResult<CreditTransaction> {
    if let Some(existing) =
        find_reference(state, entry.user_id, CreditTransactionKind::Spend, &entry.reference)
    {
        return Ok(existing);
    }

    let balance = state
        .balances
        .entry(entry.user_id)
        .or_insert_with(|| CreditBalance::empty(entry.user_id));
    if balance.balance < entry.amount {
        return Err(AppError::InsufficientCredits {
            required: entry.amount,
            available: balance.balance,
        });
    }

    balance.balance -= entry.amount;
    balance.total_spent += entry.amount;
    balance.last_activity_at = Timestamp::now();

    let transaction = CreditTransaction {
        id: Uuid::new_v4(),
        user_id: entry.user_id,
        kind: CreditTransactionKind::Spend,
        amount: -entry.amount,
        balance_after: balance.balance,
        reference_type: entry.reference.reference_type.clone(),
        reference_id: entry.reference.reference_id.clone(),
        description: entry.description.clone(),
        created_at: Timestamp::now(),
    };
    state.transactions.push(transaction.clone());
    Ok(transaction)
}

fn grant_locked(
    state: &mut MemoryState,
    kind: CreditTransactionKind,
    entry: &LedgerEntry,
) -> AppResult<CreditTransaction> {
    if let Some(existing) = find_reference(state, entry.user_id, kind, &entry.reference) {
        return Ok(existing);
    }

    let balance = state
        .balances
        .entry(entry.user_id)
        .or_insert_with(|| CreditBalance::empty(entry.user_id));
    balance.balance += entry.amount;
    balance.total_earned += entry.amount;
    balance.last_activity_at = Timestamp::now();

    let transaction = CreditTransaction {
        id: Uuid::new_v4(),
        user_id: entry.user_id,
        kind,
        amount: entry.amount,
        balance_after: balance.balance,
        reference_type: entry.reference.reference_type.clone(),
        reference_id: entry.reference.reference_id.clone(),
        description: entry.description.clone(),
        created_at: Timestamp::now(),
    };
    state.transactions.push(transaction.clone());
    Ok(transaction)
}

fn release_seats_locked(state: &mut MemoryState, class_id: Uuid, count: i32) {
    if let Some(session) = state.sessions.get_mut(&class_id) {
        let released = session.current_participants.min(count);
        if released < count {
            tracing::warn!(
                class_id = %class_id,
                requested = count,
                released,
                "seat release clamped at zero"
            );
        }
        session.current_participants -= released;
        session.updated_at = Timestamp::now();
    }
}

/// Charge rows are non-negative; refund rows reuse the table with negative
/// amounts and their own gateway ids.
fn charge_by_gateway_id(state: &MemoryState, gateway_payment_id: &str) -> Option<Uuid> {
    state
        .payments
        .values()
        .find(|p| p.gateway_payment_id == gateway_payment_id && p.amount_cents >= 0)
        .map(|p| p.id)
}

fn charge_for_booking(state: &MemoryState, booking_id: Uuid) -> Option<Uuid> {
    state
        .payments
        .values()
        .find(|p| p.booking_id == booking_id && p.amount_cents >= 0)
        .map(|p| p.id)
}

fn insert_payment_locked(state: &mut MemoryState, payment: NewPaymentRecord) -> PaymentRecord {
    let now = Timestamp::now();
    let record = PaymentRecord {
        id: Uuid::new_v4(),
        booking_id: payment.booking_id,
        user_id: payment.user_id,
        gateway_payment_id: payment.gateway_payment_id,
        amount_cents: payment.amount_cents,
        currency: payment.currency,
        status: payment.status,
        failure_reason: None,
        created_at: now,
        updated_at: now,
    };
    state.payments.insert(record.id, record.clone());
    record
}

/// Inserts the negative refund row and flips the charge to `refunded` once
/// the booking is fully refunded. Returns whether the refund is now full.
fn apply_refund_row_locked(
    state: &mut MemoryState,
    charge_id: Uuid,
    refund_id: &str,
    refund_cents: i64,
) -> AppResult<bool> {
    let (booking_id, user_id, currency, charge_amount) = {
        let charge = state.payments.get(&charge_id).ok_or_else(|| AppError::Internal {
            source: anyhow::anyhow!("charge row disappeared during refund"),
        })?;
        (
            charge.booking_id,
            charge.user_id,
            charge.currency.clone(),
            charge.amount_cents,
        )
    };

    insert_payment_locked(
        state,
        NewPaymentRecord {
            booking_id,
            user_id,
            gateway_payment_id: refund_id.to_string(),
            amount_cents: -refund_cents,
            currency,
            status: PaymentStatus::Refunded,
        },
    );

    let total_refunded: i64 = state
        .payments
        .values()
        .filter(|p| p.booking_id == booking_id && p.amount_cents < 0)
        .map(|p| -p.amount_cents)
        .sum();
    let full = total_refunded >= charge_amount;

    if full
        && let Some(charge) = state.payments.get_mut(&charge_id)
        && charge.status.can_transition_to(PaymentStatus::Refunded)
    {
        charge.status = PaymentStatus::Refunded;
        charge.updated_at = Timestamp::now();
    }
    Ok(full)
}

fn reverse_payout_locked(state: &mut MemoryState, booking: &Booking, refunded_cents: i64) {
    let Some(payout) = state.payouts.values_mut().find(|p| p.booking_id == booking.id) else {
        return;
    };
    if payout.status != PayoutStatus::Pending {
        tracing::warn!(
            booking_id = %booking.id,
            payout_id = %payout.id,
            status = payout.status.as_str(),
            "refund reversal hit a payout already in flight, manual adjustment required"
        );
        return;
    }
    let reversed =
        commission::reversal_split(booking.commission_cents, booking.amount_cents, refunded_cents);
    payout.amount_cents = (payout.amount_cents - reversed.payout_cents).max(0);
    payout.updated_at = Timestamp::now();
}

fn accrue_payout_locked(state: &mut MemoryState, payout: NewInstructorPayout) {
    if state
        .payouts
        .values()
        .any(|p| p.booking_id == payout.booking_id)
    {
        return;
    }
    let now = Timestamp::now();
    let record = InstructorPayout {
        id: Uuid::new_v4(),
        instructor_id: payout.instructor_id,
        booking_id: payout.booking_id,
        amount_cents: payout.amount_cents,
        currency: payout.currency,
        status: PayoutStatus::Pending,
        gateway_transfer_id: None,
        created_at: now,
        updated_at: now,
    };
    state.payouts.insert(record.id, record);
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn balance(&self, user_id: Uuid) -> AppResult<CreditBalance> {
        let state = self.state.lock().await;
        Ok(state
            .balances
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| CreditBalance::empty(user_id)))
    }

    async fn spend(&self, entry: LedgerEntry) -> AppResult<CreditTransaction> {
        require_positive("amount", entry.amount)?;
        let mut state = self.state.lock().await;
        spend_locked(&mut state, &entry)
    }

    async fn grant(
        &self,
        kind: CreditTransactionKind,
        entry: LedgerEntry,
    ) -> AppResult<CreditTransaction> {
        require_positive("amount", entry.amount)?;
        if kind == CreditTransactionKind::Spend {
            return Err(AppError::Validation {
                field: "kind".to_string(),
                reason: "grants cannot use the spend kind".to_string(),
            });
        }
        let mut state = self.state.lock().await;
        grant_locked(&mut state, kind, &entry)
    }

    async fn transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<CreditTransaction>> {
        let state = self.state.lock().await;
        let mut rows: Vec<CreditTransaction> = state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn replayed_balance(&self, user_id: Uuid) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.amount)
            .sum())
    }
}

#[async_trait]
impl CapacityStore for MemoryStore {
    async fn get_session(&self, id: Uuid) -> AppResult<ClassSession> {
        let state = self.state.lock().await;
        state
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound {
                entity: "ClassSession".to_string(),
                field: "id".to_string(),
                value: id.to_string(),
            })
    }

    async fn insert_session(&self, session: NewClassSession) -> AppResult<ClassSession> {
        require_positive("max_participants", session.max_participants as i64)?;
        let now = Timestamp::now();
        let record = ClassSession {
            id: Uuid::new_v4(),
            instructor_id: session.instructor_id,
            name: session.name,
            price_cents: session.price_cents,
            credit_cost: session.credit_cost,
            allow_credit_payment: session.allow_credit_payment,
            max_participants: session.max_participants,
            current_participants: 0,
            starts_at: session.starts_at,
            cancel_window_hours: session.cancel_window_hours,
            refund_percent: session.refund_percent,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().await;
        state.sessions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_upcoming(&self, from: Timestamp) -> AppResult<Vec<ClassSession>> {
        let state = self.state.lock().await;
        let mut rows: Vec<ClassSession> = state
            .sessions
            .values()
            .filter(|s| s.starts_at >= from)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.starts_at.cmp(&b.starts_at));
        Ok(rows)
    }

    async fn reserve_seats(&self, class_id: Uuid, count: i32) -> AppResult<ClassSession> {
        require_positive("attendee_count", count as i64)?;
        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .get_mut(&class_id)
            .ok_or_else(|| AppError::NotFound {
                entity: "ClassSession".to_string(),
                field: "id".to_string(),
                value: class_id.to_string(),
            })?;
        if session.current_participants + count > session.max_participants {
            return Err(AppError::ClassFull { class_id });
        }
        session.current_participants += count;
        session.updated_at = Timestamp::now();
        Ok(session.clone())
    }

    async fn release_seats(&self, class_id: Uuid, count: i32) -> AppResult<()> {
        require_positive("attendee_count", count as i64)?;
        let mut state = self.state.lock().await;
        release_seats_locked(&mut state, class_id, count);
        Ok(())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn create_confirmed_credits(&self, booking: NewBooking) -> AppResult<Booking> {
        let now = Timestamp::now();
        let record = Booking {
            id: booking.id,
            user_id: booking.user_id,
            class_id: booking.class_id,
            attendee_count: booking.attendee_count,
            status: BookingStatus::Confirmed,
            payment_method: booking.payment_method,
            amount_cents: booking.amount_cents,
            commission_cents: booking.commission_cents,
            payout_cents: booking.payout_cents,
            credits_used: booking.credits_used,
            gateway_payment_id: None,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().await;
        if state.bookings.contains_key(&record.id) {
            return Err(AppError::Duplicate {
                entity: "bookings".to_string(),
                field: "id".to_string(),
                value: record.id.to_string(),
            });
        }
        state.bookings.insert(record.id, record.clone());
        Ok(record)
    }

    async fn create_pending_card(
        &self,
        booking: NewBooking,
        payment: NewPaymentRecord,
    ) -> AppResult<(Booking, PaymentRecord)> {
        let now = Timestamp::now();
        let record = Booking {
            id: booking.id,
            user_id: booking.user_id,
            class_id: booking.class_id,
            attendee_count: booking.attendee_count,
            status: BookingStatus::Pending,
            payment_method: booking.payment_method,
            amount_cents: booking.amount_cents,
            commission_cents: booking.commission_cents,
            payout_cents: booking.payout_cents,
            credits_used: 0,
            gateway_payment_id: Some(payment.gateway_payment_id.clone()),
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().await;
        if state.bookings.contains_key(&record.id) {
            return Err(AppError::Duplicate {
                entity: "bookings".to_string(),
                field: "id".to_string(),
                value: record.id.to_string(),
            });
        }
        state.bookings.insert(record.id, record.clone());
        let payment_record = insert_payment_locked(
            &mut state,
            NewPaymentRecord {
                booking_id: record.id,
                ..payment
            },
        );
        Ok((record, payment_record))
    }

    async fn get(&self, id: Uuid) -> AppResult<Booking> {
        let state = self.state.lock().await;
        state
            .bookings
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound {
                entity: "Booking".to_string(),
                field: "id".to_string(),
                value: id.to_string(),
            })
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn stale_pending(
        &self,
        cutoff: Timestamp,
    ) -> AppResult<Vec<(Booking, PaymentRecord)>> {
        let state = self.state.lock().await;
        let mut rows = Vec::new();
        for booking in state.bookings.values() {
            if booking.status != BookingStatus::Pending || booking.created_at >= cutoff {
                continue;
            }
            if let Some(charge_id) = charge_for_booking(&state, booking.id)
                && let Some(payment) = state.payments.get(&charge_id)
            {
                rows.push((booking.clone(), payment.clone()));
            }
        }
        rows.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at));
        Ok(rows)
    }
}

#[async_trait]
impl PackStore for MemoryStore {
    async fn get_pack(&self, id: Uuid) -> AppResult<CreditPack> {
        let state = self.state.lock().await;
        state
            .packs
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound {
                entity: "CreditPack".to_string(),
                field: "id".to_string(),
                value: id.to_string(),
            })
    }

    async fn list_active_packs(&self) -> AppResult<Vec<CreditPack>> {
        let state = self.state.lock().await;
        let mut rows: Vec<CreditPack> = state.packs.values().filter(|p| p.active).cloned().collect();
        rows.sort_by_key(|p| p.price_cents);
        Ok(rows)
    }

    async fn insert_pack(&self, pack: CreditPack) -> AppResult<CreditPack> {
        let mut state = self.state.lock().await;
        state.packs.insert(pack.id, pack.clone());
        Ok(pack)
    }

    async fn create_pending_purchase(
        &self,
        purchase: NewCreditPackPurchase,
    ) -> AppResult<CreditPackPurchase> {
        let now = Timestamp::now();
        let record = CreditPackPurchase {
            id: Uuid::new_v4(),
            user_id: purchase.user_id,
            pack_id: purchase.pack_id,
            credits: purchase.credits,
            amount_cents: purchase.amount_cents,
            status: PurchaseStatus::Pending,
            gateway_payment_id: purchase.gateway_payment_id,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().await;
        state.purchases.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_purchases_for_user(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<CreditPackPurchase>> {
        let state = self.state.lock().await;
        let mut rows: Vec<CreditPackPurchase> = state
            .purchases
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn settle_card_success(&self, gateway_payment_id: &str) -> AppResult<SettlementOutcome> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(charge_id) = charge_by_gateway_id(state, gateway_payment_id) else {
            return Err(AppError::ReconciliationConflict {
                message: format!("no payment record for gateway id {}", gateway_payment_id),
            });
        };

        let (booking_id, currency) = {
            let payment = state.payments.get_mut(&charge_id).ok_or_else(|| {
                AppError::Internal {
                    source: anyhow::anyhow!("payment row disappeared during settlement"),
                }
            })?;
            if payment.status.is_settled() {
                return Ok(SettlementOutcome::AlreadySettled);
            }
            payment.status = PaymentStatus::Succeeded;
            payment.updated_at = Timestamp::now();
            (payment.booking_id, payment.currency.clone())
        };

        let (class_id, payout_cents) = {
            let booking = state.bookings.get_mut(&booking_id).ok_or_else(|| {
                AppError::Internal {
                    source: anyhow::anyhow!("booking {} missing for settled payment", booking_id),
                }
            })?;
            booking.status = BookingStatus::Confirmed;
            booking.updated_at = Timestamp::now();
            (booking.class_id, booking.payout_cents)
        };

        if payout_cents > 0 {
            let instructor_id = state
                .sessions
                .get(&class_id)
                .map(|s| s.instructor_id)
                .ok_or_else(|| AppError::Internal {
                    source: anyhow::anyhow!("class {} missing for settled booking", class_id),
                })?;
            accrue_payout_locked(
                state,
                NewInstructorPayout {
                    instructor_id,
                    booking_id,
                    amount_cents: payout_cents,
                    currency,
                },
            );
        }

        Ok(SettlementOutcome::Applied {
            reference: booking_id,
        })
    }

    async fn settle_card_failure(
        &self,
        gateway_payment_id: &str,
        reason: &str,
    ) -> AppResult<SettlementOutcome> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(charge_id) = charge_by_gateway_id(state, gateway_payment_id) else {
            return Err(AppError::ReconciliationConflict {
                message: format!("no payment record for gateway id {}", gateway_payment_id),
            });
        };

        let booking_id = {
            let payment = state.payments.get_mut(&charge_id).ok_or_else(|| {
                AppError::Internal {
                    source: anyhow::anyhow!("payment row disappeared during settlement"),
                }
            })?;
            if payment.status.is_settled() {
                return Ok(SettlementOutcome::AlreadySettled);
            }
            payment.status = PaymentStatus::Failed;
            payment.failure_reason = Some(reason.to_string());
            payment.updated_at = Timestamp::now();
            payment.booking_id
        };

        let (class_id, attendee_count) = {
            let booking = state.bookings.get_mut(&booking_id).ok_or_else(|| {
                AppError::Internal {
                    source: anyhow::anyhow!("booking {} missing for failed payment", booking_id),
                }
            })?;
            booking.status = BookingStatus::Cancelled;
            booking.updated_at = Timestamp::now();
            (booking.class_id, booking.attendee_count)
        };
        release_seats_locked(state, class_id, attendee_count);

        Ok(SettlementOutcome::Applied {
            reference: booking_id,
        })
    }

    async fn settle_refund(
        &self,
        gateway_payment_id: &str,
        refund_id: &str,
        refunded_cents: i64,
    ) -> AppResult<SettlementOutcome> {
        require_positive("refunded_cents", refunded_cents)?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state
            .payments
            .values()
            .any(|p| p.gateway_payment_id == refund_id)
        {
            return Ok(SettlementOutcome::AlreadySettled);
        }

        let Some(charge_id) = charge_by_gateway_id(state, gateway_payment_id) else {
            return Err(AppError::ReconciliationConflict {
                message: format!("refund for unknown gateway id {}", gateway_payment_id),
            });
        };
        {
            let charge = state.payments.get(&charge_id).ok_or_else(|| AppError::Internal {
                source: anyhow::anyhow!("payment row disappeared during refund"),
            })?;
            if !matches!(
                charge.status,
                PaymentStatus::Succeeded | PaymentStatus::Refunded
            ) {
                return Err(AppError::ReconciliationConflict {
                    message: format!(
                        "refund for payment {} in state {}",
                        gateway_payment_id,
                        charge.status.as_str()
                    ),
                });
            }
        }

        let full = apply_refund_row_locked(state, charge_id, refund_id, refunded_cents)?;

        let booking = {
            let charge = state.payments.get(&charge_id).ok_or_else(|| AppError::Internal {
                source: anyhow::anyhow!("payment row disappeared during refund"),
            })?;
            let booking_id = charge.booking_id;
            state
                .bookings
                .get(&booking_id)
                .cloned()
                .ok_or_else(|| AppError::Internal {
                    source: anyhow::anyhow!("booking {} missing for refunded payment", booking_id),
                })?
        };

        reverse_payout_locked(state, &booking, refunded_cents);

        if full && booking.status == BookingStatus::Confirmed {
            if let Some(row) = state.bookings.get_mut(&booking.id) {
                row.status = BookingStatus::Refunded;
                row.updated_at = Timestamp::now();
            }
            release_seats_locked(state, booking.class_id, booking.attendee_count);
        }

        Ok(SettlementOutcome::Applied {
            reference: booking.id,
        })
    }

    async fn settle_purchase_success(
        &self,
        gateway_payment_id: &str,
    ) -> AppResult<SettlementOutcome> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(purchase) = state
            .purchases
            .values()
            .find(|p| p.gateway_payment_id.as_deref() == Some(gateway_payment_id))
            .cloned()
        else {
            return Err(AppError::ReconciliationConflict {
                message: format!("no purchase for gateway id {}", gateway_payment_id),
            });
        };
        if purchase.status.is_terminal() {
            return Ok(SettlementOutcome::AlreadySettled);
        }

        let pack = state
            .packs
            .get(&purchase.pack_id)
            .cloned()
            .ok_or_else(|| AppError::Internal {
                source: anyhow::anyhow!("pack {} missing for purchase", purchase.pack_id),
            })?;
        let base = pack.credit_amount.min(purchase.credits);
        let bonus = purchase.credits - base;

        grant_locked(
            state,
            CreditTransactionKind::Purchase,
            &LedgerEntry::new(
                purchase.user_id,
                base,
                LedgerReference::purchase(purchase.id),
                format!("purchase of {}", pack.name),
            ),
        )?;
        if bonus > 0 {
            grant_locked(
                state,
                CreditTransactionKind::Bonus,
                &LedgerEntry::new(
                    purchase.user_id,
                    bonus,
                    LedgerReference::purchase(purchase.id),
                    format!("bonus credits for {}", pack.name),
                ),
            )?;
        }

        if let Some(row) = state.purchases.get_mut(&purchase.id) {
            row.status = PurchaseStatus::Completed;
            row.updated_at = Timestamp::now();
        }

        Ok(SettlementOutcome::Applied {
            reference: purchase.id,
        })
    }

    async fn settle_purchase_failure(
        &self,
        gateway_payment_id: &str,
        reason: &str,
    ) -> AppResult<SettlementOutcome> {
        let mut state = self.state.lock().await;

        let Some(purchase_id) = state
            .purchases
            .values()
            .find(|p| p.gateway_payment_id.as_deref() == Some(gateway_payment_id))
            .map(|p| p.id)
        else {
            return Err(AppError::ReconciliationConflict {
                message: format!("no purchase for gateway id {}", gateway_payment_id),
            });
        };

        let purchase = state
            .purchases
            .get_mut(&purchase_id)
            .ok_or_else(|| AppError::Internal {
                source: anyhow::anyhow!("purchase row disappeared during settlement"),
            })?;
        if purchase.status.is_terminal() {
            return Ok(SettlementOutcome::AlreadySettled);
        }
        purchase.status = PurchaseStatus::Failed;
        purchase.failure_reason = Some(reason.to_string());
        purchase.updated_at = Timestamp::now();

        Ok(SettlementOutcome::Applied {
            reference: purchase_id,
        })
    }

    async fn settle_cancellation(
        &self,
        booking_id: Uuid,
        refund: CancellationRefund,
    ) -> AppResult<Booking> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let booking = state
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound {
                entity: "Booking".to_string(),
                field: "id".to_string(),
                value: booking_id.to_string(),
            })?;
        if booking.status != BookingStatus::Confirmed {
            return Err(AppError::BadRequest {
                message: format!(
                    "booking {} cannot be cancelled from state {}",
                    booking_id,
                    booking.status.as_str()
                ),
            });
        }

        match &refund {
            CancellationRefund::None => {}
            CancellationRefund::Credits { amount } => {
                grant_locked(
                    state,
                    CreditTransactionKind::Refund,
                    &LedgerEntry::new(
                        booking.user_id,
                        *amount,
                        LedgerReference::booking(booking_id),
                        "booking cancellation refund".to_string(),
                    ),
                )?;
            }
            CancellationRefund::Card {
                refund_id,
                refund_cents,
            } => {
                let charge_id =
                    charge_for_booking(state, booking_id).ok_or_else(|| AppError::Internal {
                        source: anyhow::anyhow!("no charge row for card booking {}", booking_id),
                    })?;
                apply_refund_row_locked(state, charge_id, refund_id, *refund_cents)?;
                reverse_payout_locked(state, &booking, *refund_cents);
            }
        }

        release_seats_locked(state, booking.class_id, booking.attendee_count);

        let row = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::Internal {
                source: anyhow::anyhow!("booking row disappeared during cancellation"),
            })?;
        row.status = BookingStatus::Cancelled;
        row.updated_at = Timestamp::now();
        Ok(row.clone())
    }

    async fn pending_payouts(&self) -> AppResult<Vec<InstructorPayout>> {
        let state = self.state.lock().await;
        let mut rows: Vec<InstructorPayout> = state
            .payouts
            .values()
            .filter(|p| p.status == PayoutStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn mark_payouts_processing(&self, ids: &[Uuid], transfer_id: &str) -> AppResult<usize> {
        let mut state = self.state.lock().await;
        let mut moved = 0;
        for id in ids {
            if let Some(payout) = state.payouts.get_mut(id)
                && payout.status == PayoutStatus::Pending
            {
                payout.status = PayoutStatus::Processing;
                payout.gateway_transfer_id = Some(transfer_id.to_string());
                payout.updated_at = Timestamp::now();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn settle_transfer(&self, transfer_id: &str, succeeded: bool) -> AppResult<usize> {
        let mut state = self.state.lock().await;
        let next = if succeeded {
            PayoutStatus::Paid
        } else {
            PayoutStatus::Failed
        };
        let mut moved = 0;
        for payout in state.payouts.values_mut() {
            if payout.gateway_transfer_id.as_deref() == Some(transfer_id)
                && payout.status == PayoutStatus::Processing
            {
                payout.status = next;
                payout.updated_at = Timestamp::now();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn list_payouts(&self, instructor_id: Uuid) -> AppResult<Vec<InstructorPayout>> {
        let state = self.state.lock().await;
        let mut rows: Vec<InstructorPayout> = state
            .payouts
            .values()
            .filter(|p| p.instructor_id == instructor_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn record_event(
        &self,
        event: NewGatewayEventRecord,
    ) -> AppResult<Option<GatewayEventRecord>> {
        let mut state = self.state.lock().await;
        if state
            .events
            .values()
            .any(|e| e.provider_event_id == event.provider_event_id)
        {
            return Ok(None);
        }
        let record = GatewayEventRecord {
            id: Uuid::new_v4(),
            provider_event_id: event.provider_event_id,
            event_type: event.event_type,
            gateway_payment_id: event.gateway_payment_id,
            payload: event.payload,
            processed: false,
            error: None,
            received_at: Timestamp::now(),
            processed_at: None,
        };
        state.events.insert(record.id, record.clone());
        Ok(Some(record))
    }

    async fn mark_event_processed(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(event) = state.events.get_mut(&id) {
            event.processed = true;
            event.error = None;
            event.processed_at = Some(Timestamp::now());
        }
        Ok(())
    }

    async fn mark_event_failed(&self, id: Uuid, error: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(event) = state.events.get_mut(&id) {
            event.processed = false;
            event.error = Some(error.to_string());
            event.processed_at = Some(Timestamp::now());
        }
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::PaymentMethod;

    fn entry(user_id: Uuid, amount: i64) -> LedgerEntry {
        LedgerEntry::new(
            user_id,
            amount,
            LedgerReference::manual(Uuid::new_v4().to_string()),
            "test entry",
        )
    }

    async fn seeded_session(store: &MemoryStore, max: i32) -> ClassSession {
        store
            .insert_session(NewClassSession {
                instructor_id: Uuid::new_v4(),
                name: "Evening Pilates".to_string(),
                price_cents: 2000,
                credit_cost: 8,
                allow_credit_payment: true,
                max_participants: max,
                starts_at: Timestamp::now() + jiff::SignedDuration::from_hours(48),
                cancel_window_hours: 24,
                refund_percent: 100,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn balance_defaults_to_zero() {
        let store = MemoryStore::new();
        let balance = store.balance(Uuid::new_v4()).await.unwrap();
        assert_eq!(balance.balance, 0);
    }

    #[tokio::test]
    async fn spend_fails_without_writing_when_short() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store
            .grant(CreditTransactionKind::Adjustment, entry(user, 5))
            .await
            .unwrap();

        let err = store.spend(entry(user, 8)).await.unwrap_err();
        match err {
            AppError::InsufficientCredits {
                required,
                available,
            } => {
                assert_eq!(required, 8);
                assert_eq!(available, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let balance = store.balance(user).await.unwrap();
        assert_eq!(balance.balance, 5);
        assert_eq!(store.transactions(user, 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn spend_replay_returns_existing_row() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store
            .grant(CreditTransactionKind::Purchase, entry(user, 10))
            .await
            .unwrap();

        let reference = LedgerReference::booking(Uuid::new_v4());
        let first = store
            .spend(LedgerEntry::new(user, 4, reference.clone(), "seat"))
            .await
            .unwrap();
        let second = store
            .spend(LedgerEntry::new(user, 4, reference, "seat"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.balance(user).await.unwrap().balance, 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_spends_never_overdraw() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store
            .grant(CreditTransactionKind::Purchase, entry(user, 5))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.spend(entry(user, 1)).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 5);
        let balance = store.balance(user).await.unwrap();
        assert_eq!(balance.balance, 0);
        assert_eq!(balance.total_earned - balance.total_spent, balance.balance);
        assert_eq!(store.replayed_balance(user).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn oversubscribed_reservations_fill_exactly() {
        let store = Arc::new(MemoryStore::new());
        let session = seeded_session(&store, 5).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let class_id = session.id;
            handles.push(tokio::spawn(async move {
                store.reserve_seats(class_id, 1).await
            }));
        }

        let mut full = 0;
        let mut reserved = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => reserved += 1,
                Err(AppError::ClassFull { .. }) => full += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(reserved, 5);
        assert_eq!(full, 3);
        let session = store.get_session(session.id).await.unwrap();
        assert_eq!(session.current_participants, 5);
    }

    #[tokio::test]
    async fn release_clamps_at_zero() {
        let store = MemoryStore::new();
        let session = seeded_session(&store, 5).await;
        store.reserve_seats(session.id, 2).await.unwrap();
        store.release_seats(session.id, 4).await.unwrap();
        let session = store.get_session(session.id).await.unwrap();
        assert_eq!(session.current_participants, 0);
    }

    async fn pending_card_booking(
        store: &MemoryStore,
        session: &ClassSession,
        gateway_payment_id: &str,
    ) -> Booking {
        store.reserve_seats(session.id, 1).await.unwrap();
        let (booking, _) = store
            .create_pending_card(
                NewBooking {
                    id: Uuid::new_v4(),
                    user_id: Uuid::new_v4(),
                    class_id: session.id,
                    attendee_count: 1,
                    payment_method: PaymentMethod::Card,
                    amount_cents: 10_000,
                    commission_cents: 1_500,
                    payout_cents: 8_500,
                    credits_used: 0,
                    gateway_payment_id: Some(gateway_payment_id.to_string()),
                },
                NewPaymentRecord {
                    booking_id: Uuid::nil(),
                    user_id: Uuid::new_v4(),
                    gateway_payment_id: gateway_payment_id.to_string(),
                    amount_cents: 10_000,
                    currency: "usd".to_string(),
                    status: PaymentStatus::Processing,
                },
            )
            .await
            .unwrap();
        booking
    }

    #[tokio::test]
    async fn card_success_settles_once() {
        let store = MemoryStore::new();
        let session = seeded_session(&store, 5).await;
        let booking = pending_card_booking(&store, &session, "pi_100").await;

        let first = store.settle_card_success("pi_100").await.unwrap();
        assert_eq!(
            first,
            SettlementOutcome::Applied {
                reference: booking.id
            }
        );
        let replay = store.settle_card_success("pi_100").await.unwrap();
        assert_eq!(replay, SettlementOutcome::AlreadySettled);

        let booking = store.get(booking.id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);

        let payouts = store.list_payouts(session.instructor_id).await.unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].amount_cents, 8_500);
        assert_eq!(payouts[0].status, PayoutStatus::Pending);
    }

    #[tokio::test]
    async fn card_failure_releases_seats() {
        let store = MemoryStore::new();
        let session = seeded_session(&store, 5).await;
        let booking = pending_card_booking(&store, &session, "pi_200").await;

        store
            .settle_card_failure("pi_200", "card_declined")
            .await
            .unwrap();

        let booking = store.get(booking.id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        let session = store.get_session(session.id).await.unwrap();
        assert_eq!(session.current_participants, 0);
        assert!(store.list_payouts(session.instructor_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_order_failure_after_success_is_ignored() {
        let store = MemoryStore::new();
        let session = seeded_session(&store, 5).await;
        let booking = pending_card_booking(&store, &session, "pi_300").await;

        store.settle_card_success("pi_300").await.unwrap();
        let late = store
            .settle_card_failure("pi_300", "card_declined")
            .await
            .unwrap();
        assert_eq!(late, SettlementOutcome::AlreadySettled);

        let booking = store.get(booking.id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        let session = store.get_session(session.id).await.unwrap();
        assert_eq!(session.current_participants, 1);
    }

    #[tokio::test]
    async fn full_refund_reverses_booking_and_payout() {
        let store = MemoryStore::new();
        let session = seeded_session(&store, 5).await;
        let booking = pending_card_booking(&store, &session, "pi_400").await;
        store.settle_card_success("pi_400").await.unwrap();

        let outcome = store
            .settle_refund("pi_400", "re_400", 10_000)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SettlementOutcome::Applied {
                reference: booking.id
            }
        );

        let booking = store.get(booking.id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Refunded);
        let session = store.get_session(session.id).await.unwrap();
        assert_eq!(session.current_participants, 0);
        let payouts = store.list_payouts(session.instructor_id).await.unwrap();
        assert_eq!(payouts[0].amount_cents, 0);

        let replay = store
            .settle_refund("pi_400", "re_400", 10_000)
            .await
            .unwrap();
        assert_eq!(replay, SettlementOutcome::AlreadySettled);
    }

    #[tokio::test]
    async fn purchase_success_grants_base_and_bonus_once() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let pack = store
            .insert_pack(CreditPack {
                id: Uuid::new_v4(),
                name: "Bulk".to_string(),
                credit_amount: 50,
                bonus_credits: 5,
                price_cents: 5_000,
                active: true,
                created_at: Timestamp::now(),
            })
            .await
            .unwrap();
        store
            .create_pending_purchase(NewCreditPackPurchase {
                user_id: user,
                pack_id: pack.id,
                credits: 55,
                amount_cents: 5_000,
                gateway_payment_id: Some("pi_500".to_string()),
            })
            .await
            .unwrap();

        store.settle_purchase_success("pi_500").await.unwrap();
        let replay = store.settle_purchase_success("pi_500").await.unwrap();
        assert_eq!(replay, SettlementOutcome::AlreadySettled);

        let balance = store.balance(user).await.unwrap();
        assert_eq!(balance.balance, 55);
        let transactions = store.transactions(user, 10, 0).await.unwrap();
        assert_eq!(transactions.len(), 2);
        let purchases = store.list_purchases_for_user(user).await.unwrap();
        assert_eq!(purchases[0].status, PurchaseStatus::Completed);
    }

    #[tokio::test]
    async fn cancellation_refunds_credits_and_frees_seat() {
        let store = MemoryStore::new();
        let session = seeded_session(&store, 5).await;
        let user = Uuid::new_v4();
        store
            .grant(CreditTransactionKind::Purchase, entry(user, 10))
            .await
            .unwrap();

        store.reserve_seats(session.id, 1).await.unwrap();
        let spend_ref = LedgerReference::booking(Uuid::new_v4());
        store
            .spend(LedgerEntry::new(user, 8, spend_ref, "class booking"))
            .await
            .unwrap();
        let booking = store
            .create_confirmed_credits(NewBooking {
                id: Uuid::new_v4(),
                user_id: user,
                class_id: session.id,
                attendee_count: 1,
                payment_method: PaymentMethod::Credits,
                amount_cents: 0,
                commission_cents: 0,
                payout_cents: 0,
                credits_used: 8,
                gateway_payment_id: None,
            })
            .await
            .unwrap();

        let cancelled = store
            .settle_cancellation(booking.id, CancellationRefund::Credits { amount: 8 })
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(store.balance(user).await.unwrap().balance, 10);
        let session = store.get_session(session.id).await.unwrap();
        assert_eq!(session.current_participants, 0);

        let again = store
            .settle_cancellation(booking.id, CancellationRefund::Credits { amount: 8 })
            .await;
        assert!(matches!(again, Err(AppError::BadRequest { .. })));
    }

    #[tokio::test]
    async fn transfer_lifecycle_marks_payouts() {
        let store = MemoryStore::new();
        let session = seeded_session(&store, 5).await;
        pending_card_booking(&store, &session, "pi_600").await;
        store.settle_card_success("pi_600").await.unwrap();

        let pending = store.pending_payouts().await.unwrap();
        assert_eq!(pending.len(), 1);
        let ids: Vec<Uuid> = pending.iter().map(|p| p.id).collect();

        let moved = store.mark_payouts_processing(&ids, "tr_1").await.unwrap();
        assert_eq!(moved, 1);
        assert!(store.pending_payouts().await.unwrap().is_empty());

        let settled = store.settle_transfer("tr_1", true).await.unwrap();
        assert_eq!(settled, 1);
        let payouts = store.list_payouts(session.instructor_id).await.unwrap();
        assert_eq!(payouts[0].status, PayoutStatus::Paid);
    }

    #[tokio::test]
    async fn duplicate_events_are_rejected_once_recorded() {
        let store = MemoryStore::new();
        let event = NewGatewayEventRecord {
            provider_event_id: "evt_1".to_string(),
            event_type: "payment_intent.succeeded".to_string(),
            gateway_payment_id: Some("pi_700".to_string()),
            payload: serde_json::json!({"id": "evt_1"}),
        };

        let first = store.record_event(event.clone()).await.unwrap();
        assert!(first.is_some());
        let second = store.record_event(event).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn booking_example_scenario() {
        // Balance 10, cost 8, four of five seats taken: booking succeeds,
        // balance 2, class full afterwards.
        let store = MemoryStore::new();
        let session = seeded_session(&store, 5).await;
        store.reserve_seats(session.id, 4).await.unwrap();

        let user = Uuid::new_v4();
        store
            .grant(CreditTransactionKind::Purchase, entry(user, 10))
            .await
            .unwrap();

        store.reserve_seats(session.id, 1).await.unwrap();
        store
            .spend(LedgerEntry::new(
                user,
                8,
                LedgerReference::booking(Uuid::new_v4()),
                "class booking",
            ))
            .await
            .unwrap();

        assert_eq!(store.balance(user).await.unwrap().balance, 2);
        let err = store.reserve_seats(session.id, 1).await.unwrap_err();
        assert!(matches!(err, AppError::ClassFull { .. }));
    }
}
