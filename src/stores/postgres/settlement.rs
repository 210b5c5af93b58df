//! Settlement transitions on PostgreSQL.
//!
//! Every `settle_*` method runs one local transaction whose first statement
//! is a conditional `UPDATE … WHERE status IN (…) RETURNING`. The status
//! filter is the idempotency gate: replays and out-of-order terminal events
//! match zero rows and come back as `AlreadySettled` without writing
//! anything.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use super::capacity::release_seats_in_conn;
use super::ledger::grant_in_conn;
use super::rows::{BookingRow, EventRow, NewEventRow, NewPaymentRow, PaymentRow, PayoutRow};
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    Booking, BookingStatus, CreditTransactionKind, GatewayEventRecord, InstructorPayout,
    LedgerEntry, LedgerReference, NewGatewayEventRecord, PaymentStatus, PayoutStatus,
    PurchaseStatus,
};
use crate::schema::{
    bookings, class_sessions, credit_pack_purchases, credit_packs, gateway_events,
    instructor_payouts, payments,
};
use crate::services::commission;
use crate::stores::{CancellationRefund, SettlementOutcome, SettlementStore, require_positive};

#[derive(Clone)]
pub struct PgSettlementStore {
    pool: AsyncDbPool,
}

impl PgSettlementStore {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

/// Charge rows are non-negative; refund rows reuse the table with negative
/// amounts and their own gateway ids.
async fn charge_by_gateway_id_in_conn(
    conn: &mut AsyncPgConnection,
    gateway_payment_id: &str,
) -> Result<Option<PaymentRow>, diesel::result::Error> {
    payments::table
        .filter(payments::gateway_payment_id.eq(gateway_payment_id))
        .filter(payments::amount_cents.ge(0))
        .select(PaymentRow::as_select())
        .first(conn)
        .await
        .optional()
}

async fn charge_for_booking_in_conn(
    conn: &mut AsyncPgConnection,
    booking_id: Uuid,
) -> Result<Option<PaymentRow>, diesel::result::Error> {
    payments::table
        .filter(payments::booking_id.eq(booking_id))
        .filter(payments::amount_cents.ge(0))
        .select(PaymentRow::as_select())
        .first(conn)
        .await
        .optional()
}

/// Inserts the negative refund row and flips the charge to `refunded` once
/// the booking is fully refunded. Returns whether the refund is now full.
async fn apply_refund_row_in_conn(
    conn: &mut AsyncPgConnection,
    charge: &PaymentRow,
    refund_id: &str,
    refund_cents: i64,
) -> Result<bool, diesel::result::Error> {
    diesel::insert_into(payments::table)
        .values(NewPaymentRow {
            booking_id: charge.booking_id,
            user_id: charge.user_id,
            gateway_payment_id: refund_id.to_string(),
            amount_cents: -refund_cents,
            currency: charge.currency.clone(),
            status: PaymentStatus::Refunded,
        })
        .execute(conn)
        .await?;

    // SUM(bigint) widens to numeric; cast back down for the integer ledger.
    let total_refunded: i64 = payments::table
        .filter(payments::booking_id.eq(charge.booking_id))
        .filter(payments::amount_cents.lt(0))
        .select(diesel::dsl::sql::<BigInt>(
            "COALESCE(SUM(-amount_cents), 0)::BIGINT",
        ))
        .first(conn)
        .await?;
    let full = total_refunded >= charge.amount_cents;

    if full {
        diesel::update(
            payments::table
                .filter(payments::id.eq(charge.id))
                .filter(payments::status.eq(PaymentStatus::Succeeded)),
        )
        .set(payments::status.eq(PaymentStatus::Refunded))
        .execute(conn)
        .await?;
    }
    Ok(full)
}

/// Shrinks the pending payout for `booking` by the payout share of the
/// refunded amount. Payouts already handed to a transfer are left alone and
/// flagged for manual follow-up.
async fn reverse_payout_in_conn(
    conn: &mut AsyncPgConnection,
    booking: &BookingRow,
    refunded_cents: i64,
) -> Result<(), diesel::result::Error> {
    let reversed = commission::reversal_split(
        booking.commission_cents,
        booking.amount_cents,
        refunded_cents,
    );
    // Successive partial refunds can round one cent past the remaining
    // payout; GREATEST keeps the row inside its non-negative check.
    let shrunk = diesel::update(
        instructor_payouts::table
            .filter(instructor_payouts::booking_id.eq(booking.id))
            .filter(instructor_payouts::status.eq(PayoutStatus::Pending)),
    )
    .set(
        instructor_payouts::amount_cents.eq(diesel::dsl::sql::<BigInt>(
            "GREATEST(amount_cents - ",
        )
        .bind::<BigInt, _>(reversed.payout_cents)
        .sql(", 0)")),
    )
    .execute(conn)
    .await?;

    if shrunk == 0 {
        let in_flight: Option<PayoutRow> = instructor_payouts::table
            .filter(instructor_payouts::booking_id.eq(booking.id))
            .select(PayoutRow::as_select())
            .first(conn)
            .await
            .optional()?;
        if let Some(payout) = in_flight {
            tracing::warn!(
                booking_id = %booking.id,
                payout_id = %payout.id,
                status = payout.status.as_str(),
                "refund reversal hit a payout already in flight, manual adjustment required"
            );
        }
    }
    Ok(())
}

#[async_trait]
impl SettlementStore for PgSettlementStore {
    async fn settle_card_success(&self, gateway_payment_id: &str) -> AppResult<SettlementOutcome> {
        let mut conn = self.pool.get().await?;
        conn.transaction::<SettlementOutcome, AppError, _>(|conn| {
            async move {
                let settled: Option<PaymentRow> = diesel::update(
                    payments::table
                        .filter(payments::gateway_payment_id.eq(gateway_payment_id))
                        .filter(payments::amount_cents.ge(0))
                        .filter(
                            payments::status
                                .eq_any([PaymentStatus::Pending, PaymentStatus::Processing]),
                        ),
                )
                .set(payments::status.eq(PaymentStatus::Succeeded))
                .returning(PaymentRow::as_returning())
                .get_result(conn)
                .await
                .optional()?;

                let Some(payment) = settled else {
                    return match charge_by_gateway_id_in_conn(conn, gateway_payment_id).await? {
                        Some(_) => Ok(SettlementOutcome::AlreadySettled),
                        None => Err(AppError::ReconciliationConflict {
                            message: format!(
                                "no payment record for gateway id {}",
                                gateway_payment_id
                            ),
                        }),
                    };
                };

                let booking: BookingRow = diesel::update(
                    bookings::table.filter(bookings::id.eq(payment.booking_id)),
                )
                .set(bookings::status.eq(BookingStatus::Confirmed))
                .returning(BookingRow::as_returning())
                .get_result(conn)
                .await?;

                if booking.payout_cents > 0 {
                    let instructor_id: Uuid = class_sessions::table
                        .find(booking.class_id)
                        .select(class_sessions::instructor_id)
                        .first(conn)
                        .await?;
                    diesel::insert_into(instructor_payouts::table)
                        .values((
                            instructor_payouts::instructor_id.eq(instructor_id),
                            instructor_payouts::booking_id.eq(booking.id),
                            instructor_payouts::amount_cents.eq(booking.payout_cents),
                            instructor_payouts::currency.eq(payment.currency.clone()),
                            instructor_payouts::status.eq(PayoutStatus::Pending),
                        ))
                        .on_conflict(instructor_payouts::booking_id)
                        .do_nothing()
                        .execute(conn)
                        .await?;
                }

                Ok(SettlementOutcome::Applied {
                    reference: booking.id,
                })
            }
            .scope_boxed()
        })
        .await
    }

    async fn settle_card_failure(
        &self,
        gateway_payment_id: &str,
        reason: &str,
    ) -> AppResult<SettlementOutcome> {
        let mut conn = self.pool.get().await?;
        conn.transaction::<SettlementOutcome, AppError, _>(|conn| {
            async move {
                let settled: Option<PaymentRow> = diesel::update(
                    payments::table
                        .filter(payments::gateway_payment_id.eq(gateway_payment_id))
                        .filter(payments::amount_cents.ge(0))
                        .filter(
                            payments::status
                                .eq_any([PaymentStatus::Pending, PaymentStatus::Processing]),
                        ),
                )
                .set((
                    payments::status.eq(PaymentStatus::Failed),
                    payments::failure_reason.eq(reason),
                ))
                .returning(PaymentRow::as_returning())
                .get_result(conn)
                .await
                .optional()?;

                let Some(payment) = settled else {
                    return match charge_by_gateway_id_in_conn(conn, gateway_payment_id).await? {
                        Some(_) => Ok(SettlementOutcome::AlreadySettled),
                        None => Err(AppError::ReconciliationConflict {
                            message: format!(
                                "no payment record for gateway id {}",
                                gateway_payment_id
                            ),
                        }),
                    };
                };

                let booking: BookingRow = diesel::update(
                    bookings::table.filter(bookings::id.eq(payment.booking_id)),
                )
                .set(bookings::status.eq(BookingStatus::Cancelled))
                .returning(BookingRow::as_returning())
                .get_result(conn)
                .await?;
                release_seats_in_conn(conn, booking.class_id, booking.attendee_count).await?;

                Ok(SettlementOutcome::Applied {
                    reference: booking.id,
                })
            }
            .scope_boxed()
        })
        .await
    }

    async fn settle_refund(
        &self,
        gateway_payment_id: &str,
        refund_id: &str,
        refunded_cents: i64,
    ) -> AppResult<SettlementOutcome> {
        require_positive("refunded_cents", refunded_cents)?;
        let mut conn = self.pool.get().await?;
        let result = conn
            .transaction::<SettlementOutcome, AppError, _>(|conn| {
                async move {
                    let seen: Option<Uuid> = payments::table
                        .filter(payments::gateway_payment_id.eq(refund_id))
                        .select(payments::id)
                        .first(conn)
                        .await
                        .optional()?;
                    if seen.is_some() {
                        return Ok(SettlementOutcome::AlreadySettled);
                    }

                    let Some(charge) =
                        charge_by_gateway_id_in_conn(conn, gateway_payment_id).await?
                    else {
                        return Err(AppError::ReconciliationConflict {
                            message: format!(
                                "refund for unknown gateway id {}",
                                gateway_payment_id
                            ),
                        });
                    };
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

                    let full =
                        apply_refund_row_in_conn(conn, &charge, refund_id, refunded_cents).await?;

                    let booking: BookingRow = bookings::table
                        .find(charge.booking_id)
                        .select(BookingRow::as_select())
                        .first(conn)
                        .await?;
                    reverse_payout_in_conn(conn, &booking, refunded_cents).await?;

                    if full {
                        let reversed = diesel::update(
                            bookings::table
                                .filter(bookings::id.eq(booking.id))
                                .filter(bookings::status.eq(BookingStatus::Confirmed)),
                        )
                        .set(bookings::status.eq(BookingStatus::Refunded))
                        .execute(conn)
                        .await?;
                        if reversed > 0 {
                            release_seats_in_conn(conn, booking.class_id, booking.attendee_count)
                                .await?;
                        }
                    }

                    Ok(SettlementOutcome::Applied {
                        reference: booking.id,
                    })
                }
                .scope_boxed()
            })
            .await;

        match result {
            // Lost the insert race to a concurrent delivery of the same
            // refund; its row is already in place.
            Err(AppError::Duplicate { .. }) => Ok(SettlementOutcome::AlreadySettled),
            other => other,
        }
    }

    async fn settle_purchase_success(
        &self,
        gateway_payment_id: &str,
    ) -> AppResult<SettlementOutcome> {
        let mut conn = self.pool.get().await?;
        conn.transaction::<SettlementOutcome, AppError, _>(|conn| {
            async move {
                let completed: Option<(Uuid, Uuid, Uuid, i64)> = diesel::update(
                    credit_pack_purchases::table
                        .filter(
                            credit_pack_purchases::gateway_payment_id.eq(gateway_payment_id),
                        )
                        .filter(credit_pack_purchases::status.eq(PurchaseStatus::Pending)),
                )
                .set(credit_pack_purchases::status.eq(PurchaseStatus::Completed))
                .returning((
                    credit_pack_purchases::id,
                    credit_pack_purchases::user_id,
                    credit_pack_purchases::pack_id,
                    credit_pack_purchases::credits,
                ))
                .get_result(conn)
                .await
                .optional()?;

                let Some((purchase_id, user_id, pack_id, credits)) = completed else {
                    let known: Option<Uuid> = credit_pack_purchases::table
                        .filter(
                            credit_pack_purchases::gateway_payment_id.eq(gateway_payment_id),
                        )
                        .select(credit_pack_purchases::id)
                        .first(conn)
                        .await
                        .optional()?;
                    return match known {
                        Some(_) => Ok(SettlementOutcome::AlreadySettled),
                        None => Err(AppError::ReconciliationConflict {
                            message: format!(
                                "no purchase for gateway id {}",
                                gateway_payment_id
                            ),
                        }),
                    };
                };

                let (pack_name, pack_credits): (String, i64) = credit_packs::table
                    .find(pack_id)
                    .select((credit_packs::name, credit_packs::credit_amount))
                    .first(conn)
                    .await?;

                // The purchase snapshots the total at checkout; split it
                // against the pack's base so later pack edits cannot change
                // what this purchase grants.
                let base = pack_credits.min(credits);
                let bonus = credits - base;

                grant_in_conn(
                    conn,
                    CreditTransactionKind::Purchase,
                    &LedgerEntry::new(
                        user_id,
                        base,
                        LedgerReference::purchase(purchase_id),
                        format!("purchase of {}", pack_name),
                    ),
                )
                .await?;
                if bonus > 0 {
                    grant_in_conn(
                        conn,
                        CreditTransactionKind::Bonus,
                        &LedgerEntry::new(
                            user_id,
                            bonus,
                            LedgerReference::purchase(purchase_id),
                            format!("bonus credits for {}", pack_name),
                        ),
                    )
                    .await?;
                }

                Ok(SettlementOutcome::Applied {
                    reference: purchase_id,
                })
            }
            .scope_boxed()
        })
        .await
    }

    async fn settle_purchase_failure(
        &self,
        gateway_payment_id: &str,
        reason: &str,
    ) -> AppResult<SettlementOutcome> {
        let mut conn = self.pool.get().await?;
        let failed: Option<Uuid> = diesel::update(
            credit_pack_purchases::table
                .filter(credit_pack_purchases::gateway_payment_id.eq(gateway_payment_id))
                .filter(credit_pack_purchases::status.eq(PurchaseStatus::Pending)),
        )
        .set((
            credit_pack_purchases::status.eq(PurchaseStatus::Failed),
            credit_pack_purchases::failure_reason.eq(reason),
        ))
        .returning(credit_pack_purchases::id)
        .get_result(&mut conn)
        .await
        .optional()?;

        match failed {
            Some(purchase_id) => Ok(SettlementOutcome::Applied {
                reference: purchase_id,
            }),
            None => {
                let known: Option<Uuid> = credit_pack_purchases::table
                    .filter(credit_pack_purchases::gateway_payment_id.eq(gateway_payment_id))
                    .select(credit_pack_purchases::id)
                    .first(&mut conn)
                    .await
                    .optional()?;
                match known {
                    Some(_) => Ok(SettlementOutcome::AlreadySettled),
                    None => Err(AppError::ReconciliationConflict {
                        message: format!("no purchase for gateway id {}", gateway_payment_id),
                    }),
                }
            }
        }
    }

    async fn settle_cancellation(
        &self,
        booking_id: Uuid,
        refund: CancellationRefund,
    ) -> AppResult<Booking> {
        let mut conn = self.pool.get().await?;
        let row = conn
            .transaction::<BookingRow, AppError, _>(|conn| {
                async move {
                    let cancelled: Option<BookingRow> = diesel::update(
                        bookings::table
                            .filter(bookings::id.eq(booking_id))
                            .filter(bookings::status.eq(BookingStatus::Confirmed)),
                    )
                    .set(bookings::status.eq(BookingStatus::Cancelled))
                    .returning(BookingRow::as_returning())
                    .get_result(conn)
                    .await
                    .optional()?;

                    let Some(booking) = cancelled else {
                        let status: Option<BookingStatus> = bookings::table
                            .find(booking_id)
                            .select(bookings::status)
                            .first(conn)
                            .await
                            .optional()?;
                        return match status {
                            Some(status) => Err(AppError::BadRequest {
                                message: format!(
                                    "booking {} cannot be cancelled from state {}",
                                    booking_id,
                                    status.as_str()
                                ),
                            }),
                            None => Err(AppError::NotFound {
                                entity: "Booking".to_string(),
                                field: "id".to_string(),
                                value: booking_id.to_string(),
                            }),
                        };
                    };

                    match &refund {
                        CancellationRefund::None => {}
                        CancellationRefund::Credits { amount } => {
                            grant_in_conn(
                                conn,
                                CreditTransactionKind::Refund,
                                &LedgerEntry::new(
                                    booking.user_id,
                                    *amount,
                                    LedgerReference::booking(booking_id),
                                    "booking cancellation refund".to_string(),
                                ),
                            )
                            .await?;
                        }
                        CancellationRefund::Card {
                            refund_id,
                            refund_cents,
                        } => {
                            let charge = charge_for_booking_in_conn(conn, booking_id)
                                .await?
                                .ok_or_else(|| AppError::Internal {
                                    source: anyhow::anyhow!(
                                        "no charge row for card booking {}",
                                        booking_id
                                    ),
                                })?;
                            apply_refund_row_in_conn(conn, &charge, refund_id, *refund_cents)
                                .await?;
                            reverse_payout_in_conn(conn, &booking, *refund_cents).await?;
                        }
                    }

                    release_seats_in_conn(conn, booking.class_id, booking.attendee_count).await?;
                    Ok(booking)
                }
                .scope_boxed()
            })
            .await?;
        Ok(row.into())
    }

    async fn pending_payouts(&self) -> AppResult<Vec<InstructorPayout>> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<PayoutRow> = instructor_payouts::table
            .filter(instructor_payouts::status.eq(PayoutStatus::Pending))
            .order(instructor_payouts::created_at.asc())
            .select(PayoutRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_payouts_processing(&self, ids: &[Uuid], transfer_id: &str) -> AppResult<usize> {
        let mut conn = self.pool.get().await?;
        let moved = diesel::update(
            instructor_payouts::table
                .filter(instructor_payouts::id.eq_any(ids.iter().copied()))
                .filter(instructor_payouts::status.eq(PayoutStatus::Pending)),
        )
        .set((
            instructor_payouts::status.eq(PayoutStatus::Processing),
            instructor_payouts::gateway_transfer_id.eq(transfer_id),
        ))
        .execute(&mut conn)
        .await?;
        Ok(moved)
    }

    async fn settle_transfer(&self, transfer_id: &str, succeeded: bool) -> AppResult<usize> {
        let next = if succeeded {
            PayoutStatus::Paid
        } else {
            PayoutStatus::Failed
        };
        let mut conn = self.pool.get().await?;
        let moved = diesel::update(
            instructor_payouts::table
                .filter(instructor_payouts::gateway_transfer_id.eq(transfer_id))
                .filter(instructor_payouts::status.eq(PayoutStatus::Processing)),
        )
        .set(instructor_payouts::status.eq(next))
        .execute(&mut conn)
        .await?;
        Ok(moved)
    }

    async fn list_payouts(&self, instructor_id: Uuid) -> AppResult<Vec<InstructorPayout>> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<PayoutRow> = instructor_payouts::table
            .filter(instructor_payouts::instructor_id.eq(instructor_id))
            .order(instructor_payouts::created_at.desc())
            .select(PayoutRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn record_event(
        &self,
        event: NewGatewayEventRecord,
    ) -> AppResult<Option<GatewayEventRecord>> {
        let mut conn = self.pool.get().await?;
        let row: Option<EventRow> = diesel::insert_into(gateway_events::table)
            .values(NewEventRow::from(event))
            .on_conflict(gateway_events::provider_event_id)
            .do_nothing()
            .returning(EventRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()?;
        Ok(row.map(Into::into))
    }

    async fn mark_event_processed(&self, id: Uuid) -> AppResult<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(gateway_events::table.filter(gateway_events::id.eq(id)))
            .set((
                gateway_events::processed.eq(true),
                gateway_events::error.eq(None::<String>),
                gateway_events::processed_at.eq(diesel::dsl::now),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn mark_event_failed(&self, id: Uuid, error: &str) -> AppResult<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(gateway_events::table.filter(gateway_events::id.eq(id)))
            .set((
                gateway_events::processed.eq(false),
                gateway_events::error.eq(error),
                gateway_events::processed_at.eq(diesel::dsl::now),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.pool.get().await?;
        diesel::sql_query("SELECT 1").execute(&mut conn).await?;
        Ok(())
    }
}
