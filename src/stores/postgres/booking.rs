//! Booking rows and their charge records on PostgreSQL.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use jiff::Timestamp;
use uuid::Uuid;

use super::rows::{BookingRow, NewBookingRow, NewPaymentRow, PaymentRow, to_db};
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{Booking, BookingStatus, NewBooking, NewPaymentRecord, PaymentRecord};
use crate::schema::{bookings, payments};
use crate::stores::BookingStore;

#[derive(Clone)]
pub struct PgBookingStore {
    pool: AsyncDbPool,
}

impl PgBookingStore {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn create_confirmed_credits(&self, booking: NewBooking) -> AppResult<Booking> {
        let mut conn = self.pool.get().await?;
        let row: BookingRow = diesel::insert_into(bookings::table)
            .values(NewBookingRow {
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
            })
            .returning(BookingRow::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(row.into())
    }

    async fn create_pending_card(
        &self,
        booking: NewBooking,
        payment: NewPaymentRecord,
    ) -> AppResult<(Booking, PaymentRecord)> {
        let mut conn = self.pool.get().await?;
        let (booking_row, payment_row) = conn
            .transaction::<(BookingRow, PaymentRow), AppError, _>(|conn| {
                async move {
                    let booking_row: BookingRow = diesel::insert_into(bookings::table)
                        .values(NewBookingRow {
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
                        })
                        .returning(BookingRow::as_returning())
                        .get_result(conn)
                        .await?;

                    let payment_row: PaymentRow = diesel::insert_into(payments::table)
                        .values(NewPaymentRow {
                            booking_id: booking_row.id,
                            user_id: payment.user_id,
                            gateway_payment_id: payment.gateway_payment_id,
                            amount_cents: payment.amount_cents,
                            currency: payment.currency,
                            status: payment.status,
                        })
                        .returning(PaymentRow::as_returning())
                        .get_result(conn)
                        .await?;

                    Ok((booking_row, payment_row))
                }
                .scope_boxed()
            })
            .await?;
        Ok((booking_row.into(), payment_row.into()))
    }

    async fn get(&self, id: Uuid) -> AppResult<Booking> {
        let mut conn = self.pool.get().await?;
        let row: Option<BookingRow> = bookings::table
            .find(id)
            .select(BookingRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(Into::into).ok_or_else(|| AppError::NotFound {
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
        let mut conn = self.pool.get().await?;
        let rows: Vec<BookingRow> = bookings::table
            .filter(bookings::user_id.eq(user_id))
            .order(bookings::created_at.desc())
            .limit(limit.max(0))
            .offset(offset.max(0))
            .select(BookingRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn stale_pending(
        &self,
        cutoff: Timestamp,
    ) -> AppResult<Vec<(Booking, PaymentRecord)>> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<(BookingRow, PaymentRow)> = bookings::table
            .inner_join(payments::table)
            .filter(bookings::status.eq(BookingStatus::Pending))
            .filter(bookings::created_at.lt(to_db(cutoff)))
            .filter(payments::amount_cents.ge(0))
            .order(bookings::created_at.asc())
            .select((BookingRow::as_select(), PaymentRow::as_select()))
            .load(&mut conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(b, p)| (b.into(), p.into()))
            .collect())
    }
}
