//! Booking coordination.
//!
//! Both booking paths are sagas over independent stores: reserve seats,
//! take the money (ledger debit or gateway intent), persist the booking.
//! Later steps failing undo the earlier ones; a compensation step failing
//! is escalated as `CompensationFailure` for manual reconciliation.

use std::sync::Arc;

use jiff::Timestamp;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::gateway::{ChargeRequest, PaymentGateway, RetryPolicy, with_retries};
use crate::models::{
    Booking, BookingStatus, ClassSession, CreditTransactionKind, LedgerEntry, LedgerReference,
    NewBooking, NewPaymentRecord, PaymentMethod, PaymentStatus,
};
use crate::services::commission::CommissionSchedule;
use crate::stores::{CancellationRefund, Stores};

/// Result of a booking request. Card and wallet bookings carry the client
/// secret the payment page confirms; credits bookings are already
/// confirmed.
#[derive(Debug, Clone)]
pub struct BookingConfirmation {
    pub booking: Booking,
    pub client_secret: Option<String>,
}

/// Result of a cancellation, with whichever refund leg applied.
#[derive(Debug, Clone)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub refunded_credits: i64,
    pub refunded_cents: i64,
    pub gateway_refund_id: Option<String>,
}

/// Refund due when cancelling `remaining_secs` before start: the full
/// `refund_percent` share outside the window, linearly pro-rated down to
/// zero inside it. Integer math floors in the studio's favor.
fn prorated_refund(
    base: i64,
    refund_percent: i32,
    remaining_secs: i64,
    window_secs: i64,
) -> i64 {
    if base <= 0 || refund_percent <= 0 || remaining_secs <= 0 {
        return 0;
    }
    if window_secs <= 0 || remaining_secs >= window_secs {
        return (base as i128 * refund_percent as i128 / 100) as i64;
    }
    (base as i128 * refund_percent as i128 * remaining_secs as i128
        / (100i128 * window_secs as i128)) as i64
}

#[derive(Clone)]
pub struct BookingService {
    stores: Stores,
    gateway: Arc<dyn PaymentGateway>,
    schedule: CommissionSchedule,
    retry: RetryPolicy,
    currency: String,
}

impl BookingService {
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        schedule: CommissionSchedule,
        retry: RetryPolicy,
        currency: String,
    ) -> Self {
        Self {
            stores,
            gateway,
            schedule,
            retry,
            currency,
        }
    }

    /// Books `attendee_count` seats, paying with the requested method.
    pub async fn book(
        &self,
        user_id: Uuid,
        class_id: Uuid,
        attendee_count: i32,
        payment_method: PaymentMethod,
    ) -> AppResult<BookingConfirmation> {
        let session = self.stores.capacity.get_session(class_id).await?;
        if payment_method.uses_gateway() {
            self.book_with_card(user_id, session, attendee_count, payment_method)
                .await
        } else {
            let booking = self
                .book_with_credits(user_id, session, attendee_count)
                .await?;
            Ok(BookingConfirmation {
                booking,
                client_secret: None,
            })
        }
    }

    async fn book_with_credits(
        &self,
        user_id: Uuid,
        session: ClassSession,
        attendee_count: i32,
    ) -> AppResult<Booking> {
        if !session.allow_credit_payment {
            return Err(AppError::UnprocessableContent {
                message: format!("class {} does not accept credit payment", session.id),
            });
        }
        let credits_required = session.credit_cost * attendee_count as i64;
        let booking_id = Uuid::new_v4();
        let reference = LedgerReference::booking(booking_id);

        self.stores
            .capacity
            .reserve_seats(session.id, attendee_count)
            .await?;

        let spend = self
            .stores
            .ledger
            .spend(LedgerEntry::new(
                user_id,
                credits_required,
                reference.clone(),
                format!("booking for {}", session.name),
            ))
            .await;
        if let Err(spend_error) = spend {
            return Err(self
                .release_or_escalate(session.id, attendee_count, booking_id, spend_error)
                .await);
        }

        let created = self
            .stores
            .bookings
            .create_confirmed_credits(NewBooking {
                id: booking_id,
                user_id,
                class_id: session.id,
                attendee_count,
                payment_method: PaymentMethod::Credits,
                amount_cents: 0,
                commission_cents: 0,
                payout_cents: 0,
                credits_used: credits_required,
                gateway_payment_id: None,
            })
            .await;

        match created {
            Ok(booking) => Ok(booking),
            Err(insert_error) => {
                let mut compensated = true;
                if let Err(error) = self
                    .stores
                    .ledger
                    .grant(
                        CreditTransactionKind::Refund,
                        LedgerEntry::new(
                            user_id,
                            credits_required,
                            reference,
                            "booking rollback".to_string(),
                        ),
                    )
                    .await
                {
                    compensated = false;
                    tracing::error!(
                        booking_id = %booking_id,
                        %error,
                        "failed to refund credits while rolling back a booking"
                    );
                }
                if let Err(error) = self
                    .stores
                    .capacity
                    .release_seats(session.id, attendee_count)
                    .await
                {
                    compensated = false;
                    tracing::error!(
                        booking_id = %booking_id,
                        %error,
                        "failed to release seats while rolling back a booking"
                    );
                }
                if compensated {
                    Err(insert_error)
                } else {
                    Err(AppError::CompensationFailure {
                        context: format!("rollback of booking {}", booking_id),
                        source: anyhow::Error::new(insert_error),
                    })
                }
            }
        }
    }

    async fn book_with_card(
        &self,
        user_id: Uuid,
        session: ClassSession,
        attendee_count: i32,
        payment_method: PaymentMethod,
    ) -> AppResult<BookingConfirmation> {
        let amount_cents = session.price_cents * attendee_count as i64;
        let split = self
            .schedule
            .policy_for(session.instructor_id)
            .split(amount_cents);
        let booking_id = Uuid::new_v4();

        self.stores
            .capacity
            .reserve_seats(session.id, attendee_count)
            .await?;

        let request = ChargeRequest {
            amount_cents,
            currency: self.currency.clone(),
            description: format!("booking for {}", session.name),
            application_fee_cents: Some(split.fee_cents),
            destination_account: Some(session.instructor_id.to_string()),
            metadata: vec![
                ("booking_id".to_string(), booking_id.to_string()),
                ("user_id".to_string(), user_id.to_string()),
                ("class_id".to_string(), session.id.to_string()),
            ],
        };
        let intent = match with_retries(&self.retry, "create_payment_intent", || {
            self.gateway.create_payment_intent(request.clone())
        })
        .await
        {
            Ok(intent) => intent,
            Err(gateway_error) => {
                return Err(self
                    .release_or_escalate(
                        session.id,
                        attendee_count,
                        booking_id,
                        gateway_error.into_exhausted(),
                    )
                    .await);
            }
        };

        let created = self
            .stores
            .bookings
            .create_pending_card(
                NewBooking {
                    id: booking_id,
                    user_id,
                    class_id: session.id,
                    attendee_count,
                    payment_method,
                    amount_cents,
                    commission_cents: split.fee_cents,
                    payout_cents: split.payout_cents,
                    credits_used: 0,
                    gateway_payment_id: Some(intent.id.clone()),
                },
                NewPaymentRecord {
                    booking_id,
                    user_id,
                    gateway_payment_id: intent.id.clone(),
                    amount_cents,
                    currency: intent.currency.clone(),
                    status: PaymentStatus::Processing,
                },
            )
            .await;

        match created {
            Ok((booking, _payment)) => Ok(BookingConfirmation {
                booking,
                client_secret: Some(intent.client_secret),
            }),
            Err(persist_error) => {
                // The unconfirmed intent expires at the gateway on its own.
                tracing::warn!(
                    booking_id = %booking_id,
                    intent_id = %intent.id,
                    "discarding payment intent after persistence failure"
                );
                Err(self
                    .release_or_escalate(session.id, attendee_count, booking_id, persist_error)
                    .await)
            }
        }
    }

    /// Releases reserved seats on a failed saga step. Returns the original
    /// error, or `CompensationFailure` when the release itself fails.
    async fn release_or_escalate(
        &self,
        class_id: Uuid,
        attendee_count: i32,
        booking_id: Uuid,
        original: AppError,
    ) -> AppError {
        if let Err(error) = self
            .stores
            .capacity
            .release_seats(class_id, attendee_count)
            .await
        {
            tracing::error!(
                booking_id = %booking_id,
                %error,
                "failed to release seats while rolling back a booking"
            );
            return AppError::CompensationFailure {
                context: format!("rollback of booking {}", booking_id),
                source: anyhow::Error::new(original),
            };
        }
        original
    }

    pub async fn get_booking(&self, id: Uuid) -> AppResult<Booking> {
        self.stores.bookings.get(id).await
    }

    pub async fn list_bookings(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Booking>> {
        self.stores.bookings.list_for_user(user_id, limit, offset).await
    }

    /// Cancels a confirmed booking and applies the policy refund: the full
    /// `refund_percent` share outside the cancellation window, pro-rated
    /// inside it, nothing once the class started.
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        reason: Option<String>,
    ) -> AppResult<CancellationOutcome> {
        let booking = self.stores.bookings.get(booking_id).await?;
        if booking.status != BookingStatus::Confirmed {
            return Err(AppError::BadRequest {
                message: format!(
                    "booking {} cannot be cancelled from state {}",
                    booking_id,
                    booking.status.as_str()
                ),
            });
        }
        let session = self.stores.capacity.get_session(booking.class_id).await?;

        let refund_base = if booking.payment_method == PaymentMethod::Credits {
            booking.credits_used
        } else {
            booking.amount_cents
        };
        let remaining_secs = session.starts_at.as_second() - Timestamp::now().as_second();
        let refund_amount = prorated_refund(
            refund_base,
            session.refund_percent,
            remaining_secs,
            session.cancel_window_hours as i64 * 3600,
        );

        let leg = if refund_amount <= 0 {
            CancellationRefund::None
        } else if booking.payment_method == PaymentMethod::Credits {
            CancellationRefund::Credits {
                amount: refund_amount,
            }
        } else {
            let intent_id =
                booking
                    .gateway_payment_id
                    .clone()
                    .ok_or_else(|| AppError::Internal {
                        source: anyhow::anyhow!(
                            "card booking {} has no gateway payment id",
                            booking_id
                        ),
                    })?;
            let refund = with_retries(&self.retry, "create_refund", || {
                self.gateway.create_refund(&intent_id, refund_amount, true)
            })
            .await
            .map_err(|e| e.into_exhausted())?;
            CancellationRefund::Card {
                refund_id: refund.id,
                refund_cents: refund.amount_cents,
            }
        };

        let (refunded_credits, refunded_cents, gateway_refund_id) = match &leg {
            CancellationRefund::None => (0, 0, None),
            CancellationRefund::Credits { amount } => (*amount, 0, None),
            CancellationRefund::Card {
                refund_id,
                refund_cents,
            } => (0, *refund_cents, Some(refund_id.clone())),
        };

        match self
            .stores
            .settlement
            .settle_cancellation(booking_id, leg.clone())
            .await
        {
            Ok(booking) => {
                tracing::info!(
                    booking_id = %booking_id,
                    reason = reason.as_deref().unwrap_or(""),
                    refunded_credits,
                    refunded_cents,
                    "booking cancelled"
                );
                Ok(CancellationOutcome {
                    booking,
                    refunded_credits,
                    refunded_cents,
                    gateway_refund_id,
                })
            }
            Err(error) => {
                if matches!(leg, CancellationRefund::Card { .. }) {
                    tracing::error!(
                        booking_id = %booking_id,
                        %error,
                        "gateway refund issued but cancellation did not settle, manual reconciliation required"
                    );
                }
                Err(error)
            }
        }
    }
}
