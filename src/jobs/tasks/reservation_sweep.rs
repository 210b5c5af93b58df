//! Expiry of card reservations whose payment never confirmed.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};

use crate::error::AppResult;
use crate::gateway::{GatewayError, PaymentGateway, RetryPolicy, with_retries};
use crate::jobs::tasks::ScheduledTask;
use crate::stores::Stores;

/// Cancels pending card bookings older than the reservation TTL.
///
/// The intent is cancelled at the gateway before the local expiry, so a
/// charge can never land on a reservation this sweep already gave up. An
/// intent the gateway refuses to cancel has reached a terminal state there;
/// its webhook settles the booking instead.
pub struct ReservationSweepTask {
    stores: Stores,
    gateway: Arc<dyn PaymentGateway>,
    retry: RetryPolicy,
    ttl: SignedDuration,
}

impl ReservationSweepTask {
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        retry: RetryPolicy,
        ttl_minutes: i64,
    ) -> Self {
        Self {
            stores,
            gateway,
            retry,
            ttl: SignedDuration::from_mins(ttl_minutes),
        }
    }
}

#[async_trait]
impl ScheduledTask for ReservationSweepTask {
    fn name(&self) -> &'static str {
        "reservation_sweep"
    }

    async fn run(&self) -> AppResult<()> {
        let cutoff = Timestamp::now() - self.ttl;
        let stale = self.stores.bookings.stale_pending(cutoff).await?;
        if stale.is_empty() {
            return Ok(());
        }

        let mut expired = 0usize;
        for (booking, payment) in stale {
            let intent_id = payment.gateway_payment_id.clone();
            match with_retries(&self.retry, "cancel_payment_intent", || {
                self.gateway.cancel_payment_intent(&intent_id)
            })
            .await
            {
                Ok(_) => {}
                Err(GatewayError::Permanent { message }) => {
                    tracing::warn!(
                        booking_id = %booking.id,
                        intent_id = %intent_id,
                        %message,
                        "intent no longer cancellable, leaving the reservation for its webhook"
                    );
                    continue;
                }
                Err(GatewayError::Retryable { message }) => {
                    tracing::warn!(
                        booking_id = %booking.id,
                        intent_id = %intent_id,
                        %message,
                        "gateway unavailable, retrying on the next sweep"
                    );
                    continue;
                }
            }

            self.stores
                .settlement
                .settle_card_failure(&intent_id, "reservation expired")
                .await?;
            expired += 1;
        }
        if expired > 0 {
            tracing::info!(expired, "expired stale reservations");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::gateway::{ChargeRequest, MockGateway};
    use crate::models::{
        BookingStatus, NewBooking, NewClassSession, NewPaymentRecord, PaymentMethod, PaymentStatus,
    };

    fn task(stores: Stores, gateway: Arc<MockGateway>, ttl_minutes: i64) -> ReservationSweepTask {
        ReservationSweepTask::new(
            stores,
            gateway,
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
            ttl_minutes,
        )
    }

    async fn seed_pending_booking(stores: &Stores, gateway: &MockGateway) -> (Uuid, Uuid, String) {
        let session = stores
            .capacity
            .insert_session(NewClassSession {
                instructor_id: Uuid::new_v4(),
                name: "Evening Pilates".to_string(),
                price_cents: 2000,
                credit_cost: 8,
                allow_credit_payment: true,
                max_participants: 10,
                starts_at: Timestamp::now() + SignedDuration::from_hours(48),
                cancel_window_hours: 24,
                refund_percent: 100,
            })
            .await
            .unwrap();
        stores.capacity.reserve_seats(session.id, 1).await.unwrap();
        let intent = gateway
            .create_payment_intent(ChargeRequest {
                amount_cents: 2000,
                currency: "usd".to_string(),
                description: "booking".to_string(),
                application_fee_cents: Some(300),
                destination_account: Some(session.instructor_id.to_string()),
                metadata: Vec::new(),
            })
            .await
            .unwrap();
        let booking_id = Uuid::new_v4();
        stores
            .bookings
            .create_pending_card(
                NewBooking {
                    id: booking_id,
                    user_id: Uuid::new_v4(),
                    class_id: session.id,
                    attendee_count: 1,
                    payment_method: PaymentMethod::Card,
                    amount_cents: 2000,
                    commission_cents: 300,
                    payout_cents: 1700,
                    credits_used: 0,
                    gateway_payment_id: Some(intent.id.clone()),
                },
                NewPaymentRecord {
                    booking_id,
                    user_id: Uuid::new_v4(),
                    gateway_payment_id: intent.id.clone(),
                    amount_cents: 2000,
                    currency: "usd".to_string(),
                    status: PaymentStatus::Processing,
                },
            )
            .await
            .unwrap();
        (booking_id, session.id, intent.id)
    }

    #[tokio::test]
    async fn stale_reservations_are_cancelled_and_seats_released() {
        let stores = Stores::memory();
        let gateway = Arc::new(MockGateway::new());
        let (booking_id, session_id, intent_id) =
            seed_pending_booking(&stores, &gateway).await;

        task(stores.clone(), gateway.clone(), 0).run().await.unwrap();

        let booking = stores.bookings.get(booking_id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        let session = stores.capacity.get_session(session_id).await.unwrap();
        assert_eq!(session.current_participants, 0);
        assert_eq!(gateway.intent(&intent_id).unwrap().status, "canceled");
    }

    #[tokio::test]
    async fn fresh_reservations_survive_the_sweep() {
        let stores = Stores::memory();
        let gateway = Arc::new(MockGateway::new());
        let (booking_id, _, _) = seed_pending_booking(&stores, &gateway).await;

        task(stores.clone(), gateway, 60).run().await.unwrap();

        let booking = stores.bookings.get(booking_id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn uncancellable_intents_keep_their_reservation() {
        let stores = Stores::memory();
        let gateway = Arc::new(MockGateway::new());
        let (booking_id, _, intent_id) = seed_pending_booking(&stores, &gateway).await;
        gateway.reject_everything(true);

        task(stores.clone(), gateway.clone(), 0).run().await.unwrap();

        // The booking stays pending for its webhook to settle.
        let booking = stores.bookings.get(booking_id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        gateway.reject_everything(false);
        stores
            .settlement
            .settle_card_success(&intent_id)
            .await
            .unwrap();
        let booking = stores.bookings.get(booking_id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
    }
}
