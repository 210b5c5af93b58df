//! Webhook-driven settlement.
//!
//! Every gateway delivery lands in the event log first; only a first-time
//! event reaches the settlement stores, and those apply their own
//! terminal-state guards. A delivery is therefore safe to replay at both
//! layers.

use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};
use crate::gateway::GatewayEvent;
use crate::models::NewGatewayEventRecord;
use crate::stores::{SettlementOutcome, Stores};

/// How a webhook delivery was handled. All of these answer 200; only a
/// store failure bubbles up so the provider retries the delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// Settlement applied, or the underlying payment had already settled.
    Processed,
    /// The provider event id was seen before; nothing ran.
    Replayed,
    /// An event type this service does not handle.
    Ignored,
    /// The event references state we cannot reconcile; logged for review.
    Conflicted,
}

enum Dispatch {
    Settled,
    AlreadySettled,
    Unhandled,
}

fn payment_id_hint(event: &GatewayEvent) -> Option<String> {
    if let Some(intent_id) = &event.data.object.payment_intent {
        return Some(intent_id.clone());
    }
    if event.event_type.starts_with("payment_intent.") {
        return Some(event.data.object.id.clone());
    }
    None
}

#[derive(Clone)]
pub struct SettlementService {
    stores: Stores,
}

impl SettlementService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Dispatches one verified webhook event. `payload` is the raw body for
    /// the event log.
    pub async fn process_event(
        &self,
        event: GatewayEvent,
        payload: JsonValue,
    ) -> AppResult<WebhookDisposition> {
        let record = match self
            .stores
            .settlement
            .record_event(NewGatewayEventRecord {
                provider_event_id: event.id.clone(),
                event_type: event.event_type.clone(),
                gateway_payment_id: payment_id_hint(&event),
                payload,
            })
            .await?
        {
            Some(record) => record,
            None => {
                tracing::info!(event_id = %event.id, "webhook replay ignored");
                return Ok(WebhookDisposition::Replayed);
            }
        };

        match self.apply(&event).await {
            Ok(Dispatch::Settled) => {
                self.stores.settlement.mark_event_processed(record.id).await?;
                Ok(WebhookDisposition::Processed)
            }
            Ok(Dispatch::AlreadySettled) => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "settlement was already applied"
                );
                self.stores.settlement.mark_event_processed(record.id).await?;
                Ok(WebhookDisposition::Processed)
            }
            Ok(Dispatch::Unhandled) => {
                tracing::debug!(event_type = %event.event_type, "unhandled webhook event type");
                self.stores.settlement.mark_event_processed(record.id).await?;
                Ok(WebhookDisposition::Ignored)
            }
            Err(AppError::ReconciliationConflict { message }) => {
                tracing::warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    %message,
                    "webhook event did not reconcile"
                );
                self.stores
                    .settlement
                    .mark_event_failed(record.id, &message)
                    .await?;
                Ok(WebhookDisposition::Conflicted)
            }
            Err(error) => {
                self.stores
                    .settlement
                    .mark_event_failed(record.id, &error.to_string())
                    .await?;
                Err(error)
            }
        }
    }

    async fn apply(&self, event: &GatewayEvent) -> AppResult<Dispatch> {
        let object = &event.data.object;
        let outcome = match event.event_type.as_str() {
            // Intent ids serve both bookings and pack purchases; a conflict
            // from the booking side means the id belongs to the other.
            "payment_intent.succeeded" => {
                match self.stores.settlement.settle_card_success(&object.id).await {
                    Err(AppError::ReconciliationConflict { .. }) => {
                        self.stores
                            .settlement
                            .settle_purchase_success(&object.id)
                            .await?
                    }
                    other => other?,
                }
            }
            "payment_intent.payment_failed" => {
                let reason = object
                    .failure_message
                    .as_deref()
                    .unwrap_or("payment failed");
                match self
                    .stores
                    .settlement
                    .settle_card_failure(&object.id, reason)
                    .await
                {
                    Err(AppError::ReconciliationConflict { .. }) => {
                        self.stores
                            .settlement
                            .settle_purchase_failure(&object.id, reason)
                            .await?
                    }
                    other => other?,
                }
            }
            "charge.refunded" => {
                let intent_id = object.payment_intent.as_deref().ok_or_else(|| {
                    AppError::ReconciliationConflict {
                        message: format!("refund event {} carries no payment intent", event.id),
                    }
                })?;
                let refund = object
                    .refunds
                    .as_ref()
                    .and_then(|list| list.data.first())
                    .ok_or_else(|| AppError::ReconciliationConflict {
                        message: format!("refund event {} carries no refund object", event.id),
                    })?;
                self.stores
                    .settlement
                    .settle_refund(intent_id, &refund.id, refund.amount)
                    .await?
            }
            "payout.paid" | "payout.failed" => {
                let succeeded = event.event_type == "payout.paid";
                let moved = self
                    .stores
                    .settlement
                    .settle_transfer(&object.id, succeeded)
                    .await?;
                if moved == 0 {
                    tracing::warn!(
                        transfer_id = %object.id,
                        "transfer confirmation matched no processing payouts"
                    );
                    return Ok(Dispatch::AlreadySettled);
                }
                tracing::info!(
                    transfer_id = %object.id,
                    payouts = moved,
                    succeeded,
                    "transfer confirmation settled payouts"
                );
                return Ok(Dispatch::Settled);
            }
            _ => return Ok(Dispatch::Unhandled),
        };
        match outcome {
            SettlementOutcome::Applied { .. } => Ok(Dispatch::Settled),
            SettlementOutcome::AlreadySettled => Ok(Dispatch::AlreadySettled),
        }
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use uuid::Uuid;

    use super::*;
    use crate::gateway::types::{GatewayEventData, GatewayObject, RefundList, RefundObject};
    use crate::models::{
        Booking, BookingStatus, ClassSession, NewBooking, NewClassSession, NewPaymentRecord,
        PaymentMethod, PaymentStatus, PayoutStatus,
    };

    fn service() -> (SettlementService, Stores) {
        let stores = Stores::memory();
        (SettlementService::new(stores.clone()), stores)
    }

    fn object(id: &str) -> GatewayObject {
        GatewayObject {
            id: id.to_string(),
            payment_intent: None,
            amount: None,
            currency: None,
            failure_message: None,
            refunds: None,
        }
    }

    fn event(id: &str, event_type: &str, object: GatewayObject) -> GatewayEvent {
        GatewayEvent {
            id: id.to_string(),
            event_type: event_type.to_string(),
            data: GatewayEventData { object },
        }
    }

    async fn seed_card_booking(stores: &Stores, intent_id: &str) -> (Booking, ClassSession) {
        let session = stores
            .capacity
            .insert_session(NewClassSession {
                instructor_id: Uuid::new_v4(),
                name: "Evening Pilates".to_string(),
                price_cents: 2000,
                credit_cost: 8,
                allow_credit_payment: true,
                max_participants: 10,
                starts_at: Timestamp::now() + jiff::SignedDuration::from_hours(48),
                cancel_window_hours: 24,
                refund_percent: 100,
            })
            .await
            .unwrap();
        stores.capacity.reserve_seats(session.id, 1).await.unwrap();
        let booking_id = Uuid::new_v4();
        let (booking, _) = stores
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
                    gateway_payment_id: Some(intent_id.to_string()),
                },
                NewPaymentRecord {
                    booking_id,
                    user_id: Uuid::new_v4(),
                    gateway_payment_id: intent_id.to_string(),
                    amount_cents: 2000,
                    currency: "usd".to_string(),
                    status: PaymentStatus::Processing,
                },
            )
            .await
            .unwrap();
        (booking, session)
    }

    #[tokio::test]
    async fn success_event_confirms_and_replay_short_circuits() {
        let (service, stores) = service();
        let (booking, _) = seed_card_booking(&stores, "pi_1").await;

        let first = service
            .process_event(event("evt_1", "payment_intent.succeeded", object("pi_1")), JsonValue::Null)
            .await
            .unwrap();
        assert_eq!(first, WebhookDisposition::Processed);
        let booking = stores.bookings.get(booking.id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);

        let replay = service
            .process_event(event("evt_1", "payment_intent.succeeded", object("pi_1")), JsonValue::Null)
            .await
            .unwrap();
        assert_eq!(replay, WebhookDisposition::Replayed);
    }

    #[tokio::test]
    async fn redelivery_under_a_new_event_id_settles_once() {
        let (service, stores) = service();
        let (booking, _) = seed_card_booking(&stores, "pi_1").await;

        service
            .process_event(event("evt_1", "payment_intent.succeeded", object("pi_1")), JsonValue::Null)
            .await
            .unwrap();
        let second = service
            .process_event(event("evt_2", "payment_intent.succeeded", object("pi_1")), JsonValue::Null)
            .await
            .unwrap();

        assert_eq!(second, WebhookDisposition::Processed);
        let booking = stores.bookings.get(booking.id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        // One payout accrued, not two.
        assert_eq!(stores.settlement.pending_payouts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failure_event_cancels_and_releases_seats() {
        let (service, stores) = service();
        let (booking, session) = seed_card_booking(&stores, "pi_1").await;

        let mut failed = object("pi_1");
        failed.failure_message = Some("card declined".to_string());
        let disposition = service
            .process_event(event("evt_1", "payment_intent.payment_failed", failed), JsonValue::Null)
            .await
            .unwrap();

        assert_eq!(disposition, WebhookDisposition::Processed);
        let booking = stores.bookings.get(booking.id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        let session = stores.capacity.get_session(session.id).await.unwrap();
        assert_eq!(session.current_participants, 0);
    }

    #[tokio::test]
    async fn purchase_intent_falls_through_to_the_purchase_path() {
        let (service, stores) = service();
        let pack = stores
            .packs
            .insert_pack(crate::models::CreditPack {
                id: Uuid::new_v4(),
                name: "Value".to_string(),
                credit_amount: 20,
                bonus_credits: 5,
                price_cents: 4500,
                active: true,
                created_at: Timestamp::now(),
            })
            .await
            .unwrap();
        let user = Uuid::new_v4();
        stores
            .packs
            .create_pending_purchase(crate::models::NewCreditPackPurchase {
                user_id: user,
                pack_id: pack.id,
                credits: 25,
                amount_cents: 4500,
                gateway_payment_id: Some("pi_pack".to_string()),
            })
            .await
            .unwrap();

        let disposition = service
            .process_event(
                event("evt_1", "payment_intent.succeeded", object("pi_pack")),
                JsonValue::Null,
            )
            .await
            .unwrap();

        assert_eq!(disposition, WebhookDisposition::Processed);
        assert_eq!(stores.ledger.balance(user).await.unwrap().balance, 25);
    }

    #[tokio::test]
    async fn full_refund_event_flips_the_booking() {
        let (service, stores) = service();
        let (booking, session) = seed_card_booking(&stores, "pi_1").await;
        service
            .process_event(event("evt_1", "payment_intent.succeeded", object("pi_1")), JsonValue::Null)
            .await
            .unwrap();

        let mut refunded = object("ch_1");
        refunded.payment_intent = Some("pi_1".to_string());
        refunded.refunds = Some(RefundList {
            data: vec![RefundObject {
                id: "re_1".to_string(),
                amount: 2000,
            }],
        });
        let disposition = service
            .process_event(event("evt_2", "charge.refunded", refunded), JsonValue::Null)
            .await
            .unwrap();

        assert_eq!(disposition, WebhookDisposition::Processed);
        let booking = stores.bookings.get(booking.id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Refunded);
        let session = stores.capacity.get_session(session.id).await.unwrap();
        assert_eq!(session.current_participants, 0);
    }

    #[tokio::test]
    async fn refund_event_without_refund_objects_is_conflicted() {
        let (service, stores) = service();
        seed_card_booking(&stores, "pi_1").await;

        let mut refunded = object("ch_1");
        refunded.payment_intent = Some("pi_1".to_string());
        let disposition = service
            .process_event(event("evt_1", "charge.refunded", refunded), JsonValue::Null)
            .await
            .unwrap();

        assert_eq!(disposition, WebhookDisposition::Conflicted);
    }

    #[tokio::test]
    async fn unknown_event_types_are_ignored() {
        let (service, _) = service();
        let disposition = service
            .process_event(event("evt_1", "customer.created", object("cus_1")), JsonValue::Null)
            .await
            .unwrap();
        assert_eq!(disposition, WebhookDisposition::Ignored);
    }

    #[tokio::test]
    async fn transfer_confirmation_marks_payouts_paid() {
        let (service, stores) = service();
        let (_, session) = seed_card_booking(&stores, "pi_1").await;
        service
            .process_event(event("evt_1", "payment_intent.succeeded", object("pi_1")), JsonValue::Null)
            .await
            .unwrap();
        let pending = stores.settlement.pending_payouts().await.unwrap();
        let ids: Vec<Uuid> = pending.iter().map(|p| p.id).collect();
        stores
            .settlement
            .mark_payouts_processing(&ids, "tr_1")
            .await
            .unwrap();

        let disposition = service
            .process_event(event("evt_2", "payout.paid", object("tr_1")), JsonValue::Null)
            .await
            .unwrap();

        assert_eq!(disposition, WebhookDisposition::Processed);
        let payouts = stores
            .settlement
            .list_payouts(session.instructor_id)
            .await
            .unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].status, PayoutStatus::Paid);
        assert_eq!(payouts[0].gateway_transfer_id.as_deref(), Some("tr_1"));
    }
}
