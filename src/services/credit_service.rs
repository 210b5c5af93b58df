//! Credit pack checkout and ledger reads.
//!
//! Buying a pack only creates the gateway intent and a pending purchase
//! row; the credits themselves are granted when the gateway confirms the
//! charge through the webhook settlement path.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::gateway::{ChargeRequest, PaymentGateway, RetryPolicy, with_retries};
use crate::models::{
    CreditBalance, CreditPack, CreditPackPurchase, CreditTransaction, NewCreditPackPurchase,
};
use crate::stores::Stores;

/// Upper bound on one page of ledger history.
const MAX_PAGE_SIZE: i64 = 100;

/// A pending purchase plus the client secret the payment page confirms.
#[derive(Debug, Clone)]
pub struct PurchaseCheckout {
    pub purchase: CreditPackPurchase,
    pub client_secret: String,
}

/// Materialized balance checked against a replay of the transaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditAudit {
    pub user_id: Uuid,
    pub materialized: i64,
    pub replayed: i64,
    pub consistent: bool,
}

#[derive(Clone)]
pub struct CreditService {
    stores: Stores,
    gateway: Arc<dyn PaymentGateway>,
    retry: RetryPolicy,
    currency: String,
}

impl CreditService {
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        retry: RetryPolicy,
        currency: String,
    ) -> Self {
        Self {
            stores,
            gateway,
            retry,
            currency,
        }
    }

    pub async fn balance(&self, user_id: Uuid) -> AppResult<CreditBalance> {
        self.stores.ledger.balance(user_id).await
    }

    /// One page of ledger history, newest first. Pages start at 1.
    pub async fn transactions(
        &self,
        user_id: Uuid,
        page: i64,
        page_size: i64,
    ) -> AppResult<Vec<CreditTransaction>> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self.stores
            .ledger
            .transactions(user_id, page_size, (page - 1) * page_size)
            .await
    }

    /// Replays the user's transaction log and compares it with the
    /// materialized balance. Drift means a bug or manual tampering.
    pub async fn audit(&self, user_id: Uuid) -> AppResult<CreditAudit> {
        let balance = self.stores.ledger.balance(user_id).await?;
        let replayed = self.stores.ledger.replayed_balance(user_id).await?;
        let consistent = balance.balance == replayed;
        if !consistent {
            tracing::warn!(
                user_id = %user_id,
                materialized = balance.balance,
                replayed,
                "credit ledger drift detected"
            );
        }
        Ok(CreditAudit {
            user_id,
            materialized: balance.balance,
            replayed,
            consistent,
        })
    }

    pub async fn list_packs(&self) -> AppResult<Vec<CreditPack>> {
        self.stores.packs.list_active_packs().await
    }

    pub async fn purchases(&self, user_id: Uuid) -> AppResult<Vec<CreditPackPurchase>> {
        self.stores.packs.list_purchases_for_user(user_id).await
    }

    /// Starts a pack purchase: creates the gateway intent and records the
    /// purchase as pending with the pack's credit total snapshotted.
    pub async fn purchase_pack(
        &self,
        user_id: Uuid,
        pack_id: Uuid,
    ) -> AppResult<PurchaseCheckout> {
        let pack = self.stores.packs.get_pack(pack_id).await?;
        if !pack.active {
            return Err(AppError::BadRequest {
                message: format!("credit pack {} is no longer offered", pack_id),
            });
        }

        let request = ChargeRequest {
            amount_cents: pack.price_cents,
            currency: self.currency.clone(),
            description: format!("credit pack {}", pack.name),
            application_fee_cents: None,
            destination_account: None,
            metadata: vec![
                ("user_id".to_string(), user_id.to_string()),
                ("pack_id".to_string(), pack_id.to_string()),
            ],
        };
        let intent = with_retries(&self.retry, "create_payment_intent", || {
            self.gateway.create_payment_intent(request.clone())
        })
        .await
        .map_err(|e| e.into_exhausted())?;

        let created = self
            .stores
            .packs
            .create_pending_purchase(NewCreditPackPurchase {
                user_id,
                pack_id,
                credits: pack.total_credits(),
                amount_cents: pack.price_cents,
                gateway_payment_id: Some(intent.id.clone()),
            })
            .await;
        match created {
            Ok(purchase) => Ok(PurchaseCheckout {
                purchase,
                client_secret: intent.client_secret,
            }),
            Err(persist_error) => {
                // The unconfirmed intent expires at the gateway on its own.
                tracing::warn!(
                    user_id = %user_id,
                    pack_id = %pack_id,
                    intent_id = %intent.id,
                    "discarding payment intent after persistence failure"
                );
                Err(persist_error)
            }
        }
    }
}
