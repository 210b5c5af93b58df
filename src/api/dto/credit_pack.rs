//! Credit pack catalog and purchase DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::dto::format_timestamp;
use crate::models::{CreditPack, CreditPackPurchase, PurchaseStatus};
use crate::services::PurchaseCheckout;

/// Request body for starting a credit pack purchase.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PurchasePackRequest {
    /// The member buying the pack
    pub user_id: Uuid,

    /// The pack from the active catalog
    pub credit_pack_id: Uuid,
}

/// One pack from the catalog, with the bonus expressed as a savings
/// percentage for display.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreditPackResponse {
    pub id: Uuid,
    pub name: String,
    /// Base credits the pack grants
    pub credit_amount: i64,
    /// Extra credits granted on top of the base amount
    pub bonus_credits: i64,
    /// Total credits granted at settlement
    pub total_credits: i64,
    pub price_cents: i64,
    /// Bonus relative to the base amount, rounded to whole percent
    #[schema(example = 20)]
    pub savings_percentage: i64,
}

impl From<CreditPack> for CreditPackResponse {
    fn from(pack: CreditPack) -> Self {
        Self {
            total_credits: pack.total_credits(),
            savings_percentage: pack.savings_percentage(),
            id: pack.id,
            name: pack.name,
            credit_amount: pack.credit_amount,
            bonus_credits: pack.bonus_credits,
            price_cents: pack.price_cents,
        }
    }
}

/// One purchase from a member's history.
#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pack_id: Uuid,
    /// Credits the purchase grants at settlement, snapshotted at checkout
    pub credits: i64,
    pub amount_cents: i64,
    pub status: PurchaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CreditPackPurchase> for PurchaseResponse {
    fn from(purchase: CreditPackPurchase) -> Self {
        Self {
            id: purchase.id,
            user_id: purchase.user_id,
            pack_id: purchase.pack_id,
            credits: purchase.credits,
            amount_cents: purchase.amount_cents,
            status: purchase.status,
            gateway_payment_id: purchase.gateway_payment_id,
            failure_reason: purchase.failure_reason,
            created_at: format_timestamp(purchase.created_at),
            updated_at: format_timestamp(purchase.updated_at),
        }
    }
}

/// Response for a started purchase; the client secret drives the payment
/// page, credits land when the gateway webhook settles.
#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseCheckoutResponse {
    pub purchase_id: Uuid,
    pub status: PurchaseStatus,
    pub client_secret: String,
    pub purchase: PurchaseResponse,
}

impl From<PurchaseCheckout> for PurchaseCheckoutResponse {
    fn from(checkout: PurchaseCheckout) -> Self {
        Self {
            purchase_id: checkout.purchase.id,
            status: checkout.purchase.status,
            client_secret: checkout.client_secret,
            purchase: checkout.purchase.into(),
        }
    }
}
