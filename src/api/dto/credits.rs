//! Credit balance and ledger DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::api::dto::format_timestamp;
use crate::models::{CreditBalance, CreditTransaction, CreditTransactionKind};
use crate::services::CreditAudit;

/// Query parameter selecting the member for balance, audit and purchase
/// history lookups.
#[derive(Debug, Deserialize, IntoParams)]
pub struct UserQuery {
    /// The member to look up
    pub user_id: Uuid,
}

/// Query parameters for paging through a member's ledger history.
#[derive(Debug, Deserialize, IntoParams, Validate)]
pub struct TransactionQuery {
    /// The member whose transactions to list
    pub user_id: Uuid,

    /// Page number (1-based)
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "Page must be at least 1"))]
    #[param(minimum = 1, example = 1)]
    pub page: i64,

    /// Number of items per page (max 100)
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100, message = "Page size must be between 1 and 100"))]
    #[param(minimum = 1, maximum = 100, example = 20)]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

/// A member's materialized credit balance. Members without ledger
/// activity report zeroes rather than not-found.
#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub last_activity_at: String,
}

impl From<CreditBalance> for BalanceResponse {
    fn from(balance: CreditBalance) -> Self {
        Self {
            user_id: balance.user_id,
            balance: balance.balance,
            total_earned: balance.total_earned,
            total_spent: balance.total_spent,
            last_activity_at: format_timestamp(balance.last_activity_at),
        }
    }
}

/// One ledger entry in a member's history.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: CreditTransactionKind,
    /// Signed credit delta; negative for debits
    pub amount: i64,
    /// Balance immediately after this entry was applied
    pub balance_after: i64,
    pub reference_type: String,
    pub reference_id: String,
    pub description: String,
    pub created_at: String,
}

impl From<CreditTransaction> for TransactionResponse {
    fn from(tx: CreditTransaction) -> Self {
        Self {
            id: tx.id,
            user_id: tx.user_id,
            kind: tx.kind,
            amount: tx.amount,
            balance_after: tx.balance_after,
            reference_type: tx.reference_type,
            reference_id: tx.reference_id,
            description: tx.description,
            created_at: format_timestamp(tx.created_at),
        }
    }
}

/// Materialized balance checked against a replay of the transaction log.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditResponse {
    pub user_id: Uuid,
    /// Balance as stored
    pub materialized: i64,
    /// Balance recomputed from the full transaction log
    pub replayed: i64,
    /// False when the two disagree; drift needs investigation
    pub consistent: bool,
}

impl From<CreditAudit> for AuditResponse {
    fn from(audit: CreditAudit) -> Self {
        Self {
            user_id: audit.user_id,
            materialized: audit.materialized,
            replayed: audit.replayed,
            consistent: audit.consistent,
        }
    }
}
