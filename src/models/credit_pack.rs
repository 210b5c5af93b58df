//! Credit packs and their purchase records.

use diesel::deserialize::{self, FromSql};
use diesel::pg::Pg;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

/// A purchasable bundle of credits, optionally with bonus credits on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPack {
    pub id: Uuid,
    pub name: String,
    pub credit_amount: i64,
    pub bonus_credits: i64,
    pub price_cents: i64,
    pub active: bool,
    pub created_at: Timestamp,
}

impl CreditPack {
    /// Credits actually granted on a completed purchase.
    pub fn total_credits(&self) -> i64 {
        self.credit_amount + self.bonus_credits
    }

    /// Bonus expressed as a percentage of the base amount, rounded to the
    /// nearest whole percent. Display-only.
    pub fn savings_percentage(&self) -> i64 {
        if self.credit_amount == 0 {
            return 0;
        }
        (self.bonus_credits * 100 + self.credit_amount / 2) / self.credit_amount
    }
}

/// Purchase lifecycle state. Stored as lowercase text.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    utoipa::ToSchema,
    AsExpression,
    FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    /// Gateway intent created, credits not granted yet.
    Pending,
    /// Charge succeeded and credits were granted in the same settlement.
    Completed,
    Failed,
    Refunded,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Failed => "failed",
            PurchaseStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PurchaseStatus::Pending)
    }
}

impl diesel::query_builder::QueryId for PurchaseStatus {
    type QueryId = PurchaseStatus;
    const HAS_STATIC_QUERY_ID: bool = false;
}

impl ToSql<Text, Pg> for PurchaseStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<Text, Pg> for PurchaseStatus {
    fn from_sql(
        bytes: <Pg as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        match s.as_str() {
            "pending" => Ok(PurchaseStatus::Pending),
            "completed" => Ok(PurchaseStatus::Completed),
            "failed" => Ok(PurchaseStatus::Failed),
            "refunded" => Ok(PurchaseStatus::Refunded),
            _ => Err(format!("Unrecognized purchase status: {}", s).into()),
        }
    }
}

/// One attempt to buy a credit pack. `credits` snapshots the pack's total at
/// purchase time so later pack edits never change what was granted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPackPurchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pack_id: Uuid,
    pub credits: i64,
    pub amount_cents: i64,
    pub status: PurchaseStatus,
    pub gateway_payment_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct NewCreditPackPurchase {
    pub user_id: Uuid,
    pub pack_id: Uuid,
    pub credits: i64,
    pub amount_cents: i64,
    pub gateway_payment_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(credit_amount: i64, bonus_credits: i64) -> CreditPack {
        CreditPack {
            id: Uuid::new_v4(),
            name: "Starter".to_string(),
            credit_amount,
            bonus_credits,
            price_cents: 5000,
            active: true,
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn total_includes_bonus() {
        assert_eq!(pack(50, 5).total_credits(), 55);
    }

    #[test]
    fn savings_rounds_to_nearest_percent() {
        assert_eq!(pack(50, 5).savings_percentage(), 10);
        assert_eq!(pack(30, 2).savings_percentage(), 7);
        assert_eq!(pack(0, 5).savings_percentage(), 0);
    }
}
