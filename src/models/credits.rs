//! Credit ledger entities: materialized balances and the append-only
//! transaction log they are derived from.

use diesel::deserialize::{self, FromSql};
use diesel::pg::Pg;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

/// Kind of a ledger transaction. Stored as lowercase text.
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
pub enum CreditTransactionKind {
    Purchase,
    Spend,
    Refund,
    Bonus,
    Adjustment,
}

impl CreditTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditTransactionKind::Purchase => "purchase",
            CreditTransactionKind::Spend => "spend",
            CreditTransactionKind::Refund => "refund",
            CreditTransactionKind::Bonus => "bonus",
            CreditTransactionKind::Adjustment => "adjustment",
        }
    }
}

impl diesel::query_builder::QueryId for CreditTransactionKind {
    type QueryId = CreditTransactionKind;
    const HAS_STATIC_QUERY_ID: bool = false;
}

impl ToSql<Text, Pg> for CreditTransactionKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<Text, Pg> for CreditTransactionKind {
    fn from_sql(
        bytes: <Pg as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        match s.as_str() {
            "purchase" => Ok(CreditTransactionKind::Purchase),
            "spend" => Ok(CreditTransactionKind::Spend),
            "refund" => Ok(CreditTransactionKind::Refund),
            "bonus" => Ok(CreditTransactionKind::Bonus),
            "adjustment" => Ok(CreditTransactionKind::Adjustment),
            _ => Err(format!("Unrecognized transaction kind: {}", s).into()),
        }
    }
}

/// Materialized credit balance for one user.
///
/// `balance == total_earned - total_spent` at every committed state, and the
/// transaction log replays to the same numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub user_id: Uuid,
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub last_activity_at: Timestamp,
}

impl CreditBalance {
    /// Zero-value balance for users with no ledger activity yet. Reads never
    /// fail on a missing row.
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            balance: 0,
            total_earned: 0,
            total_spent: 0,
            last_activity_at: Timestamp::now(),
        }
    }
}

/// One immutable row of the append-only credit ledger.
///
/// `amount` is signed: positive rows credit the user, negative rows debit.
/// `balance_after` is the running sum at the time the row was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: CreditTransactionKind,
    pub amount: i64,
    pub balance_after: i64,
    pub reference_type: String,
    pub reference_id: String,
    pub description: String,
    pub created_at: Timestamp,
}

/// What a ledger entry points back at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReference {
    pub reference_type: String,
    pub reference_id: String,
}

impl LedgerReference {
    pub fn booking(id: Uuid) -> Self {
        Self {
            reference_type: "booking".to_string(),
            reference_id: id.to_string(),
        }
    }

    pub fn purchase(id: Uuid) -> Self {
        Self {
            reference_type: "credit_pack_purchase".to_string(),
            reference_id: id.to_string(),
        }
    }

    pub fn manual(reference_id: impl Into<String>) -> Self {
        Self {
            reference_type: "manual".to_string(),
            reference_id: reference_id.into(),
        }
    }
}

/// Request shape for ledger writes (spend, grant, refund).
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub user_id: Uuid,
    /// Always positive; the ledger decides the sign from the operation.
    pub amount: i64,
    pub reference: LedgerReference,
    pub description: String,
}

impl LedgerEntry {
    pub fn new(
        user_id: Uuid,
        amount: i64,
        reference: LedgerReference,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            amount,
            reference,
            description: description.into(),
        }
    }
}
