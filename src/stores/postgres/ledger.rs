//! Credit ledger on PostgreSQL.
//!
//! Debits are a single conditional `UPDATE … WHERE balance >= n RETURNING`,
//! so two concurrent spends can never both pass a stale balance check. The
//! unique `(user_id, kind, reference)` index turns replays into fetches of
//! the row the first attempt wrote.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use super::rows::{BalanceRow, NewTransactionRow, TransactionRow};
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{CreditBalance, CreditTransaction, CreditTransactionKind, LedgerEntry};
use crate::schema::{credit_balances, credit_transactions};
use crate::stores::{LedgerStore, require_positive};

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: AsyncDbPool,
}

impl PgLedgerStore {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

/// Looks up the ledger row a reference already produced, if any.
pub(super) async fn find_reference_in_conn(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    kind: CreditTransactionKind,
    reference_type: &str,
    reference_id: &str,
) -> Result<Option<TransactionRow>, diesel::result::Error> {
    credit_transactions::table
        .filter(credit_transactions::user_id.eq(user_id))
        .filter(credit_transactions::kind.eq(kind))
        .filter(credit_transactions::reference_type.eq(reference_type))
        .filter(credit_transactions::reference_id.eq(reference_id))
        .select(TransactionRow::as_select())
        .first(conn)
        .await
        .optional()
}

/// Credits `entry.amount` under `kind` within an open transaction.
///
/// The balance upsert and the ledger append commit or roll back together
/// with whatever else the caller's transaction does. Replays return the
/// original row.
pub(super) async fn grant_in_conn(
    conn: &mut AsyncPgConnection,
    kind: CreditTransactionKind,
    entry: &LedgerEntry,
) -> Result<TransactionRow, AppError> {
    if let Some(existing) = find_reference_in_conn(
        conn,
        entry.user_id,
        kind,
        &entry.reference.reference_type,
        &entry.reference.reference_id,
    )
    .await?
    {
        return Ok(existing);
    }

    let balance: BalanceRow = diesel::insert_into(credit_balances::table)
        .values((
            credit_balances::user_id.eq(entry.user_id),
            credit_balances::balance.eq(entry.amount),
            credit_balances::total_earned.eq(entry.amount),
        ))
        .on_conflict(credit_balances::user_id)
        .do_update()
        .set((
            credit_balances::balance.eq(credit_balances::balance + entry.amount),
            credit_balances::total_earned.eq(credit_balances::total_earned + entry.amount),
            credit_balances::last_activity_at.eq(diesel::dsl::now),
        ))
        .returning(BalanceRow::as_returning())
        .get_result(conn)
        .await?;

    let row = diesel::insert_into(credit_transactions::table)
        .values(NewTransactionRow {
            user_id: entry.user_id,
            kind,
            amount: entry.amount,
            balance_after: balance.balance,
            reference_type: entry.reference.reference_type.clone(),
            reference_id: entry.reference.reference_id.clone(),
            description: entry.description.clone(),
        })
        .returning(TransactionRow::as_returning())
        .get_result(conn)
        .await?;
    Ok(row)
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn balance(&self, user_id: Uuid) -> AppResult<CreditBalance> {
        let mut conn = self.pool.get().await?;
        let row: Option<BalanceRow> = credit_balances::table
            .find(user_id)
            .select(BalanceRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row
            .map(Into::into)
            .unwrap_or_else(|| CreditBalance::empty(user_id)))
    }

    async fn spend(&self, entry: LedgerEntry) -> AppResult<CreditTransaction> {
        require_positive("amount", entry.amount)?;
        let mut conn = self.pool.get().await?;
        let user_id = entry.user_id;
        let reference = entry.reference.clone();

        let result = conn
            .transaction::<TransactionRow, AppError, _>(|conn| {
                async move {
                    if let Some(existing) = find_reference_in_conn(
                        conn,
                        entry.user_id,
                        CreditTransactionKind::Spend,
                        &entry.reference.reference_type,
                        &entry.reference.reference_id,
                    )
                    .await?
                    {
                        return Ok(existing);
                    }

                    let updated: Option<BalanceRow> = diesel::update(
                        credit_balances::table
                            .filter(credit_balances::user_id.eq(entry.user_id))
                            .filter(credit_balances::balance.ge(entry.amount)),
                    )
                    .set((
                        credit_balances::balance.eq(credit_balances::balance - entry.amount),
                        credit_balances::total_spent
                            .eq(credit_balances::total_spent + entry.amount),
                        credit_balances::last_activity_at.eq(diesel::dsl::now),
                    ))
                    .returning(BalanceRow::as_returning())
                    .get_result(conn)
                    .await
                    .optional()?;

                    let Some(balance) = updated else {
                        let available = credit_balances::table
                            .find(entry.user_id)
                            .select(credit_balances::balance)
                            .first::<i64>(conn)
                            .await
                            .optional()?
                            .unwrap_or(0);
                        return Err(AppError::InsufficientCredits {
                            required: entry.amount,
                            available,
                        });
                    };

                    let row = diesel::insert_into(credit_transactions::table)
                        .values(NewTransactionRow {
                            user_id: entry.user_id,
                            kind: CreditTransactionKind::Spend,
                            amount: -entry.amount,
                            balance_after: balance.balance,
                            reference_type: entry.reference.reference_type.clone(),
                            reference_id: entry.reference.reference_id.clone(),
                            description: entry.description.clone(),
                        })
                        .returning(TransactionRow::as_returning())
                        .get_result(conn)
                        .await?;
                    Ok(row)
                }
                .scope_boxed()
            })
            .await;

        match result {
            Ok(row) => Ok(row.into()),
            // Lost the reference race to a concurrent replay; the winner's
            // row is the authoritative one.
            Err(AppError::Duplicate { .. }) => {
                let existing = find_reference_in_conn(
                    &mut conn,
                    user_id,
                    CreditTransactionKind::Spend,
                    &reference.reference_type,
                    &reference.reference_id,
                )
                .await?;
                existing.map(Into::into).ok_or_else(|| AppError::Internal {
                    source: anyhow::anyhow!("ledger row missing after duplicate spend"),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn grant(
        &self,
        kind: CreditTransactionKind,
        entry: LedgerEntry,
    ) -> AppResult<CreditTransaction> {
        require_positive("amount", entry.amount)?;
        if kind == CreditTransactionKind::Spend {
            return Err(AppError::Validation {
                field: "kind".to_string(),
                reason: "grants cannot use the spend kind".to_string(),
            });
        }
        let mut conn = self.pool.get().await?;
        let user_id = entry.user_id;
        let reference = entry.reference.clone();

        let result = conn
            .transaction::<TransactionRow, AppError, _>(|conn| {
                async move { grant_in_conn(conn, kind, &entry).await }.scope_boxed()
            })
            .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(AppError::Duplicate { .. }) => {
                let existing = find_reference_in_conn(
                    &mut conn,
                    user_id,
                    kind,
                    &reference.reference_type,
                    &reference.reference_id,
                )
                .await?;
                existing.map(Into::into).ok_or_else(|| AppError::Internal {
                    source: anyhow::anyhow!("ledger row missing after duplicate grant"),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<CreditTransaction>> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<TransactionRow> = credit_transactions::table
            .filter(credit_transactions::user_id.eq(user_id))
            .order(credit_transactions::created_at.desc())
            .limit(limit.max(0))
            .offset(offset.max(0))
            .select(TransactionRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn replayed_balance(&self, user_id: Uuid) -> AppResult<i64> {
        let mut conn = self.pool.get().await?;
        // SUM(bigint) widens to numeric; cast back down instead of pulling
        // in a decimal type for an integer ledger.
        let total: i64 = credit_transactions::table
            .filter(credit_transactions::user_id.eq(user_id))
            .select(diesel::dsl::sql::<diesel::sql_types::BigInt>(
                "COALESCE(SUM(amount), 0)::BIGINT",
            ))
            .first(&mut conn)
            .await?;
        Ok(total)
    }
}
