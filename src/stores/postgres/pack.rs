//! Credit pack catalog and purchase records on PostgreSQL.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::rows::{NewPurchaseRow, PackRow, PurchaseRow};
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{CreditPack, CreditPackPurchase, NewCreditPackPurchase};
use crate::schema::{credit_pack_purchases, credit_packs};
use crate::stores::PackStore;

#[derive(Clone)]
pub struct PgPackStore {
    pool: AsyncDbPool,
}

impl PgPackStore {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PackStore for PgPackStore {
    async fn get_pack(&self, id: Uuid) -> AppResult<CreditPack> {
        let mut conn = self.pool.get().await?;
        let row: Option<PackRow> = credit_packs::table
            .find(id)
            .select(PackRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(Into::into).ok_or_else(|| AppError::NotFound {
            entity: "CreditPack".to_string(),
            field: "id".to_string(),
            value: id.to_string(),
        })
    }

    async fn list_active_packs(&self) -> AppResult<Vec<CreditPack>> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<PackRow> = credit_packs::table
            .filter(credit_packs::active.eq(true))
            .order(credit_packs::price_cents.asc())
            .select(PackRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_pack(&self, pack: CreditPack) -> AppResult<CreditPack> {
        let mut conn = self.pool.get().await?;
        let row: PackRow = diesel::insert_into(credit_packs::table)
            .values(PackRow::from(pack))
            .returning(PackRow::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(row.into())
    }

    async fn create_pending_purchase(
        &self,
        purchase: NewCreditPackPurchase,
    ) -> AppResult<CreditPackPurchase> {
        let mut conn = self.pool.get().await?;
        let row: PurchaseRow = diesel::insert_into(credit_pack_purchases::table)
            .values(NewPurchaseRow::from(purchase))
            .returning(PurchaseRow::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(row.into())
    }

    async fn list_purchases_for_user(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<CreditPackPurchase>> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<PurchaseRow> = credit_pack_purchases::table
            .filter(credit_pack_purchases::user_id.eq(user_id))
            .order(credit_pack_purchases::created_at.desc())
            .select(PurchaseRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
