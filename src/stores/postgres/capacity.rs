//! Seat accounting on PostgreSQL.
//!
//! Reservation is one conditional `UPDATE … WHERE current + n <= max`, so
//! the capacity check and the increment are a single atomic statement and
//! oversubscription cannot slip through between them.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use jiff::Timestamp;
use uuid::Uuid;

use super::rows::{NewSessionRow, SessionRow, to_db};
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{ClassSession, NewClassSession};
use crate::schema::class_sessions;
use crate::stores::{CapacityStore, require_positive};

#[derive(Clone)]
pub struct PgCapacityStore {
    pool: AsyncDbPool,
}

impl PgCapacityStore {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

/// Conditional seat decrement, floored at zero, usable inside a settlement
/// transaction.
pub(super) async fn release_seats_in_conn(
    conn: &mut AsyncPgConnection,
    class_id: Uuid,
    count: i32,
) -> Result<(), diesel::result::Error> {
    let released = diesel::update(
        class_sessions::table
            .filter(class_sessions::id.eq(class_id))
            .filter(class_sessions::current_participants.ge(count)),
    )
    .set((
        class_sessions::current_participants.eq(class_sessions::current_participants - count),
        class_sessions::updated_at.eq(diesel::dsl::now),
    ))
    .execute(conn)
    .await?;

    if released == 0 {
        let floored = diesel::update(class_sessions::table.filter(class_sessions::id.eq(class_id)))
            .set((
                class_sessions::current_participants.eq(0),
                class_sessions::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .await?;
        if floored > 0 {
            tracing::warn!(
                class_id = %class_id,
                requested = count,
                "seat release clamped at zero"
            );
        }
    }
    Ok(())
}

#[async_trait]
impl CapacityStore for PgCapacityStore {
    async fn get_session(&self, id: Uuid) -> AppResult<ClassSession> {
        let mut conn = self.pool.get().await?;
        let row: Option<SessionRow> = class_sessions::table
            .find(id)
            .select(SessionRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(Into::into).ok_or_else(|| AppError::NotFound {
            entity: "ClassSession".to_string(),
            field: "id".to_string(),
            value: id.to_string(),
        })
    }

    async fn insert_session(&self, session: NewClassSession) -> AppResult<ClassSession> {
        require_positive("max_participants", session.max_participants as i64)?;
        let mut conn = self.pool.get().await?;
        let row: SessionRow = diesel::insert_into(class_sessions::table)
            .values(NewSessionRow::from(session))
            .returning(SessionRow::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(row.into())
    }

    async fn list_upcoming(&self, from: Timestamp) -> AppResult<Vec<ClassSession>> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<SessionRow> = class_sessions::table
            .filter(class_sessions::starts_at.ge(to_db(from)))
            .order(class_sessions::starts_at.asc())
            .select(SessionRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn reserve_seats(&self, class_id: Uuid, count: i32) -> AppResult<ClassSession> {
        require_positive("attendee_count", count as i64)?;
        let mut conn = self.pool.get().await?;
        let updated: Option<SessionRow> = diesel::update(
            class_sessions::table
                .filter(class_sessions::id.eq(class_id))
                .filter(
                    class_sessions::current_participants
                        .le(class_sessions::max_participants - count),
                ),
        )
        .set((
            class_sessions::current_participants
                .eq(class_sessions::current_participants + count),
            class_sessions::updated_at.eq(diesel::dsl::now),
        ))
        .returning(SessionRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()?;

        match updated {
            Some(row) => Ok(row.into()),
            // Zero rows means either the class is full or it does not
            // exist; a plain lookup tells them apart.
            None => {
                let exists: Option<Uuid> = class_sessions::table
                    .find(class_id)
                    .select(class_sessions::id)
                    .first(&mut conn)
                    .await
                    .optional()?;
                match exists {
                    Some(_) => Err(AppError::ClassFull { class_id }),
                    None => Err(AppError::NotFound {
                        entity: "ClassSession".to_string(),
                        field: "id".to_string(),
                        value: class_id.to_string(),
                    }),
                }
            }
        }
    }

    async fn release_seats(&self, class_id: Uuid, count: i32) -> AppResult<()> {
        require_positive("attendee_count", count as i64)?;
        let mut conn = self.pool.get().await?;
        release_seats_in_conn(&mut conn, class_id, count).await?;
        Ok(())
    }
}
