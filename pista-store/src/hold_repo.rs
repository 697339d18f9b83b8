use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pista_core::error::StoreError;
use pista_core::hold::Hold;
use pista_core::repository::HoldRepository;

use crate::backend_err;

pub struct PgHoldRepository {
    pool: PgPool,
}

impl PgHoldRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct HoldRow {
    id: Uuid,
    time_slot_id: Uuid,
    seats: Vec<i32>,
    session_id: String,
    expires_at: DateTime<Utc>,
}

impl From<HoldRow> for Hold {
    fn from(row: HoldRow) -> Self {
        Hold {
            id: row.id,
            slot_id: row.time_slot_id,
            seats: row.seats,
            session_id: row.session_id,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl HoldRepository for PgHoldRepository {
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM holds WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(result.rows_affected())
    }

    async fn active_for_slot(
        &self,
        slot_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Hold>, StoreError> {
        let rows: Vec<HoldRow> = sqlx::query_as(
            "SELECT id, time_slot_id, seats, session_id, expires_at \
             FROM holds WHERE time_slot_id = $1 AND expires_at > $2",
        )
        .bind(slot_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        Ok(rows.into_iter().map(Hold::from).collect())
    }

    async fn insert_hold(&self, hold: &Hold) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO holds (id, time_slot_id, seats, session_id, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(hold.id)
        .bind(hold.slot_id)
        .bind(&hold.seats)
        .bind(&hold.session_id)
        .bind(hold.expires_at)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    async fn delete_for_session(&self, session_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM holds WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(result.rows_affected())
    }
}
