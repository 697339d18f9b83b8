use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use uuid::Uuid;

use pista_core::error::StoreError;
use pista_core::repository::SlotRepository;
use pista_core::slot::TimeSlot;

use crate::backend_err;

pub struct PgSlotRepository {
    pool: PgPool,
}

impl PgSlotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SlotRow {
    id: Uuid,
    branch_id: Uuid,
    date: NaiveDate,
    start_time: NaiveTime,
    duration_min: i32,
    buffer_min: i32,
    capacity: i32,
    available: i32,
    status: String,
}

impl SlotRow {
    pub(crate) fn into_slot(self) -> Result<TimeSlot, StoreError> {
        Ok(TimeSlot {
            id: self.id,
            branch_id: self.branch_id,
            date: self.date,
            start_time: self.start_time,
            duration_min: self.duration_min,
            buffer_min: self.buffer_min,
            capacity: self.capacity,
            available: self.available,
            status: self.status.parse().map_err(StoreError::Backend)?,
        })
    }
}

const SLOT_COLUMNS: &str =
    "id, branch_id, date, start_time, duration_min, buffer_min, capacity, available, status";

#[async_trait]
impl SlotRepository for PgSlotRepository {
    async fn get_slot(&self, id: Uuid) -> Result<Option<TimeSlot>, StoreError> {
        let row: Option<SlotRow> = sqlx::query_as(&format!(
            "SELECT {SLOT_COLUMNS} FROM time_slots WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        row.map(SlotRow::into_slot).transpose()
    }

    async fn list_open_slots(
        &self,
        branch_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, StoreError> {
        let rows: Vec<SlotRow> = sqlx::query_as(&format!(
            "SELECT {SLOT_COLUMNS} FROM time_slots \
             WHERE branch_id = $1 AND date = $2 AND status = 'open' AND available > 0 \
             ORDER BY start_time ASC"
        ))
        .bind(branch_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        rows.into_iter().map(SlotRow::into_slot).collect()
    }

    async fn insert_slots(&self, slots: &[TimeSlot]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend_err)?;

        for slot in slots {
            sqlx::query(
                "INSERT INTO time_slots \
                 (id, branch_id, date, start_time, duration_min, buffer_min, capacity, available, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(slot.id)
            .bind(slot.branch_id)
            .bind(slot.date)
            .bind(slot.start_time)
            .bind(slot.duration_min)
            .bind(slot.buffer_min)
            .bind(slot.capacity)
            .bind(slot.available)
            .bind(slot.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        }

        tx.commit().await.map_err(backend_err)?;
        Ok(slots.len() as u64)
    }
}
