use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pista_core::error::StoreError;
use pista_core::kart::Kart;
use pista_core::plan::{PaymentMethod, Plan, PlanPrice};
use pista_core::repository::{KartRepository, PlanRepository};

use crate::backend_err;

pub struct PgPlanRepository {
    pool: PgPool,
}

impl PgPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    name: String,
    qualy_laps: i32,
    race_laps: i32,
    description: Option<String>,
    active: bool,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Plan {
            id: row.id,
            name: row.name,
            qualy_laps: row.qualy_laps,
            race_laps: row.race_laps,
            description: row.description,
            active: row.active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PriceRow {
    id: Uuid,
    plan_id: Uuid,
    method: String,
    amount: i64,
    surcharge_pct: i64,
    valid_from: DateTime<Utc>,
    valid_to: Option<DateTime<Utc>>,
    active: bool,
}

impl PriceRow {
    fn into_price(self) -> Result<PlanPrice, StoreError> {
        Ok(PlanPrice {
            id: self.id,
            plan_id: self.plan_id,
            method: self.method.parse().map_err(StoreError::Backend)?,
            amount: self.amount,
            surcharge_pct: self.surcharge_pct,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            active: self.active,
        })
    }
}

#[async_trait]
impl PlanRepository for PgPlanRepository {
    async fn get_plan(&self, id: Uuid) -> Result<Option<Plan>, StoreError> {
        let row: Option<PlanRow> = sqlx::query_as(
            "SELECT id, name, qualy_laps, race_laps, description, active \
             FROM plans WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        Ok(row.map(Plan::from))
    }

    async fn list_active_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let rows: Vec<PlanRow> = sqlx::query_as(
            "SELECT id, name, qualy_laps, race_laps, description, active \
             FROM plans WHERE active = TRUE ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        Ok(rows.into_iter().map(Plan::from).collect())
    }

    async fn prices_for(
        &self,
        plan_id: Uuid,
        method: PaymentMethod,
    ) -> Result<Vec<PlanPrice>, StoreError> {
        let rows: Vec<PriceRow> = sqlx::query_as(
            "SELECT id, plan_id, method, amount, surcharge_pct, valid_from, valid_to, active \
             FROM plan_prices WHERE plan_id = $1 AND method = $2",
        )
        .bind(plan_id)
        .bind(method.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        rows.into_iter().map(PriceRow::into_price).collect()
    }
}

pub struct PgKartRepository {
    pool: PgPool,
}

impl PgKartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct KartRow {
    id: Uuid,
    branch_id: Uuid,
    number: i32,
    status: String,
    reason: Option<String>,
}

impl KartRow {
    fn into_kart(self) -> Result<Kart, StoreError> {
        Ok(Kart {
            id: self.id,
            branch_id: self.branch_id,
            number: self.number,
            status: self.status.parse().map_err(StoreError::Backend)?,
            reason: self.reason,
        })
    }
}

#[async_trait]
impl KartRepository for PgKartRepository {
    async fn list_for_branch(&self, branch_id: Uuid) -> Result<Vec<Kart>, StoreError> {
        let rows: Vec<KartRow> = sqlx::query_as(
            "SELECT id, branch_id, number, status, reason \
             FROM karts WHERE branch_id = $1 ORDER BY number ASC",
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        rows.into_iter().map(KartRow::into_kart).collect()
    }

    async fn find_by_numbers(
        &self,
        branch_id: Uuid,
        numbers: &[i32],
    ) -> Result<Vec<Kart>, StoreError> {
        let rows: Vec<KartRow> = sqlx::query_as(
            "SELECT id, branch_id, number, status, reason \
             FROM karts WHERE branch_id = $1 AND number = ANY($2)",
        )
        .bind(branch_id)
        .bind(numbers)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        rows.into_iter().map(KartRow::into_kart).collect()
    }
}
