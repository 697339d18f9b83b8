use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pista_core::availability::KartAvailabilityView;
use pista_core::plan::{select_current_price, PaymentMethod, Plan, PlanPrice};
use pista_core::slot::SlotView;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotsQuery {
    branch_id: Uuid,
    date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct PlansQuery {
    #[serde(default = "default_method")]
    method: PaymentMethod,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::Cash
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanWithPrice {
    #[serde(flatten)]
    plan: Plan,
    current_price: Option<PlanPrice>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/public/timeslots", get(list_timeslots))
        .route("/api/public/karts/{slot_id}", get(kart_availability))
        .route("/api/public/plans", get(list_plans))
}

async fn list_timeslots(
    State(state): State<AppState>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<SlotView>>, AppError> {
    let views = state
        .availability
        .list_available_slots(query.branch_id, query.date)
        .await?;
    Ok(Json(views))
}

async fn kart_availability(
    State(state): State<AppState>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<KartAvailabilityView>, AppError> {
    let view = state.availability.kart_availability(slot_id).await?;
    Ok(Json(view))
}

async fn list_plans(
    State(state): State<AppState>,
    Query(query): Query<PlansQuery>,
) -> Result<Json<Vec<PlanWithPrice>>, AppError> {
    let now = Utc::now();
    let plans = state.plans.list_active_plans().await.map_err(|e| {
        AppError::from(pista_core::BookingError::Storage(e))
    })?;

    let mut out = Vec::with_capacity(plans.len());
    for plan in plans {
        let prices = state
            .plans
            .prices_for(plan.id, query.method)
            .await
            .map_err(|e| AppError::from(pista_core::BookingError::Storage(e)))?;
        let current_price = select_current_price(&prices, now).cloned();
        out.push(PlanWithPrice {
            plan,
            current_price,
        });
    }
    Ok(Json(out))
}
