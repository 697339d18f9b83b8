use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use tracing::info;

use pista_core::slot::{generate_slots, SlotGenerationConfig};
use pista_core::BookingError;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct GenerateResponse {
    count: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/admin/timeslots/generate", post(generate_timeslots))
}

/// Batch slot generation. Access control is the caller's concern: this
/// service sits behind the venue's staff gateway.
async fn generate_timeslots(
    State(state): State<AppState>,
    Json(config): Json<SlotGenerationConfig>,
) -> Result<Json<GenerateResponse>, AppError> {
    if config.end_date < config.start_date {
        return Err(BookingError::Validation("end date precedes start date".into()).into());
    }
    if config.interval_min <= 0 {
        return Err(BookingError::Validation("interval must be positive".into()).into());
    }

    let slots = generate_slots(&config);
    let count = state
        .slots
        .insert_slots(&slots)
        .await
        .map_err(BookingError::Storage)?;

    info!(count, branch_id = %config.branch_id, "time slots generated");
    Ok(Json(GenerateResponse { count }))
}
