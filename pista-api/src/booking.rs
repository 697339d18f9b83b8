use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use pista_core::booking::CreateBookingRequest;
use pista_core::{Booking, BookingDetail, Hold};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateHoldRequest {
    time_slot_id: Uuid,
    seats: Vec<i32>,
    session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateHoldResponse {
    hold: Hold,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RescheduleRequest {
    new_time_slot_id: Uuid,
    new_seats: Vec<i32>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/bookings/hold", post(create_hold))
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/{code}", get(get_booking))
        .route("/api/bookings/{code}/cancel", post(cancel_booking))
        .route("/api/bookings/{code}/reschedule", post(reschedule_booking))
}

async fn create_hold(
    State(state): State<AppState>,
    Json(req): Json<CreateHoldRequest>,
) -> Result<Json<CreateHoldResponse>, AppError> {
    let hold = state
        .hold_manager
        .create_hold(req.time_slot_id, req.seats, req.session_id)
        .await?;

    let expires_at = hold.expires_at;
    Ok(Json(CreateHoldResponse { hold, expires_at }))
}

async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.allocator.create_booking(req).await?;
    info!(code = %booking.code, "booking created");
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<BookingDetail>, AppError> {
    let detail = state.allocator.get_by_code(&code).await?;
    Ok(Json(detail))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.lifecycle.cancel_booking(&code).await?;
    Ok(Json(MessageResponse {
        message: "booking cancelled",
    }))
}

async fn reschedule_booking(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .lifecycle
        .reschedule_booking(&code, req.new_time_slot_id, req.new_seats)
        .await?;
    Ok(Json(MessageResponse {
        message: "booking rescheduled",
    }))
}
