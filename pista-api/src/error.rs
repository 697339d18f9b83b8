use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use pista_core::error::{BookingError, ConflictBody};

#[derive(Debug)]
pub enum AppError {
    Domain(BookingError),
    Internal(anyhow::Error),
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError::Domain(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Domain(BookingError::Conflict { conflicting_seats }) => {
                let body = ConflictBody {
                    error: "some seats are already taken".to_string(),
                    conflicting_seats,
                };
                (StatusCode::CONFLICT, Json(body)).into_response()
            }
            AppError::Domain(err @ BookingError::Validation(_))
            | AppError::Domain(err @ BookingError::Policy(_))
            | AppError::Domain(err @ BookingError::AlreadyCancelled) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response(),
            AppError::Domain(err @ BookingError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response(),
            AppError::Domain(BookingError::Storage(err)) => {
                tracing::error!("storage error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
            AppError::Internal(err) => {
                tracing::error!("internal error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
