use serde::Serialize;

/// Errors surfaced by the storage layer.
///
/// The conflict variants carry enough detail for the services to translate
/// them into client-facing errors without re-reading storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("seats already taken: {0:?}")]
    SeatConflict(Vec<i32>),

    #[error("slot capacity exhausted")]
    CapacityExhausted,

    #[error("duplicate booking code")]
    DuplicateCode,

    /// A guarded status transition matched zero rows: the booking left the
    /// pending/confirmed set after the caller read it.
    #[error("booking status changed concurrently")]
    StaleStatus,

    #[error("{0} not found")]
    Missing(&'static str),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Domain error taxonomy for the booking core.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// Malformed or missing input. Rejected before any write.
    #[error("{0}")]
    Validation(String),

    /// Requested seats clash with a live hold or an active booking.
    /// The offending kart numbers are reported so the client can re-select.
    #[error("seats already taken")]
    Conflict { conflicting_seats: Vec<i32> },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("booking is already cancelled")]
    AlreadyCancelled,

    /// A business rule (e.g. the 24-hour cutoff) rejected the operation.
    #[error("{0}")]
    Policy(String),

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SeatConflict(seats) => BookingError::Conflict {
                conflicting_seats: seats,
            },
            // Capacity underflow detected at commit is a lost race, not a
            // specific-seat clash, so there is no seat list to report.
            StoreError::CapacityExhausted => BookingError::Conflict {
                conflicting_seats: Vec::new(),
            },
            StoreError::Missing(what) => BookingError::NotFound(what),
            // A lost status race on cancel means someone else cancelled first.
            StoreError::StaleStatus => BookingError::AlreadyCancelled,
            other => BookingError::Storage(other),
        }
    }
}

/// Wire shape for conflict responses: `{"error": ..., "conflictingSeats": [..]}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictBody {
    pub error: String,
    pub conflicting_seats: Vec<i32>,
}
