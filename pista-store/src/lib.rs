//! Persistence for the booking core: layered configuration, the Postgres
//! repositories (one transaction per multi-entity write), and an in-memory
//! store with the same atomicity guarantees for tests and local runs.

pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod hold_repo;
pub mod memory;
pub mod plan_repo;
pub mod slot_repo;

pub use app_config::{BusinessRules, Config};
pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use hold_repo::PgHoldRepository;
pub use memory::MemoryStore;
pub use plan_repo::{PgKartRepository, PgPlanRepository};
pub use slot_repo::PgSlotRepository;

use pista_core::error::StoreError;

pub(crate) fn backend_err(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}
