use std::net::SocketAddr;
use std::sync::Arc;

use pista_api::{app, AppState};
use pista_core::notify::LogSender;
use pista_core::repository::{
    BookingRepository, HoldRepository, KartRepository, PlanRepository, SlotRepository,
};
use pista_core::{AvailabilityService, BookingAllocator, HoldManager, LifecycleManager};
use pista_store::{
    DbClient, PgBookingRepository, PgHoldRepository, PgKartRepository, PgPlanRepository,
    PgSlotRepository,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pista_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = pista_store::Config::load()?;
    tracing::info!("Starting Pista API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url).await?;
    db.migrate().await?;

    let slots: Arc<dyn SlotRepository> = Arc::new(PgSlotRepository::new(db.pool.clone()));
    let holds: Arc<dyn HoldRepository> = Arc::new(PgHoldRepository::new(db.pool.clone()));
    let karts: Arc<dyn KartRepository> = Arc::new(PgKartRepository::new(db.pool.clone()));
    let plans: Arc<dyn PlanRepository> = Arc::new(PgPlanRepository::new(db.pool.clone()));
    let bookings: Arc<dyn BookingRepository> = Arc::new(PgBookingRepository::new(db.pool.clone()));

    let rules = config.business_rules.clone();
    let state = AppState {
        hold_manager: Arc::new(HoldManager::new(holds.clone(), rules.hold_minutes)),
        allocator: Arc::new(BookingAllocator::new(
            slots.clone(),
            holds.clone(),
            karts.clone(),
            plans.clone(),
            bookings.clone(),
            Arc::new(LogSender),
            rules.deposit_pct,
        )),
        lifecycle: Arc::new(LifecycleManager::new(
            slots.clone(),
            karts.clone(),
            bookings.clone(),
            rules.cancellation_cutoff_hours,
        )),
        availability: Arc::new(AvailabilityService::new(
            slots.clone(),
            holds.clone(),
            karts.clone(),
            bookings.clone(),
        )),
        slots,
        plans,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}
