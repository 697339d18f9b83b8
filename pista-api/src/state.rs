use std::sync::Arc;

use pista_core::repository::{PlanRepository, SlotRepository};
use pista_core::{AvailabilityService, BookingAllocator, HoldManager, LifecycleManager};

#[derive(Clone)]
pub struct AppState {
    pub hold_manager: Arc<HoldManager>,
    pub allocator: Arc<BookingAllocator>,
    pub lifecycle: Arc<LifecycleManager>,
    pub availability: Arc<AvailabilityService>,
    pub slots: Arc<dyn SlotRepository>,
    pub plans: Arc<dyn PlanRepository>,
}
