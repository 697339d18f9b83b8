//! Seat-hold and booking-allocation core for a kart-racing venue.
//!
//! The correctness-critical resource is the `(slot, kart number)` pair:
//! holds give customers a short advisory lock while they check out, and the
//! allocator commits bookings inside one atomic storage unit that re-checks
//! seat disjointness and guards the slot's availability counter.

pub mod allocator;
pub mod availability;
pub mod booking;
pub mod error;
pub mod hold;
pub mod kart;
pub mod lifecycle;
pub mod notify;
pub mod plan;
pub mod repository;
pub mod slot;

pub use allocator::{BookingAllocator, BookingDetail};
pub use availability::AvailabilityService;
pub use booking::{Booking, BookingStatus, CreateBookingRequest, Participant, PaymentStatus};
pub use error::{BookingError, StoreError};
pub use hold::{Hold, HoldManager};
pub use lifecycle::LifecycleManager;
pub use plan::{PaymentMethod, Plan, PlanPrice};
pub use slot::{SlotStatus, TimeSlot};
