use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::booking::{Booking, Participant, Payment};
use crate::error::StoreError;
use crate::hold::Hold;
use crate::kart::Kart;
use crate::plan::{Plan, PlanPrice, PaymentMethod};
use crate::slot::TimeSlot;

/// Slot persistence. `available` is never written through this trait
/// directly; it only moves inside the atomic booking operations below.
#[async_trait]
pub trait SlotRepository: Send + Sync {
    async fn get_slot(&self, id: Uuid) -> Result<Option<TimeSlot>, StoreError>;

    /// Open slots with remaining stored availability for one branch/date.
    async fn list_open_slots(
        &self,
        branch_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, StoreError>;

    /// Batch insert for slot generation. Returns the number created.
    async fn insert_slots(&self, slots: &[TimeSlot]) -> Result<u64, StoreError>;
}

/// Hold persistence. Expiry is a predicate on `now`, evaluated here at read
/// time; callers pass the clock so tests can pin it.
#[async_trait]
pub trait HoldRepository: Send + Sync {
    /// Delete every hold past its expiry. Returns the number removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Non-expired holds on a slot.
    async fn active_for_slot(
        &self,
        slot_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Hold>, StoreError>;

    async fn insert_hold(&self, hold: &Hold) -> Result<(), StoreError>;

    /// Best-effort cleanup once a session books or walks away.
    async fn delete_for_session(&self, session_id: &str) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait KartRepository: Send + Sync {
    async fn list_for_branch(&self, branch_id: Uuid) -> Result<Vec<Kart>, StoreError>;

    async fn find_by_numbers(
        &self,
        branch_id: Uuid,
        numbers: &[i32],
    ) -> Result<Vec<Kart>, StoreError>;
}

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn get_plan(&self, id: Uuid) -> Result<Option<Plan>, StoreError>;

    async fn list_active_plans(&self) -> Result<Vec<Plan>, StoreError>;

    /// All price rows for one (plan, method); the caller applies the
    /// validity-window selection.
    async fn prices_for(
        &self,
        plan_id: Uuid,
        method: PaymentMethod,
    ) -> Result<Vec<PlanPrice>, StoreError>;
}

/// Booking persistence. The multi-entity writes are each one atomic unit in
/// every implementation: a failure partway leaves the pre-operation state.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Atomically insert the booking and its participants and decrement the
    /// slot's availability by `booking.qty`.
    ///
    /// Inside the same unit of work the implementation re-checks the booked
    /// seats on the slot (`SeatConflict` on overlap), guards the decrement
    /// (`CapacityExhausted` if it would go negative), and enforces code
    /// uniqueness (`DuplicateCode` on collision).
    async fn commit_booking(
        &self,
        booking: &Booking,
        participants: &[Participant],
    ) -> Result<(), StoreError>;

    /// Lookup by normalized (uppercase) code.
    async fn get_by_code(&self, code: &str) -> Result<Option<Booking>, StoreError>;

    async fn participants_for(&self, booking_id: Uuid) -> Result<Vec<Participant>, StoreError>;

    /// Union of seats across pending and confirmed bookings on a slot.
    async fn booked_seats(&self, slot_id: Uuid) -> Result<Vec<i32>, StoreError>;

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    async fn payments_for(&self, booking_id: Uuid) -> Result<Vec<Payment>, StoreError>;

    /// Atomically mark the booking cancelled and restore `qty` seats to the
    /// slot, capped at capacity.
    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        slot_id: Uuid,
        qty: i32,
    ) -> Result<(), StoreError>;

    /// Atomically move a booking: update slot/seats/qty, restore the old
    /// slot by the old qty, debit the new slot by the new qty. Re-checks
    /// per-kart overlap and aggregate availability on the destination.
    async fn reschedule_booking(
        &self,
        booking_id: Uuid,
        old_slot_id: Uuid,
        old_qty: i32,
        new_slot_id: Uuid,
        new_seats: &[i32],
    ) -> Result<(), StoreError>;
}
