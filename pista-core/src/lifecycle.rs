use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::booking::{normalize_code, Booking, BookingStatus};
use crate::error::{BookingError, StoreError};
use crate::kart::KartStatus;
use crate::repository::{BookingRepository, KartRepository, SlotRepository};
use crate::slot::{SlotStatus, TimeSlot};

/// Post-creation state transitions: cancellation and rescheduling, both
/// guarded by the cutoff window against the booking's current slot.
pub struct LifecycleManager {
    slots: Arc<dyn SlotRepository>,
    karts: Arc<dyn KartRepository>,
    bookings: Arc<dyn BookingRepository>,
    cutoff_hours: i64,
}

impl LifecycleManager {
    pub fn new(
        slots: Arc<dyn SlotRepository>,
        karts: Arc<dyn KartRepository>,
        bookings: Arc<dyn BookingRepository>,
        cutoff_hours: i64,
    ) -> Self {
        Self {
            slots,
            karts,
            bookings,
            cutoff_hours,
        }
    }

    /// Cancel a booking and return its seats to the slot. The deposit is
    /// not refunded; no refund transaction exists to issue.
    pub async fn cancel_booking(&self, code: &str) -> Result<(), BookingError> {
        let booking = self.lookup(code).await?;

        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled);
        }

        let slot = self
            .slots
            .get_slot(booking.slot_id)
            .await?
            .ok_or(BookingError::NotFound("time slot"))?;
        self.check_cutoff(&slot, "cancel")?;

        self.bookings
            .cancel_booking(booking.id, booking.slot_id, booking.qty)
            .await?;

        tracing::info!(code = %booking.code, qty = booking.qty, "booking cancelled");
        Ok(())
    }

    /// Move a booking to a new slot and seat set. The booking update, the
    /// old slot's restore and the new slot's debit are one atomic unit.
    pub async fn reschedule_booking(
        &self,
        code: &str,
        new_slot_id: Uuid,
        new_seats: Vec<i32>,
    ) -> Result<(), BookingError> {
        let booking = self.lookup(code).await?;

        if !booking.status.holds_seats() {
            return Err(BookingError::Policy(
                "this booking can no longer be rescheduled".into(),
            ));
        }

        if new_seats.is_empty() {
            return Err(BookingError::Validation(
                "at least one kart must be selected".into(),
            ));
        }
        let unique: HashSet<i32> = new_seats.iter().copied().collect();
        if unique.len() != new_seats.len() {
            return Err(BookingError::Validation(
                "duplicate kart numbers in selection".into(),
            ));
        }

        // Cutoff is measured against the slot the customer currently has.
        let current_slot = self
            .slots
            .get_slot(booking.slot_id)
            .await?
            .ok_or(BookingError::NotFound("time slot"))?;
        self.check_cutoff(&current_slot, "reschedule")?;

        let new_slot = self
            .slots
            .get_slot(new_slot_id)
            .await?
            .ok_or(BookingError::NotFound("time slot"))?;
        if new_slot.status != SlotStatus::Open {
            return Err(BookingError::Policy("the new time slot is closed".into()));
        }

        let karts = self
            .karts
            .find_by_numbers(booking.branch_id, &new_seats)
            .await?;
        for &number in &new_seats {
            match karts.iter().find(|k| k.number == number) {
                None => {
                    return Err(BookingError::Validation(format!(
                        "kart {number} does not exist at this branch"
                    )))
                }
                Some(k) if k.status == KartStatus::Oos => {
                    return Err(BookingError::Validation(format!(
                        "kart {number} is out of service"
                    )))
                }
                Some(_) => {}
            }
        }

        match self
            .bookings
            .reschedule_booking(
                booking.id,
                booking.slot_id,
                booking.qty,
                new_slot_id,
                &new_seats,
            )
            .await
        {
            Ok(()) => {
                tracing::info!(
                    code = %booking.code,
                    new_slot_id = %new_slot_id,
                    qty = new_seats.len(),
                    "booking rescheduled"
                );
                Ok(())
            }
            Err(StoreError::CapacityExhausted) => Err(BookingError::Policy(
                "the new time slot does not have enough availability".into(),
            )),
            Err(StoreError::StaleStatus) => Err(BookingError::Policy(
                "this booking can no longer be rescheduled".into(),
            )),
            Err(other) => Err(other.into()),
        }
    }

    async fn lookup(&self, code: &str) -> Result<Booking, BookingError> {
        let code = normalize_code(code);
        self.bookings
            .get_by_code(&code)
            .await?
            .ok_or(BookingError::NotFound("booking"))
    }

    fn check_cutoff(&self, slot: &TimeSlot, action: &str) -> Result<(), BookingError> {
        let now = Utc::now().naive_utc();
        if slot.starts_at() - now < Duration::hours(self.cutoff_hours) {
            return Err(BookingError::Policy(format!(
                "cannot {action} less than {} hours before race time",
                self.cutoff_hours
            )));
        }
        Ok(())
    }
}
