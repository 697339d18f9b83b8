use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::BookingError;
use crate::kart::{kart_availability, KartAvailability, SeatStatus};
use crate::repository::{BookingRepository, HoldRepository, KartRepository, SlotRepository};
use crate::slot::{SlotView, TimeSlot};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KartAvailabilityView {
    pub time_slot: TimeSlot,
    pub karts: Vec<KartAvailability>,
    pub available_count: usize,
}

/// Read-side views over slots and karts. Everything here is derived at
/// read time; nothing is written back to storage except the opportunistic
/// hold purge.
pub struct AvailabilityService {
    slots: Arc<dyn SlotRepository>,
    holds: Arc<dyn HoldRepository>,
    karts: Arc<dyn KartRepository>,
    bookings: Arc<dyn BookingRepository>,
}

impl AvailabilityService {
    pub fn new(
        slots: Arc<dyn SlotRepository>,
        holds: Arc<dyn HoldRepository>,
        karts: Arc<dyn KartRepository>,
        bookings: Arc<dyn BookingRepository>,
    ) -> Self {
        Self {
            slots,
            holds,
            karts,
            bookings,
        }
    }

    /// Open slots for a branch and date, with display availability reduced
    /// by seats currently held by in-flight checkout sessions.
    pub async fn list_available_slots(
        &self,
        branch_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<SlotView>, BookingError> {
        let now = Utc::now();
        let slots = self.slots.list_open_slots(branch_id, date).await?;

        let mut views = Vec::with_capacity(slots.len());
        for slot in slots {
            let held: i32 = self
                .holds
                .active_for_slot(slot.id, now)
                .await?
                .iter()
                .map(|h| h.seats.len() as i32)
                .sum();
            views.push(SlotView::new(slot, held));
        }
        Ok(views)
    }

    /// Per-kart status map for one slot: oos beats booked beats held.
    pub async fn kart_availability(
        &self,
        slot_id: Uuid,
    ) -> Result<KartAvailabilityView, BookingError> {
        let slot = self
            .slots
            .get_slot(slot_id)
            .await?
            .ok_or(BookingError::NotFound("time slot"))?;

        let karts = self.karts.list_for_branch(slot.branch_id).await?;
        let booked = self.bookings.booked_seats(slot_id).await?;
        let held: Vec<i32> = self
            .holds
            .active_for_slot(slot_id, Utc::now())
            .await?
            .into_iter()
            .flat_map(|h| h.seats)
            .collect();

        let statuses = kart_availability(&karts, &booked, &held);
        let available_count = statuses
            .iter()
            .filter(|k| k.status == SeatStatus::Available)
            .count();

        Ok(KartAvailabilityView {
            time_slot: slot,
            karts: statuses,
            available_count,
        })
    }
}
