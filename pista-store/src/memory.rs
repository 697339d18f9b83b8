use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use pista_core::booking::{Booking, Participant, Payment};
use pista_core::error::StoreError;
use pista_core::hold::Hold;
use pista_core::kart::Kart;
use pista_core::plan::{PaymentMethod, Plan, PlanPrice};
use pista_core::repository::{
    BookingRepository, HoldRepository, KartRepository, PlanRepository, SlotRepository,
};
use pista_core::slot::TimeSlot;

/// In-memory store for tests and local development.
///
/// One mutex guards all tables, so every repository operation is trivially
/// atomic: the multi-entity booking writes see the same isolation the
/// Postgres implementation gets from a transaction.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    slots: HashMap<Uuid, TimeSlot>,
    holds: Vec<Hold>,
    karts: Vec<Kart>,
    plans: HashMap<Uuid, Plan>,
    prices: Vec<PlanPrice>,
    bookings: HashMap<Uuid, Booking>,
    participants: Vec<Participant>,
    payments: Vec<Payment>,
}

impl Tables {
    fn booked_seats_locked(&self, slot_id: Uuid, exclude: Option<Uuid>) -> HashSet<i32> {
        self.bookings
            .values()
            .filter(|b| b.slot_id == slot_id && b.status.holds_seats())
            .filter(|b| Some(b.id) != exclude)
            .flat_map(|b| b.seats.iter().copied())
            .collect()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_kart(&self, kart: Kart) {
        self.inner.lock().await.karts.push(kart);
    }

    pub async fn seed_plan(&self, plan: Plan) {
        self.inner.lock().await.plans.insert(plan.id, plan);
    }

    pub async fn seed_price(&self, price: PlanPrice) {
        self.inner.lock().await.prices.push(price);
    }

    pub async fn seed_slot(&self, slot: TimeSlot) {
        self.inner.lock().await.slots.insert(slot.id, slot);
    }
}

#[async_trait]
impl SlotRepository for MemoryStore {
    async fn get_slot(&self, id: Uuid) -> Result<Option<TimeSlot>, StoreError> {
        Ok(self.inner.lock().await.slots.get(&id).cloned())
    }

    async fn list_open_slots(
        &self,
        branch_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, StoreError> {
        let tables = self.inner.lock().await;
        let mut slots: Vec<TimeSlot> = tables
            .slots
            .values()
            .filter(|s| {
                s.branch_id == branch_id
                    && s.date == date
                    && s.status == pista_core::slot::SlotStatus::Open
                    && s.available > 0
            })
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.start_time);
        Ok(slots)
    }

    async fn insert_slots(&self, slots: &[TimeSlot]) -> Result<u64, StoreError> {
        let mut tables = self.inner.lock().await;
        for slot in slots {
            tables.slots.insert(slot.id, slot.clone());
        }
        Ok(slots.len() as u64)
    }
}

#[async_trait]
impl HoldRepository for MemoryStore {
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.inner.lock().await;
        let before = tables.holds.len();
        tables.holds.retain(|h| !h.is_expired(now));
        Ok((before - tables.holds.len()) as u64)
    }

    async fn active_for_slot(
        &self,
        slot_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Hold>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .holds
            .iter()
            .filter(|h| h.slot_id == slot_id && !h.is_expired(now))
            .cloned()
            .collect())
    }

    async fn insert_hold(&self, hold: &Hold) -> Result<(), StoreError> {
        self.inner.lock().await.holds.push(hold.clone());
        Ok(())
    }

    async fn delete_for_session(&self, session_id: &str) -> Result<u64, StoreError> {
        let mut tables = self.inner.lock().await;
        let before = tables.holds.len();
        tables.holds.retain(|h| h.session_id != session_id);
        Ok((before - tables.holds.len()) as u64)
    }
}

#[async_trait]
impl KartRepository for MemoryStore {
    async fn list_for_branch(&self, branch_id: Uuid) -> Result<Vec<Kart>, StoreError> {
        let tables = self.inner.lock().await;
        let mut karts: Vec<Kart> = tables
            .karts
            .iter()
            .filter(|k| k.branch_id == branch_id)
            .cloned()
            .collect();
        karts.sort_by_key(|k| k.number);
        Ok(karts)
    }

    async fn find_by_numbers(
        &self,
        branch_id: Uuid,
        numbers: &[i32],
    ) -> Result<Vec<Kart>, StoreError> {
        let wanted: HashSet<i32> = numbers.iter().copied().collect();
        Ok(self
            .inner
            .lock()
            .await
            .karts
            .iter()
            .filter(|k| k.branch_id == branch_id && wanted.contains(&k.number))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PlanRepository for MemoryStore {
    async fn get_plan(&self, id: Uuid) -> Result<Option<Plan>, StoreError> {
        Ok(self.inner.lock().await.plans.get(&id).cloned())
    }

    async fn list_active_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let tables = self.inner.lock().await;
        let mut plans: Vec<Plan> = tables.plans.values().filter(|p| p.active).cloned().collect();
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    async fn prices_for(
        &self,
        plan_id: Uuid,
        method: PaymentMethod,
    ) -> Result<Vec<PlanPrice>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .prices
            .iter()
            .filter(|p| p.plan_id == plan_id && p.method == method)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn commit_booking(
        &self,
        booking: &Booking,
        participants: &[Participant],
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;

        if tables.bookings.values().any(|b| b.code == booking.code) {
            return Err(StoreError::DuplicateCode);
        }

        // Authoritative disjointness check, inside the lock.
        let taken = tables.booked_seats_locked(booking.slot_id, None);
        let mut clashes: Vec<i32> = booking
            .seats
            .iter()
            .copied()
            .filter(|s| taken.contains(s))
            .collect();
        if !clashes.is_empty() {
            clashes.sort_unstable();
            return Err(StoreError::SeatConflict(clashes));
        }

        let slot = tables
            .slots
            .get(&booking.slot_id)
            .ok_or(StoreError::Missing("time slot"))?;
        if slot.available < booking.qty {
            return Err(StoreError::CapacityExhausted);
        }

        // All checks passed: apply the whole unit.
        tables
            .slots
            .get_mut(&booking.slot_id)
            .expect("slot checked above")
            .available -= booking.qty;
        tables.bookings.insert(booking.id, booking.clone());
        tables.participants.extend(participants.iter().cloned());
        Ok(())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .bookings
            .values()
            .find(|b| b.code == code)
            .cloned())
    }

    async fn participants_for(&self, booking_id: Uuid) -> Result<Vec<Participant>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .participants
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn booked_seats(&self, slot_id: Uuid) -> Result<Vec<i32>, StoreError> {
        let tables = self.inner.lock().await;
        let mut seats: Vec<i32> = tables.booked_seats_locked(slot_id, None).into_iter().collect();
        seats.sort_unstable();
        Ok(seats)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        self.inner.lock().await.payments.push(payment.clone());
        Ok(())
    }

    async fn payments_for(&self, booking_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        slot_id: Uuid,
        qty: i32,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;

        // Same guarded transition as the Postgres store: only a booking
        // still holding seats can be cancelled, so the restore runs once.
        match tables.bookings.get(&booking_id) {
            None => return Err(StoreError::Missing("booking")),
            Some(b) if !b.status.holds_seats() => return Err(StoreError::StaleStatus),
            Some(_) => {}
        }

        {
            let slot = tables
                .slots
                .get_mut(&slot_id)
                .ok_or(StoreError::Missing("time slot"))?;
            slot.available = (slot.available + qty).min(slot.capacity);
        }

        let booking = tables
            .bookings
            .get_mut(&booking_id)
            .expect("booking checked above");
        booking.status = pista_core::booking::BookingStatus::Cancelled;
        Ok(())
    }

    async fn reschedule_booking(
        &self,
        booking_id: Uuid,
        old_slot_id: Uuid,
        old_qty: i32,
        new_slot_id: Uuid,
        new_seats: &[i32],
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        let new_qty = new_seats.len() as i32;

        match tables.bookings.get(&booking_id) {
            None => return Err(StoreError::Missing("booking")),
            Some(b) if !b.status.holds_seats() => return Err(StoreError::StaleStatus),
            Some(_) => {}
        }

        // Destination seat check, ignoring the booking being moved so a
        // same-slot seat swap is allowed.
        let taken = tables.booked_seats_locked(new_slot_id, Some(booking_id));
        let mut clashes: Vec<i32> = new_seats
            .iter()
            .copied()
            .filter(|s| taken.contains(s))
            .collect();
        if !clashes.is_empty() {
            clashes.sort_unstable();
            return Err(StoreError::SeatConflict(clashes));
        }

        if !tables.slots.contains_key(&old_slot_id) {
            return Err(StoreError::Missing("time slot"));
        }
        let new_slot = tables
            .slots
            .get(&new_slot_id)
            .ok_or(StoreError::Missing("time slot"))?;

        // When moving within the same slot the old seats come back first.
        let effective_available = if old_slot_id == new_slot_id {
            (new_slot.available + old_qty).min(new_slot.capacity)
        } else {
            new_slot.available
        };
        if effective_available < new_qty {
            return Err(StoreError::CapacityExhausted);
        }

        if old_slot_id == new_slot_id {
            let slot = tables.slots.get_mut(&new_slot_id).expect("checked above");
            slot.available = effective_available - new_qty;
        } else {
            {
                let old = tables.slots.get_mut(&old_slot_id).expect("checked above");
                old.available = (old.available + old_qty).min(old.capacity);
            }
            let new = tables.slots.get_mut(&new_slot_id).expect("checked above");
            new.available -= new_qty;
        }

        let booking = tables
            .bookings
            .get_mut(&booking_id)
            .ok_or(StoreError::Missing("booking"))?;
        booking.slot_id = new_slot_id;
        booking.seats = new_seats.to_vec();
        booking.qty = new_qty;
        Ok(())
    }
}
