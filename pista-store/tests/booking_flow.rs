use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use uuid::Uuid;

use pista_core::booking::{Booking, CreateBookingRequest, Participant, ParticipantInput, Payment};
use pista_core::hold::Hold;
use pista_core::kart::{Kart, KartStatus};
use pista_core::notify::LogSender;
use pista_core::plan::{PaymentMethod, Plan, PlanPrice};
use pista_core::repository::{BookingRepository, HoldRepository, SlotRepository};
use pista_core::slot::{SlotStatus, TimeSlot};
use pista_core::{
    AvailabilityService, BookingAllocator, BookingError, BookingStatus, HoldManager,
    LifecycleManager, PaymentStatus, StoreError,
};
use pista_store::MemoryStore;

const CASH_PRICE: i64 = 2_200_000;

struct Harness {
    store: Arc<MemoryStore>,
    hold_manager: HoldManager,
    allocator: Arc<BookingAllocator>,
    lifecycle: LifecycleManager,
    availability: AvailabilityService,
    branch_id: Uuid,
    plan_id: Uuid,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let branch_id = Uuid::new_v4();
    let plan_id = Uuid::new_v4();

    for number in 1..=8 {
        store
            .seed_kart(Kart {
                id: Uuid::new_v4(),
                branch_id,
                number,
                status: KartStatus::Ok,
                reason: None,
            })
            .await;
    }

    store
        .seed_plan(Plan {
            id: plan_id,
            name: "Plan 10".into(),
            qualy_laps: 2,
            race_laps: 10,
            description: None,
            active: true,
        })
        .await;

    let now = Utc::now();
    for (method, amount, surcharge_pct) in [
        (PaymentMethod::Cash, CASH_PRICE, 0),
        (PaymentMethod::Transfer, 2_400_000, 0),
        (PaymentMethod::Card, 2_400_000, 10),
    ] {
        store
            .seed_price(PlanPrice {
                id: Uuid::new_v4(),
                plan_id,
                method,
                amount,
                surcharge_pct,
                valid_from: now - Duration::days(1),
                valid_to: None,
                active: true,
            })
            .await;
    }

    let slots: Arc<dyn pista_core::repository::SlotRepository> = store.clone();
    let holds: Arc<dyn pista_core::repository::HoldRepository> = store.clone();
    let karts: Arc<dyn pista_core::repository::KartRepository> = store.clone();
    let plans: Arc<dyn pista_core::repository::PlanRepository> = store.clone();
    let bookings: Arc<dyn pista_core::repository::BookingRepository> = store.clone();

    Harness {
        hold_manager: HoldManager::new(holds.clone(), 5),
        allocator: Arc::new(BookingAllocator::new(
            slots.clone(),
            holds.clone(),
            karts.clone(),
            plans.clone(),
            bookings.clone(),
            Arc::new(LogSender),
            50,
        )),
        lifecycle: LifecycleManager::new(slots.clone(), karts.clone(), bookings.clone(), 24),
        availability: AvailabilityService::new(slots, holds, karts, bookings),
        store,
        branch_id,
        plan_id,
    }
}

fn slot_starting_in(branch_id: Uuid, hours: i64, capacity: i32) -> TimeSlot {
    let start = Utc::now().naive_utc() + Duration::hours(hours);
    TimeSlot {
        id: Uuid::new_v4(),
        branch_id,
        date: start.date(),
        start_time: start.time(),
        duration_min: 12,
        buffer_min: 3,
        capacity,
        available: capacity,
        status: SlotStatus::Open,
    }
}

fn participants(seats: &[i32]) -> Vec<ParticipantInput> {
    seats
        .iter()
        .enumerate()
        .map(|(i, &kart_number)| ParticipantInput {
            name: format!("Pilot {}", i + 1),
            dni: None,
            email: if i == 0 {
                Some("holder@example.com".into())
            } else {
                None
            },
            phone: None,
            kart_number,
            is_holder: i == 0,
        })
        .collect()
}

fn request(
    h: &Harness,
    slot_id: Uuid,
    seats: &[i32],
    method: PaymentMethod,
    session: &str,
) -> CreateBookingRequest {
    CreateBookingRequest {
        branch_id: h.branch_id,
        slot_id,
        plan_id: h.plan_id,
        participants: participants(seats),
        payment_method: method,
        notes: None,
        session_id: session.into(),
    }
}

#[tokio::test]
async fn hold_conflict_reports_the_clashing_seat() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    h.hold_manager
        .create_hold(slot.id, vec![3], "session-a".into())
        .await
        .unwrap();

    let err = h
        .hold_manager
        .create_hold(slot.id, vec![3], "session-b".into())
        .await
        .unwrap_err();

    match err {
        BookingError::Conflict { conflicting_seats } => assert_eq!(conflicting_seats, vec![3]),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn disjoint_holds_coexist_on_one_slot() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    h.hold_manager
        .create_hold(slot.id, vec![1, 2], "session-a".into())
        .await
        .unwrap();
    h.hold_manager
        .create_hold(slot.id, vec![3, 4], "session-b".into())
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_hold_does_not_block_booking() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    // Plant a hold that timed out: its session abandoned checkout.
    h.store
        .insert_hold(&Hold {
            id: Uuid::new_v4(),
            slot_id: slot.id,
            seats: vec![1, 2],
            session_id: "abandoned".into(),
            expires_at: Utc::now() - Duration::minutes(1),
        })
        .await
        .unwrap();

    let booking = h
        .allocator
        .create_booking(request(&h, slot.id, &[1, 2], PaymentMethod::Cash, "s-new"))
        .await
        .unwrap();
    assert_eq!(booking.seats, vec![1, 2]);
}

#[tokio::test]
async fn expired_hold_is_purged_and_seat_freed_for_new_hold() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    h.store
        .insert_hold(&Hold {
            id: Uuid::new_v4(),
            slot_id: slot.id,
            seats: vec![5],
            session_id: "stale".into(),
            expires_at: Utc::now() - Duration::seconds(1),
        })
        .await
        .unwrap();

    // The stale hold is invisible, so the same seat can be held again.
    h.hold_manager
        .create_hold(slot.id, vec![5], "fresh".into())
        .await
        .unwrap();
}

#[tokio::test]
async fn end_to_end_book_conflict_cancel() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 30, 8);
    h.store.seed_slot(slot.clone()).await;

    let booking = h
        .allocator
        .create_booking(request(&h, slot.id, &[1, 2], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();

    assert_eq!(booking.total, 2 * CASH_PRICE);
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_status, PaymentStatus::Deposit);

    let stored = h.store.get_slot(slot.id).await.unwrap().unwrap();
    assert_eq!(stored.available, 6);

    // Kart 2 is taken: the second attempt reports exactly that seat.
    let err = h
        .allocator
        .create_booking(request(&h, slot.id, &[2], PaymentMethod::Cash, "s-2"))
        .await
        .unwrap_err();
    match err {
        BookingError::Conflict { conflicting_seats } => assert_eq!(conflicting_seats, vec![2]),
        other => panic!("expected conflict, got {other:?}"),
    }
    let stored = h.store.get_slot(slot.id).await.unwrap().unwrap();
    assert_eq!(stored.available, 6);

    // 30 hours out, cancellation is allowed and restores capacity.
    h.lifecycle.cancel_booking(&booking.code).await.unwrap();
    let stored = h.store.get_slot(slot.id).await.unwrap().unwrap();
    assert_eq!(stored.available, 8);

    let detail = h.allocator.get_by_code(&booking.code).await.unwrap();
    assert_eq!(detail.booking.status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn non_cash_booking_is_pending_with_deposit_payment() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    let booking = h
        .allocator
        .create_booking(request(&h, slot.id, &[1], PaymentMethod::Transfer, "s-1"))
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.payment_status, PaymentStatus::Unpaid);

    let detail = h.allocator.get_by_code(&booking.code).await.unwrap();
    assert_eq!(detail.payments.len(), 1);
    assert_eq!(detail.payments[0].amount, booking.total / 2);
}

#[tokio::test]
async fn card_surcharge_is_applied_per_seat() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    let booking = h
        .allocator
        .create_booking(request(&h, slot.id, &[1, 2], PaymentMethod::Card, "s-1"))
        .await
        .unwrap();

    // 2,400,000 + 10% = 2,640,000 per seat
    assert_eq!(booking.total, 2 * 2_640_000);
}

#[tokio::test]
async fn holder_validation() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    let mut req = request(&h, slot.id, &[1, 2], PaymentMethod::Cash, "s-1");
    req.participants[0].is_holder = false;
    let err = h.allocator.create_booking(req).await.unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));

    let mut req = request(&h, slot.id, &[1, 2], PaymentMethod::Cash, "s-1");
    req.participants[1].is_holder = true;
    let err = h.allocator.create_booking(req).await.unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));
}

#[tokio::test]
async fn booking_releases_the_sessions_holds() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    h.hold_manager
        .create_hold(slot.id, vec![1, 2], "s-1".into())
        .await
        .unwrap();
    h.allocator
        .create_booking(request(&h, slot.id, &[1, 2], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();

    let live = h
        .store
        .active_for_slot(slot.id, Utc::now())
        .await
        .unwrap();
    assert!(live.is_empty());
}

#[tokio::test]
async fn concurrent_overlapping_bookings_allow_at_most_one_winner() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    let a = {
        let allocator = h.allocator.clone();
        let req = request(&h, slot.id, &[4, 5], PaymentMethod::Cash, "s-a");
        tokio::spawn(async move { allocator.create_booking(req).await })
    };
    let b = {
        let allocator = h.allocator.clone();
        let req = request(&h, slot.id, &[5, 6], PaymentMethod::Cash, "s-b");
        tokio::spawn(async move { allocator.create_booking(req).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "seat 5 must go to exactly one booking");

    let loser = results.iter().find(|r| r.is_err()).unwrap();
    match loser.as_ref().unwrap_err() {
        BookingError::Conflict { conflicting_seats } => {
            assert_eq!(conflicting_seats, &vec![5]);
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    // Seat sets across surviving bookings stay disjoint and the counter
    // reflects exactly the winner's two seats.
    let stored = h.store.get_slot(slot.id).await.unwrap().unwrap();
    assert_eq!(stored.available, 6);
    let booked = h.store.booked_seats(slot.id).await.unwrap();
    assert_eq!(booked.len(), 2);
}

#[tokio::test]
async fn capacity_guard_rejects_overflow() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 2);
    h.store.seed_slot(slot.clone()).await;

    h.allocator
        .create_booking(request(&h, slot.id, &[1, 2], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();

    let err = h
        .allocator
        .create_booking(request(&h, slot.id, &[3], PaymentMethod::Cash, "s-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Conflict { .. }));

    let stored = h.store.get_slot(slot.id).await.unwrap().unwrap();
    assert_eq!(stored.available, 0);
}

#[tokio::test]
async fn cancellation_cutoff_policy() {
    let h = harness().await;
    let near = slot_starting_in(h.branch_id, 23, 8);
    let far = slot_starting_in(h.branch_id, 25, 8);
    h.store.seed_slot(near.clone()).await;
    h.store.seed_slot(far.clone()).await;

    let near_booking = h
        .allocator
        .create_booking(request(&h, near.id, &[1], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();
    let far_booking = h
        .allocator
        .create_booking(request(&h, far.id, &[1], PaymentMethod::Cash, "s-2"))
        .await
        .unwrap();

    let err = h
        .lifecycle
        .cancel_booking(&near_booking.code)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Policy(_)));

    h.lifecycle.cancel_booking(&far_booking.code).await.unwrap();
}

#[tokio::test]
async fn cancelling_twice_fails() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    let booking = h
        .allocator
        .create_booking(request(&h, slot.id, &[1], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();

    h.lifecycle.cancel_booking(&booking.code).await.unwrap();
    let err = h.lifecycle.cancel_booking(&booking.code).await.unwrap_err();
    assert!(matches!(err, BookingError::AlreadyCancelled));

    // The restore happened exactly once.
    let stored = h.store.get_slot(slot.id).await.unwrap().unwrap();
    assert_eq!(stored.available, 8);
}

#[tokio::test]
async fn lookup_is_case_insensitive() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    let booking = h
        .allocator
        .create_booking(request(&h, slot.id, &[1], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();

    let lower = booking.code.to_lowercase();
    let detail = h.allocator.get_by_code(&lower).await.unwrap();
    assert_eq!(detail.booking.id, booking.id);
}

#[tokio::test]
async fn reschedule_moves_capacity_between_slots() {
    let h = harness().await;
    let old_slot = slot_starting_in(h.branch_id, 48, 8);
    let new_slot = slot_starting_in(h.branch_id, 72, 8);
    h.store.seed_slot(old_slot.clone()).await;
    h.store.seed_slot(new_slot.clone()).await;

    let booking = h
        .allocator
        .create_booking(request(&h, old_slot.id, &[1, 2], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();

    h.lifecycle
        .reschedule_booking(&booking.code, new_slot.id, vec![3, 4, 5])
        .await
        .unwrap();

    let old_stored = h.store.get_slot(old_slot.id).await.unwrap().unwrap();
    let new_stored = h.store.get_slot(new_slot.id).await.unwrap().unwrap();
    assert_eq!(old_stored.available, 8);
    assert_eq!(new_stored.available, 5);

    let detail = h.allocator.get_by_code(&booking.code).await.unwrap();
    assert_eq!(detail.booking.slot_id, new_slot.id);
    assert_eq!(detail.booking.seats, vec![3, 4, 5]);
    assert_eq!(detail.booking.qty, 3);
}

#[tokio::test]
async fn reschedule_rejects_destination_seat_overlap() {
    let h = harness().await;
    let old_slot = slot_starting_in(h.branch_id, 48, 8);
    let new_slot = slot_starting_in(h.branch_id, 72, 8);
    h.store.seed_slot(old_slot.clone()).await;
    h.store.seed_slot(new_slot.clone()).await;

    // Someone else already races kart 3 in the destination slot.
    h.allocator
        .create_booking(request(&h, new_slot.id, &[3], PaymentMethod::Cash, "s-other"))
        .await
        .unwrap();

    let booking = h
        .allocator
        .create_booking(request(&h, old_slot.id, &[1], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();

    let err = h
        .lifecycle
        .reschedule_booking(&booking.code, new_slot.id, vec![3])
        .await
        .unwrap_err();
    match err {
        BookingError::Conflict { conflicting_seats } => assert_eq!(conflicting_seats, vec![3]),
        other => panic!("expected conflict, got {other:?}"),
    }

    // Nothing moved.
    let old_stored = h.store.get_slot(old_slot.id).await.unwrap().unwrap();
    assert_eq!(old_stored.available, 7);
}

#[tokio::test]
async fn reschedule_rejects_insufficient_destination_capacity() {
    let h = harness().await;
    let old_slot = slot_starting_in(h.branch_id, 48, 8);
    let new_slot = slot_starting_in(h.branch_id, 72, 1);
    h.store.seed_slot(old_slot.clone()).await;
    h.store.seed_slot(new_slot.clone()).await;

    let booking = h
        .allocator
        .create_booking(request(&h, old_slot.id, &[1, 2], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();

    let err = h
        .lifecycle
        .reschedule_booking(&booking.code, new_slot.id, vec![1, 2])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Policy(_)));
}

#[tokio::test]
async fn reschedule_respects_cutoff_on_current_slot() {
    let h = harness().await;
    let near = slot_starting_in(h.branch_id, 23, 8);
    let far = slot_starting_in(h.branch_id, 72, 8);
    h.store.seed_slot(near.clone()).await;
    h.store.seed_slot(far.clone()).await;

    let booking = h
        .allocator
        .create_booking(request(&h, near.id, &[1], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();

    let err = h
        .lifecycle
        .reschedule_booking(&booking.code, far.id, vec![1])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Policy(_)));
}

#[tokio::test]
async fn held_seats_reduce_display_availability_only() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    h.hold_manager
        .create_hold(slot.id, vec![1, 2, 3], "s-1".into())
        .await
        .unwrap();

    let views = h
        .availability
        .list_available_slots(h.branch_id, slot.date)
        .await
        .unwrap();
    let view = views.iter().find(|v| v.slot.id == slot.id).unwrap();
    assert_eq!(view.display_available, 5);
    assert_eq!(view.slot.available, 8, "stored counter untouched by holds");
}

#[tokio::test]
async fn kart_availability_view_reflects_all_states() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    // Kart 9 is in the workshop.
    h.store
        .seed_kart(Kart {
            id: Uuid::new_v4(),
            branch_id: h.branch_id,
            number: 9,
            status: KartStatus::Oos,
            reason: Some("engine rebuild".into()),
        })
        .await;

    h.allocator
        .create_booking(request(&h, slot.id, &[1], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();
    h.hold_manager
        .create_hold(slot.id, vec![2], "s-2".into())
        .await
        .unwrap();

    let view = h.availability.kart_availability(slot.id).await.unwrap();
    let status_of = |n: i32| {
        view.karts
            .iter()
            .find(|k| k.number == n)
            .map(|k| k.status)
            .unwrap()
    };

    assert_eq!(status_of(1), pista_core::kart::SeatStatus::Booked);
    assert_eq!(status_of(2), pista_core::kart::SeatStatus::Held);
    assert_eq!(status_of(3), pista_core::kart::SeatStatus::Available);
    assert_eq!(status_of(9), pista_core::kart::SeatStatus::Oos);
    assert_eq!(view.available_count, 6);
}

/// Booking store that rejects the first `collisions` commits as duplicate
/// codes and delegates everything else, recording each code it was offered.
struct CollidingCommits {
    inner: Arc<MemoryStore>,
    collisions: AtomicU32,
    codes: StdMutex<Vec<String>>,
}

impl CollidingCommits {
    fn new(inner: Arc<MemoryStore>, collisions: u32) -> Self {
        Self {
            inner,
            collisions: AtomicU32::new(collisions),
            codes: StdMutex::new(Vec::new()),
        }
    }

    fn seen_codes(&self) -> Vec<String> {
        self.codes.lock().unwrap().clone()
    }
}

#[async_trait]
impl BookingRepository for CollidingCommits {
    async fn commit_booking(
        &self,
        booking: &Booking,
        participants: &[Participant],
    ) -> Result<(), StoreError> {
        self.codes.lock().unwrap().push(booking.code.clone());
        let collide = self
            .collisions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if collide {
            return Err(StoreError::DuplicateCode);
        }
        self.inner.commit_booking(booking, participants).await
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Booking>, StoreError> {
        self.inner.get_by_code(code).await
    }

    async fn participants_for(&self, booking_id: Uuid) -> Result<Vec<Participant>, StoreError> {
        self.inner.participants_for(booking_id).await
    }

    async fn booked_seats(&self, slot_id: Uuid) -> Result<Vec<i32>, StoreError> {
        self.inner.booked_seats(slot_id).await
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        self.inner.insert_payment(payment).await
    }

    async fn payments_for(&self, booking_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        self.inner.payments_for(booking_id).await
    }

    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        slot_id: Uuid,
        qty: i32,
    ) -> Result<(), StoreError> {
        self.inner.cancel_booking(booking_id, slot_id, qty).await
    }

    async fn reschedule_booking(
        &self,
        booking_id: Uuid,
        old_slot_id: Uuid,
        old_qty: i32,
        new_slot_id: Uuid,
        new_seats: &[i32],
    ) -> Result<(), StoreError> {
        self.inner
            .reschedule_booking(booking_id, old_slot_id, old_qty, new_slot_id, new_seats)
            .await
    }
}

fn allocator_over(h: &Harness, bookings: Arc<dyn BookingRepository>) -> BookingAllocator {
    BookingAllocator::new(
        h.store.clone(),
        h.store.clone(),
        h.store.clone(),
        h.store.clone(),
        bookings,
        Arc::new(LogSender),
        50,
    )
}

#[tokio::test]
async fn code_collision_retries_with_a_fresh_code() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    let colliding = Arc::new(CollidingCommits::new(h.store.clone(), 2));
    let allocator = allocator_over(&h, colliding.clone());

    let booking = allocator
        .create_booking(request(&h, slot.id, &[1], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();

    let codes = colliding.seen_codes();
    assert_eq!(codes.len(), 3);
    let distinct: HashSet<&String> = codes.iter().collect();
    assert_eq!(distinct.len(), 3, "every attempt used a fresh code");
    assert_eq!(codes[2], booking.code);

    // Exactly one booking landed, under the final code.
    assert!(h.store.get_by_code(&booking.code).await.unwrap().is_some());
    let stored = h.store.get_slot(slot.id).await.unwrap().unwrap();
    assert_eq!(stored.available, 7);
}

#[tokio::test]
async fn code_collision_retry_is_bounded() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    let colliding = Arc::new(CollidingCommits::new(h.store.clone(), u32::MAX));
    let allocator = allocator_over(&h, colliding.clone());

    let err = allocator
        .create_booking(request(&h, slot.id, &[1], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::Storage(StoreError::DuplicateCode)
    ));

    // Five attempts, then the allocator gives up without committing.
    assert_eq!(colliding.seen_codes().len(), 5);
    let stored = h.store.get_slot(slot.id).await.unwrap().unwrap();
    assert_eq!(stored.available, 8);
}

#[tokio::test]
async fn store_rejects_duplicate_booking_code() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    let booking = h
        .allocator
        .create_booking(request(&h, slot.id, &[1], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();

    let mut second = booking.clone();
    second.id = Uuid::new_v4();
    second.seats = vec![2];
    second.qty = 1;
    let err = h.store.commit_booking(&second, &[]).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateCode));
}

#[tokio::test]
async fn racing_cancels_restore_seats_once() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    let a = h
        .allocator
        .create_booking(request(&h, slot.id, &[1, 2], PaymentMethod::Cash, "s-a"))
        .await
        .unwrap();
    h.allocator
        .create_booking(request(&h, slot.id, &[3, 4], PaymentMethod::Cash, "s-b"))
        .await
        .unwrap();
    assert_eq!(h.store.get_slot(slot.id).await.unwrap().unwrap().available, 4);

    // Two callers race past the service-level status check; the store's
    // guarded transition lets only the first one through.
    h.store.cancel_booking(a.id, slot.id, a.qty).await.unwrap();
    let err = h
        .store
        .cancel_booking(a.id, slot.id, a.qty)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::StaleStatus));

    let stored = h.store.get_slot(slot.id).await.unwrap().unwrap();
    assert_eq!(stored.available, 6);
}

#[tokio::test]
async fn reschedule_guard_rejects_a_cancelled_booking() {
    let h = harness().await;
    let old_slot = slot_starting_in(h.branch_id, 48, 8);
    let new_slot = slot_starting_in(h.branch_id, 72, 8);
    h.store.seed_slot(old_slot.clone()).await;
    h.store.seed_slot(new_slot.clone()).await;

    let booking = h
        .allocator
        .create_booking(request(&h, old_slot.id, &[1], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap();
    h.lifecycle.cancel_booking(&booking.code).await.unwrap();

    let err = h
        .store
        .reschedule_booking(booking.id, old_slot.id, booking.qty, new_slot.id, &[2])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::StaleStatus));

    // No capacity moved anywhere.
    assert_eq!(h.store.get_slot(old_slot.id).await.unwrap().unwrap().available, 8);
    assert_eq!(h.store.get_slot(new_slot.id).await.unwrap().unwrap().available, 8);
}

#[tokio::test]
async fn booking_oos_kart_is_rejected() {
    let h = harness().await;
    let slot = slot_starting_in(h.branch_id, 48, 8);
    h.store.seed_slot(slot.clone()).await;

    h.store
        .seed_kart(Kart {
            id: Uuid::new_v4(),
            branch_id: h.branch_id,
            number: 9,
            status: KartStatus::Oos,
            reason: None,
        })
        .await;

    let err = h
        .allocator
        .create_booking(request(&h, slot.id, &[9], PaymentMethod::Cash, "s-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));
}
