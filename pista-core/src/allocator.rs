use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::booking::{
    generate_booking_code, normalize_code, Booking, BookingStatus, CreateBookingRequest,
    Participant, Payment, PaymentRecordStatus, PaymentStatus,
};
use crate::error::{BookingError, StoreError};
use crate::kart::KartStatus;
use crate::notify::NotificationSender;
use crate::plan::select_current_price;
use crate::repository::{
    BookingRepository, HoldRepository, KartRepository, PlanRepository, SlotRepository,
};
use crate::slot::SlotStatus;

/// Attempts at a fresh booking code before giving up. Collisions on a
/// 36^6 space are rare enough that hitting this limit means something is
/// wrong with the RNG or the table.
const CODE_RETRY_LIMIT: u32 = 5;

/// Booking plus its linked rows, as returned by the code lookup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetail {
    #[serde(flatten)]
    pub booking: Booking,
    pub participants: Vec<Participant>,
    pub payments: Vec<Payment>,
}

/// The transactional core: turns a validated checkout request into a
/// committed booking while keeping slot capacity and seat disjointness
/// consistent under concurrent attempts.
pub struct BookingAllocator {
    slots: Arc<dyn SlotRepository>,
    holds: Arc<dyn HoldRepository>,
    karts: Arc<dyn KartRepository>,
    plans: Arc<dyn PlanRepository>,
    bookings: Arc<dyn BookingRepository>,
    notifier: Arc<dyn NotificationSender>,
    deposit_pct: i64,
}

impl BookingAllocator {
    pub fn new(
        slots: Arc<dyn SlotRepository>,
        holds: Arc<dyn HoldRepository>,
        karts: Arc<dyn KartRepository>,
        plans: Arc<dyn PlanRepository>,
        bookings: Arc<dyn BookingRepository>,
        notifier: Arc<dyn NotificationSender>,
        deposit_pct: i64,
    ) -> Self {
        Self {
            slots,
            holds,
            karts,
            plans,
            bookings,
            notifier,
            deposit_pct,
        }
    }

    pub async fn create_booking(
        &self,
        req: CreateBookingRequest,
    ) -> Result<Booking, BookingError> {
        // Exactly one participant is the contact of record.
        let holders: Vec<_> = req.participants.iter().filter(|p| p.is_holder).collect();
        let holder = match holders.as_slice() {
            [one] => *one,
            [] => {
                return Err(BookingError::Validation(
                    "a holder participant is required".into(),
                ))
            }
            _ => {
                return Err(BookingError::Validation(
                    "only one participant may be the holder".into(),
                ))
            }
        };
        let email = holder
            .email
            .clone()
            .ok_or_else(|| BookingError::Validation("holder email is required".into()))?;
        let customer_name = holder.name.clone();
        let phone = holder.phone.clone();

        let seats: Vec<i32> = req.participants.iter().map(|p| p.kart_number).collect();
        if seats.is_empty() {
            return Err(BookingError::Validation(
                "at least one participant is required".into(),
            ));
        }
        let unique: HashSet<i32> = seats.iter().copied().collect();
        if unique.len() != seats.len() {
            return Err(BookingError::Validation(
                "participants share a kart number".into(),
            ));
        }

        let slot = self
            .slots
            .get_slot(req.slot_id)
            .await?
            .ok_or(BookingError::NotFound("time slot"))?;
        if slot.status != SlotStatus::Open {
            return Err(BookingError::Policy("time slot is closed".into()));
        }

        // Resolve kart numbers to roster rows; out-of-service karts are not
        // bookable even if nothing else occupies them.
        let karts = self.karts.find_by_numbers(req.branch_id, &seats).await?;
        for &number in &seats {
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

        // Early conflict check against committed bookings. This is advisory
        // for UX; the commit below re-runs it inside the transaction and is
        // the authoritative one.
        let booked = self.bookings.booked_seats(req.slot_id).await?;
        let taken: HashSet<i32> = booked.into_iter().collect();
        let clashes: Vec<i32> = seats.iter().copied().filter(|s| taken.contains(s)).collect();
        if !clashes.is_empty() {
            return Err(BookingError::Conflict {
                conflicting_seats: clashes,
            });
        }

        let plan = self
            .plans
            .get_plan(req.plan_id)
            .await?
            .ok_or(BookingError::NotFound("plan"))?;
        let prices = self.plans.prices_for(plan.id, req.payment_method).await?;
        let now = Utc::now();
        let price = select_current_price(&prices, now)
            .ok_or(BookingError::NotFound("plan price"))?;

        let unit_price = price.unit_price();
        let qty = seats.len() as i32;
        let total = unit_price * qty as i64;

        let (status, payment_status) = if req.payment_method.is_pay_on_arrival() {
            (BookingStatus::Confirmed, PaymentStatus::Deposit)
        } else {
            (BookingStatus::Pending, PaymentStatus::Unpaid)
        };

        let mut booking = Booking {
            id: Uuid::new_v4(),
            code: generate_booking_code(),
            branch_id: req.branch_id,
            slot_id: req.slot_id,
            plan_id: req.plan_id,
            seats: seats.clone(),
            qty,
            customer_name,
            email,
            phone,
            notes: req.notes.unwrap_or_default(),
            payment_method: req.payment_method,
            subtotal: total,
            total,
            status,
            payment_status,
            created_at: now,
        };

        let participants: Vec<Participant> = req
            .participants
            .iter()
            .map(|p| {
                // Present by construction: every number was resolved above.
                let kart = karts.iter().find(|k| k.number == p.kart_number);
                Participant {
                    id: Uuid::new_v4(),
                    booking_id: booking.id,
                    kart_id: kart.map(|k| k.id).unwrap_or_default(),
                    name: p.name.clone(),
                    dni: p.dni.clone(),
                    is_holder: p.is_holder,
                }
            })
            .collect();

        // Commit, regenerating the code on a uniqueness collision. Every
        // attempt is a fresh atomic unit, so a retry can never double-charge
        // or double-allocate.
        let mut attempts = 0;
        loop {
            match self.bookings.commit_booking(&booking, &participants).await {
                Ok(()) => break,
                Err(StoreError::DuplicateCode) => {
                    attempts += 1;
                    if attempts >= CODE_RETRY_LIMIT {
                        return Err(BookingError::Storage(StoreError::DuplicateCode));
                    }
                    tracing::warn!(code = %booking.code, "booking code collision, regenerating");
                    booking.code = generate_booking_code();
                }
                Err(other) => return Err(other.into()),
            }
        }

        tracing::info!(
            code = %booking.code,
            slot_id = %booking.slot_id,
            qty = booking.qty,
            total = booking.total,
            "booking committed"
        );

        // Post-commit side effects are fire-and-forget: the booking stands
        // even if any of these fail.
        if let Err(err) = self.holds.delete_for_session(&req.session_id).await {
            tracing::warn!(session_id = %req.session_id, error = %err, "hold cleanup failed");
        }

        if !req.payment_method.is_pay_on_arrival() {
            let deposit = Payment {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                method: req.payment_method,
                amount: booking.total * self.deposit_pct / 100,
                status: PaymentRecordStatus::Pending,
            };
            if let Err(err) = self.bookings.insert_payment(&deposit).await {
                tracing::warn!(code = %booking.code, error = %err, "deposit record failed");
            }
        }

        if let Err(err) = self.notifier.booking_confirmed(&booking).await {
            tracing::warn!(code = %booking.code, error = %err, "confirmation notification failed");
        }

        Ok(booking)
    }

    /// Case-insensitive lookup by code.
    pub async fn get_by_code(&self, code: &str) -> Result<BookingDetail, BookingError> {
        let code = normalize_code(code);
        let booking = self
            .bookings
            .get_by_code(&code)
            .await?
            .ok_or(BookingError::NotFound("booking"))?;
        let participants = self.bookings.participants_for(booking.id).await?;
        let payments = self.bookings.payments_for(booking.id).await?;
        Ok(BookingDetail {
            booking,
            participants,
            payments,
        })
    }
}
