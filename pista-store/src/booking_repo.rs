use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use pista_core::booking::{Booking, Participant, Payment};
use pista_core::error::StoreError;
use pista_core::repository::BookingRepository;

use crate::backend_err;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    code: String,
    branch_id: Uuid,
    time_slot_id: Uuid,
    plan_id: Uuid,
    seats: Vec<i32>,
    qty: i32,
    customer_name: String,
    email: String,
    phone: Option<String>,
    notes: String,
    payment_method: String,
    subtotal: i64,
    total: i64,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self) -> Result<Booking, StoreError> {
        Ok(Booking {
            id: self.id,
            code: self.code,
            branch_id: self.branch_id,
            slot_id: self.time_slot_id,
            plan_id: self.plan_id,
            seats: self.seats,
            qty: self.qty,
            customer_name: self.customer_name,
            email: self.email,
            phone: self.phone,
            notes: self.notes,
            payment_method: self.payment_method.parse().map_err(StoreError::Backend)?,
            subtotal: self.subtotal,
            total: self.total,
            status: self.status.parse().map_err(StoreError::Backend)?,
            payment_status: self.payment_status.parse().map_err(StoreError::Backend)?,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    id: Uuid,
    booking_id: Uuid,
    kart_id: Uuid,
    name: String,
    dni: Option<String>,
    is_holder: bool,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Participant {
            id: row.id,
            booking_id: row.booking_id,
            kart_id: row.kart_id,
            name: row.name,
            dni: row.dni,
            is_holder: row.is_holder,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    method: String,
    amount: i64,
    status: String,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, StoreError> {
        Ok(Payment {
            id: self.id,
            booking_id: self.booking_id,
            method: self.method.parse().map_err(StoreError::Backend)?,
            amount: self.amount,
            status: self.status.parse().map_err(StoreError::Backend)?,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, code, branch_id, time_slot_id, plan_id, seats, qty, \
     customer_name, email, phone, notes, payment_method, subtotal, total, status, \
     payment_status, created_at";

fn map_insert_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
            && db.constraint() == Some("bookings_code_key")
        {
            return StoreError::DuplicateCode;
        }
    }
    backend_err(err)
}

/// Take the slot's row lock for the rest of the transaction. Every writer on
/// a slot goes through this first, so the seat reads below cannot miss a
/// concurrent insert: locking only the existing booking rows would let two
/// inserters for an empty slot pass each other (phantom insert).
async fn lock_slot(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    slot_id: Uuid,
) -> Result<(), StoreError> {
    let locked = sqlx::query("SELECT id FROM time_slots WHERE id = $1 FOR UPDATE")
        .bind(slot_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend_err)?;
    if locked.is_none() {
        return Err(StoreError::Missing("time slot"));
    }
    Ok(())
}

/// Seats on `slot_id` occupied by pending/confirmed bookings, with the rows
/// locked for the duration of the surrounding transaction.
async fn locked_booked_seats(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    slot_id: Uuid,
    exclude: Option<Uuid>,
) -> Result<HashSet<i32>, StoreError> {
    let rows: Vec<(Vec<i32>,)> = sqlx::query_as(
        "SELECT seats FROM bookings \
         WHERE time_slot_id = $1 AND status IN ('pending', 'confirmed') AND id != $2 \
         FOR UPDATE",
    )
    .bind(slot_id)
    .bind(exclude.unwrap_or(Uuid::nil()))
    .fetch_all(&mut **tx)
    .await
    .map_err(backend_err)?;

    Ok(rows.into_iter().flat_map(|(seats,)| seats).collect())
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn commit_booking(
        &self,
        booking: &Booking,
        participants: &[Participant],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend_err)?;

        // Authoritative disjointness check: the slot lock serializes all
        // writers on this slot, so the loser of a race sees the winner's
        // committed seats.
        lock_slot(&mut tx, booking.slot_id).await?;
        let taken = locked_booked_seats(&mut tx, booking.slot_id, None).await?;
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

        sqlx::query(&format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        ))
        .bind(booking.id)
        .bind(&booking.code)
        .bind(booking.branch_id)
        .bind(booking.slot_id)
        .bind(booking.plan_id)
        .bind(&booking.seats)
        .bind(booking.qty)
        .bind(&booking.customer_name)
        .bind(&booking.email)
        .bind(&booking.phone)
        .bind(&booking.notes)
        .bind(booking.payment_method.as_str())
        .bind(booking.subtotal)
        .bind(booking.total)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_insert_err)?;

        for p in participants {
            sqlx::query(
                "INSERT INTO participants (id, booking_id, kart_id, name, dni, is_holder) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(p.id)
            .bind(p.booking_id)
            .bind(p.kart_id)
            .bind(&p.name)
            .bind(&p.dni)
            .bind(p.is_holder)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        }

        // Guarded decrement: zero rows touched means the counter would have
        // gone negative, i.e. this racer lost. Dropping the transaction
        // rolls back the inserts above.
        let updated = sqlx::query(
            "UPDATE time_slots SET available = available - $2 \
             WHERE id = $1 AND available >= $2",
        )
        .bind(booking.slot_id)
        .bind(booking.qty)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?
        .rows_affected();
        if updated == 0 {
            return Err(StoreError::CapacityExhausted);
        }

        tx.commit().await.map_err(backend_err)
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        row.map(BookingRow::into_booking).transpose()
    }

    async fn participants_for(&self, booking_id: Uuid) -> Result<Vec<Participant>, StoreError> {
        let rows: Vec<ParticipantRow> = sqlx::query_as(
            "SELECT id, booking_id, kart_id, name, dni, is_holder \
             FROM participants WHERE booking_id = $1",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        Ok(rows.into_iter().map(Participant::from).collect())
    }

    async fn booked_seats(&self, slot_id: Uuid) -> Result<Vec<i32>, StoreError> {
        let rows: Vec<(Vec<i32>,)> = sqlx::query_as(
            "SELECT seats FROM bookings \
             WHERE time_slot_id = $1 AND status IN ('pending', 'confirmed')",
        )
        .bind(slot_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        let mut seats: Vec<i32> = rows
            .into_iter()
            .flat_map(|(seats,)| seats)
            .collect::<HashSet<i32>>()
            .into_iter()
            .collect();
        seats.sort_unstable();
        Ok(seats)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payments (id, booking_id, method, amount, status) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(payment.id)
        .bind(payment.booking_id)
        .bind(payment.method.as_str())
        .bind(payment.amount)
        .bind(payment.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    async fn payments_for(&self, booking_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(
            "SELECT id, booking_id, method, amount, status \
             FROM payments WHERE booking_id = $1",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        rows.into_iter().map(PaymentRow::into_payment).collect()
    }

    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        slot_id: Uuid,
        qty: i32,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend_err)?;

        lock_slot(&mut tx, slot_id).await?;

        // Guarded transition: of two racing cancels, only one matches the
        // pending/confirmed row, so the restore below runs exactly once.
        let updated = sqlx::query(
            "UPDATE bookings SET status = 'cancelled' \
             WHERE id = $1 AND status IN ('pending', 'confirmed')",
        )
        .bind(booking_id)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?
        .rows_affected();
        if updated == 0 {
            return Err(StoreError::StaleStatus);
        }

        // Restore is capped at capacity so a double restore can never
        // overfill the slot.
        let updated = sqlx::query(
            "UPDATE time_slots SET available = LEAST(capacity, available + $2) WHERE id = $1",
        )
        .bind(slot_id)
        .bind(qty)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?
        .rows_affected();
        if updated == 0 {
            return Err(StoreError::Missing("time slot"));
        }

        tx.commit().await.map_err(backend_err)
    }

    async fn reschedule_booking(
        &self,
        booking_id: Uuid,
        old_slot_id: Uuid,
        old_qty: i32,
        new_slot_id: Uuid,
        new_seats: &[i32],
    ) -> Result<(), StoreError> {
        let new_qty = new_seats.len() as i32;
        let mut tx = self.pool.begin().await.map_err(backend_err)?;

        // Lock both slot rows in a fixed order so concurrent moves between
        // the same pair of slots cannot deadlock.
        let mut slot_ids = [old_slot_id, new_slot_id];
        slot_ids.sort();
        lock_slot(&mut tx, slot_ids[0]).await?;
        if slot_ids[1] != slot_ids[0] {
            lock_slot(&mut tx, slot_ids[1]).await?;
        }

        // Per-kart check on the destination, not just the aggregate counter.
        let taken = locked_booked_seats(&mut tx, new_slot_id, Some(booking_id)).await?;
        let mut clashes: Vec<i32> = new_seats
            .iter()
            .copied()
            .filter(|s| taken.contains(s))
            .collect();
        if !clashes.is_empty() {
            clashes.sort_unstable();
            return Err(StoreError::SeatConflict(clashes));
        }

        // Status guard: a booking cancelled since the caller read it must
        // not be moved, and must not re-debit any slot.
        let updated = sqlx::query(
            "UPDATE bookings SET time_slot_id = $2, seats = $3, qty = $4 \
             WHERE id = $1 AND status IN ('pending', 'confirmed')",
        )
        .bind(booking_id)
        .bind(new_slot_id)
        .bind(new_seats)
        .bind(new_qty)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?
        .rows_affected();
        if updated == 0 {
            return Err(StoreError::StaleStatus);
        }

        // Restore the old slot first so a same-slot seat swap sees its own
        // seats come back before the guarded debit.
        let updated = sqlx::query(
            "UPDATE time_slots SET available = LEAST(capacity, available + $2) WHERE id = $1",
        )
        .bind(old_slot_id)
        .bind(old_qty)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?
        .rows_affected();
        if updated == 0 {
            return Err(StoreError::Missing("time slot"));
        }

        let updated = sqlx::query(
            "UPDATE time_slots SET available = available - $2 \
             WHERE id = $1 AND available >= $2",
        )
        .bind(new_slot_id)
        .bind(new_qty)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?
        .rows_affected();
        if updated == 0 {
            return Err(StoreError::CapacityExhausted);
        }

        tx.commit().await.map_err(backend_err)
    }
}
