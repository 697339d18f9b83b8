use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::BookingError;
use crate::repository::HoldRepository;

/// An ephemeral soft reservation of karts within one slot, owned by a
/// checkout session. Holds never decrement slot availability; they only
/// surface as "held" to other viewers and gate the happy path to checkout.
/// The authoritative seat check happens again at booking commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hold {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub seats: Vec<i32>,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Hold {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Kart numbers from `requested` that appear in any of the live holds.
pub fn conflicting_seats(requested: &[i32], holds: &[Hold]) -> Vec<i32> {
    let held: HashSet<i32> = holds.iter().flat_map(|h| h.seats.iter().copied()).collect();
    requested
        .iter()
        .copied()
        .filter(|seat| held.contains(seat))
        .collect()
}

/// Advisory seat locking with a TTL.
///
/// This is read-check-write without a storage guard: two sessions racing the
/// same seat can in principle both acquire a hold. That is acceptable because
/// the booking allocator re-validates against committed bookings inside its
/// transaction; a stale hold costs a customer a re-selection, never a
/// double-booked kart.
pub struct HoldManager {
    holds: Arc<dyn HoldRepository>,
    ttl_minutes: i64,
}

impl HoldManager {
    pub fn new(holds: Arc<dyn HoldRepository>, ttl_minutes: i64) -> Self {
        Self { holds, ttl_minutes }
    }

    /// Place a hold on `seats` for `session_id`, failing with the specific
    /// clashing kart numbers if another live hold already covers any of them.
    pub async fn create_hold(
        &self,
        slot_id: Uuid,
        seats: Vec<i32>,
        session_id: String,
    ) -> Result<Hold, BookingError> {
        if seats.is_empty() {
            return Err(BookingError::Validation(
                "at least one kart must be selected".into(),
            ));
        }
        let mut deduped = seats.clone();
        deduped.sort_unstable();
        deduped.dedup();
        if deduped.len() != seats.len() {
            return Err(BookingError::Validation(
                "duplicate kart numbers in selection".into(),
            ));
        }

        let now = Utc::now();

        // Opportunistic hygiene: drop every expired hold before reading.
        let purged = self.holds.purge_expired(now).await?;
        if purged > 0 {
            tracing::debug!(purged, "purged expired holds");
        }

        let live = self.holds.active_for_slot(slot_id, now).await?;
        let clashes = conflicting_seats(&seats, &live);
        if !clashes.is_empty() {
            return Err(BookingError::Conflict {
                conflicting_seats: clashes,
            });
        }

        let hold = Hold {
            id: Uuid::new_v4(),
            slot_id,
            seats,
            session_id,
            expires_at: now + Duration::minutes(self.ttl_minutes),
        };
        self.holds.insert_hold(&hold).await?;

        tracing::info!(hold_id = %hold.id, slot_id = %slot_id, expires_at = %hold.expires_at, "hold created");
        Ok(hold)
    }

    /// Live held seat numbers for a slot, expiry applied at read time.
    pub async fn held_seats(&self, slot_id: Uuid) -> Result<Vec<i32>, BookingError> {
        let live = self.holds.active_for_slot(slot_id, Utc::now()).await?;
        Ok(live.into_iter().flat_map(|h| h.seats).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hold(seats: Vec<i32>, expires_at: DateTime<Utc>) -> Hold {
        Hold {
            id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            seats,
            session_id: "s1".into(),
            expires_at,
        }
    }

    #[test]
    fn reports_only_overlapping_seats() {
        let live = vec![hold(vec![1, 2], Utc::now() + Duration::minutes(5))];
        assert_eq!(conflicting_seats(&[2, 3], &live), vec![2]);
        assert!(conflicting_seats(&[4, 5], &live).is_empty());
    }

    #[test]
    fn expiry_is_a_read_time_predicate() {
        let h = hold(vec![1], Utc::now() - Duration::seconds(1));
        assert!(h.is_expired(Utc::now()));
        let h = hold(vec![1], Utc::now() + Duration::minutes(5));
        assert!(!h.is_expired(Utc::now()));
    }
}
