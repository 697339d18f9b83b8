use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::PaymentMethod;

pub const CODE_PREFIX: &str = "RIK-";
pub const CODE_RANDOM_LEN: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    /// Statuses that occupy seats for the disjointness invariant.
    pub fn holds_seats(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "noShow",
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "noShow" => Ok(BookingStatus::NoShow),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Deposit,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Deposit => "deposit",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "deposit" => Ok(PaymentStatus::Deposit),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// The durable reservation. Never physically deleted: cancellation is a
/// status change so the code remains resolvable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub code: String,
    pub branch_id: Uuid,
    pub slot_id: Uuid,
    pub plan_id: Uuid,
    pub seats: Vec<i32>,
    pub qty: i32,
    pub customer_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: String,
    pub payment_method: PaymentMethod,
    pub subtotal: i64,
    pub total: i64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// One row per kart occupant. Exactly one participant per booking carries
/// `is_holder` and is the contact of record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub kart_id: Uuid,
    pub name: String,
    pub dni: Option<String>,
    pub is_holder: bool,
}

/// Participant as submitted by the checkout flow.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInput {
    pub name: String,
    #[serde(default)]
    pub dni: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub kart_number: i32,
    #[serde(default)]
    pub is_holder: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub branch_id: Uuid,
    pub slot_id: Uuid,
    pub plan_id: Uuid,
    pub participants: Vec<ParticipantInput>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRecordStatus {
    Pending,
    Completed,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRecordStatus::Pending => "pending",
            PaymentRecordStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for PaymentRecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentRecordStatus::Pending),
            "completed" => Ok(PaymentRecordStatus::Completed),
            other => Err(format!("unknown payment record status: {other}")),
        }
    }
}

/// Deposit ledger entry. Settlement against a gateway is out of scope;
/// this only records that a deposit is owed or was taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub method: PaymentMethod,
    pub amount: i64,
    pub status: PaymentRecordStatus,
}

/// Generate a human-readable booking code: `RIK-` plus six random
/// uppercase-alphanumeric characters. Uniqueness is enforced by storage;
/// the allocator retries on collision.
pub fn generate_booking_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(CODE_PREFIX.len() + CODE_RANDOM_LEN);
    code.push_str(CODE_PREFIX);
    for _ in 0..CODE_RANDOM_LEN {
        let idx = rng.gen_range(0..CODE_CHARSET.len());
        code.push(CODE_CHARSET[idx] as char);
    }
    code
}

/// Codes compare case-insensitively; storage keys them uppercased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_has_expected_shape() {
        for _ in 0..100 {
            let code = generate_booking_code();
            assert_eq!(code.len(), 10);
            assert!(code.starts_with("RIK-"));
            assert!(code[4..]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize_code(" rik-ab12cd "), "RIK-AB12CD");
        assert_eq!(normalize_code("RIK-AB12CD"), "RIK-AB12CD");
    }

    #[test]
    fn cancelled_bookings_do_not_hold_seats() {
        assert!(BookingStatus::Pending.holds_seats());
        assert!(BookingStatus::Confirmed.holds_seats());
        assert!(!BookingStatus::Cancelled.holds_seats());
        assert!(!BookingStatus::NoShow.holds_seats());
    }
}
