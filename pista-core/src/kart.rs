use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KartStatus {
    Ok,
    /// Out of service: excluded from booking until staff clear it.
    Oos,
}

impl KartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KartStatus::Ok => "ok",
            KartStatus::Oos => "oos",
        }
    }
}

impl std::str::FromStr for KartStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(KartStatus::Ok),
            "oos" => Ok(KartStatus::Oos),
            other => Err(format!("unknown kart status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kart {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub number: i32,
    pub status: KartStatus,
    pub reason: Option<String>,
}

/// Per-kart status as seen by a customer picking seats for one slot.
/// Precedence: out-of-service beats booked beats held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Booked,
    Held,
    Oos,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KartAvailability {
    pub number: i32,
    pub status: SeatStatus,
    pub reason: Option<String>,
}

/// Fold booked and held seat sets over the branch roster into the
/// per-kart view returned by the availability endpoint.
pub fn kart_availability(
    karts: &[Kart],
    booked_seats: &[i32],
    held_seats: &[i32],
) -> Vec<KartAvailability> {
    let booked: HashSet<i32> = booked_seats.iter().copied().collect();
    let held: HashSet<i32> = held_seats.iter().copied().collect();

    karts
        .iter()
        .map(|kart| {
            let status = if kart.status == KartStatus::Oos {
                SeatStatus::Oos
            } else if booked.contains(&kart.number) {
                SeatStatus::Booked
            } else if held.contains(&kart.number) {
                SeatStatus::Held
            } else {
                SeatStatus::Available
            };
            KartAvailability {
                number: kart.number,
                status,
                reason: kart.reason.clone(),
            }
        })
        .collect()
}
