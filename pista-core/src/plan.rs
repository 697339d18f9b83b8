use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the customer intends to pay. Cash is settled on arrival, so cash
/// bookings confirm immediately; the other methods go through a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Mp,
    Card,
}

impl PaymentMethod {
    pub fn is_pay_on_arrival(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Mp => "mp",
            PaymentMethod::Card => "card",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "transfer" => Ok(PaymentMethod::Transfer),
            "mp" => Ok(PaymentMethod::Mp),
            "card" => Ok(PaymentMethod::Card),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub qualy_laps: i32,
    pub race_laps: i32,
    pub description: Option<String>,
    pub active: bool,
}

/// One price row per (plan, method) with a validity window. Amounts are
/// integer minor currency units; no floating point anywhere in money math.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPrice {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub method: PaymentMethod,
    pub amount: i64,
    pub surcharge_pct: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub active: bool,
}

impl PlanPrice {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.valid_from <= now
            && self.valid_to.map_or(true, |until| until >= now)
    }

    /// Base amount plus percentage surcharge, rounded half-up in minor units.
    pub fn unit_price(&self) -> i64 {
        self.amount + (self.amount * self.surcharge_pct + 50) / 100
    }
}

/// Pick the authoritative price among candidate rows: active, window
/// containing `now`, latest `valid_from` wins.
pub fn select_current_price(prices: &[PlanPrice], now: DateTime<Utc>) -> Option<&PlanPrice> {
    prices
        .iter()
        .filter(|p| p.is_valid_at(now))
        .max_by_key(|p| p.valid_from)
}
