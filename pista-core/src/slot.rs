use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Open,
    Closed,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Open => "open",
            SlotStatus::Closed => "closed",
        }
    }
}

impl std::str::FromStr for SlotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SlotStatus::Open),
            "closed" => Ok(SlotStatus::Closed),
            other => Err(format!("unknown slot status: {other}")),
        }
    }
}

/// A bookable time window at a branch.
///
/// `available` is the remaining seat counter. It is only ever mutated through
/// the conditional updates in the storage layer, so `0 <= available <= capacity`
/// holds at all times. Holds never touch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_min: i32,
    pub buffer_min: i32,
    pub capacity: i32,
    pub available: i32,
    pub status: SlotStatus,
}

impl TimeSlot {
    /// Wall-clock start of the race window, used for cutoff policies.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }
}

/// Public view of a slot: stored availability minus seats currently held
/// by in-flight checkout sessions. Derived at read time, never written back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    #[serde(flatten)]
    pub slot: TimeSlot,
    pub display_available: i32,
    pub held_seats: i32,
}

impl SlotView {
    pub fn new(slot: TimeSlot, held_seats: i32) -> Self {
        let display_available = (slot.available - held_seats).max(0);
        Self {
            slot,
            display_available,
            held_seats,
        }
    }
}

/// Parameters for batch slot generation.
///
/// Defaults mirror the venue's schedule: 20-minute grid of 12-minute races
/// with a 3-minute buffer, 8 karts per slot, closed on Mondays.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotGenerationConfig {
    pub branch_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_day_start")]
    pub start_time: NaiveTime,
    #[serde(default = "default_day_end")]
    pub end_time: NaiveTime,
    #[serde(default = "default_interval")]
    pub interval_min: i32,
    #[serde(default = "default_duration")]
    pub duration_min: i32,
    #[serde(default = "default_buffer")]
    pub buffer_min: i32,
    #[serde(default = "default_capacity")]
    pub capacity: i32,
    #[serde(default = "default_excluded")]
    pub excluded_weekdays: Vec<Weekday>,
}

fn default_day_start() -> NaiveTime {
    NaiveTime::from_hms_opt(17, 0, 0).unwrap()
}

fn default_day_end() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 0, 0).unwrap()
}

fn default_interval() -> i32 {
    20
}

fn default_duration() -> i32 {
    12
}

fn default_buffer() -> i32 {
    3
}

fn default_capacity() -> i32 {
    8
}

fn default_excluded() -> Vec<Weekday> {
    vec![Weekday::Mon]
}

/// Expand a generation config into concrete slots, one per grid point,
/// skipping excluded weekdays. Slots start open and fully available.
pub fn generate_slots(config: &SlotGenerationConfig) -> Vec<TimeSlot> {
    let mut slots = Vec::new();
    let mut date = config.start_date;

    while date <= config.end_date {
        if !config.excluded_weekdays.contains(&date.weekday()) {
            let mut time = config.start_time;
            while time < config.end_time {
                slots.push(TimeSlot {
                    id: Uuid::new_v4(),
                    branch_id: config.branch_id,
                    date,
                    start_time: time,
                    duration_min: config.duration_min,
                    buffer_min: config.buffer_min,
                    capacity: config.capacity,
                    available: config.capacity,
                    status: SlotStatus::Open,
                });

                let (next, wrapped) =
                    time.overflowing_add_signed(Duration::minutes(config.interval_min as i64));
                if wrapped != 0 {
                    break;
                }
                time = next;
            }
        }
        date = match date.succ_opt() {
            Some(d) => d,
            None => break,
        };
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(start: NaiveDate, end: NaiveDate) -> SlotGenerationConfig {
        SlotGenerationConfig {
            branch_id: Uuid::new_v4(),
            start_date: start,
            end_date: end,
            start_time: default_day_start(),
            end_time: default_day_end(),
            interval_min: 20,
            duration_min: 12,
            buffer_min: 3,
            capacity: 8,
            excluded_weekdays: vec![Weekday::Mon],
        }
    }

    #[test]
    fn generates_grid_for_one_day() {
        // 2026-08-26 is a Wednesday
        let day = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        let slots = generate_slots(&config(day, day));

        // 17:00..23:00 every 20 minutes = 18 slots
        assert_eq!(slots.len(), 18);
        assert_eq!(slots[0].start_time, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert_eq!(
            slots.last().unwrap().start_time,
            NaiveTime::from_hms_opt(22, 40, 0).unwrap()
        );
        assert!(slots.iter().all(|s| s.available == s.capacity));
        assert!(slots.iter().all(|s| s.status == SlotStatus::Open));
    }

    #[test]
    fn skips_excluded_weekdays() {
        // 2026-08-24 is a Monday
        let mon = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let tue = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        let slots = generate_slots(&config(mon, tue));

        assert!(slots.iter().all(|s| s.date == tue));
    }

    #[test]
    fn display_availability_subtracts_held_seats() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        let slot = generate_slots(&config(day, day)).remove(0);

        let view = SlotView::new(slot, 3);
        assert_eq!(view.display_available, 5);
        assert_eq!(view.held_seats, 3);
    }
}
