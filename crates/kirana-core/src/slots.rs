//! # Delivery Slots
//!
//! Fixed two-hour delivery windows between 08:00 and 22:00.
//!
//! ```text
//!   08-10  10-12  12-14  14-16  16-18  18-20  20-22
//!                                      └─ peak ─┘   surcharge applies
//!
//!   Today at 13:20 → first offered slot starts max(8, 13 + 2) = 15 → 16
//! ```
//!
//! Booked counts come from committed orders in kirana-db; this module only
//! lays out the grid and applies capacity.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

pub const FIRST_SLOT_HOUR: u32 = 8;
pub const LAST_SLOT_END_HOUR: u32 = 22;
pub const SLOT_LENGTH_HOURS: u32 = 2;

/// Slots must start at least this many hours from now.
pub const MIN_LEAD_HOURS: u32 = 2;

/// Slot start hours that carry the peak surcharge.
pub const PEAK_SLOT_STARTS: [u32; 2] = [18, 20];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DeliverySlot {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub start_hour: u32,
    pub end_hour: u32,
    /// "18:00 - 20:00"
    pub label: String,
    pub capacity: i64,
    pub booked: i64,
    pub available: bool,
    pub is_peak: bool,
    pub surcharge: Money,
}

/// All slot start hours in a day.
pub fn slot_starts() -> impl Iterator<Item = u32> {
    (FIRST_SLOT_HOUR..LAST_SLOT_END_HOUR).step_by(SLOT_LENGTH_HOURS as usize)
}

#[inline]
pub fn is_peak_slot(start_hour: u32) -> bool {
    PEAK_SLOT_STARTS.contains(&start_hour)
}

pub fn slot_label(start_hour: u32) -> String {
    format!("{:02}:00 - {:02}:00", start_hour, start_hour + SLOT_LENGTH_HOURS)
}

/// Human key for a slot, used in rejection messages.
pub fn slot_key(date: NaiveDate, start_hour: u32) -> String {
    format!("{} {}", date, slot_label(start_hour))
}

/// Earliest slot start still offered on `date`, or `None` when the day is over.
fn first_offered_start(date: NaiveDate, now: NaiveDateTime) -> Option<u32> {
    let today = now.date();
    if date < today {
        return None;
    }
    if date > today {
        return Some(FIRST_SLOT_HOUR);
    }

    let earliest = (now.hour() + MIN_LEAD_HOURS).max(FIRST_SLOT_HOUR);
    // Round up onto the grid.
    let offset = (earliest - FIRST_SLOT_HOUR) % SLOT_LENGTH_HOURS;
    let start = if offset == 0 {
        earliest
    } else {
        earliest + SLOT_LENGTH_HOURS - offset
    };

    (start < LAST_SLOT_END_HOUR).then_some(start)
}

/// Lays out the slots offered on `date`.
///
/// `booked` returns the committed order count for a slot start hour.
pub fn generate_slots(
    date: NaiveDate,
    now: NaiveDateTime,
    capacity: i64,
    peak_surcharge: Money,
    booked: impl Fn(u32) -> i64,
) -> Vec<DeliverySlot> {
    let Some(first) = first_offered_start(date, now) else {
        return Vec::new();
    };

    slot_starts()
        .filter(|start| *start >= first)
        .map(|start| {
            let booked = booked(start);
            let is_peak = is_peak_slot(start);
            DeliverySlot {
                date,
                start_hour: start,
                end_hour: start + SLOT_LENGTH_HOURS,
                label: slot_label(start),
                capacity,
                booked,
                available: booked < capacity,
                is_peak,
                surcharge: if is_peak { peak_surcharge } else { Money::zero() },
            }
        })
        .collect()
}

/// Checks that a slot is on the grid and still offered at `now`.
pub fn check_slot_offered(date: NaiveDate, start_hour: u32, now: NaiveDateTime) -> CoreResult<()> {
    let on_grid = slot_starts().any(|s| s == start_hour);
    let still_offered = first_offered_start(date, now).is_some_and(|first| start_hour >= first);

    if on_grid && still_offered {
        Ok(())
    } else {
        Err(CoreError::SlotUnavailable {
            slot: slot_key(date, start_hour),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn at(hour: u32, min: u32) -> NaiveDateTime {
        day().and_hms_opt(hour, min, 0).unwrap()
    }

    #[test]
    fn test_future_day_has_all_seven_slots() {
        let tomorrow = day().succ_opt().unwrap();
        let slots = generate_slots(tomorrow, at(23, 0), 10, Money::from_rupees(30), |_| 0);
        assert_eq!(slots.len(), 7);
        assert_eq!(slots[0].label, "08:00 - 10:00");
        assert_eq!(slots[6].label, "20:00 - 22:00");
    }

    #[test]
    fn test_today_rounds_up_to_grid() {
        let slots = generate_slots(day(), at(13, 20), 10, Money::zero(), |_| 0);
        assert_eq!(slots.first().map(|s| s.start_hour), Some(16));

        let slots = generate_slots(day(), at(12, 0), 10, Money::zero(), |_| 0);
        assert_eq!(slots.first().map(|s| s.start_hour), Some(14));

        let early = generate_slots(day(), at(3, 0), 10, Money::zero(), |_| 0);
        assert_eq!(early.first().map(|s| s.start_hour), Some(8));
    }

    #[test]
    fn test_late_evening_and_past_days_are_empty() {
        assert!(generate_slots(day(), at(19, 0), 10, Money::zero(), |_| 0).is_empty());
        let yesterday = day().pred_opt().unwrap();
        assert!(generate_slots(yesterday, at(9, 0), 10, Money::zero(), |_| 0).is_empty());
    }

    #[test]
    fn test_capacity_and_peak_surcharge() {
        let tomorrow = day().succ_opt().unwrap();
        let slots = generate_slots(tomorrow, at(9, 0), 3, Money::from_rupees(30), |start| {
            if start == 18 { 3 } else { 1 }
        });
        let peak = slots.iter().find(|s| s.start_hour == 18).unwrap();
        assert!(peak.is_peak);
        assert!(!peak.available);
        assert_eq!(peak.surcharge, Money::from_rupees(30));

        let morning = slots.iter().find(|s| s.start_hour == 8).unwrap();
        assert!(morning.available);
        assert_eq!(morning.surcharge, Money::zero());
    }

    #[test]
    fn test_check_slot_offered() {
        assert!(check_slot_offered(day(), 16, at(13, 20)).is_ok());
        assert!(check_slot_offered(day(), 14, at(13, 20)).is_err());
        assert!(check_slot_offered(day(), 15, at(6, 0)).is_err());
        assert!(check_slot_offered(day(), 22, at(6, 0)).is_err());
    }
}
