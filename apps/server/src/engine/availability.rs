//! Composes schedule, slot grid and occupancy into the list of bookable
//! start times for a requested duration.

use chrono::{NaiveDate, NaiveTime};
use sqlx::SqliteConnection;

use crate::models::TimeSlot;

use super::occupancy::occupied_intervals;
use super::schedule::{resolve_window, StylistSchedule, WeeklySchedule, Window};
use super::slots::generate_slots;
use super::{format_hhmm, minutes_of, Interval, SLOT_GRANULARITY_MIN};

/// Whether the full `[start, start+duration)` interval fits inside the
/// window and misses every occupied interval. Exact minute arithmetic;
/// durations that are not a multiple of the granularity are not rounded.
pub fn start_fits(
    start: NaiveTime,
    duration_min: u32,
    window: &Window,
    occupied: &[Interval],
) -> bool {
    let candidate = Interval::from_start(start, duration_min);

    if candidate.start < minutes_of(window.open) || candidate.end > minutes_of(window.close) {
        return false;
    }

    !occupied.iter().any(|iv| candidate.overlaps(iv))
}

/// The qualifying start times within `window`, ascending. A start qualifies
/// only if every minute of the requested duration is free: single-slot
/// availability is necessary but not sufficient for long services.
pub fn free_starts(
    window: &Window,
    duration_min: u32,
    granularity_min: u32,
    occupied: &[Interval],
) -> Vec<NaiveTime> {
    generate_slots(window.open, window.close, granularity_min)
        .into_iter()
        .filter(|s| start_fits(*s, duration_min, window, occupied))
        .collect()
}

/// Full slot list for a date: every grid slot in the resolved window with its
/// availability flag. Empty when the day is closed (or in the past).
pub async fn day_slots(
    conn: &mut SqliteConnection,
    salon: &WeeklySchedule,
    stylist: Option<(i64, &StylistSchedule)>,
    date: NaiveDate,
    duration_min: u32,
    today: NaiveDate,
) -> sqlx::Result<Vec<TimeSlot>> {
    let schedule = stylist.map(|(_, s)| s);
    let Some(window) = resolve_window(salon, schedule, date, today) else {
        return Ok(Vec::new());
    };

    let occupied = occupied_intervals(conn, date, stylist.map(|(id, _)| id), None).await?;

    let slots = generate_slots(window.open, window.close, SLOT_GRANULARITY_MIN)
        .into_iter()
        .map(|s| TimeSlot {
            time: format_hhmm(s),
            available: start_fits(s, duration_min, &window, &occupied),
        })
        .collect();

    Ok(slots)
}
