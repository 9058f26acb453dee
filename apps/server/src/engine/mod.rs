//! Availability & booking engine.
//!
//! Read path (`schedule`, `slots`, `occupancy`, `availability`) is pure or
//! read-only and lock-free; its output is advisory. All writers go through
//! `booking`, which serializes per calendar date and re-validates inside a
//! single transaction.

pub mod availability;
pub mod booking;
pub mod occupancy;
pub mod schedule;
pub mod slots;

use chrono::{NaiveTime, Timelike};

/// Fixed slot granularity. Service durations are multiples of this; the
/// slot grid is never derived from any single service's duration.
pub const SLOT_GRANULARITY_MIN: u32 = 30;

/// Half-open `[start, end)` interval, in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
}

impl Interval {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Interval covering `duration_min` minutes from `start`.
    pub fn from_start(start: NaiveTime, duration_min: u32) -> Self {
        let s = minutes_of(start);
        Self {
            start: s,
            end: s + duration_min,
        }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Minutes since midnight of a time-of-day. Seconds are ignored; the engine
/// works at minute granularity throughout.
pub fn minutes_of(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Inverse of `minutes_of`. `None` for values past 23:59.
pub fn time_from_minutes(m: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(m / 60, m % 60, 0)
}

/// Parse an "HH:MM" string as stored in the database and sent by clients.
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// Render a time-of-day back to "HH:MM".
pub fn format_hhmm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}
