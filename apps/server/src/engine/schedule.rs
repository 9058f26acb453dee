//! Resolves the open/close window applicable to a date: salon-wide weekly
//! hours, intersected with a stylist's personal hours and blocked dates.

use chrono::{Datelike, NaiveDate, NaiveTime};
use sqlx::SqliteConnection;
use std::collections::HashSet;

use super::parse_hhmm;

/// Opening hours for one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayHours {
    pub is_open: bool,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl DayHours {
    pub fn closed() -> Self {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        Self {
            is_open: false,
            open: midnight,
            close: midnight,
        }
    }

    pub fn open(open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            is_open: true,
            open,
            close,
        }
    }
}

/// Seven-day schedule indexed by weekday, Monday first. An explicit array,
/// never a string-keyed map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    days: [DayHours; 7],
}

impl WeeklySchedule {
    pub fn closed() -> Self {
        Self {
            days: [DayHours::closed(); 7],
        }
    }

    /// 0 = Monday … 6 = Sunday, matching `Weekday::num_days_from_monday`.
    pub fn set_day(&mut self, weekday: usize, hours: DayHours) {
        if weekday < 7 {
            self.days[weekday] = hours;
        }
    }

    pub fn day_for(&self, date: NaiveDate) -> &DayHours {
        &self.days[date.weekday().num_days_from_monday() as usize]
    }

    pub fn days(&self) -> &[DayHours; 7] {
        &self.days
    }

    /// Length in minutes of the longest open day. Used to reject durations
    /// that could never fit any window.
    pub fn max_open_minutes(&self) -> u32 {
        self.days
            .iter()
            .filter(|d| d.is_open && d.open < d.close)
            .map(|d| super::minutes_of(d.close) - super::minutes_of(d.open))
            .max()
            .unwrap_or(0)
    }
}

/// A stylist's working pattern: personal weekly hours plus ad-hoc days off.
#[derive(Debug, Clone)]
pub struct StylistSchedule {
    pub hours: WeeklySchedule,
    pub blocked_dates: HashSet<NaiveDate>,
}

/// The window during which bookings may start on some date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

/// Resolve the bookable window for `date`.
///
/// Without a stylist this is the salon entry for the weekday. With one, the
/// window is the intersection of salon and stylist hours; closed when either
/// side is closed, the intersection is empty or inverted, or the date is in
/// the stylist's blocked set. Dates before `today` are always closed.
pub fn resolve_window(
    salon: &WeeklySchedule,
    stylist: Option<&StylistSchedule>,
    date: NaiveDate,
    today: NaiveDate,
) -> Option<Window> {
    if date < today {
        return None;
    }

    let salon_day = salon.day_for(date);
    if !salon_day.is_open || salon_day.open >= salon_day.close {
        return None;
    }

    let Some(stylist) = stylist else {
        return Some(Window {
            open: salon_day.open,
            close: salon_day.close,
        });
    };

    if stylist.blocked_dates.contains(&date) {
        return None;
    }

    let own_day = stylist.hours.day_for(date);
    if !own_day.is_open || own_day.open >= own_day.close {
        return None;
    }

    let open = salon_day.open.max(own_day.open);
    let close = salon_day.close.min(own_day.close);
    if open >= close {
        return None;
    }

    Some(Window { open, close })
}

// ── Loading from the database ──

#[derive(sqlx::FromRow)]
struct HoursRow {
    weekday: i64,
    is_open: bool,
    open_time: String,
    close_time: String,
}

fn schedule_from_rows(rows: Vec<HoursRow>) -> WeeklySchedule {
    let mut schedule = WeeklySchedule::closed();
    for row in rows {
        if !(0..7).contains(&row.weekday) {
            tracing::warn!("ignoring hours row with weekday {}", row.weekday);
            continue;
        }
        let hours = match (row.is_open, parse_hhmm(&row.open_time), parse_hhmm(&row.close_time)) {
            (true, Some(open), Some(close)) => DayHours::open(open, close),
            _ => DayHours::closed(),
        };
        schedule.set_day(row.weekday as usize, hours);
    }
    schedule
}

/// Load the salon-wide weekly schedule.
pub async fn load_salon_hours(conn: &mut SqliteConnection) -> sqlx::Result<WeeklySchedule> {
    let rows = sqlx::query_as::<_, HoursRow>(
        "SELECT weekday, is_open, open_time, close_time FROM salon_hours ORDER BY weekday ASC",
    )
    .fetch_all(conn)
    .await?;

    Ok(schedule_from_rows(rows))
}

/// Load a stylist's weekly hours and blocked dates. `None` when the stylist
/// does not exist or is inactive.
pub async fn load_stylist_schedule(
    conn: &mut SqliteConnection,
    stylist_id: i64,
) -> sqlx::Result<Option<StylistSchedule>> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM stylists WHERE id = ? AND is_active = 1",
    )
    .bind(stylist_id)
    .fetch_one(&mut *conn)
    .await?;

    if !exists {
        return Ok(None);
    }

    let rows = sqlx::query_as::<_, HoursRow>(
        "SELECT weekday, is_open, open_time, close_time
         FROM stylist_hours WHERE stylist_id = ? ORDER BY weekday ASC",
    )
    .bind(stylist_id)
    .fetch_all(&mut *conn)
    .await?;

    let dates: Vec<String> =
        sqlx::query_scalar("SELECT date FROM stylist_blocked_dates WHERE stylist_id = ?")
            .bind(stylist_id)
            .fetch_all(&mut *conn)
            .await?;

    let blocked_dates = dates
        .iter()
        .filter_map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .collect();

    Ok(Some(StylistSchedule {
        hours: schedule_from_rows(rows),
        blocked_dates,
    }))
}
