//! Read-only view over existing appointments and manual slot blocks for a
//! date: the set of occupied `[start, end)` intervals.

use chrono::NaiveDate;
use sqlx::SqliteConnection;

use super::{parse_hhmm, Interval, SLOT_GRANULARITY_MIN};

#[derive(sqlx::FromRow)]
struct OccupiedRow {
    start_time: String,
    duration_min: i64,
}

/// Occupied intervals for `date`, scoped to a stylist or salon-wide.
///
/// With a stylist id, appointments for that stylist AND unassigned
/// appointments both count: an appointment with no stylist consumes
/// salon-wide capacity and blocks everyone. Without one, every scheduled
/// appointment on the date counts regardless of assignment.
///
/// `exclude_appointment` drops one appointment from the view; reschedule
/// uses it so an appointment does not collide with its own current slot.
pub async fn occupied_intervals(
    conn: &mut SqliteConnection,
    date: NaiveDate,
    stylist_id: Option<i64>,
    exclude_appointment: Option<i64>,
) -> sqlx::Result<Vec<Interval>> {
    let date_str = date.format("%Y-%m-%d").to_string();
    let exclude = exclude_appointment.unwrap_or(-1);

    let rows = match stylist_id {
        Some(sid) => {
            sqlx::query_as::<_, OccupiedRow>(
                "SELECT start_time, duration_min FROM appointments
                 WHERE date = ? AND status = 'scheduled' AND id != ?
                   AND (stylist_id IS NULL OR stylist_id = ?)",
            )
            .bind(&date_str)
            .bind(exclude)
            .bind(sid)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, OccupiedRow>(
                "SELECT start_time, duration_min FROM appointments
                 WHERE date = ? AND status = 'scheduled' AND id != ?",
            )
            .bind(&date_str)
            .bind(exclude)
            .fetch_all(&mut *conn)
            .await?
        }
    };

    let mut intervals = Vec::with_capacity(rows.len());
    for row in rows {
        match parse_hhmm(&row.start_time) {
            Some(start) if row.duration_min > 0 => {
                intervals.push(Interval::from_start(start, row.duration_min as u32));
            }
            _ => {
                tracing::warn!(
                    "skipping malformed appointment row on {}: {} ({} min)",
                    date_str,
                    row.start_time,
                    row.duration_min
                );
            }
        }
    }

    // Manual blocks occupy one granularity unit each. A block scoped to a
    // stylist only affects that stylist; a salon-wide block affects everyone.
    let block_times: Vec<String> = match stylist_id {
        Some(sid) => {
            sqlx::query_scalar(
                "SELECT time FROM slot_blocks
                 WHERE date = ? AND (stylist_id IS NULL OR stylist_id = ?)",
            )
            .bind(&date_str)
            .bind(sid)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_scalar("SELECT time FROM slot_blocks WHERE date = ?")
                .bind(&date_str)
                .fetch_all(&mut *conn)
                .await?
        }
    };

    for time in block_times {
        match parse_hhmm(&time) {
            Some(start) => intervals.push(Interval::from_start(start, SLOT_GRANULARITY_MIN)),
            None => tracing::warn!("skipping malformed slot block on {}: {}", date_str, time),
        }
    }

    Ok(intervals)
}
