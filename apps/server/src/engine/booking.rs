//! The write path: claim, move, cancel and block slots.
//!
//! Every mutation serializes on a per-date async mutex and then re-validates
//! inside a single transaction, so a slot reported available by the (lock-free,
//! advisory) read path is re-checked before anything is committed. A booking
//! that loses the race fails with `SlotUnavailable`; a booking that cannot get
//! the date key within `LOCK_TIMEOUT` fails with `TransientContention`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use dashmap::DashMap;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::errors::AppError;
use crate::models::AppointmentDetail;

use super::availability::start_fits;
use super::occupancy::occupied_intervals;
use super::schedule::{load_salon_hours, load_stylist_schedule, resolve_window};
use super::{format_hhmm, minutes_of, time_from_minutes, SLOT_GRANULARITY_MIN};

/// How long a writer may wait for its date key before giving up.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-date serialization keys.
///
/// The key is the calendar date, a conservative superset of the
/// (date, stylist-or-null) pairs the invariants are stated over: an
/// appointment with no stylist consumes salon-wide capacity, so cross-stylist
/// writes on one date may conflict and must not interleave.
#[derive(Debug, Default)]
pub struct SlotLocks {
    inner: DashMap<NaiveDate, Arc<Mutex<()>>>,
}

impl SlotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn acquire(&self, date: NaiveDate) -> Result<OwnedMutexGuard<()>, AppError> {
        let lock = self.inner.entry(date).or_default().value().clone();
        tokio::time::timeout(LOCK_TIMEOUT, lock.lock_owned())
            .await
            .map_err(|_| AppError::TransientContention)
    }

    /// Drop keys for past dates nobody is holding. Run periodically.
    pub fn prune(&self, today: NaiveDate) {
        self.inner
            .retain(|date, lock| *date >= today || Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

/// A validated booking request, dates and times already parsed.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub service_ids: Vec<i64>,
    pub stylist_id: Option<i64>,
    pub customer_name: String,
    pub customer_phone: String,
}

#[derive(sqlx::FromRow)]
struct ServiceRef {
    id: i64,
    price: i64,
    duration_min: i64,
}

#[derive(sqlx::FromRow)]
struct AppointmentRow {
    id: i64,
    date: String,
    start_time: String,
    duration_min: i64,
    total_price: i64,
    stylist_id: Option<i64>,
    customer_name: String,
    customer_phone: String,
    status: String,
    created_at: String,
}

/// Atomically claim a slot: re-validate the window and every occupied
/// interval inside one transaction, then insert the appointment. Never
/// retries and never substitutes a nearby slot.
pub async fn book(
    db: &SqlitePool,
    locks: &SlotLocks,
    req: BookingRequest,
    now: DateTime<FixedOffset>,
) -> Result<AppointmentDetail, AppError> {
    if req.service_ids.is_empty() {
        return Err(AppError::Validation("at least one service is required".into()));
    }
    if req.customer_name.trim().is_empty() {
        return Err(AppError::Validation("customer name is required".into()));
    }
    if minutes_of(req.start) % SLOT_GRANULARITY_MIN != 0 {
        return Err(AppError::Validation(format!(
            "start time must align to the {}-minute slot grid",
            SLOT_GRANULARITY_MIN
        )));
    }

    let _guard = locks.acquire(req.date).await?;
    let mut tx = db.begin().await?;

    let mut services = Vec::with_capacity(req.service_ids.len());
    for id in &req.service_ids {
        let service = sqlx::query_as::<_, ServiceRef>(
            "SELECT id, price, duration_min FROM services WHERE id = ? AND is_active = 1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("service {}", id)))?;
        services.push(service);
    }

    let duration_min: i64 = services.iter().map(|s| s.duration_min).sum();
    let total_price: i64 = services.iter().map(|s| s.price).sum();

    let salon = load_salon_hours(&mut tx).await?;
    validate_duration(duration_min, salon.max_open_minutes())?;

    let stylist_schedule = match req.stylist_id {
        Some(sid) => Some(
            load_stylist_schedule(&mut tx, sid)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("stylist {}", sid)))?,
        ),
        None => None,
    };

    let today = now.date_naive();
    let window = resolve_window(&salon, stylist_schedule.as_ref(), req.date, today)
        .ok_or(AppError::SlotUnavailable("the salon is closed on this date"))?;

    let occupied = occupied_intervals(&mut tx, req.date, req.stylist_id, None).await?;
    if !start_fits(req.start, duration_min as u32, &window, &occupied) {
        return Err(AppError::SlotUnavailable("the requested time is taken"));
    }

    let created_at = now.format("%Y-%m-%d %H:%M:%S").to_string();
    let appointment_id = sqlx::query(
        "INSERT INTO appointments
            (date, start_time, duration_min, total_price, stylist_id,
             customer_name, customer_phone, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 'scheduled', ?)",
    )
    .bind(req.date.format("%Y-%m-%d").to_string())
    .bind(format_hhmm(req.start))
    .bind(duration_min)
    .bind(total_price)
    .bind(req.stylist_id)
    .bind(req.customer_name.trim())
    .bind(req.customer_phone.trim())
    .bind(&created_at)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for service in &services {
        sqlx::query("INSERT INTO appointment_services (appointment_id, service_id) VALUES (?, ?)")
            .bind(appointment_id)
            .bind(service.id)
            .execute(&mut *tx)
            .await?;
    }

    let detail = load_detail(&mut tx, appointment_id).await?;
    tx.commit().await?;

    tracing::info!(
        "booked appointment {} on {} at {} ({} min)",
        appointment_id,
        detail.date,
        detail.start_time,
        detail.duration_min
    );
    Ok(detail)
}

/// Move an appointment to a new date/time in one visible transition: the new
/// interval is validated with the appointment's own interval excluded, then
/// date and time are updated in place. No delete-then-insert.
pub async fn reschedule(
    db: &SqlitePool,
    locks: &SlotLocks,
    appointment_id: i64,
    new_date: NaiveDate,
    new_start: NaiveTime,
    now: DateTime<FixedOffset>,
) -> Result<AppointmentDetail, AppError> {
    if minutes_of(new_start) % SLOT_GRANULARITY_MIN != 0 {
        return Err(AppError::Validation(format!(
            "start time must align to the {}-minute slot grid",
            SLOT_GRANULARITY_MIN
        )));
    }

    let _guard = locks.acquire(new_date).await?;
    let mut tx = db.begin().await?;

    let current = sqlx::query_as::<_, AppointmentRow>(
        "SELECT id, date, start_time, duration_min, total_price, stylist_id,
                customer_name, customer_phone, status, created_at
         FROM appointments WHERE id = ? AND status = 'scheduled'",
    )
    .bind(appointment_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::AppointmentNotFound)?;

    let new_date_str = new_date.format("%Y-%m-%d").to_string();
    let new_start_str = format_hhmm(new_start);
    if current.date == new_date_str && current.start_time == new_start_str {
        return Err(AppError::NoChangeRequested);
    }

    let salon = load_salon_hours(&mut tx).await?;
    let stylist_schedule = match current.stylist_id {
        Some(sid) => Some(
            load_stylist_schedule(&mut tx, sid)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("stylist {}", sid)))?,
        ),
        None => None,
    };

    let today = now.date_naive();
    let window = resolve_window(&salon, stylist_schedule.as_ref(), new_date, today)
        .ok_or(AppError::SlotUnavailable("the salon is closed on this date"))?;

    let occupied =
        occupied_intervals(&mut tx, new_date, current.stylist_id, Some(appointment_id)).await?;
    if !start_fits(new_start, current.duration_min as u32, &window, &occupied) {
        return Err(AppError::SlotUnavailable("the requested time is taken"));
    }

    sqlx::query("UPDATE appointments SET date = ?, start_time = ? WHERE id = ?")
        .bind(&new_date_str)
        .bind(&new_start_str)
        .bind(appointment_id)
        .execute(&mut *tx)
        .await?;

    let detail = load_detail(&mut tx, appointment_id).await?;
    tx.commit().await?;

    tracing::info!(
        "rescheduled appointment {} to {} at {}",
        appointment_id,
        new_date_str,
        new_start_str
    );
    Ok(detail)
}

/// Soft-cancel an appointment. The interval is released by virtue of the
/// status filter on the occupancy view.
pub async fn cancel(
    db: &SqlitePool,
    locks: &SlotLocks,
    appointment_id: i64,
    now: DateTime<FixedOffset>,
) -> Result<AppointmentDetail, AppError> {
    let date: Option<String> = sqlx::query_scalar(
        "SELECT date FROM appointments WHERE id = ? AND status = 'scheduled'",
    )
    .bind(appointment_id)
    .fetch_optional(db)
    .await?;

    let date = date.ok_or(AppError::AppointmentNotFound)?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| AppError::AppointmentNotFound)?;

    let _guard = locks.acquire(date).await?;
    let mut tx = db.begin().await?;

    let updated = sqlx::query(
        "UPDATE appointments SET status = 'cancelled', cancelled_at = ?
         WHERE id = ? AND status = 'scheduled'",
    )
    .bind(now.format("%Y-%m-%d %H:%M:%S").to_string())
    .bind(appointment_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        // Raced with another cancel between the lookup and the lock.
        return Err(AppError::AppointmentNotFound);
    }

    let detail = load_detail(&mut tx, appointment_id).await?;
    tx.commit().await?;
    tracing::info!("cancelled appointment {}", appointment_id);
    Ok(detail)
}

/// Mark a slot unavailable regardless of schedule or bookings. Idempotent;
/// an existing appointment in the slot is left untouched (blocking prevents
/// future bookings only, cancellation is a separate operation).
pub async fn block_slot(
    db: &SqlitePool,
    locks: &SlotLocks,
    date: NaiveDate,
    time: NaiveTime,
    stylist_id: Option<i64>,
    now: DateTime<FixedOffset>,
) -> Result<(), AppError> {
    validate_slot_aligned(time)?;

    let _guard = locks.acquire(date).await?;
    let mut tx = db.begin().await?;

    let date_str = date.format("%Y-%m-%d").to_string();
    let time_str = format_hhmm(time);

    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM slot_blocks WHERE date = ? AND time = ? AND stylist_id IS ?",
    )
    .bind(&date_str)
    .bind(&time_str)
    .bind(stylist_id)
    .fetch_one(&mut *tx)
    .await?;

    if !exists {
        sqlx::query(
            "INSERT INTO slot_blocks (date, time, stylist_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&date_str)
        .bind(&time_str)
        .bind(stylist_id)
        .bind(now.format("%Y-%m-%d %H:%M:%S").to_string())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Remove a manual block. Unblocking a slot that is not blocked is a no-op
/// success.
pub async fn unblock_slot(
    db: &SqlitePool,
    locks: &SlotLocks,
    date: NaiveDate,
    time: NaiveTime,
    stylist_id: Option<i64>,
) -> Result<(), AppError> {
    validate_slot_aligned(time)?;

    let _guard = locks.acquire(date).await?;

    sqlx::query("DELETE FROM slot_blocks WHERE date = ? AND time = ? AND stylist_id IS ?")
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(format_hhmm(time))
        .bind(stylist_id)
        .execute(db)
        .await?;

    Ok(())
}

// ── Helpers ──

/// Reject durations that are non-positive or could never fit any operating
/// window regardless of date. Shared with the read path.
pub(crate) fn validate_duration(duration_min: i64, longest_window_min: u32) -> Result<(), AppError> {
    if duration_min <= 0 {
        return Err(AppError::InvalidDuration(
            "total duration must be positive".into(),
        ));
    }
    if duration_min as u32 > longest_window_min {
        return Err(AppError::InvalidDuration(format!(
            "{} minutes can never fit an operating window (longest is {} minutes)",
            duration_min, longest_window_min
        )));
    }
    Ok(())
}

fn validate_slot_aligned(time: NaiveTime) -> Result<(), AppError> {
    if minutes_of(time) % SLOT_GRANULARITY_MIN != 0 {
        return Err(AppError::Validation(format!(
            "slot time must align to the {}-minute grid",
            SLOT_GRANULARITY_MIN
        )));
    }
    Ok(())
}

/// Assemble the joined view of one appointment.
async fn load_detail(
    conn: &mut SqliteConnection,
    appointment_id: i64,
) -> Result<AppointmentDetail, AppError> {
    let row = sqlx::query_as::<_, AppointmentRow>(
        "SELECT id, date, start_time, duration_min, total_price, stylist_id,
                customer_name, customer_phone, status, created_at
         FROM appointments WHERE id = ?",
    )
    .bind(appointment_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::AppointmentNotFound)?;

    let services: Vec<String> = sqlx::query_scalar(
        "SELECT s.name FROM appointment_services aps
         JOIN services s ON s.id = aps.service_id
         WHERE aps.appointment_id = ?
         ORDER BY s.sort_order ASC",
    )
    .bind(appointment_id)
    .fetch_all(&mut *conn)
    .await?;

    let stylist_name: Option<String> = match row.stylist_id {
        Some(sid) => {
            sqlx::query_scalar("SELECT name FROM stylists WHERE id = ?")
                .bind(sid)
                .fetch_optional(&mut *conn)
                .await?
        }
        None => None,
    };

    let end_time = super::parse_hhmm(&row.start_time)
        .map(|t| minutes_of(t) + row.duration_min as u32)
        .and_then(time_from_minutes)
        .map(format_hhmm)
        .unwrap_or_else(|| row.start_time.clone());

    Ok(AppointmentDetail {
        id: row.id,
        date: row.date,
        start_time: row.start_time,
        end_time,
        duration_min: row.duration_min,
        total_price: row.total_price,
        stylist_id: row.stylist_id,
        stylist_name,
        services,
        customer_name: row.customer_name,
        customer_phone: row.customer_phone,
        status: row.status,
        created_at: row.created_at,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::availability::day_slots;
    use crate::engine::Interval;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Fixed clock for deterministic "today" handling: 2024-06-01 is a
    /// Saturday, all test bookings target the following week.
    fn test_now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-06-01T10:00:00+03:00").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn req(date: &str, time: &str, service_ids: Vec<i64>, stylist_id: Option<i64>) -> BookingRequest {
        BookingRequest {
            date: d(date),
            start: t(time),
            service_ids,
            stylist_id,
            customer_name: "Nora Lindqvist".into(),
            customer_phone: "+46701234567".into(),
        }
    }

    /// In-memory database with a fixed fixture instead of the seed data:
    /// salon open 09:00–17:00 every day; stylist 1 works 11:00–19:00 except
    /// Tuesday; stylist 2 works 09:00–17:00 every day.
    async fn test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        for table in [
            "appointment_services",
            "appointments",
            "slot_blocks",
            "stylist_specialties",
            "stylist_blocked_dates",
            "stylist_hours",
            "stylists",
            "services",
            "salon_hours",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&pool)
                .await
                .unwrap();
        }

        for wd in 0..7 {
            sqlx::query(
                "INSERT INTO salon_hours (weekday, is_open, open_time, close_time)
                 VALUES (?, 1, '09:00', '17:00')",
            )
            .bind(wd as i64)
            .execute(&pool)
            .await
            .unwrap();
        }

        sqlx::query(
            "INSERT INTO services (id, name, description, price, duration_min, sort_order) VALUES
                (1, 'Cut', '', 5000, 60, 1),
                (2, 'Colour', '', 9000, 120, 2),
                (3, 'Style', '', 2500, 30, 3),
                (4, 'Bridal marathon', '', 20000, 600, 4)",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query("INSERT INTO stylists (id, name) VALUES (1, 'Alba'), (2, 'Maren')")
            .execute(&pool)
            .await
            .unwrap();

        for wd in 0..7 {
            if wd != 1 {
                sqlx::query(
                    "INSERT INTO stylist_hours (stylist_id, weekday, is_open, open_time, close_time)
                     VALUES (1, ?, 1, '11:00', '19:00')",
                )
                .bind(wd as i64)
                .execute(&pool)
                .await
                .unwrap();
            }
            sqlx::query(
                "INSERT INTO stylist_hours (stylist_id, weekday, is_open, open_time, close_time)
                 VALUES (2, ?, 1, '09:00', '17:00')",
            )
            .bind(wd as i64)
            .execute(&pool)
            .await
            .unwrap();
        }

        pool
    }

    async fn occupied(pool: &SqlitePool, date: &str, stylist: Option<i64>) -> Vec<Interval> {
        let mut conn = pool.acquire().await.unwrap();
        occupied_intervals(&mut conn, d(date), stylist, None)
            .await
            .unwrap()
    }

    // ── book ──

    #[tokio::test]
    async fn test_book_happy_path() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let detail = book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();

        assert_eq!(detail.date, "2024-06-10");
        assert_eq!(detail.start_time, "14:00");
        assert_eq!(detail.end_time, "15:00");
        assert_eq!(detail.duration_min, 60);
        assert_eq!(detail.total_price, 5000);
        assert_eq!(detail.stylist_name.as_deref(), Some("Alba"));
        assert_eq!(detail.services, vec!["Cut".to_string()]);
        assert_eq!(detail.status, "scheduled");
    }

    #[tokio::test]
    async fn test_book_bundle_sums_duration_and_price() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let detail = book(
            &pool,
            &locks,
            req("2024-06-10", "11:00", vec![1, 3], Some(1)),
            test_now(),
        )
        .await
        .unwrap();

        assert_eq!(detail.duration_min, 90);
        assert_eq!(detail.total_price, 7500);
        assert_eq!(detail.end_time, "12:30");
    }

    #[tokio::test]
    async fn test_book_past_date_rejected() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let err = book(&pool, &locks, req("2024-05-20", "14:00", vec![1], None), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
    }

    #[tokio::test]
    async fn test_book_outside_window_rejected() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        // Stylist 1's Monday window is 11:00–17:00 after intersection.
        let err = book(&pool, &locks, req("2024-06-10", "09:00", vec![1], Some(1)), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
    }

    #[tokio::test]
    async fn test_book_stylist_closed_weekday_rejected() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        // 2024-06-11 is a Tuesday, Alba's day off.
        let err = book(&pool, &locks, req("2024-06-11", "12:00", vec![1], Some(1)), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
    }

    #[tokio::test]
    async fn test_book_blocked_date_rejected() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        sqlx::query("INSERT INTO stylist_blocked_dates (stylist_id, date) VALUES (1, '2024-06-12')")
            .execute(&pool)
            .await
            .unwrap();

        let err = book(&pool, &locks, req("2024-06-12", "12:00", vec![1], Some(1)), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
    }

    #[tokio::test]
    async fn test_book_unknown_service_rejected() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let err = book(&pool, &locks, req("2024-06-10", "14:00", vec![99], None), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_book_unknown_stylist_rejected() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let err = book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(9)), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_book_empty_bundle_rejected() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let err = book(&pool, &locks, req("2024-06-10", "14:00", vec![], None), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_book_misaligned_time_rejected() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let err = book(&pool, &locks, req("2024-06-10", "14:15", vec![1], None), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_book_duration_never_fits_any_window() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        // 600 minutes against a 480-minute longest window.
        let err = book(&pool, &locks, req("2024-06-10", "09:00", vec![4], None), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDuration(_)));
    }

    #[tokio::test]
    async fn test_double_booking_rejected() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();
        let err = book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(1)), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
    }

    #[tokio::test]
    async fn test_partial_overlap_rejected() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();

        // 14:30 starts inside the existing [14:00, 15:00).
        let err = book(&pool, &locks, req("2024-06-10", "14:30", vec![1], Some(1)), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));

        // 15:00 is adjacent and fine.
        book(&pool, &locks, req("2024-06-10", "15:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_bookings_single_winner() {
        let pool = test_db().await;
        let locks = Arc::new(SlotLocks::new());

        let mut handles = Vec::new();
        for i in 0..8 {
            let pool = pool.clone();
            let locks = Arc::clone(&locks);
            handles.push(tokio::spawn(async move {
                let mut r = req("2024-06-10", "14:00", vec![1], Some(1));
                r.customer_name = format!("Customer {}", i);
                book(&pool, &locks, r, test_now()).await
            }));
        }

        let mut won = 0;
        let mut lost = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(AppError::SlotUnavailable(_)) => lost += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(won, 1);
        assert_eq!(lost, 7);

        let intervals = occupied(&pool, "2024-06-10", Some(1)).await;
        assert_eq!(intervals, vec![Interval::new(840, 900)]);
    }

    #[tokio::test]
    async fn test_unassigned_booking_consumes_salon_capacity() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        book(&pool, &locks, req("2024-06-10", "14:00", vec![1], None), test_now())
            .await
            .unwrap();

        // Every stylist sees the unassigned appointment as occupancy.
        let err = book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(2)), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
    }

    #[tokio::test]
    async fn test_salon_wide_check_sees_all_stylists() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();

        // An unassigned request is checked against every appointment.
        let err = book(&pool, &locks, req("2024-06-10", "14:00", vec![1], None), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
    }

    #[tokio::test]
    async fn test_different_stylists_can_overlap() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();
        book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(2)), test_now())
            .await
            .unwrap();
    }

    // ── reschedule ──

    #[tokio::test]
    async fn test_reschedule_moves_the_interval() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let appt = book(&pool, &locks, req("2024-06-10", "11:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();

        let moved = reschedule(&pool, &locks, appt.id, d("2024-06-10"), t("15:00"), test_now())
            .await
            .unwrap();
        assert_eq!(moved.start_time, "15:00");
        assert_eq!(moved.end_time, "16:00");

        // Old slot free, new slot occupied — exactly one interval remains.
        let intervals = occupied(&pool, "2024-06-10", Some(1)).await;
        assert_eq!(intervals, vec![Interval::new(900, 960)]);
    }

    #[tokio::test]
    async fn test_reschedule_across_dates() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let appt = book(&pool, &locks, req("2024-06-10", "11:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();

        reschedule(&pool, &locks, appt.id, d("2024-06-13"), t("12:00"), test_now())
            .await
            .unwrap();

        assert!(occupied(&pool, "2024-06-10", Some(1)).await.is_empty());
        assert_eq!(
            occupied(&pool, "2024-06-13", Some(1)).await,
            vec![Interval::new(720, 780)]
        );
    }

    #[tokio::test]
    async fn test_reschedule_same_slot_is_no_change() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let appt = book(&pool, &locks, req("2024-06-10", "11:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();

        let err = reschedule(&pool, &locks, appt.id, d("2024-06-10"), t("11:00"), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoChangeRequested));
    }

    #[tokio::test]
    async fn test_reschedule_missing_appointment() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let err = reschedule(&pool, &locks, 777, d("2024-06-10"), t("11:00"), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AppointmentNotFound));
    }

    #[tokio::test]
    async fn test_reschedule_cancelled_appointment() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let appt = book(&pool, &locks, req("2024-06-10", "11:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();
        cancel(&pool, &locks, appt.id, test_now()).await.unwrap();

        let err = reschedule(&pool, &locks, appt.id, d("2024-06-10"), t("15:00"), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AppointmentNotFound));
    }

    #[tokio::test]
    async fn test_reschedule_conflict_keeps_original() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let first = book(&pool, &locks, req("2024-06-10", "11:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();
        book(&pool, &locks, req("2024-06-10", "15:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();

        let err = reschedule(&pool, &locks, first.id, d("2024-06-10"), t("15:00"), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));

        // The failed move left both appointments exactly where they were.
        let intervals = occupied(&pool, "2024-06-10", Some(1)).await;
        assert!(intervals.contains(&Interval::new(660, 720)));
        assert!(intervals.contains(&Interval::new(900, 960)));
    }

    #[tokio::test]
    async fn test_reschedule_may_overlap_its_own_interval() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        // 120-minute colour at 12:00; moving to 13:00 overlaps [12:00, 14:00)
        // — but only with itself, which the occupancy check excludes.
        let appt = book(&pool, &locks, req("2024-06-10", "12:00", vec![2], Some(2)), test_now())
            .await
            .unwrap();

        let moved = reschedule(&pool, &locks, appt.id, d("2024-06-10"), t("13:00"), test_now())
            .await
            .unwrap();
        assert_eq!(moved.start_time, "13:00");
        assert_eq!(moved.end_time, "15:00");
    }

    #[tokio::test]
    async fn test_reschedule_into_past_rejected() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let appt = book(&pool, &locks, req("2024-06-10", "11:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();

        let err = reschedule(&pool, &locks, appt.id, d("2024-05-20"), t("11:00"), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
    }

    // ── cancel ──

    #[tokio::test]
    async fn test_cancel_frees_the_slot() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let appt = book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();
        let cancelled = cancel(&pool, &locks, appt.id, test_now()).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");

        assert!(occupied(&pool, "2024-06-10", Some(1)).await.is_empty());

        // The slot can be claimed again.
        book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_twice_fails() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let appt = book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();
        cancel(&pool, &locks, appt.id, test_now()).await.unwrap();

        let err = cancel(&pool, &locks, appt.id, test_now()).await.unwrap_err();
        assert!(matches!(err, AppError::AppointmentNotFound));
    }

    #[tokio::test]
    async fn test_cancel_missing_appointment() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let err = cancel(&pool, &locks, 555, test_now()).await.unwrap_err();
        assert!(matches!(err, AppError::AppointmentNotFound));
    }

    // ── block / unblock ──

    #[tokio::test]
    async fn test_block_prevents_future_booking() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        block_slot(&pool, &locks, d("2024-06-10"), t("14:00"), None, test_now())
            .await
            .unwrap();

        let err = book(&pool, &locks, req("2024-06-10", "14:00", vec![1], None), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));

        // A 60-minute service starting 13:30 would run into the block too.
        let err = book(&pool, &locks, req("2024-06-10", "13:30", vec![1], None), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
    }

    #[tokio::test]
    async fn test_block_is_idempotent() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        block_slot(&pool, &locks, d("2024-06-10"), t("14:00"), None, test_now())
            .await
            .unwrap();
        block_slot(&pool, &locks, d("2024-06-10"), t("14:00"), None, test_now())
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM slot_blocks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_unblock_is_idempotent() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        // Unblocking a slot that was never blocked is a no-op success.
        unblock_slot(&pool, &locks, d("2024-06-10"), t("14:00"), None)
            .await
            .unwrap();

        block_slot(&pool, &locks, d("2024-06-10"), t("14:00"), None, test_now())
            .await
            .unwrap();
        unblock_slot(&pool, &locks, d("2024-06-10"), t("14:00"), None)
            .await
            .unwrap();
        unblock_slot(&pool, &locks, d("2024-06-10"), t("14:00"), None)
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM slot_blocks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_unblock_restores_bookability() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        block_slot(&pool, &locks, d("2024-06-10"), t("14:00"), None, test_now())
            .await
            .unwrap();
        unblock_slot(&pool, &locks, d("2024-06-10"), t("14:00"), None)
            .await
            .unwrap();

        book(&pool, &locks, req("2024-06-10", "14:00", vec![1], None), test_now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stylist_scoped_block() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        block_slot(&pool, &locks, d("2024-06-10"), t("14:00"), Some(1), test_now())
            .await
            .unwrap();

        let err = book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(1)), test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));

        // Another stylist's 14:00 is unaffected.
        book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(2)), test_now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_block_misaligned_time_rejected() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let err = block_slot(&pool, &locks, d("2024-06-10"), t("14:10"), None, test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_block_does_not_cancel_existing_appointment() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        let appt = book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();
        block_slot(&pool, &locks, d("2024-06-10"), t("14:00"), Some(1), test_now())
            .await
            .unwrap();

        let status: String = sqlx::query_scalar("SELECT status FROM appointments WHERE id = ?")
            .bind(appt.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "scheduled");
    }

    // ── read path against the live store ──

    #[tokio::test]
    async fn test_day_slots_reflect_bookings_and_blocks() {
        let pool = test_db().await;
        let locks = SlotLocks::new();

        book(&pool, &locks, req("2024-06-10", "14:00", vec![1], Some(1)), test_now())
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let salon = load_salon_hours(&mut conn).await.unwrap();
        let stylist = load_stylist_schedule(&mut conn, 1).await.unwrap().unwrap();

        let slots = day_slots(
            &mut conn,
            &salon,
            Some((1, &stylist)),
            d("2024-06-10"),
            60,
            test_now().date_naive(),
        )
        .await
        .unwrap();

        // Window 11:00–17:00 → twelve grid slots.
        assert_eq!(slots.len(), 12);

        let available: Vec<&str> = slots
            .iter()
            .filter(|s| s.available)
            .map(|s| s.time.as_str())
            .collect();
        assert_eq!(
            available,
            vec!["11:00", "11:30", "12:00", "12:30", "13:00", "15:00", "15:30", "16:00"]
        );
    }

    // ── locks ──

    #[tokio::test]
    async fn test_locks_prune_drops_past_dates() {
        let locks = SlotLocks::new();
        locks.acquire(d("2024-05-01")).await.unwrap();
        locks.acquire(d("2024-06-10")).await.unwrap();
        assert_eq!(locks.len(), 2);

        locks.prune(d("2024-06-01"));
        assert_eq!(locks.len(), 1);
    }
}
