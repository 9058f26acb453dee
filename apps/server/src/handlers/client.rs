use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::availability::{day_slots, free_starts};
use crate::engine::booking::{self, BookingRequest};
use crate::engine::schedule::{load_salon_hours, load_stylist_schedule, resolve_window};
use crate::engine::{parse_hhmm, Interval, SLOT_GRANULARITY_MIN};
use crate::errors::AppError;
use crate::models::*;
use crate::{notify, AppState};

use super::{parse_date, parse_service_ids, parse_time};

// ── Endpoints ──

/// GET /api/services — list the active catalog.
pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Service>>>, AppError> {
    let services = sqlx::query_as::<_, Service>(
        "SELECT id, name, description, price, duration_min, is_active, sort_order
         FROM services WHERE is_active = 1 ORDER BY sort_order ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(services)))
}

/// GET /api/stylists — active stylists with their specialty service ids.
pub async fn list_stylists(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<StylistInfo>>>, AppError> {
    let stylists = sqlx::query_as::<_, Stylist>(
        "SELECT id, name, is_active FROM stylists WHERE is_active = 1 ORDER BY name ASC",
    )
    .fetch_all(&state.db)
    .await?;

    let pairs = sqlx::query_as::<_, (i64, i64)>(
        "SELECT stylist_id, service_id FROM stylist_specialties ORDER BY service_id ASC",
    )
    .fetch_all(&state.db)
    .await?;

    let mut by_stylist: HashMap<i64, Vec<i64>> = HashMap::new();
    for (stylist_id, service_id) in pairs {
        by_stylist.entry(stylist_id).or_default().push(service_id);
    }

    let infos = stylists
        .into_iter()
        .map(|s| StylistInfo {
            specialty_service_ids: by_stylist.remove(&s.id).unwrap_or_default(),
            id: s.id,
            name: s.name,
        })
        .collect();

    Ok(Json(ApiResponse::success(infos)))
}

/// GET /api/available-slots?date=YYYY-MM-DD&service_ids=1,2&stylist_id=N
///
/// Every grid slot of the resolved window, flagged bookable for the full
/// requested bundle or not. Empty for closed or past dates.
pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<ApiResponse<Vec<TimeSlot>>>, AppError> {
    let date = parse_date(&query.date)?;
    let service_ids = parse_service_ids(&query.service_ids)?;
    if service_ids.is_empty() {
        return Err(AppError::Validation("at least one service is required".into()));
    }

    let mut conn = state.db.acquire().await?;

    let mut duration_min: i64 = 0;
    for id in &service_ids {
        let d: Option<i64> = sqlx::query_scalar(
            "SELECT duration_min FROM services WHERE id = ? AND is_active = 1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        duration_min += d.ok_or_else(|| AppError::NotFound(format!("service {}", id)))?;
    }

    let salon = load_salon_hours(&mut conn).await?;
    booking::validate_duration(duration_min, salon.max_open_minutes())?;

    let stylist_schedule = match query.stylist_id {
        Some(sid) => Some(
            load_stylist_schedule(&mut conn, sid)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("stylist {}", sid)))?,
        ),
        None => None,
    };

    let slots = day_slots(
        &mut conn,
        &salon,
        query.stylist_id.zip(stylist_schedule.as_ref()),
        date,
        duration_min as u32,
        state.salon_today(),
    )
    .await?;

    Ok(Json(ApiResponse::success(slots)))
}

/// GET /api/calendar?year=2026&month=2&service_ids=1&stylist_id=N
///
/// Per-day bookability for a month. Occupancy for the whole month is fetched
/// in two queries (no per-day round trips).
pub async fn calendar(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<ApiResponse<Vec<CalendarDay>>>, AppError> {
    if !(1..=12).contains(&query.month) {
        return Err(AppError::Validation(format!("invalid month: {}", query.month)));
    }

    let mut conn = state.db.acquire().await?;

    let duration_min: i64 = match &query.service_ids {
        Some(raw) => {
            let ids = parse_service_ids(raw)?;
            let mut total = 0;
            for id in &ids {
                let d: Option<i64> = sqlx::query_scalar(
                    "SELECT duration_min FROM services WHERE id = ? AND is_active = 1",
                )
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
                total += d.ok_or_else(|| AppError::NotFound(format!("service {}", id)))?;
            }
            total
        }
        None => SLOT_GRANULARITY_MIN as i64,
    };

    let salon = load_salon_hours(&mut conn).await?;
    let stylist_schedule = match query.stylist_id {
        Some(sid) => Some(
            load_stylist_schedule(&mut conn, sid)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("stylist {}", sid)))?,
        ),
        None => None,
    };

    let (year, month) = (query.year, query.month);
    let days_in_month = chrono::NaiveDate::from_ymd_opt(
        if month == 12 { year + 1 } else { year },
        if month == 12 { 1 } else { month + 1 },
        1,
    )
    .and_then(|d| d.pred_opt())
    .map(|d| chrono::Datelike::day(&d))
    .unwrap_or(28);

    let month_start = format!("{:04}-{:02}-01", year, month);
    let month_end = format!("{:04}-{:02}-{:02}", year, month, days_in_month);

    // Whole month in two queries, grouped by date in memory.
    let appointment_rows: Vec<(String, String, i64)> = match query.stylist_id {
        Some(sid) => {
            sqlx::query_as(
                "SELECT date, start_time, duration_min FROM appointments
                 WHERE date BETWEEN ? AND ? AND status = 'scheduled'
                   AND (stylist_id IS NULL OR stylist_id = ?)",
            )
            .bind(&month_start)
            .bind(&month_end)
            .bind(sid)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT date, start_time, duration_min FROM appointments
                 WHERE date BETWEEN ? AND ? AND status = 'scheduled'",
            )
            .bind(&month_start)
            .bind(&month_end)
            .fetch_all(&mut *conn)
            .await?
        }
    };

    let block_rows: Vec<(String, String)> = match query.stylist_id {
        Some(sid) => {
            sqlx::query_as(
                "SELECT date, time FROM slot_blocks
                 WHERE date BETWEEN ? AND ? AND (stylist_id IS NULL OR stylist_id = ?)",
            )
            .bind(&month_start)
            .bind(&month_end)
            .bind(sid)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as("SELECT date, time FROM slot_blocks WHERE date BETWEEN ? AND ?")
                .bind(&month_start)
                .bind(&month_end)
                .fetch_all(&mut *conn)
                .await?
        }
    };

    let mut occupied_by_date: HashMap<String, Vec<Interval>> = HashMap::new();
    for (date, start_time, duration) in appointment_rows {
        if let (Some(start), true) = (parse_hhmm(&start_time), duration > 0) {
            occupied_by_date
                .entry(date)
                .or_default()
                .push(Interval::from_start(start, duration as u32));
        }
    }
    for (date, time) in block_rows {
        if let Some(start) = parse_hhmm(&time) {
            occupied_by_date
                .entry(date)
                .or_default()
                .push(Interval::from_start(start, SLOT_GRANULARITY_MIN));
        }
    }

    let today = state.salon_today();
    let mut days = Vec::new();

    for day in 1..=days_in_month {
        let Some(date) = chrono::NaiveDate::from_ymd_opt(year, month, day) else {
            continue;
        };
        if date < today {
            continue;
        }
        let date_str = date.format("%Y-%m-%d").to_string();

        let free = match resolve_window(&salon, stylist_schedule.as_ref(), date, today) {
            Some(window) => {
                let occupied = occupied_by_date
                    .get(&date_str)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                free_starts(&window, duration_min as u32, SLOT_GRANULARITY_MIN, occupied).len()
            }
            None => 0,
        };

        days.push(CalendarDay {
            date: date_str,
            bookable: free > 0,
            free_starts: free as i64,
        });
    }

    Ok(Json(ApiResponse::success(days)))
}

/// POST /api/appointments — claim a slot for a service bundle.
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateAppointmentRequest>,
) -> Result<Json<ApiResponse<AppointmentDetail>>, AppError> {
    let request = BookingRequest {
        date: parse_date(&body.date)?,
        start: parse_time(&body.start_time)?,
        service_ids: body.service_ids,
        stylist_id: body.stylist_id,
        customer_name: body.customer_name,
        customer_phone: body.customer_phone,
    };

    let detail = booking::book(&state.db, &state.locks, request, state.salon_now()).await?;

    notify::dispatch(&state, "appointment.created", &detail);
    Ok(Json(ApiResponse::success(detail)))
}

/// POST /api/appointments/:id/reschedule — move an appointment.
pub async fn reschedule_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<RescheduleRequest>,
) -> Result<Json<ApiResponse<AppointmentDetail>>, AppError> {
    let new_date = parse_date(&body.date)?;
    let new_start = parse_time(&body.start_time)?;

    let detail = booking::reschedule(
        &state.db,
        &state.locks,
        id,
        new_date,
        new_start,
        state.salon_now(),
    )
    .await?;

    notify::dispatch(&state, "appointment.rescheduled", &detail);
    Ok(Json(ApiResponse::success(detail)))
}

/// DELETE /api/appointments/:id — cancel an appointment.
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<AppointmentDetail>>, AppError> {
    let detail = booking::cancel(&state.db, &state.locks, id, state.salon_now()).await?;

    notify::dispatch(&state, "appointment.cancelled", &detail);
    Ok(Json(ApiResponse::success(detail)))
}
