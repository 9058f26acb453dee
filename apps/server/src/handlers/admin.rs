use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    Json,
};
use std::sync::Arc;

use crate::auth;
use crate::engine::booking;
use crate::engine::SLOT_GRANULARITY_MIN;
use crate::errors::AppError;
use crate::models::*;
use crate::{notify, AppState};

use super::{parse_date, parse_time};

/// Helper: validate the admin bearer token on every admin endpoint.
fn extract_admin(headers: &HeaderMap, state: &AppState) -> Result<(), AppError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if !auth::verify_bearer(header, &state.admin_token) {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

const APPOINTMENT_SELECT: &str =
    "SELECT id, date, start_time, duration_min, total_price, stylist_id,
            customer_name, customer_phone, status, created_at, cancelled_at
     FROM appointments";

/// GET /api/admin/appointments — list scheduled appointments.
///
/// Filters: `?date=` for one day, `?from=&to=` for a range, otherwise
/// everything from today onwards.
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Json<ApiResponse<Vec<Appointment>>>, AppError> {
    extract_admin(&headers, &state)?;

    let appointments = if let Some(date) = &query.date {
        parse_date(date)?;
        sqlx::query_as::<_, Appointment>(&format!(
            "{} WHERE date = ? AND status = 'scheduled' ORDER BY start_time ASC",
            APPOINTMENT_SELECT
        ))
        .bind(date)
        .fetch_all(&state.db)
        .await?
    } else if let (Some(from), Some(to)) = (&query.from, &query.to) {
        parse_date(from)?;
        parse_date(to)?;
        sqlx::query_as::<_, Appointment>(&format!(
            "{} WHERE date BETWEEN ? AND ? AND status = 'scheduled'
             ORDER BY date ASC, start_time ASC",
            APPOINTMENT_SELECT
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&state.db)
        .await?
    } else {
        sqlx::query_as::<_, Appointment>(&format!(
            "{} WHERE date >= ? AND status = 'scheduled'
             ORDER BY date ASC, start_time ASC",
            APPOINTMENT_SELECT
        ))
        .bind(state.salon_today().format("%Y-%m-%d").to_string())
        .fetch_all(&state.db)
        .await?
    };

    Ok(Json(ApiResponse::success(appointments)))
}

/// POST /api/admin/appointments/:id/cancel — cancel on the customer's behalf.
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<AppointmentDetail>>, AppError> {
    extract_admin(&headers, &state)?;

    let detail = booking::cancel(&state.db, &state.locks, id, state.salon_now()).await?;

    notify::dispatch(&state, "appointment.cancelled", &detail);
    Ok(Json(ApiResponse::success(detail)))
}

// ── Slot blocks ──

/// GET /api/admin/blocks?date=YYYY-MM-DD — list manual blocks for a date.
pub async fn list_blocks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BlocksQuery>,
) -> Result<Json<ApiResponse<Vec<SlotBlock>>>, AppError> {
    extract_admin(&headers, &state)?;
    parse_date(&query.date)?;

    let blocks = sqlx::query_as::<_, SlotBlock>(
        "SELECT id, date, time, stylist_id, created_at
         FROM slot_blocks WHERE date = ? ORDER BY time ASC",
    )
    .bind(&query.date)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(blocks)))
}

/// POST /api/admin/blocks — block a slot. Idempotent.
pub async fn create_block(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SlotBlockRequest>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    extract_admin(&headers, &state)?;

    let date = parse_date(&body.date)?;
    let time = parse_time(&body.time)?;

    booking::block_slot(
        &state.db,
        &state.locks,
        date,
        time,
        body.stylist_id,
        state.salon_now(),
    )
    .await?;

    Ok(Json(ApiResponse::success("blocked")))
}

/// DELETE /api/admin/blocks — unblock a slot. Idempotent.
pub async fn delete_block(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SlotBlockRequest>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    extract_admin(&headers, &state)?;

    let date = parse_date(&body.date)?;
    let time = parse_time(&body.time)?;

    booking::unblock_slot(&state.db, &state.locks, date, time, body.stylist_id).await?;

    Ok(Json(ApiResponse::success("unblocked")))
}

// ── Salon hours ──

/// GET /api/admin/hours — the salon-wide weekly schedule.
pub async fn get_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<DayHoursPayload>>>, AppError> {
    extract_admin(&headers, &state)?;

    let days = sqlx::query_as::<_, DayHoursPayload>(
        "SELECT weekday, is_open, open_time, close_time FROM salon_hours ORDER BY weekday ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(days)))
}

/// PUT /api/admin/hours — replace the salon-wide weekly schedule.
///
/// Expects all seven weekdays; each open day must have open < close.
pub async fn update_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpdateHoursRequest>,
) -> Result<Json<ApiResponse<Vec<DayHoursPayload>>>, AppError> {
    extract_admin(&headers, &state)?;

    let mut seen = [false; 7];
    for day in &body.days {
        if !(0..7).contains(&day.weekday) {
            return Err(AppError::Validation(format!("invalid weekday: {}", day.weekday)));
        }
        if seen[day.weekday as usize] {
            return Err(AppError::Validation(format!("duplicate weekday: {}", day.weekday)));
        }
        seen[day.weekday as usize] = true;

        if day.is_open {
            let open = parse_time(&day.open_time)?;
            let close = parse_time(&day.close_time)?;
            if open >= close {
                return Err(AppError::Validation(format!(
                    "weekday {}: opening time must precede closing time",
                    day.weekday
                )));
            }
        }
    }
    if !seen.iter().all(|s| *s) {
        return Err(AppError::Validation("all seven weekdays are required".into()));
    }

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM salon_hours").execute(&mut *tx).await?;
    for day in &body.days {
        sqlx::query(
            "INSERT INTO salon_hours (weekday, is_open, open_time, close_time) VALUES (?, ?, ?, ?)",
        )
        .bind(day.weekday)
        .bind(day.is_open)
        .bind(&day.open_time)
        .bind(&day.close_time)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let days = sqlx::query_as::<_, DayHoursPayload>(
        "SELECT weekday, is_open, open_time, close_time FROM salon_hours ORDER BY weekday ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(days)))
}

// ── Catalog management ──

/// GET /api/admin/services — list ALL services (including inactive).
pub async fn list_all_services(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<Service>>>, AppError> {
    extract_admin(&headers, &state)?;

    let services = sqlx::query_as::<_, Service>(
        "SELECT id, name, description, price, duration_min, is_active, sort_order
         FROM services ORDER BY sort_order ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(services)))
}

fn validate_service_duration(duration_min: i64) -> Result<(), AppError> {
    if duration_min <= 0 || duration_min % SLOT_GRANULARITY_MIN as i64 != 0 {
        return Err(AppError::Validation(format!(
            "duration must be a positive multiple of {} minutes",
            SLOT_GRANULARITY_MIN
        )));
    }
    Ok(())
}

/// POST /api/admin/services — create a new service.
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateServiceRequest>,
) -> Result<Json<ApiResponse<Service>>, AppError> {
    extract_admin(&headers, &state)?;

    if body.name.trim().is_empty() {
        return Err(AppError::Validation("service name is required".into()));
    }
    if body.price < 0 {
        return Err(AppError::Validation("price must not be negative".into()));
    }
    validate_service_duration(body.duration_min)?;

    let id = sqlx::query(
        "INSERT INTO services (name, description, price, duration_min, sort_order)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(body.name.trim())
    .bind(body.description.as_deref().unwrap_or(""))
    .bind(body.price)
    .bind(body.duration_min)
    .bind(body.sort_order.unwrap_or(0))
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    let service = sqlx::query_as::<_, Service>(
        "SELECT id, name, description, price, duration_min, is_active, sort_order
         FROM services WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(service)))
}

/// PUT /api/admin/services/:id — update a service.
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateServiceRequest>,
) -> Result<Json<ApiResponse<Service>>, AppError> {
    extract_admin(&headers, &state)?;

    let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM services WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if !exists {
        return Err(AppError::NotFound(format!("service {}", id)));
    }

    if let Some(duration) = body.duration_min {
        validate_service_duration(duration)?;
    }
    if let Some(price) = body.price {
        if price < 0 {
            return Err(AppError::Validation("price must not be negative".into()));
        }
    }

    if let Some(name) = &body.name {
        sqlx::query("UPDATE services SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(desc) = &body.description {
        sqlx::query("UPDATE services SET description = ? WHERE id = ?")
            .bind(desc)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(price) = body.price {
        sqlx::query("UPDATE services SET price = ? WHERE id = ?")
            .bind(price)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(duration) = body.duration_min {
        sqlx::query("UPDATE services SET duration_min = ? WHERE id = ?")
            .bind(duration)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(active) = body.is_active {
        sqlx::query("UPDATE services SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(order) = body.sort_order {
        sqlx::query("UPDATE services SET sort_order = ? WHERE id = ?")
            .bind(order)
            .bind(id)
            .execute(&state.db)
            .await?;
    }

    let service = sqlx::query_as::<_, Service>(
        "SELECT id, name, description, price, duration_min, is_active, sort_order
         FROM services WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(service)))
}
