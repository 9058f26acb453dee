use serde::{Deserialize, Serialize};

// ── Database models ──

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub duration_min: i64,
    pub is_active: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Stylist {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Appointment {
    pub id: i64,
    pub date: String,
    pub start_time: String,
    pub duration_min: i64,
    pub total_price: i64,
    pub stylist_id: Option<i64>,
    pub customer_name: String,
    pub customer_phone: String,
    pub status: String,
    pub created_at: String,
    pub cancelled_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SlotBlock {
    pub id: i64,
    pub date: String,
    pub time: String,
    pub stylist_id: Option<i64>,
    pub created_at: String,
}

// ── Derived read-path types ──

/// One fixed-granularity slot of a day, flagged bookable or not.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub time: String,
    pub available: bool,
}

/// Appointment joined with its service names and stylist name.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentDetail {
    pub id: i64,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_min: i64,
    pub total_price: i64,
    pub stylist_id: Option<i64>,
    pub stylist_name: Option<String>,
    pub services: Vec<String>,
    pub customer_name: String,
    pub customer_phone: String,
    pub status: String,
    pub created_at: String,
}

/// Stylist with the service ids they are qualified for.
#[derive(Debug, Clone, Serialize)]
pub struct StylistInfo {
    pub id: i64,
    pub name: String,
    pub specialty_service_ids: Vec<i64>,
}

/// One day of the monthly calendar view.
#[derive(Debug, Serialize)]
pub struct CalendarDay {
    pub date: String,
    pub bookable: bool,
    pub free_starts: i64,
}

// ── API request/response types ──

#[derive(Debug, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: String,
    /// Comma-separated service ids, e.g. "1,3".
    pub service_ids: String,
    pub stylist_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub year: i32,
    pub month: u32,
    pub service_ids: Option<String>,
    pub stylist_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub date: String,
    pub start_time: String,
    pub service_ids: Vec<i64>,
    pub stylist_id: Option<i64>,
    pub customer_name: String,
    pub customer_phone: String,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub date: String,
    pub start_time: String,
}

#[derive(Debug, Deserialize)]
pub struct SlotBlockRequest {
    pub date: String,
    pub time: String,
    pub stylist_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BlocksQuery {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentsQuery {
    pub date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration_min: i64,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub duration_min: Option<i64>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i64>,
}

/// One weekday entry of the salon weekly schedule, as sent over the API.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DayHoursPayload {
    /// 0 = Monday … 6 = Sunday.
    pub weekday: i64,
    pub is_open: bool,
    pub open_time: String,
    pub close_time: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateHoursRequest {
    pub days: Vec<DayHoursPayload>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
