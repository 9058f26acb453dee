pub mod alerts;
pub mod auth;
pub mod db;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod rate_limit;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use engine::booking::SlotLocks;
use rate_limit::{rate_limit, RateLimiter, Tier};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub admin_token: String,
    /// The salon's fixed timezone. All date/time comparisons happen here.
    pub tz: FixedOffset,
    pub booking_webhook_url: Option<String>,
    pub started_at: Instant,
    pub locks: SlotLocks,
}

impl AppState {
    pub fn salon_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.tz)
    }

    pub fn salon_today(&self) -> NaiveDate {
        self.salon_now().date_naive()
    }
}

/// Assemble the full router: four route groups with per-group rate limits.
pub fn build_router(state: Arc<AppState>, limiter: RateLimiter, cors: CorsLayer) -> Router {
    // 1. No-limit: health checks
    let no_limit_routes = Router::new().route("/api/health", get(handlers::health::health));

    // 2. Public: read-only availability endpoints
    let public_routes = Router::new()
        .route("/api/services", get(handlers::client::list_services))
        .route("/api/stylists", get(handlers::client::list_stylists))
        .route(
            "/api/available-slots",
            get(handlers::client::available_slots),
        )
        .route("/api/calendar", get(handlers::client::calendar))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Public),
            rate_limit,
        ));

    // 3. Booking writes: strictest limit
    let booking_routes = Router::new()
        .route("/api/appointments", post(handlers::client::create_appointment))
        .route(
            "/api/appointments/{id}/reschedule",
            post(handlers::client::reschedule_appointment),
        )
        .route(
            "/api/appointments/{id}",
            delete(handlers::client::cancel_appointment),
        )
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Booking),
            rate_limit,
        ));

    // 4. Admin: token-gated management endpoints
    let admin_routes = Router::new()
        .route(
            "/api/admin/appointments",
            get(handlers::admin::list_appointments),
        )
        .route(
            "/api/admin/appointments/{id}/cancel",
            post(handlers::admin::cancel_appointment),
        )
        .route("/api/admin/blocks", get(handlers::admin::list_blocks))
        .route("/api/admin/blocks", post(handlers::admin::create_block))
        .route("/api/admin/blocks", delete(handlers::admin::delete_block))
        .route("/api/admin/hours", get(handlers::admin::get_hours))
        .route("/api/admin/hours", put(handlers::admin::update_hours))
        .route("/api/admin/services", get(handlers::admin::list_all_services))
        .route("/api/admin/services", post(handlers::admin::create_service))
        .route(
            "/api/admin/services/{id}",
            put(handlers::admin::update_service),
        )
        .layer(from_fn_with_state((limiter, Tier::Admin), rate_limit));

    Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(booking_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
