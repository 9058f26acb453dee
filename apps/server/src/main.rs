use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use salon_server::alerts::WebhookAlertLayer;
use salon_server::engine::booking::SlotLocks;
use salon_server::rate_limit::{RateLimiter, Tier, TierConfig};
use salon_server::{build_router, db, AppState};

/// Maintenance interval for rate-limiter and lock-map cleanup (seconds).
const MAINTENANCE_INTERVAL_SECS: u64 = 300;

/// Default salon timezone offset when SALON_UTC_OFFSET_HOURS is unset (UTC+3).
const DEFAULT_UTC_OFFSET_HOURS: i32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // ── Required env vars ──
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:salon.db?mode=rwc".into());
    let admin_token = std::env::var("ADMIN_TOKEN").expect("ADMIN_TOKEN must be set");

    // ── Tracing: console + optional webhook error alerts ──
    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    let fmt_layer = tracing_subscriber::fmt::layer();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    let alert_webhook_url = std::env::var("ALERT_WEBHOOK_URL").unwrap_or_default();
    if !alert_webhook_url.is_empty() {
        registry
            .with(WebhookAlertLayer::new(alert_webhook_url))
            .init();
    } else {
        registry.init();
    }

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());

    // ── Optional env vars ──
    let utc_offset_hours: i32 = std::env::var("SALON_UTC_OFFSET_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_UTC_OFFSET_HOURS);
    let tz = chrono::FixedOffset::east_opt(utc_offset_hours * 3600)
        .expect("SALON_UTC_OFFSET_HOURS out of range");

    let booking_webhook_url = std::env::var("BOOKING_WEBHOOK_URL").ok().filter(|v| !v.is_empty());
    if booking_webhook_url.is_none() {
        tracing::warn!("BOOKING_WEBHOOK_URL not set — booking notifications disabled");
    }

    let webapp_url = std::env::var("WEBAPP_URL").unwrap_or_default();

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    db::run_migrations(&pool).await?;

    let state = Arc::new(AppState {
        db: pool,
        admin_token,
        tz,
        booking_webhook_url,
        started_at: Instant::now(),
        locks: SlotLocks::new(),
    });

    // ── Rate limiter ──
    let rate_limiter = RateLimiter::new();
    rate_limiter.add_tier(
        Tier::Public,
        TierConfig {
            max_requests: 60,
            window: Duration::from_secs(60),
        },
    );
    rate_limiter.add_tier(
        Tier::Booking,
        TierConfig {
            max_requests: 5,
            window: Duration::from_secs(300),
        },
    );
    rate_limiter.add_tier(
        Tier::Admin,
        TierConfig {
            max_requests: 120,
            window: Duration::from_secs(60),
        },
    );

    // ── Background task: drop stale rate-limit entries and lock keys ──
    let cleanup_limiter = rate_limiter.clone();
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(MAINTENANCE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
            cleanup_state.locks.prune(cleanup_state.salon_today());
        }
    });

    // ── CORS: whitelist WEBAPP_URL when configured, otherwise allow any ──
    let cors = if !webapp_url.is_empty() {
        let origins: Vec<axum::http::HeaderValue> = vec![
            webapp_url.parse().expect("WEBAPP_URL must be a valid URL"),
            "http://localhost:5173".parse().unwrap(), // Vite dev server
        ];
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = build_router(state, rate_limiter, cors);

    let addr = format!("{}:{}", host, port);
    tracing::info!("Salon booking server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
