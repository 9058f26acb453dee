use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

/// The route groups that carry distinct rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Read-only availability endpoints.
    Public,
    /// Booking/reschedule/cancel writes.
    Booking,
    /// Token-gated admin endpoints.
    Admin,
}

/// Configuration for a single rate limit tier.
#[derive(Debug, Clone)]
pub struct TierConfig {
    /// Maximum requests allowed within the sliding window.
    pub max_requests: u32,
    /// Duration of the sliding window.
    pub window: Duration,
}

type TierMap = DashMap<Tier, (TierConfig, DashMap<IpAddr, Vec<Instant>>)>;

/// In-memory per-IP rate limiter using sliding window counters.
///
/// Each tier has its own config and tracking map; keys are client IP
/// addresses, values are vectors of request timestamps.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    tiers: Arc<TierMap>,
}

impl RateLimiter {
    /// Create a new empty rate limiter. Call `add_tier()` to configure.
    pub fn new() -> Self {
        Self {
            tiers: Arc::new(DashMap::new()),
        }
    }

    /// Register a tier with its configuration.
    pub fn add_tier(&self, tier: Tier, config: TierConfig) {
        self.tiers.insert(tier, (config, DashMap::new()));
    }

    /// Check if a request from `ip` is allowed under the given tier.
    ///
    /// Returns `Ok(())` if allowed, `Err(retry_after_secs)` if rate limited.
    pub fn check(&self, tier: Tier, ip: IpAddr) -> Result<(), u64> {
        let tier_entry = self.tiers.get(&tier).expect("unknown rate limit tier");
        let (config, ip_map) = tier_entry.value();
        let now = Instant::now();
        let window_start = now - config.window;

        let mut entry = ip_map.entry(ip).or_insert_with(Vec::new);

        // Evict expired timestamps
        entry.retain(|t| *t > window_start);

        if entry.len() >= config.max_requests as usize {
            // Time until the oldest request expires from the window
            let oldest = entry[0];
            let retry_after = (oldest + config.window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        entry.push(now);
        Ok(())
    }

    /// Remove stale entries (older than 2× window) from all tiers.
    /// Call periodically from a background task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        for tier_entry in self.tiers.iter() {
            let (config, ip_map) = tier_entry.value();
            let cutoff = config.window * 2;
            ip_map.retain(|_ip, timestamps| {
                timestamps.retain(|t| now.duration_since(*t) < cutoff);
                !timestamps.is_empty()
            });
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// ── IP Extraction ──

/// Extract client IP from X-Forwarded-For header (reverse proxy) or
/// ConnectInfo.
pub fn extract_client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first_ip) = forwarded.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or_else(|| "127.0.0.1".parse().unwrap())
}

// ── Middleware ──

fn too_many_requests(retry_after: u64) -> Response {
    let body = ApiResponse::<()>::error(format!(
        "Too many requests. Try again in {} seconds",
        retry_after
    ));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

/// Single middleware for every tier; the tier travels in the state tuple.
pub async fn rate_limit(
    State((limiter, tier)): State<(RateLimiter, Tier)>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check(tier, ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

// ── Tests ──
