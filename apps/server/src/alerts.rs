//! Custom tracing layer that forwards ERROR-level events to an ops webhook.
//!
//! Features:
//! - Rate limiting: at most 1 alert per `MIN_INTERVAL` (10 s default)
//! - Deduplication: identical messages are suppressed for `DEDUP_WINDOW` (60 s)
//! - Non-blocking: webhook HTTP calls are spawned onto the Tokio runtime

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Minimum interval between alerts (prevents spam on cascading errors).
const MIN_INTERVAL: Duration = Duration::from_secs(10);
/// Window during which identical message hashes are suppressed.
const DEDUP_WINDOW: Duration = Duration::from_secs(60);

// ── Layer ──

/// A `tracing` layer that POSTs ERROR events to a webhook as JSON.
pub struct WebhookAlertLayer {
    webhook_url: String,
    http: reqwest::Client,
    /// Tracks when we last sent an alert (rate limit) and recent hashes.
    state: Mutex<LayerState>,
}

struct LayerState {
    last_sent: Instant,
    /// (hash, inserted_at) of recently sent messages.
    recent: Vec<(u64, Instant)>,
}

impl WebhookAlertLayer {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
            state: Mutex::new(LayerState {
                last_sent: Instant::now() - MIN_INTERVAL, // allow first alert immediately
                recent: Vec::new(),
            }),
        }
    }
}

impl<S: Subscriber> Layer<S> for WebhookAlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let message = visitor.message();

        let target = event.metadata().target().to_string();
        let file = event.metadata().file().unwrap_or("?");
        let line = event
            .metadata()
            .line()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "?".into());
        let location = format!("{file}:{line}");

        // ── Rate limit + dedup ──
        let hash = {
            let mut h = DefaultHasher::new();
            message.hash(&mut h);
            h.finish()
        };

        let should_send = {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();

            state
                .recent
                .retain(|(_, ts)| now.duration_since(*ts) < DEDUP_WINDOW);

            let is_dup = state.recent.iter().any(|(h, _)| *h == hash);
            let too_soon = now.duration_since(state.last_sent) < MIN_INTERVAL;

            if is_dup || too_soon {
                false
            } else {
                state.last_sent = now;
                state.recent.push((hash, now));
                true
            }
        };

        if !should_send {
            return;
        }

        // ── Spawn async send (non-blocking) ──
        let url = self.webhook_url.clone();
        let client = self.http.clone();
        let at = chrono::Utc::now().to_rfc3339();

        tokio::spawn(async move {
            let _ = client
                .post(&url)
                .json(&serde_json::json!({
                    "level": "error",
                    "message": message,
                    "target": target,
                    "location": location,
                    "at": at,
                }))
                .send()
                .await;
        });
    }
}

// ── Field visitor ──

/// Collects `message` (or unnamed) field from a tracing event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl MessageVisitor {
    /// Combined message: the main message plus any structured fields.
    fn message(&self) -> String {
        if self.fields.is_empty() {
            return self.message.clone();
        }
        let extras: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if self.message.is_empty() {
            extras.join(", ")
        } else {
            format!("{} ({})", self.message, extras.join(", "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{:?}", value);
        if field.name() == "message" {
            self.message = val;
        } else {
            self.fields.push((field.name().to_string(), val));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .push((field.name().to_string(), value.to_string()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .push((field.name().to_string(), value.to_string()));
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn make_layer() -> WebhookAlertLayer {
        WebhookAlertLayer::new("http://localhost:9/alerts".into())
    }

    /// Helper: simulate the rate-limit + dedup logic.
    fn check_should_send(state: &Mutex<LayerState>, hash: u64) -> bool {
        let mut s = state.lock().unwrap();
        let now = Instant::now();
        s.recent
            .retain(|(_, ts)| now.duration_since(*ts) < DEDUP_WINDOW);

        let is_dup = s.recent.iter().any(|(h, _)| *h == hash);
        let too_soon = now.duration_since(s.last_sent) < MIN_INTERVAL;

        if is_dup || too_soon {
            return false;
        }
        s.last_sent = now;
        s.recent.push((hash, now));
        true
    }

    #[test]
    fn test_first_alert_allowed() {
        let layer = make_layer();
        assert!(check_should_send(&layer.state, 111));
    }

    #[test]
    fn test_rate_limit_suppresses_second() {
        let layer = make_layer();
        assert!(check_should_send(&layer.state, 111));
        // Different hash but within rate limit window → suppressed
        assert!(!check_should_send(&layer.state, 222));
    }

    #[test]
    fn test_dedup_same_message() {
        let layer = make_layer();
        assert!(check_should_send(&layer.state, 111));

        // Fast-forward past rate limit
        {
            let mut s = layer.state.lock().unwrap();
            s.last_sent = Instant::now() - MIN_INTERVAL;
        }

        // Same hash → suppressed by dedup
        assert!(!check_should_send(&layer.state, 111));
    }

    #[test]
    fn test_different_errors_sent_after_interval() {
        let layer = make_layer();
        assert!(check_should_send(&layer.state, 111));

        {
            let mut s = layer.state.lock().unwrap();
            s.last_sent = Instant::now() - MIN_INTERVAL;
        }

        assert!(check_should_send(&layer.state, 222));
    }

    #[test]
    fn test_dedup_expires_after_window() {
        let layer = make_layer();
        assert!(check_should_send(&layer.state, 111));

        {
            let mut s = layer.state.lock().unwrap();
            s.last_sent = Instant::now() - MIN_INTERVAL;
            s.recent.clear();
            s.recent
                .push((111, Instant::now() - DEDUP_WINDOW - Duration::from_secs(1)));
        }

        // Same hash but dedup expired → allowed
        assert!(check_should_send(&layer.state, 111));
    }

    #[test]
    fn test_format_message_basic() {
        let mut v = MessageVisitor::default();
        v.message = "Something failed".into();
        assert_eq!(v.message(), "Something failed");
    }

    #[test]
    fn test_format_message_with_fields() {
        let mut v = MessageVisitor::default();
        v.message = "DB error".into();
        v.fields.push(("appointment_id".into(), "42".into()));
        assert_eq!(v.message(), "DB error (appointment_id=42)");
    }

    #[test]
    fn test_format_message_fields_only() {
        let v = MessageVisitor {
            message: String::new(),
            fields: vec![("error".into(), "timeout".into())],
        };
        assert_eq!(v.message(), "error=timeout");
    }
}
