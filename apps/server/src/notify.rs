//! Outbound booking lifecycle notifications.
//!
//! Delivery (email, WhatsApp, whatever sits behind the webhook) is someone
//! else's job; this module only POSTs the event and logs failures.

use crate::models::AppointmentDetail;
use crate::AppState;

/// Fire-and-forget a lifecycle event to the configured booking webhook.
/// A missing webhook URL disables notifications entirely.
pub fn dispatch(state: &AppState, event: &'static str, appointment: &AppointmentDetail) {
    let Some(url) = state.booking_webhook_url.clone() else {
        return;
    };

    let payload = serde_json::json!({
        "event": event,
        "appointment": appointment,
    });

    tokio::spawn(async move {
        let client = reqwest::Client::new();
        if let Err(e) = client.post(&url).json(&payload).send().await {
            tracing::error!("failed to deliver {} webhook: {}", payload["event"], e);
        }
    });
}
