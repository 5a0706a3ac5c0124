//! Subscription and notification models.
//!
//! Subscriptions are loaded once at startup and never change. A
//! `QueuedNotification` is created for every routed broker event, consumed
//! exactly once by the dispatcher, and never mutated in between.

use std::{borrow::Cow, fmt};

use bytes::Bytes;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::format::WebhookMessage;

/// Topic used for lifecycle notifications sent to the meta destination.
pub const META_TOPIC: &str = "meta";

/// Payload of the final notification emitted during shutdown.
pub const SHUTDOWN_PAYLOAD: &str = "SIGINT/SIGTERM";

/// Strongly-typed notification identifier.
///
/// Only used to correlate log lines for a single notification across
/// enqueue, retries and its terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    /// Creates a new random notification ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for NotificationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A topic filter bound to the webhook that receives its messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// MQTT topic filter, without the configured prefix.
    pub topic: String,
    /// Destination webhook URL.
    #[serde(rename = "webhook", alias = "destination_url")]
    pub destination_url: String,
}

impl Subscription {
    /// Creates a subscription.
    pub fn new(topic: impl Into<String>, destination_url: impl Into<String>) -> Self {
        Self { topic: topic.into(), destination_url: destination_url.into() }
    }
}

/// A formatted notification waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedNotification {
    /// Correlation identifier.
    pub id: NotificationId,
    /// Webhook URL the body is posted to.
    pub destination_url: String,
    /// Serialized JSON webhook message.
    pub body: Bytes,
    /// When the originating broker event was received.
    pub created_at: DateTime<Utc>,
}

impl QueuedNotification {
    /// Creates a notification from an already serialized body.
    pub fn new(destination_url: impl Into<String>, body: Bytes, created_at: DateTime<Utc>) -> Self {
        Self {
            id: NotificationId::new(),
            destination_url: destination_url.into(),
            body,
            created_at,
        }
    }

    /// Formats a broker event into a notification for `destination_url`.
    ///
    /// The rendered timestamp uses the local time zone.
    pub fn from_event(
        destination_url: impl Into<String>,
        topic: &str,
        payload: &[u8],
        received_at: DateTime<Utc>,
    ) -> Self {
        let message = WebhookMessage::new(topic, payload, &received_at.with_timezone(&Local));
        Self::new(destination_url, message.to_bytes(), received_at)
    }

    /// Builds the final lifecycle notification sent when shutdown begins.
    pub fn shutdown_notice(meta_destination: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::from_event(meta_destination, META_TOPIC, SHUTDOWN_PAYLOAD.as_bytes(), at)
    }

    /// Returns the body as text for diagnostics.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Masks the final path segment of a webhook URL for logging.
///
/// Webhook URLs usually embed their credential as the last path segment.
/// Unparseable input is masked entirely.
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = url::Url::parse(raw) else {
        return "***".to_string();
    };

    let segments: Vec<String> = match url.path_segments() {
        Some(segments) => segments.map(str::to_string).collect(),
        None => return format!("{}://***", url.scheme()),
    };

    if segments.len() >= 2 {
        let kept = &segments[..segments.len() - 1];
        url.set_path(&format!("/{}/***", kept.join("/")));
    }
    url.set_query(None);
    let _ = url.set_password(None);

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_ids_are_unique() {
        assert_ne!(NotificationId::new(), NotificationId::new());
    }

    #[test]
    fn subscription_uses_webhook_key() {
        let subscription: Subscription =
            serde_json::from_str(r#"{"topic": "home/door", "webhook": "https://example.com/hook"}"#)
                .unwrap();

        assert_eq!(subscription, Subscription::new("home/door", "https://example.com/hook"));
    }

    #[test]
    fn shutdown_notice_targets_meta_destination() {
        let notice = QueuedNotification::shutdown_notice("https://example.com/meta", Utc::now());
        let message: WebhookMessage = serde_json::from_slice(&notice.body).unwrap();

        assert_eq!(notice.destination_url, "https://example.com/meta");
        assert!(message.content.contains("meta: `SIGINT/SIGTERM`"));
    }

    #[test]
    fn body_text_is_lossy() {
        let body = Bytes::from_static(b"ok\xff");
        let notification = QueuedNotification::new("https://example.com", body, Utc::now());
        assert_eq!(notification.body_text(), "ok\u{FFFD}");
    }

    #[test]
    fn redacts_webhook_token() {
        assert_eq!(
            redact_url("https://discord.com/api/webhooks/123/secret-token"),
            "https://discord.com/api/webhooks/123/***"
        );
        assert_eq!(redact_url("not a url"), "***");
    }
}
