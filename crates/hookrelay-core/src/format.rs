//! Notification formatting.
//!
//! Turns a broker message into the single text field the chat sink renders:
//! a wall-clock timestamp, the topic, and the payload as inline code. The
//! transform is total: every payload, including invalid UTF-8, yields a
//! deterministic string.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Maximum number of characters the sink accepts in a message.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Placeholder rendered in place of an empty payload.
pub const EMPTY_PAYLOAD: &str = "(empty)";

const ELLIPSIS: char = '…';

/// Formats the notification text for a broker message.
///
/// The timestamp is rendered as `HH:MM:SS` in the time zone of `at`. Invalid
/// UTF-8 sequences are replaced with U+FFFD. Payloads containing a backtick
/// are fenced with double backticks so the inline-code span stays intact, and
/// the payload is truncated so the whole content fits the sink's limit. If the
/// timestamp and topic alone reach the limit, the whole line is truncated.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use hookrelay_core::format_content;
///
/// let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
/// assert_eq!(format_content("door", b"open", &at), "09:05:07 door: `open`");
/// ```
pub fn format_content<Tz>(topic: &str, payload: &[u8], at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let prefix = format!("{} {}: ", at.format("%H:%M:%S"), topic);
    let text = render_payload(payload);

    let (open, close) = if text.contains('`') { ("`` ", " ``") } else { ("`", "`") };
    let overhead = prefix.chars().count() + open.len() + close.len();

    // A topic alone can exceed the limit; then the whole line is cut.
    if overhead >= MAX_CONTENT_CHARS {
        return truncate_chars(&format!("{prefix}{open}{text}{close}"), MAX_CONTENT_CHARS);
    }

    let text = truncate_chars(&text, MAX_CONTENT_CHARS - overhead);
    format!("{prefix}{open}{text}{close}")
}

fn render_payload(payload: &[u8]) -> String {
    if payload.is_empty() {
        return EMPTY_PAYLOAD.to_string();
    }
    String::from_utf8_lossy(payload).into_owned()
}

fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    if budget == 0 {
        return String::new();
    }

    let mut truncated: String = text.chars().take(budget - 1).collect();
    truncated.push(ELLIPSIS);
    truncated
}

/// JSON body posted to the webhook sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookMessage {
    /// Text rendered by the sink.
    pub content: String,
}

impl WebhookMessage {
    /// Builds the message for a broker event received at `at`.
    pub fn new<Tz>(topic: &str, payload: &[u8], at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self { content: format_content(topic, payload, at) }
    }

    /// Serializes the message into the `{"content": ...}` wire form.
    pub fn to_bytes(&self) -> Bytes {
        // A struct of plain strings always serializes.
        serde_json::to_vec(self).map(Bytes::from).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 13, 4, 5).unwrap()
    }

    #[test]
    fn formats_timestamp_topic_and_payload() {
        let content = format_content("home/door", b"open", &at());
        assert_eq!(content, "13:04:05 home/door: `open`");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let content = format_content("raw", &[0x66, 0x6f, 0xff, 0x6f], &at());
        assert_eq!(content, "13:04:05 raw: `fo\u{FFFD}o`");
    }

    #[test]
    fn empty_payload_uses_placeholder() {
        let content = format_content("meta", b"", &at());
        assert_eq!(content, "13:04:05 meta: `(empty)`");
    }

    #[test]
    fn backticks_get_double_fence() {
        let content = format_content("code", b"a`b", &at());
        assert_eq!(content, "13:04:05 code: `` a`b ``");
    }

    #[test]
    fn long_payload_is_truncated_to_limit() {
        let payload = "x".repeat(5000);
        let content = format_content("bulk", payload.as_bytes(), &at());

        assert_eq!(content.chars().count(), MAX_CONTENT_CHARS);
        assert!(content.starts_with("13:04:05 bulk: `x"));
        assert!(content.ends_with("…`"));
    }

    #[test]
    fn oversized_topic_is_cut_to_limit() {
        let topic = "t".repeat(2100);
        let content = format_content(&topic, b"payload", &at());

        assert_eq!(content.chars().count(), MAX_CONTENT_CHARS);
        assert!(content.starts_with("13:04:05 ttt"));
        assert!(content.ends_with('…'));
    }

    #[test]
    fn topic_just_under_limit_keeps_fence() {
        let topic = "t".repeat(MAX_CONTENT_CHARS - 14);
        let content = format_content(&topic, b"payload", &at());

        assert_eq!(content.chars().count(), MAX_CONTENT_CHARS);
        assert!(content.ends_with("`…`"));
    }

    #[test]
    fn multibyte_payload_truncates_on_char_boundary() {
        let payload = "é".repeat(3000);
        let content = format_content("t", payload.as_bytes(), &at());
        assert_eq!(content.chars().count(), MAX_CONTENT_CHARS);
    }

    #[test]
    fn webhook_message_serializes_content_field() {
        let message = WebhookMessage::new("meta", b"SIGINT/SIGTERM", &at());
        let value: serde_json::Value = serde_json::from_slice(&message.to_bytes()).unwrap();

        assert_eq!(value, serde_json::json!({ "content": "13:04:05 meta: `SIGINT/SIGTERM`" }));
    }

    #[test]
    fn quotes_in_payload_survive_json_encoding() {
        let message = WebhookMessage::new("t", br#"{"state":"on"}"#, &at());
        let decoded: WebhookMessage = serde_json::from_slice(&message.to_bytes()).unwrap();
        assert_eq!(decoded, message);
    }
}
