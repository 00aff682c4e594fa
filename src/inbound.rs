use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::Deserialize;

static SENDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""sender"\s*:\s*"([^"]*)""#).expect("static regex"));

static MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"message"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("static regex")
});

static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""timestamp"\s*:\s*"([^"]*)""#).expect("static regex"));

#[derive(Debug, Deserialize)]
struct InboundPayload {
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// One forwarded alert as received from the relay (phone SMS forwarder or
/// charting webhook).
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub sender: String,
    pub message: String,
    /// Client-supplied event time; arrival time is used when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Extract sender/message/timestamp from a request body.
///
/// Well-formed JSON is read directly. Forwarders sometimes emit broken JSON
/// (raw newlines, unescaped quotes), so the fields are then recovered by
/// pattern, and failing that the whole body is treated as the message.
pub fn extract_inbound(body: &str) -> InboundMessage {
    if let Ok(payload) = serde_json::from_str::<InboundPayload>(body) {
        return InboundMessage {
            sender: payload.sender.unwrap_or_else(|| "unknown".to_string()),
            message: payload.message.unwrap_or_default(),
            timestamp: payload.timestamp.as_deref().and_then(parse_client_timestamp),
        };
    }

    tracing::warn!("Inbound body is not valid JSON, recovering fields by pattern");
    let sender = SENDER_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let message = MESSAGE_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| unescape(m.as_str()))
        .unwrap_or_else(|| body.trim().to_string());
    let timestamp = TIMESTAMP_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_client_timestamp(m.as_str()));

    InboundMessage {
        sender,
        message,
        timestamp,
    }
}

fn unescape(raw: &str) -> String {
    raw.replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\\"", "\"")
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
pub fn parse_client_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
