//! Touchpoint event model and the persisted log encoding.
//!
//! The event log is stored under a single key as a JSON array:
//!
//! ```text
//! [{"url": "...", "timestamp": 1700000000000, "referrer": "...", "title": "...",
//!   "attribution": {...}, "uuid": "...", "is_loggedin": false,
//!   "event_id": "...", "deriv_user_id": "...", "event_type": "pageview"}, ...]
//! ```
//!
//! Decoding is lenient: unknown fields are ignored, missing optional fields
//! are absent, and an entry lacking `url`, `uuid`, or `event_id` is dropped
//! on its own without invalidating its neighbours.

pub mod types;

pub use types::{EventKind, UnknownEventKind};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::attribution::AttributionSnapshot;
use crate::page::PageContext;

/// One recorded touchpoint.
///
/// Immutable once created, except that the reconciler may rewrite the login
/// flag and account id of the open event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TouchpointEvent {
    /// Location visited.
    pub url: String,
    /// Visit time in epoch milliseconds.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Attribution in force when the event was captured.
    pub attribution: AttributionSnapshot,
    /// Visitor identity.
    pub uuid: String,
    #[serde(rename = "is_loggedin")]
    pub logged_in: bool,
    pub event_id: String,
    #[serde(rename = "deriv_user_id", skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(rename = "event_type")]
    pub kind: EventKind,
}

impl<'de> Deserialize<'de> for TouchpointEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        /// Wire shape with every field optional; required ones are checked
        /// after decoding.
        #[derive(Deserialize)]
        struct EventRaw {
            url: Option<String>,
            #[serde(default)]
            timestamp: Value,
            #[serde(default)]
            referrer: Value,
            #[serde(default)]
            title: Value,
            #[serde(default)]
            attribution: AttributionSnapshot,
            uuid: Option<String>,
            #[serde(default)]
            is_loggedin: Value,
            event_id: Option<String>,
            #[serde(default)]
            deriv_user_id: Value,
            #[serde(default)]
            event_type: Value,
        }

        fn text(value: Value) -> Option<String> {
            match value {
                Value::String(s) if !s.is_empty() => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        }

        let raw = EventRaw::deserialize(deserializer)?;
        let missing = |field: &'static str| <D::Error as serde::de::Error>::missing_field(field);
        let url = raw.url.filter(|u| !u.is_empty()).ok_or_else(|| missing("url"))?;
        let uuid = raw.uuid.filter(|u| !u.is_empty()).ok_or_else(|| missing("uuid"))?;
        let event_id = raw
            .event_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing("event_id"))?;

        let timestamp = match &raw.timestamp {
            Value::Number(n) => n.as_i64().unwrap_or_default(),
            Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .or_else(|_| s.parse::<i64>())
                .unwrap_or_default(),
            _ => 0,
        };
        let logged_in = match raw.is_loggedin {
            Value::Bool(b) => b,
            Value::String(s) => s == "true",
            _ => false,
        };
        let kind = raw
            .event_type
            .as_str()
            .and_then(|s| s.parse::<EventKind>().ok())
            .unwrap_or_default();

        Ok(Self {
            url,
            timestamp,
            referrer: text(raw.referrer),
            title: text(raw.title),
            attribution: raw.attribution,
            uuid,
            logged_in,
            event_id,
            account_id: text(raw.deriv_user_id),
            kind,
        })
    }
}

impl TouchpointEvent {
    /// Capture a new event for `page` with a fresh event id.
    #[must_use]
    pub fn capture(
        kind: EventKind,
        page: &PageContext,
        attribution: AttributionSnapshot,
        visitor: impl Into<String>,
        logged_in: bool,
        account_id: Option<String>,
        now_ms: i64,
    ) -> Self {
        Self {
            url: page.location().to_string(),
            timestamp: now_ms,
            referrer: page.referrer.clone(),
            title: page.title.clone(),
            attribution,
            uuid: visitor.into(),
            logged_in,
            event_id: Uuid::new_v4().to_string(),
            account_id,
            kind,
        }
    }
}

impl std::fmt::Display for TouchpointEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = self
            .attribution
            .utm_source
            .as_deref()
            .or(self.attribution.referrer.as_deref())
            .unwrap_or("direct");
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.timestamp, self.kind, self.url, source, self.event_id
        )
    }
}

/// Encode a log for storage.
///
/// # Errors
///
/// Returns [`serde_json::Error`] if an event fails to serialize.
pub fn encode_log(events: &[TouchpointEvent]) -> Result<String, serde_json::Error> {
    serde_json::to_string(events)
}

/// Decode a stored log, dropping whatever cannot be used.
///
/// Unparsable input or a non-array document yields an empty log.
#[must_use]
pub fn decode_log(raw: &str) -> Vec<TouchpointEvent> {
    let entries = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(other) => {
            tracing::warn!(kind = json_kind(&other), "stored event log is not an array; ignoring it");
            return Vec::new();
        }
        Err(err) => {
            tracing::warn!("stored event log is malformed; ignoring it: {err}");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::warn!(index, "dropping unreadable stored event: {err}");
                None
            }
        })
        .collect()
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> TouchpointEvent {
        let mut attribution = AttributionSnapshot::default();
        attribution.set("utm_source", "google");
        attribution.attribution_timestamp = Some(1_700_000_000_000);
        TouchpointEvent {
            url: "https://x.com/?utm_source=google".into(),
            timestamp: 1_700_000_000_000,
            referrer: Some("https://google.com/".into()),
            title: Some("Home".into()),
            attribution,
            uuid: "visitor-1".into(),
            logged_in: false,
            event_id: "evt-1".into(),
            account_id: None,
            kind: EventKind::Pageview,
        }
    }

    #[test]
    fn wire_field_names_match_storage_format() {
        let mut event = sample_event();
        event.account_id = Some("U1".into());
        event.logged_in = true;
        let value = serde_json::to_value(&event).expect("encode");
        assert_eq!(value["is_loggedin"], json!(true));
        assert_eq!(value["deriv_user_id"], json!("U1"));
        assert_eq!(value["event_type"], json!("pageview"));
        assert_eq!(value["attribution"]["utm_source"], json!("google"));
        assert!(value.get("logged_in").is_none());
    }

    #[test]
    fn stored_log_round_trips() {
        let mut second = sample_event();
        second.event_id = "evt-2".into();
        second.kind = EventKind::Signup;
        second.account_id = Some("U42".into());
        let events = vec![sample_event(), second];
        let json = encode_log(&events).expect("encode");
        assert_eq!(decode_log(&json), events);
    }

    #[test]
    fn missing_optional_and_unknown_fields_are_tolerated() {
        let raw = json!([{
            "url": "https://x.com/",
            "timestamp": "2024-01-01T00:00:00Z",
            "uuid": "visitor-1",
            "event_id": "evt-1",
            "is_loggedin": "true",
            "event_type": "purchase",
            "something_new": {"nested": 1}
        }]);
        let events = decode_log(&raw.to_string());
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.timestamp, 1_704_067_200_000);
        assert!(event.logged_in);
        assert_eq!(event.kind, EventKind::Pageview);
        assert_eq!(event.referrer, None);
        assert!(event.attribution.is_empty());
    }

    #[test]
    fn entries_missing_required_fields_are_dropped_individually() {
        let raw = json!([
            {"url": "https://x.com/a", "timestamp": 1, "uuid": "v", "event_id": "e1"},
            {"url": "https://x.com/b", "timestamp": 2, "uuid": "v"},
            "garbage",
            {"url": "", "timestamp": 3, "uuid": "v", "event_id": "e3"},
            {"url": "https://x.com/d", "timestamp": 4, "uuid": "v", "event_id": "e4"}
        ]);
        let ids: Vec<String> = decode_log(&raw.to_string())
            .into_iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec!["e1", "e4"]);
    }

    #[test]
    fn malformed_logs_decode_to_empty() {
        assert!(decode_log("{not json").is_empty());
        assert!(decode_log("{\"url\": \"x\"}").is_empty());
        assert!(decode_log("").is_empty());
    }

    #[test]
    fn capture_mints_unique_ids() {
        let page = PageContext::parse("https://x.com/")
            .expect("valid")
            .with_title("Home");
        let a = TouchpointEvent::capture(
            EventKind::Pageview,
            &page,
            AttributionSnapshot::default(),
            "v",
            false,
            None,
            10,
        );
        let b = TouchpointEvent::capture(
            EventKind::Pageview,
            &page,
            AttributionSnapshot::default(),
            "v",
            false,
            None,
            10,
        );
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.title.as_deref(), Some("Home"));
        assert_eq!(a.url, "https://x.com/");
    }
}
