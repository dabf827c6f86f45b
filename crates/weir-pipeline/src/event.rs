//! Typed adapter for the recent-change event feed.
//!
//! The core path treats payloads as opaque text; this adapter exists for
//! consumers that want structured fields. It is pure and stateless:
//! unknown fields are ignored, absent fields come back as `None`, and a
//! payload that is not a JSON object yields a decode error.

use serde::{Deserialize, Serialize};

/// One recent-change event from the upstream feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentChange {
    /// Event envelope metadata.
    #[serde(default)]
    pub meta: Option<RecentChangeMeta>,
    /// Upstream change identifier.
    #[serde(default)]
    pub id: Option<i64>,
    /// Change type (`edit`, `new`, `log`, ...).
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Page namespace number.
    #[serde(default)]
    pub namespace: Option<i32>,
    /// Page title.
    #[serde(default)]
    pub title: Option<String>,
    /// Acting user name.
    #[serde(default)]
    pub user: Option<String>,
    /// Whether the actor is a bot account.
    #[serde(default)]
    pub bot: Option<bool>,
    /// Host wiki server name.
    #[serde(default)]
    pub server_name: Option<String>,
    /// Event time (epoch seconds).
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Envelope metadata carried in the event's `meta` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentChangeMeta {
    /// Canonical page URI.
    #[serde(default)]
    pub uri: Option<String>,
    /// Upstream request identifier.
    #[serde(default)]
    pub request_id: Option<String>,
    /// Envelope identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Event datetime (ISO 8601).
    #[serde(default)]
    pub dt: Option<String>,
    /// Originating domain.
    #[serde(default)]
    pub domain: Option<String>,
    /// Upstream stream name.
    #[serde(default)]
    pub stream: Option<String>,
    /// Upstream topic name.
    #[serde(default)]
    pub topic: Option<String>,
}

impl RecentChange {
    /// Parses an event from its JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the decode failure if the payload is not a JSON object.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Returns the originating domain, if the envelope carries one.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.domain.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "meta": {
            "uri": "https://en.wikipedia.org/wiki/Example",
            "request_id": "a1b2",
            "id": "evt-1",
            "dt": "2024-05-01T12:00:00Z",
            "domain": "en.wikipedia.org",
            "stream": "recentchange",
            "topic": "eqiad.mediawiki.recentchange"
        },
        "id": 123456,
        "type": "edit",
        "namespace": 0,
        "title": "Example",
        "user": "Editor",
        "bot": false,
        "server_name": "en.wikipedia.org",
        "timestamp": 1714564800
    }"#;

    #[test]
    fn test_parses_full_event() {
        let event = RecentChange::from_json(SAMPLE).unwrap();
        assert_eq!(event.id, Some(123_456));
        assert_eq!(event.kind.as_deref(), Some("edit"));
        assert_eq!(event.title.as_deref(), Some("Example"));
        assert_eq!(event.user.as_deref(), Some("Editor"));
        assert_eq!(event.bot, Some(false));
        assert_eq!(event.domain(), Some("en.wikipedia.org"));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let event =
            RecentChange::from_json(r#"{"title": "T", "wiki": "enwiki", "minor": true}"#).unwrap();
        assert_eq!(event.title.as_deref(), Some("T"));
        assert!(event.meta.is_none());
    }

    #[test]
    fn test_missing_fields_are_none() {
        let event = RecentChange::from_json("{}").unwrap();
        assert!(event.id.is_none());
        assert!(event.domain().is_none());
    }

    #[test]
    fn test_non_object_payload_fails() {
        assert!(RecentChange::from_json("not json").is_err());
        assert!(RecentChange::from_json("[1, 2]").is_err());
    }
}
