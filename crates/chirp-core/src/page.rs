//! Page and record helpers.
//!
//! Pages and records stay raw [`serde_json::Value`]s so that API-native keys
//! pass through untouched. The helpers here read the continuation markers out
//! of a page and attach retrieval metadata.

use std::pin::Pin;

use chrono::{DateTime, SecondsFormat, Utc};
use futures_core::Stream;
use serde::Serialize;
use serde_json::Value;

use crate::Result;

/// A lazy sequence of whole pages.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

/// A lazy sequence of single records (or ids).
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

/// Key under which retrieval metadata is attached.
pub const METADATA_KEY: &str = "__chirp";

/// Retrieval metadata attached to pages or records when enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// The request URL, without query string.
    pub url: String,
    /// Library version.
    pub version: &'static str,
    /// RFC 3339 retrieval time.
    pub retrieved_at: String,
}

impl Metadata {
    pub fn new(url: impl Into<String>, retrieved_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            version: env!("CARGO_PKG_VERSION"),
            retrieved_at: retrieved_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Attach to `value` if it is an object that has no metadata key yet.
    pub fn attach(&self, value: &mut Value) {
        let Some(object) = value.as_object_mut() else {
            return;
        };
        if !object.contains_key(METADATA_KEY) {
            object.insert(METADATA_KEY.to_string(), self.to_value());
        }
    }

    fn to_value(&self) -> Value {
        serde_json::json!({
            "url": self.url,
            "version": self.version,
            "retrieved_at": self.retrieved_at,
        })
    }
}

/// The v2 continuation token of a page.
///
/// `None` only when `meta.next_token` is absent (or JSON `null`). An empty
/// string is a present token and paging continues.
pub fn next_token(page: &Value) -> Option<String> {
    match page.get("meta")?.get("next_token")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// The v1.1 cursor of a page. A missing cursor reads as `0` (exhausted).
pub fn next_cursor(page: &Value) -> i64 {
    if let Some(cursor) = page.get("next_cursor").and_then(Value::as_i64) {
        return cursor;
    }
    page.get("next_cursor_str")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// The numeric id of a record: `id_str` (v1.1) first, then `id`.
pub fn record_id(record: &Value) -> Option<u64> {
    if let Some(id) = record
        .get("id_str")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
    {
        return Some(id);
    }
    match record.get("id")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// The `data` entries of a v2 page as a list. An object is one record;
/// a missing or null `data` is none.
pub fn page_records(page: &Value) -> Vec<Value> {
    match page.get("data") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn token_presence_not_truthiness() {
        assert_eq!(next_token(&json!({"meta": {"next_token": "abc"}})), Some("abc".into()));
        assert_eq!(next_token(&json!({"meta": {"next_token": ""}})), Some(String::new()));
        assert_eq!(next_token(&json!({"meta": {"result_count": 0}})), None);
        assert_eq!(next_token(&json!({"meta": {"next_token": null}})), None);
        assert_eq!(next_token(&json!({"data": []})), None);
    }

    #[test]
    fn cursor_reads_number_or_string() {
        assert_eq!(next_cursor(&json!({"next_cursor": 1374004777531007833_i64})), 1374004777531007833);
        assert_eq!(next_cursor(&json!({"next_cursor_str": "42"})), 42);
        assert_eq!(next_cursor(&json!({"ids": []})), 0);
    }

    #[test]
    fn record_id_prefers_id_str() {
        assert_eq!(record_id(&json!({"id": 1.5, "id_str": "20"})), Some(20));
        assert_eq!(record_id(&json!({"id": "1460323737035677698"})), Some(1460323737035677698));
        assert_eq!(record_id(&json!({"id": 7})), Some(7));
        assert_eq!(record_id(&json!({"text": "no id"})), None);
    }

    #[test]
    fn metadata_never_overwrites() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let meta = Metadata::new("https://api.twitter.com/2/tweets", at);

        let mut page = json!({"data": []});
        meta.attach(&mut page);
        assert_eq!(page[METADATA_KEY]["retrieved_at"], "2024-05-01T12:00:00Z");
        assert_eq!(page[METADATA_KEY]["url"], "https://api.twitter.com/2/tweets");

        let mut existing = json!({"__chirp": "keep"});
        meta.attach(&mut existing);
        assert_eq!(existing[METADATA_KEY], "keep");
    }

    #[test]
    fn page_records_normalizes_data() {
        assert_eq!(page_records(&json!({"data": {"id": "1"}})).len(), 1);
        assert_eq!(page_records(&json!({"data": [{"id": "1"}, {"id": "2"}]})).len(), 2);
        assert!(page_records(&json!({"meta": {}})).is_empty());
    }
}
