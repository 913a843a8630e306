//! The raw search telemetry event.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// One historical search action, as captured by the web tier and stored as
/// a string-valued hash in the event store.
///
/// Immutable once read; the collector reads it, the aggregators consume it
/// once and discard it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEvent {
    /// Free-text query, case preserved as captured.
    pub query: String,
    /// Search category, e.g. `people` or `movies`.
    pub search_type: String,
    /// Upstream response time in milliseconds.
    pub response_time: u64,
    /// Capture time, epoch milliseconds.
    pub timestamp: i64,
}

impl SearchEvent {
    /// Build an event from a store hash. All fields arrive as strings;
    /// numeric fields are coerced here. A missing or non-numeric required
    /// field makes the whole record malformed.
    pub fn from_hash_fields(fields: &HashMap<String, String>) -> Result<Self, RecordError> {
        let query = require(fields, "query")?.to_string();
        let search_type = require(fields, "searchType")?.to_string();
        let response_time = parse_numeric(fields, "responseTime")?;
        let timestamp = parse_numeric(fields, "timestamp")?;

        Ok(Self {
            query,
            search_type,
            response_time,
            timestamp,
        })
    }
}

fn require<'a>(
    fields: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, RecordError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or(RecordError::MissingField(name))
}

fn parse_numeric<T: std::str::FromStr>(
    fields: &HashMap<String, String>,
    name: &'static str,
) -> Result<T, RecordError> {
    let raw = require(fields, name)?;
    raw.parse().map_err(|_| RecordError::NonNumeric {
        field: name,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_hash(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_stringly_typed_hash() {
        let fields = raw_hash(&[
            ("query", "Luke"),
            ("searchType", "people"),
            ("responseTime", "120"),
            ("timestamp", "1700000000000"),
        ]);

        let event = SearchEvent::from_hash_fields(&fields).unwrap();
        assert_eq!(event.query, "Luke");
        assert_eq!(event.search_type, "people");
        assert_eq!(event.response_time, 120);
        assert_eq!(event.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn missing_field_is_an_error() {
        let fields = raw_hash(&[
            ("query", "Luke"),
            ("responseTime", "120"),
            ("timestamp", "1700000000000"),
        ]);

        let err = SearchEvent::from_hash_fields(&fields).unwrap_err();
        assert!(matches!(err, RecordError::MissingField("searchType")));
    }

    #[test]
    fn non_numeric_response_time_is_an_error() {
        let fields = raw_hash(&[
            ("query", "Luke"),
            ("searchType", "people"),
            ("responseTime", "fast"),
            ("timestamp", "1700000000000"),
        ]);

        let err = SearchEvent::from_hash_fields(&fields).unwrap_err();
        assert!(matches!(
            err,
            RecordError::NonNumeric {
                field: "responseTime",
                ..
            }
        ));
    }

    #[test]
    fn json_shape_is_camel_case() {
        let event = SearchEvent {
            query: "Luke".to_string(),
            search_type: "people".to_string(),
            response_time: 120,
            timestamp: 1_700_000_000_000,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"query":"Luke","searchType":"people","responseTime":120,"timestamp":1700000000000}"#
        );
    }
}
