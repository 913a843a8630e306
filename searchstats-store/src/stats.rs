//! Telemetry and stats operations layered on the store seam.
//!
//! The web tier records raw searches with [`record_search`]; the
//! aggregators persist their documents with the `write_*` operations; the
//! read API picks them up with the `read_*` operations. Raw telemetry
//! expires on its own (the pipeline never deletes it), result documents
//! are overwritten wholesale on every batch close.

use std::time::Duration;

use searchstats_core::{PopularHourResult, SearchEvent, TopQueriesResult};
use tracing::debug;

use crate::error::Result;
use crate::keys::{self, fields};
use crate::traits::EventStore;

/// Retention for raw telemetry records (30 days).
pub const RAW_EVENT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Record one raw search under its time-ordered key. All fields are stored
/// as strings; the collector coerces them back on read.
pub async fn record_search(store: &dyn EventStore, event: &SearchEvent) -> Result<()> {
    let key = keys::search_key(event.timestamp);
    store
        .write_hash(
            &key,
            &[
                (fields::QUERY, event.query.clone()),
                (fields::SEARCH_TYPE, event.search_type.clone()),
                (fields::RESPONSE_TIME, event.response_time.to_string()),
                (fields::TIMESTAMP, event.timestamp.to_string()),
            ],
            Some(RAW_EVENT_TTL),
        )
        .await?;
    debug!(key, search_type = %event.search_type, "Recorded search telemetry");
    Ok(())
}

/// Persist the top-queries document for one category, replacing any
/// previous value.
pub async fn write_top_queries(
    store: &dyn EventStore,
    search_type: &str,
    result: &TopQueriesResult,
) -> Result<()> {
    let json = serde_json::to_string(result)?;
    store
        .set_string(&keys::top_queries_key(search_type), &json, None)
        .await
}

/// Fetch and decode the top-queries document for one category.
pub async fn read_top_queries(
    store: &dyn EventStore,
    search_type: &str,
) -> Result<Option<TopQueriesResult>> {
    let raw = store
        .get_string(&keys::top_queries_key(search_type))
        .await?;
    Ok(match raw {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    })
}

/// Persist the popular-hour document, replacing any previous value.
pub async fn write_popular_hour(store: &dyn EventStore, result: &PopularHourResult) -> Result<()> {
    let json = serde_json::to_string(result)?;
    store.set_string(keys::POPULAR_HOUR_KEY, &json, None).await
}

/// Fetch and decode the popular-hour document.
pub async fn read_popular_hour(store: &dyn EventStore) -> Result<Option<PopularHourResult>> {
    let raw = store.get_string(keys::POPULAR_HOUR_KEY).await?;
    Ok(match raw {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use searchstats_core::{Period, RankedQuery};

    use super::*;
    use crate::memory::MemoryEventStore;

    fn sample_event() -> SearchEvent {
        SearchEvent {
            query: "Luke".to_string(),
            search_type: "people".to_string(),
            response_time: 120,
            timestamp: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn recorded_search_is_scannable_and_stringly_typed() {
        let store = MemoryEventStore::new();
        record_search(&store, &sample_event()).await.unwrap();

        let keys = store.scan_keys(keys::SEARCH_KEY_PATTERN).await.unwrap();
        assert_eq!(keys, ["search:1700000000000"]);

        let fields = store.read_hash(&keys[0]).await.unwrap();
        assert_eq!(fields["query"], "Luke");
        assert_eq!(fields["searchType"], "people");
        assert_eq!(fields["responseTime"], "120");
        assert_eq!(fields["timestamp"], "1700000000000");

        let parsed = SearchEvent::from_hash_fields(&fields).unwrap();
        assert_eq!(parsed, sample_event());
    }

    #[tokio::test(start_paused = true)]
    async fn recorded_search_expires() {
        let store = MemoryEventStore::new();
        record_search(&store, &sample_event()).await.unwrap();

        tokio::time::advance(RAW_EVENT_TTL + Duration::from_secs(1)).await;
        assert!(
            store
                .scan_keys(keys::SEARCH_KEY_PATTERN)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn top_queries_document_round_trips() {
        let store = MemoryEventStore::new();
        let result = TopQueriesResult {
            total_queries: 3,
            top_five: vec![RankedQuery {
                query: "luke".to_string(),
                count: 2,
                percentage: "66.67%".to_string(),
            }],
            timestamp: "2024-05-01T12:00:00.000Z".to_string(),
            avg_response_time_ms: 200.0,
        };

        write_top_queries(&store, "people", &result).await.unwrap();
        assert_eq!(
            read_top_queries(&store, "people").await.unwrap(),
            Some(result)
        );
        assert_eq!(read_top_queries(&store, "movies").await.unwrap(), None);
    }

    #[tokio::test]
    async fn popular_hour_document_round_trips() {
        let store = MemoryEventStore::new();
        let result = PopularHourResult {
            hour: 2,
            period: Period::Pm,
            count: 2,
            percentage: "66.67%".to_string(),
            timestamp: "2024-05-01T12:00:00.000Z".to_string(),
        };

        write_popular_hour(&store, &result).await.unwrap();
        assert_eq!(read_popular_hour(&store).await.unwrap(), Some(result));
    }

    #[tokio::test]
    async fn result_keys_are_isolated_per_category() {
        let store = MemoryEventStore::new();
        let result = TopQueriesResult {
            total_queries: 1,
            top_five: vec![],
            timestamp: "2024-05-01T12:00:00.000Z".to_string(),
            avg_response_time_ms: 10.0,
        };

        write_top_queries(&store, "people", &result).await.unwrap();
        assert_eq!(read_top_queries(&store, "movies").await.unwrap(), None);
    }
}
