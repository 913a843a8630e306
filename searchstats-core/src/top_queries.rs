//! Per-partition state machine for the top-queries aggregation.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::event::SearchEvent;
use crate::format;
use crate::record::{LogRecord, MarkerKind};

/// One ranked entry of a [`TopQueriesResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedQuery {
    pub query: String,
    pub count: u64,
    /// Share of the batch total, e.g. `"23.45%"`.
    pub percentage: String,
}

/// The persisted top-queries document for one search category.
///
/// Overwritten wholesale on every batch close; the read API consumes it
/// verbatim as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopQueriesResult {
    pub total_queries: u64,
    pub top_five: Vec<RankedQuery>,
    pub timestamp: String,
    pub avg_response_time_ms: f64,
}

/// Count and summed response time for one normalized query.
#[derive(Debug, Clone, Copy, Default)]
struct QueryTally {
    count: u64,
    total_response_time: u64,
}

/// Aggregation state for one topic partition.
///
/// Batches for different categories can be mid-flight on the same partition
/// only sequentially (a category's batch is pinned to one partition), but a
/// consumer still keys state per category so interleaved framing from a
/// misbehaving producer cannot cross-contaminate counts. Queries are
/// tracked in first-encounter order; the stable descending sort at
/// finalize therefore breaks count ties by encounter order.
#[derive(Debug, Default)]
pub struct TopQueriesState {
    batches: IndexMap<String, IndexMap<String, QueryTally>>,
}

impl TopQueriesState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one delivered record. Returns the finalized document and
    /// its category when the record closes a non-empty batch.
    pub fn apply(
        &mut self,
        record: &LogRecord,
        now: DateTime<Utc>,
    ) -> Option<(String, TopQueriesResult)> {
        match record {
            LogRecord::Marker(marker) => match marker.kind {
                MarkerKind::Bof => {
                    self.begin(&marker.search_type);
                    None
                }
                MarkerKind::Eof => self
                    .finalize(&marker.search_type, now)
                    .map(|result| (marker.search_type.clone(), result)),
            },
            LogRecord::Event(event) => {
                self.fold(event);
                None
            }
        }
    }

    /// Start a fresh batch for the category. A batch already in flight is
    /// a protocol anomaly: discard it rather than let two batches' counts
    /// bleed together.
    fn begin(&mut self, search_type: &str) {
        let stale = self
            .batches
            .insert(search_type.to_string(), IndexMap::new());
        if let Some(stale) = stale
            && !stale.is_empty()
        {
            warn!(
                search_type,
                discarded = stale.len(),
                "Duplicate BOF without EOF, resetting partial batch"
            );
        }
    }

    /// Fold one event into its category's tally under the case-folded query.
    fn fold(&mut self, event: &SearchEvent) {
        let tally = self
            .batches
            .entry(event.search_type.clone())
            .or_default()
            .entry(event.query.to_lowercase())
            .or_default();
        tally.count += 1;
        tally.total_response_time += event.response_time;
    }

    /// Close the category's batch. Returns `None` for an empty batch so a
    /// previously persisted result is left untouched.
    fn finalize(&mut self, search_type: &str, now: DateTime<Utc>) -> Option<TopQueriesResult> {
        let tallies = self.batches.shift_remove(search_type).unwrap_or_default();

        let total_queries: u64 = tallies.values().map(|t| t.count).sum();
        if total_queries == 0 {
            debug!(search_type, "Empty batch at EOF, keeping previous result");
            return None;
        }

        let total_response_time: u64 = tallies.values().map(|t| t.total_response_time).sum();

        let mut ranked: Vec<(String, QueryTally)> = tallies.into_iter().collect();
        // Stable sort: ties keep first-encounter order.
        ranked.sort_by(|a, b| b.1.count.cmp(&a.1.count));

        let top_five = ranked
            .into_iter()
            .take(5)
            .map(|(query, tally)| RankedQuery {
                query,
                count: tally.count,
                percentage: format::percentage(tally.count, total_queries),
            })
            .collect();

        Some(TopQueriesResult {
            total_queries,
            top_five,
            timestamp: format::timestamp(now),
            avg_response_time_ms: format::round2(
                total_response_time as f64 / total_queries as f64,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn event(query: &str, search_type: &str, response_time: u64) -> LogRecord {
        LogRecord::Event(SearchEvent {
            query: query.to_string(),
            search_type: search_type.to_string(),
            response_time,
            timestamp: 1_700_000_000_000,
        })
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn run_batch(state: &mut TopQueriesState, records: &[LogRecord]) -> Option<TopQueriesResult> {
        let mut finalized = None;
        for record in records {
            if let Some((_, result)) = state.apply(record, fixed_now()) {
                finalized = Some(result);
            }
        }
        finalized
    }

    #[test]
    fn ranks_case_folded_queries_with_percentages_and_average() {
        let mut state = TopQueriesState::new();
        let result = run_batch(
            &mut state,
            &[
                LogRecord::bof("people"),
                event("Luke", "people", 100),
                event("luke", "people", 300),
                event("Yoda", "people", 200),
                LogRecord::eof("people"),
            ],
        )
        .unwrap();

        assert_eq!(result.total_queries, 3);
        assert_eq!(result.avg_response_time_ms, 200.0);
        assert_eq!(
            result.top_five,
            vec![
                RankedQuery {
                    query: "luke".to_string(),
                    count: 2,
                    percentage: "66.67%".to_string(),
                },
                RankedQuery {
                    query: "yoda".to_string(),
                    count: 1,
                    percentage: "33.33%".to_string(),
                },
            ]
        );
    }

    #[test]
    fn takes_at_most_five_entries() {
        let mut state = TopQueriesState::new();
        let mut records = vec![LogRecord::bof("people")];
        for (i, query) in ["a", "b", "c", "d", "e", "f", "g"].iter().enumerate() {
            for _ in 0..=i {
                records.push(event(query, "people", 10));
            }
        }
        records.push(LogRecord::eof("people"));

        let result = run_batch(&mut state, &records).unwrap();
        assert_eq!(result.top_five.len(), 5);
        // Highest counts first: g (7), f (6), e (5), d (4), c (3).
        assert_eq!(result.top_five[0].query, "g");
        assert_eq!(result.top_five[4].query, "c");
    }

    #[test]
    fn count_ties_keep_encounter_order() {
        let mut state = TopQueriesState::new();
        let result = run_batch(
            &mut state,
            &[
                LogRecord::bof("people"),
                event("leia", "people", 10),
                event("han", "people", 10),
                event("chewie", "people", 10),
                LogRecord::eof("people"),
            ],
        )
        .unwrap();

        let queries: Vec<&str> = result.top_five.iter().map(|q| q.query.as_str()).collect();
        assert_eq!(queries, ["leia", "han", "chewie"]);
    }

    #[test]
    fn empty_batch_finalizes_to_none() {
        let mut state = TopQueriesState::new();
        let result = run_batch(
            &mut state,
            &[LogRecord::bof("people"), LogRecord::eof("people")],
        );
        assert!(result.is_none());
    }

    #[test]
    fn eof_without_bof_finalizes_to_none() {
        let mut state = TopQueriesState::new();
        assert!(state.apply(&LogRecord::eof("people"), fixed_now()).is_none());
    }

    #[test]
    fn duplicate_bof_discards_the_partial_batch() {
        let mut state = TopQueriesState::new();
        let result = run_batch(
            &mut state,
            &[
                LogRecord::bof("people"),
                event("stale", "people", 10),
                LogRecord::bof("people"),
                event("fresh", "people", 10),
                LogRecord::eof("people"),
            ],
        )
        .unwrap();

        assert_eq!(result.total_queries, 1);
        assert_eq!(result.top_five[0].query, "fresh");
    }

    #[test]
    fn categories_accumulate_independently() {
        let mut state = TopQueriesState::new();
        state.apply(&LogRecord::bof("people"), fixed_now());
        state.apply(&LogRecord::bof("movies"), fixed_now());
        state.apply(&event("Luke", "people", 100), fixed_now());
        state.apply(&event("Empire", "movies", 50), fixed_now());

        let (_, people) = state
            .apply(&LogRecord::eof("people"), fixed_now())
            .unwrap();
        let (_, movies) = state
            .apply(&LogRecord::eof("movies"), fixed_now())
            .unwrap();

        assert_eq!(people.top_five[0].query, "luke");
        assert_eq!(movies.top_five[0].query, "empire");
    }

    #[test]
    fn reprocessing_the_same_batch_is_byte_identical() {
        let records = [
            LogRecord::bof("people"),
            event("Luke", "people", 100),
            event("luke", "people", 300),
            event("Yoda", "people", 200),
            LogRecord::eof("people"),
        ];

        let mut state = TopQueriesState::new();
        let first = run_batch(&mut state, &records).unwrap();
        let second = run_batch(&mut state, &records).unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn result_json_shape_matches_the_read_api() {
        let mut state = TopQueriesState::new();
        let result = run_batch(
            &mut state,
            &[
                LogRecord::bof("people"),
                event("Luke", "people", 100),
                LogRecord::eof("people"),
            ],
        )
        .unwrap();

        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(
            json,
            r#"{"totalQueries":1,"topFive":[{"query":"luke","count":1,"percentage":"100.00%"}],"timestamp":"2024-05-01T12:00:00.000Z","avgResponseTimeMs":100.0}"#
        );
    }
}
