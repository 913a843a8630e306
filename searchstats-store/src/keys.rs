//! Event store key conventions.
//!
//! Raw telemetry keys are time-ordered (`search:<epoch-millis>`); computed
//! documents live under fixed keys the read API knows about. Each result
//! key has exactly one writer component.

/// Pattern matching every raw telemetry key.
pub const SEARCH_KEY_PATTERN: &str = "search:*";

/// The single popular-hour result document.
pub const POPULAR_HOUR_KEY: &str = "stats:popular-hour";

/// Raw telemetry key for one captured search.
pub fn search_key(timestamp_ms: i64) -> String {
    format!("search:{timestamp_ms}")
}

/// Top-queries result document for one search category.
pub fn top_queries_key(search_type: &str) -> String {
    format!("stats:{search_type}:top-queries")
}

/// Field names of the raw telemetry hash.
pub mod fields {
    pub const QUERY: &str = "query";
    pub const SEARCH_TYPE: &str = "searchType";
    pub const RESPONSE_TIME: &str = "responseTime";
    pub const TIMESTAMP: &str = "timestamp";
}
