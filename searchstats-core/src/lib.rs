//! Core domain types for the search-telemetry aggregation pipeline.
//!
//! This crate holds everything the pipeline agrees on without doing I/O:
//! the telemetry event shape, the control/data records multiplexed on the
//! log topic, and the two per-partition aggregation state machines with
//! their persisted result documents.
//!
//! # Key Types
//!
//! - [`SearchEvent`] - one historical search action, read from the store
//! - [`LogRecord`] - tagged variant (`Marker | Event`) decoded at the boundary
//! - [`TopQueriesState`] / [`TopQueriesResult`] - top-5 queries per category
//! - [`PopularHourState`] / [`PopularHourResult`] - busiest hour of day

pub mod error;
pub mod event;
pub mod format;
pub mod popular_hour;
pub mod record;
pub mod top_queries;

// Re-exports
pub use error::RecordError;
pub use event::SearchEvent;
pub use popular_hour::{HourBucket, Period, PopularHourResult, PopularHourState};
pub use record::{BOF_KEY, BatchMarker, EOF_KEY, LogRecord, MarkerKind, WireRecord};
pub use top_queries::{RankedQuery, TopQueriesResult, TopQueriesState};
