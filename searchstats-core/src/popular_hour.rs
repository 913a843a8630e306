//! Per-partition state machine for the popular-hour aggregation.

use chrono::{DateTime, Local, TimeZone, Timelike, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::event::SearchEvent;
use crate::format;
use crate::record::{LogRecord, MarkerKind};

/// AM/PM half of the 12-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "AM")]
    Am,
    #[serde(rename = "PM")]
    Pm,
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Am => "AM",
            Self::Pm => "PM",
        })
    }
}

/// One 12-hour-clock bucket, e.g. 2 PM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HourBucket {
    /// 1 through 12.
    pub hour: u8,
    pub period: Period,
}

impl HourBucket {
    /// Bucket for an epoch-milliseconds capture time, in local time.
    /// `None` when the timestamp is outside the representable range.
    pub fn from_timestamp_ms(timestamp: i64) -> Option<Self> {
        let local = Local.timestamp_millis_opt(timestamp).single()?;
        let (is_pm, hour) = local.hour12();
        Some(Self {
            hour: hour as u8,
            period: if is_pm { Period::Pm } else { Period::Am },
        })
    }

    /// Display label, e.g. `"2PM"`.
    pub fn label(&self) -> String {
        format!("{}{}", self.hour, self.period)
    }
}

/// The persisted popular-hour document, shared across all categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularHourResult {
    pub hour: u8,
    pub period: Period,
    pub count: u64,
    /// Share of the batch total, e.g. `"66.67%"`.
    pub percentage: String,
    pub timestamp: String,
}

/// Aggregation state for one topic partition.
///
/// A single histogram, not keyed by category: the framing brackets arrive
/// once per category, and this aggregator resets on every BOF and
/// finalizes on every EOF. Each category's batch-close therefore produces
/// its own snapshot, and the last one written wins the single result key.
/// That is the observed upstream behavior, carried as-is.
#[derive(Debug, Default)]
pub struct PopularHourState {
    histogram: IndexMap<HourBucket, u64>,
}

impl PopularHourState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one delivered record. Returns the finalized document when
    /// the record closes a non-empty batch.
    pub fn apply(&mut self, record: &LogRecord, now: DateTime<Utc>) -> Option<PopularHourResult> {
        match record {
            LogRecord::Marker(marker) => match marker.kind {
                MarkerKind::Bof => {
                    self.begin();
                    None
                }
                MarkerKind::Eof => self.finalize(now),
            },
            LogRecord::Event(event) => {
                self.fold(event);
                None
            }
        }
    }

    fn begin(&mut self) {
        if !self.histogram.is_empty() {
            warn!(
                buckets = self.histogram.len(),
                "BOF with accumulated state, resetting partial batch"
            );
        }
        self.histogram.clear();
    }

    fn fold(&mut self, event: &SearchEvent) {
        let Some(bucket) = HourBucket::from_timestamp_ms(event.timestamp) else {
            warn!(
                timestamp = event.timestamp,
                "Dropping event with out-of-range timestamp"
            );
            return;
        };
        *self.histogram.entry(bucket).or_insert(0) += 1;
    }

    /// Close the batch. Returns `None` for an empty batch so a previously
    /// persisted result is left untouched.
    fn finalize(&mut self, now: DateTime<Utc>) -> Option<PopularHourResult> {
        let histogram = std::mem::take(&mut self.histogram);

        let total: u64 = histogram.values().sum();
        if total == 0 {
            debug!("Empty batch at EOF, keeping previous result");
            return None;
        }

        // First strictly-greater wins: ties go to the earlier-seen bucket.
        let mut best: Option<(HourBucket, u64)> = None;
        for (bucket, count) in &histogram {
            if best.is_none_or(|(_, best_count)| *count > best_count) {
                best = Some((*bucket, *count));
            }
        }
        let (bucket, count) = best?;

        Some(PopularHourResult {
            hour: bucket.hour,
            period: bucket.period,
            count,
            percentage: format::percentage(count, total),
            timestamp: format::timestamp(now),
        })
    }
}
