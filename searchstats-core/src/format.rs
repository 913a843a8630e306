//! Rendering helpers shared by the persisted result documents.

use chrono::{DateTime, SecondsFormat, Utc};

/// Render a share of a total as a two-decimal percentage string,
/// e.g. `"66.67%"`.
pub fn percentage(count: u64, total: u64) -> String {
    format!("{:.2}%", count as f64 * 100.0 / total as f64)
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Render a result timestamp: RFC 3339, UTC, millisecond precision.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}
