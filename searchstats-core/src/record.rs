//! Records multiplexed on the log topic.
//!
//! The topic carries two shapes distinguished by message key: batch markers
//! (`BOF`/`EOF`, value = category name) and data records (key = category,
//! value = JSON-encoded [`SearchEvent`]). Encoding and decoding happen once
//! at this boundary; everything downstream dispatches on the tagged
//! [`LogRecord`] variant instead of comparing key strings.

use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::event::SearchEvent;

/// Wire key marking the beginning of a category batch.
pub const BOF_KEY: &str = "BOF";
/// Wire key marking the end of a category batch.
pub const EOF_KEY: &str = "EOF";

/// Which end of a batch a marker frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerKind {
    Bof,
    Eof,
}

/// A control record framing one category's batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMarker {
    pub kind: MarkerKind,
    pub search_type: String,
}

/// A record as delivered on the topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogRecord {
    Marker(BatchMarker),
    Event(SearchEvent),
}

/// The key/value pair a record travels as. Transports move these opaquely;
/// [`LogRecord::from_wire`] is the single decode point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    pub key: String,
    pub value: String,
}

impl LogRecord {
    /// A beginning-of-batch marker for the given category.
    pub fn bof(search_type: impl Into<String>) -> Self {
        Self::Marker(BatchMarker {
            kind: MarkerKind::Bof,
            search_type: search_type.into(),
        })
    }

    /// An end-of-batch marker for the given category.
    pub fn eof(search_type: impl Into<String>) -> Self {
        Self::Marker(BatchMarker {
            kind: MarkerKind::Eof,
            search_type: search_type.into(),
        })
    }

    /// Encode into the key/value pair published on the topic.
    pub fn to_wire(&self) -> Result<WireRecord, RecordError> {
        match self {
            Self::Marker(marker) => Ok(WireRecord {
                key: match marker.kind {
                    MarkerKind::Bof => BOF_KEY.to_string(),
                    MarkerKind::Eof => EOF_KEY.to_string(),
                },
                // The category name travels as the raw value, not JSON.
                value: marker.search_type.clone(),
            }),
            Self::Event(event) => Ok(WireRecord {
                key: event.search_type.clone(),
                value: serde_json::to_string(event)?,
            }),
        }
    }

    /// Decode a delivered key/value pair.
    pub fn from_wire(key: &str, value: &str) -> Result<Self, RecordError> {
        match key {
            BOF_KEY => Ok(Self::bof(value)),
            EOF_KEY => Ok(Self::eof(value)),
            _ => {
                let mut event: SearchEvent = serde_json::from_str(value)?;
                // The wire key is the routing authority for the category.
                event.search_type = key.to_string();
                Ok(Self::Event(event))
            }
        }
    }
}
