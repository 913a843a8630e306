//! Error types for record decoding.

/// Error raised when a raw telemetry record or wire payload cannot be
/// interpreted. Callers drop the offending record and continue; this is
/// never fatal to a cycle or a batch.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// A required hash field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A numeric field holds a non-numeric string.
    #[error("field `{field}` is not numeric: {value:?}")]
    NonNumeric {
        field: &'static str,
        value: String,
    },

    /// The wire value of a data record is not a valid event payload.
    #[error("malformed event payload: {0}")]
    Payload(#[from] serde_json::Error),
}
