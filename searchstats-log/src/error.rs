//! Error types for log transport operations.

/// Error type for log operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport could not be reached or the connection dropped.
    #[error("log connection failed: {0}")]
    Connection(String),

    /// An error reported by the Iggy server or SDK.
    #[error("iggy error: {0}")]
    Iggy(String),

    /// A partition index outside the configured topic layout.
    #[error("unknown partition {0}")]
    UnknownPartition(u32),

    /// A payload could not be serialized for the wire.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<iggy::prelude::IggyError> for Error {
    fn from(err: iggy::prelude::IggyError) -> Self {
        Self::Iggy(err.to_string())
    }
}

/// Result type alias for log operations.
pub type Result<T> = std::result::Result<T, Error>;
