//! Error types for event store operations.

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store could not be reached.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// An error reported by the Redis server or client.
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    /// An operation hit a key holding a different shape of value.
    #[error("value at `{key}` is not a {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
    },

    /// A persisted stats document failed to decode.
    #[error("malformed stats document: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
