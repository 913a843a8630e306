//! The event store seam.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Key-value/hash store shared with the web tier and the read API.
///
/// The pipeline needs no locking here: the collector only reads raw keys,
/// and each aggregator is the sole writer of its result keys.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Keys matching a glob-style pattern (`*` wildcards).
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// All fields of a hash. Empty map when the key is absent.
    async fn read_hash(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Set hash fields, merging into an existing hash. An optional TTL
    /// applies to the whole key.
    async fn write_hash(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Read a string value.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value, replacing any previous one.
    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Add `delta` to an integer hash field, creating it at zero when
    /// absent. Returns the new value.
    async fn increment_hash_field(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    /// Remove a key of any shape.
    async fn delete_key(&self, key: &str) -> Result<()>;
}
