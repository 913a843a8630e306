//! Event store access for the searchstats pipeline.
//!
//! The store is a shared key-value/hash service: the web tier records raw
//! telemetry into it, the collector scans that telemetry out, and the
//! aggregators persist their computed documents back under well-known keys
//! for the read API to serve verbatim.
//!
//! # Key Types
//!
//! - [`EventStore`] - the store seam (scan, hash, string and TTL ops)
//! - [`RedisEventStore`] - Redis-backed implementation
//! - [`MemoryEventStore`] - in-memory implementation for tests
//! - [`stats`] - the telemetry/record operations layered on the seam

pub mod error;
pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod stats;
pub mod traits;

// Re-exports
pub use error::{Error, Result};
pub use memory::MemoryEventStore;
pub use redis_store::RedisEventStore;
pub use traits::EventStore;
