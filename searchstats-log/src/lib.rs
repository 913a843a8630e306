//! Partitioned log transport for the searchstats pipeline.
//!
//! The topic is an ordered, partitioned, append-only log with at-least-once
//! per-partition delivery and independent consumer-group offsets. This
//! crate provides the seam as traits plus two implementations: an
//! Iggy-backed one for production and a partitioned in-memory one for
//! tests.
//!
//! # Key Types
//!
//! - [`SearchLog`] - publish records and create per-partition consumers
//! - [`PartitionConsumer`] - poll one partition with offset tracking
//! - [`IggySearchLog`] - Iggy-backed implementation
//! - [`PartitionedMemoryLog`] - in-memory implementation for tests

pub mod config;
pub mod error;
pub mod iggy_log;
pub mod memory;
pub mod traits;

// Re-exports
pub use config::LogConfig;
pub use error::{Error, Result};
pub use iggy_log::IggySearchLog;
pub use memory::PartitionedMemoryLog;
pub use traits::{Offset, PartitionConsumer, SearchLog, SeekPosition};
