//! Core traits for the partitioned search log.

use std::time::Duration;

use async_trait::async_trait;
use searchstats_core::WireRecord;

use crate::error::Result;

/// Partition-local offset into the topic.
pub type Offset = u64;

/// Position to start a consumer from when its group has no stored offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPosition {
    /// Start from the earliest retained record.
    Beginning,
    /// Start from the end (new records only).
    End,
    /// Start from a specific offset.
    Offset(Offset),
}

/// The producer/consumer seam over the partitioned topic.
///
/// Within one partition, delivery order is exactly publish order; no
/// ordering exists across partitions. Consumer groups track their offsets
/// independently and never observe each other's progress.
#[async_trait]
pub trait SearchLog: Send + Sync {
    /// Number of partitions on the topic.
    fn partition_count(&self) -> u32;

    /// Append a record to the given partition.
    async fn publish(&self, partition: u32, record: &WireRecord) -> Result<()>;

    /// Create a consumer for one partition under the given group. A stored
    /// group offset takes precedence over `start`.
    async fn consumer(
        &self,
        group: &str,
        partition: u32,
        start: SeekPosition,
    ) -> Result<Box<dyn PartitionConsumer>>;
}

/// Polls one partition with offset tracking.
#[async_trait]
pub trait PartitionConsumer: Send + Sync {
    /// Poll for new records, waiting up to `timeout` when none are ready.
    /// Records are `(offset, record)` pairs in partition order.
    async fn poll(&mut self, max_count: usize, timeout: Duration) -> Result<Vec<(Offset, WireRecord)>>;

    /// Store the current position for this consumer's group.
    async fn commit(&mut self) -> Result<()>;

    /// The partition this consumer reads.
    fn partition(&self) -> u32;

    /// The consumer group this consumer belongs to.
    fn group(&self) -> &str;
}
