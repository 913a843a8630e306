//! Partitioned in-memory SearchLog for testing cross-partition behavior.
//!
//! Simulates the broker's partitioning to test:
//! - Batches pinned to explicit partitions
//! - Partition-local offsets (not global)
//! - Independent consumer-group offset tracking

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use searchstats_core::WireRecord;
use tokio::sync::{Notify, RwLock};

use crate::error::{Error, Result};
use crate::traits::{Offset, PartitionConsumer, SearchLog, SeekPosition};

/// Shared state between the log and its consumers.
struct SharedState {
    /// One record vector per partition; a record's offset is its index.
    partitions: Vec<RwLock<Vec<WireRecord>>>,
    /// Committed next-to-read offset per `(group, partition)`.
    group_offsets: RwLock<HashMap<(String, u32), Offset>>,
    notify: Notify,
}

/// Partitioned in-memory implementation of [`SearchLog`].
pub struct PartitionedMemoryLog {
    shared: Arc<SharedState>,
}

impl PartitionedMemoryLog {
    /// Create a new in-memory log with the given partition count.
    #[must_use]
    pub fn new(partition_count: u32) -> Self {
        Self {
            shared: Arc::new(SharedState {
                partitions: (0..partition_count).map(|_| RwLock::new(Vec::new())).collect(),
                group_offsets: RwLock::new(HashMap::new()),
                notify: Notify::new(),
            }),
        }
    }

    fn partition_lock(&self, partition: u32) -> Result<&RwLock<Vec<WireRecord>>> {
        self.shared
            .partitions
            .get(partition as usize)
            .ok_or(Error::UnknownPartition(partition))
    }

    /// All records currently on a partition, in publish order.
    pub async fn records(&self, partition: u32) -> Vec<WireRecord> {
        match self.partition_lock(partition) {
            Ok(lock) => lock.read().await.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Total record count across all partitions.
    pub async fn total_count(&self) -> usize {
        let mut total = 0;
        for partition in &self.shared.partitions {
            total += partition.read().await.len();
        }
        total
    }

    /// The committed next-to-read offset for a group on a partition.
    pub async fn committed_offset(&self, group: &str, partition: u32) -> Option<Offset> {
        self.shared
            .group_offsets
            .read()
            .await
            .get(&(group.to_string(), partition))
            .copied()
    }
}

#[async_trait]
impl SearchLog for PartitionedMemoryLog {
    fn partition_count(&self) -> u32 {
        self.shared.partitions.len() as u32
    }

    async fn publish(&self, partition: u32, record: &WireRecord) -> Result<()> {
        self.partition_lock(partition)?.write().await.push(record.clone());
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn consumer(
        &self,
        group: &str,
        partition: u32,
        start: SeekPosition,
    ) -> Result<Box<dyn PartitionConsumer>> {
        let len = self.partition_lock(partition)?.read().await.len() as Offset;

        let stored = self
            .shared
            .group_offsets
            .read()
            .await
            .get(&(group.to_string(), partition))
            .copied();

        let position = stored.unwrap_or(match start {
            SeekPosition::Beginning => 0,
            SeekPosition::End => len,
            SeekPosition::Offset(offset) => offset,
        });

        Ok(Box::new(MemoryPartitionConsumer {
            group: group.to_string(),
            partition,
            shared: Arc::clone(&self.shared),
            position,
        }))
    }
}

/// In-memory consumer for one partition.
struct MemoryPartitionConsumer {
    group: String,
    partition: u32,
    shared: Arc<SharedState>,
    /// Next offset to read.
    position: Offset,
}

impl MemoryPartitionConsumer {
    async fn read_available(&mut self, max_count: usize) -> Vec<(Offset, WireRecord)> {
        let records = self.shared.partitions[self.partition as usize].read().await;
        let start = self.position as usize;
        let end = std::cmp::min(start + max_count, records.len());

        if start >= records.len() {
            return Vec::new();
        }

        let batch: Vec<(Offset, WireRecord)> = records[start..end]
            .iter()
            .enumerate()
            .map(|(i, record)| ((start + i) as Offset, record.clone()))
            .collect();

        self.position = end as Offset;
        batch
    }
}

#[async_trait]
impl PartitionConsumer for MemoryPartitionConsumer {
    async fn poll(&mut self, max_count: usize, timeout: Duration) -> Result<Vec<(Offset, WireRecord)>> {
        // Register interest before the first read so a publish landing
        // between read and wait still wakes us.
        let shared = self.shared.clone();
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let batch = self.read_available(max_count).await;
        if !batch.is_empty() {
            return Ok(batch);
        }

        let _ = tokio::time::timeout(timeout, notified).await;
        Ok(self.read_available(max_count).await)
    }

    async fn commit(&mut self) -> Result<()> {
        self.shared
            .group_offsets
            .write()
            .await
            .insert((self.group.clone(), self.partition), self.position);
        Ok(())
    }

    fn partition(&self) -> u32 {
        self.partition
    }

    fn group(&self) -> &str {
        &self.group
    }
}
