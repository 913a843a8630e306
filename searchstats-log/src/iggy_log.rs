//! Iggy-backed SearchLog implementation.
//!
//! Records are carried as JSON payloads on a single topic; the wire
//! key/value pair travels inside the payload and is decoded downstream at
//! the record boundary. Batch framing relies on explicit partition routing,
//! so publishing targets a partition index rather than a key hash.

use async_trait::async_trait;
use iggy::prelude::*;
use searchstats_core::WireRecord;
use tracing::{debug, info, warn};

use crate::config::LogConfig;
use crate::error::{Error, Result};
use crate::traits::{Offset, PartitionConsumer, SearchLog, SeekPosition};

/// Check if an Iggy error indicates a resource already exists.
fn is_already_exists_error(e: &IggyError) -> bool {
    let err_str = e.to_string();
    err_str.contains("already exists")
        || err_str.contains("already_exists")
        || err_str.contains("AlreadyExists")
}

/// Stream and topic configuration for the search log.
pub mod topics {
    /// The stream name for searchstats.
    pub const STREAM_NAME: &str = "searchstats";
    /// The topic carrying framed search batches.
    pub const TOPIC_NAME: &str = "computable-searches";
}

fn stream_id() -> Result<Identifier> {
    Identifier::named(topics::STREAM_NAME).map_err(|e| Error::Iggy(format!("invalid stream name: {e}")))
}

fn topic_id() -> Result<Identifier> {
    Identifier::named(topics::TOPIC_NAME).map_err(|e| Error::Iggy(format!("invalid topic name: {e}")))
}

/// Iggy-backed implementation of [`SearchLog`].
///
/// The connection is scoped: `connect` establishes it and ensures the
/// stream/topic exist, `disconnect` releases it. The collector opens and
/// closes one per collection cycle; consumers hold one for their lifetime.
pub struct IggySearchLog {
    config: LogConfig,
    client: IggyClient,
}

impl IggySearchLog {
    /// Create a new client for the configured broker. Call [`connect`]
    /// before publishing or consuming.
    ///
    /// [`connect`]: IggySearchLog::connect
    pub fn new(config: LogConfig) -> Result<Self> {
        let client = IggyClient::builder()
            .with_tcp()
            .with_server_address(config.addr.clone())
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Connect, authenticate, and create the stream/topic if absent.
    pub async fn connect(&self) -> Result<()> {
        self.client.connect().await?;
        debug!(addr = %self.config.addr, "Connected to log broker");

        self.client
            .login_user(DEFAULT_ROOT_USERNAME, DEFAULT_ROOT_PASSWORD)
            .await?;

        let streams = self.client.get_streams().await?;
        if streams.iter().any(|s| s.name == topics::STREAM_NAME) {
            debug!("Stream '{}' already exists", topics::STREAM_NAME);
        } else {
            match self.client.create_stream(topics::STREAM_NAME).await {
                Ok(_) => info!("Created stream '{}'", topics::STREAM_NAME),
                Err(e) if is_already_exists_error(&e) => {
                    debug!("Stream already exists (concurrent creation)");
                }
                Err(e) => return Err(e.into()),
            }
        }

        match self
            .client
            .create_topic(
                &stream_id()?,
                topics::TOPIC_NAME,
                self.config.partitions,
                CompressionAlgorithm::None,
                None, // replication_factor
                IggyExpiry::NeverExpire,
                MaxTopicSize::ServerDefault,
            )
            .await
        {
            Ok(_) => info!(
                "Created topic '{}' with {} partitions",
                topics::TOPIC_NAME,
                self.config.partitions
            ),
            Err(e) if is_already_exists_error(&e) => {
                debug!("Topic already exists");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    /// Release the broker connection.
    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        debug!(addr = %self.config.addr, "Disconnected from log broker");
        Ok(())
    }
}

#[async_trait]
impl SearchLog for IggySearchLog {
    fn partition_count(&self) -> u32 {
        self.config.partitions
    }

    async fn publish(&self, partition: u32, record: &WireRecord) -> Result<()> {
        if partition >= self.config.partitions {
            return Err(Error::UnknownPartition(partition));
        }

        let payload = serde_json::to_vec(record)?;
        let message = IggyMessage::builder()
            .payload(payload.into())
            .build()
            .map_err(|e| Error::Iggy(e.to_string()))?;

        // Iggy partition ids are 1-based.
        let partitioning = Partitioning::partition_id(partition + 1);

        let mut messages = [message];
        self.client
            .send_messages(&stream_id()?, &topic_id()?, &partitioning, &mut messages)
            .await?;

        Ok(())
    }

    async fn consumer(
        &self,
        group: &str,
        partition: u32,
        start: SeekPosition,
    ) -> Result<Box<dyn PartitionConsumer>> {
        if partition >= self.config.partitions {
            return Err(Error::UnknownPartition(partition));
        }

        // Each consumer needs its own connection.
        let client = IggyClient::builder()
            .with_tcp()
            .with_server_address(self.config.addr.clone())
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;

        client.connect().await?;
        client
            .login_user(DEFAULT_ROOT_USERNAME, DEFAULT_ROOT_PASSWORD)
            .await?;

        let consumer = IggyPartitionConsumer::new(client, group.to_string(), partition);
        let offset = consumer.stored_offset().await.unwrap_or_else(|| match start {
            SeekPosition::Beginning => 0,
            // Poll returns empty from here until new records arrive.
            SeekPosition::End => u64::MAX,
            SeekPosition::Offset(offset) => offset,
        });

        Ok(Box::new(consumer.starting_at(offset)))
    }
}

/// Iggy-backed consumer for one partition.
struct IggyPartitionConsumer {
    client: IggyClient,
    group: String,
    partition: u32,
    /// Next offset to read; committed verbatim.
    offset: Offset,
}

impl IggyPartitionConsumer {
    fn new(client: IggyClient, group: String, partition: u32) -> Self {
        Self {
            client,
            group,
            partition,
            offset: 0,
        }
    }

    fn starting_at(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }

    fn identity(&self) -> Result<Consumer> {
        Ok(Consumer::new(
            Identifier::named(&self.group).map_err(|e| Error::Iggy(e.to_string()))?,
        ))
    }

    /// The partition id on the wire (1-based).
    fn wire_partition(&self) -> u32 {
        self.partition + 1
    }

    /// The group's stored offset on this partition, if any.
    async fn stored_offset(&self) -> Option<Offset> {
        let consumer = self.identity().ok()?;
        match self
            .client
            .get_consumer_offset(
                &consumer,
                &stream_id().ok()?,
                &topic_id().ok()?,
                Some(self.wire_partition()),
            )
            .await
        {
            Ok(Some(info)) => Some(info.stored_offset),
            Ok(None) => None,
            Err(e) => {
                debug!(group = %self.group, partition = self.partition, error = %e,
                    "No stored offset available");
                None
            }
        }
    }
}

#[async_trait]
impl PartitionConsumer for IggyPartitionConsumer {
    async fn poll(
        &mut self,
        max_count: usize,
        _timeout: std::time::Duration,
    ) -> Result<Vec<(Offset, WireRecord)>> {
        let strategy = PollingStrategy::offset(self.offset);

        let polled = match self
            .client
            .poll_messages(
                &stream_id()?,
                &topic_id()?,
                Some(self.wire_partition()),
                &self.identity()?,
                &strategy,
                max_count as u32,
                false, // manual commit
            )
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                // The stored position may point at purged records.
                let err_str = e.to_string().to_lowercase();
                if err_str.contains("offset") || err_str.contains("not found") || err_str.contains("invalid")
                {
                    warn!(
                        partition = self.partition,
                        offset = self.offset,
                        error = %e,
                        "Invalid offset, resetting to beginning of partition"
                    );
                    self.offset = 0;
                    return Ok(Vec::new());
                }
                return Err(e.into());
            }
        };

        let mut records = Vec::with_capacity(polled.messages.len());
        for msg in polled.messages {
            let delivered_at = msg.header.offset;
            self.offset = delivered_at + 1;
            match serde_json::from_slice::<WireRecord>(&msg.payload) {
                Ok(record) => records.push((delivered_at, record)),
                Err(e) => warn!(
                    partition = self.partition,
                    offset = delivered_at,
                    error = %e,
                    "Dropping undecodable payload"
                ),
            }
        }

        Ok(records)
    }

    async fn commit(&mut self) -> Result<()> {
        self.client
            .store_consumer_offset(
                &self.identity()?,
                &stream_id()?,
                &topic_id()?,
                Some(self.wire_partition()),
                self.offset,
            )
            .await?;

        debug!(group = %self.group, partition = self.partition, offset = self.offset,
            "Committed offset");
        Ok(())
    }

    fn partition(&self) -> u32 {
        self.partition
    }

    fn group(&self) -> &str {
        &self.group
    }
}
