//! Bounded-fanout partition consumer runtime.
//!
//! One task per partition, gated by a semaphore so at most `fanout`
//! partitions are mid-handler at once. Each task owns its partition's
//! consumer and handler state, so nothing is shared across partitions and
//! no locks guard the aggregation state. Offsets are committed on an
//! interval, not per message; a record's handler completes (including its
//! store writes) before the offset can advance past it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use searchstats_core::LogRecord;
use searchstats_log::{PartitionConsumer, SearchLog, SeekPosition};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

/// Result type for consumer runtime operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Errors that can occur in consumer operations.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("failed to create consumer: {0}")]
    Creation(String),

    #[error("consumer poll failed: {0}")]
    Poll(String),
}

/// Consecutive poll failures tolerated before the group gives up. The
/// transport already retries transient faults internally; hitting this
/// limit means the broker is gone and the worker should exit for its
/// orchestrator to restart.
const MAX_POLL_FAILURES: u32 = 5;

/// Per-partition record handler. One instance exists per partition and
/// owns that partition's aggregation state; failures are the handler's to
/// log, a single bad record must never stop the partition.
#[async_trait]
pub trait PartitionHandler: Send {
    async fn handle(&mut self, record: LogRecord);
}

/// Configuration for a consumer group's runtime.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Consumer group name (determines offset tracking).
    pub group: String,
    /// Where to start reading when the group has no stored offset.
    pub start: SeekPosition,
    /// Maximum records per poll.
    pub batch_size: usize,
    /// Poll timeout.
    pub poll_timeout: Duration,
    /// Time between offset commits.
    pub commit_interval: Duration,
    /// How many partitions run their handlers concurrently.
    pub fanout: usize,
}

impl ConsumerOptions {
    /// A replay consumer that processes the topic from the beginning, so a
    /// late-starting instance still sees the most recent complete batches.
    pub fn replay(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            start: SeekPosition::Beginning,
            batch_size: 100,
            poll_timeout: Duration::from_secs(1),
            commit_interval: Duration::from_secs(5),
            fanout: 2,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the poll timeout.
    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the commit interval.
    #[must_use]
    pub fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval;
        self
    }

    /// Set the partition fanout.
    #[must_use]
    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout;
        self
    }
}

/// Consume every partition of the topic until shutdown.
///
/// `make_handler` is called once per partition; the handler it returns is
/// owned by that partition's task for its whole life.
pub async fn run_partition_consumers<H, F>(
    log: &dyn SearchLog,
    options: ConsumerOptions,
    mut make_handler: F,
    shutdown: CancellationToken,
) -> Result<()>
where
    H: PartitionHandler + 'static,
    F: FnMut(u32) -> H,
{
    let permits = Arc::new(Semaphore::new(options.fanout.max(1)));
    // One partition giving up takes the whole group down with it, so the
    // worker exits instead of limping along with a silent partition.
    let stop = shutdown.child_token();
    let mut handles = Vec::new();

    for partition in 0..log.partition_count() {
        let consumer = log
            .consumer(&options.group, partition, options.start)
            .await
            .map_err(|e| ConsumerError::Creation(e.to_string()))?;
        let handler = make_handler(partition);

        handles.push(tokio::spawn(partition_loop(
            consumer,
            handler,
            options.clone(),
            Arc::clone(&permits),
            stop.clone(),
        )));
    }

    info!(group = %options.group, partitions = handles.len(), "Consumer group running");

    let mut failure = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failure.get_or_insert(e);
            }
            Err(e) => warn!(error = %e, "Partition task panicked"),
        }
    }

    info!(group = %options.group, "Consumer group stopped");
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn partition_loop<H: PartitionHandler>(
    mut consumer: Box<dyn PartitionConsumer>,
    mut handler: H,
    options: ConsumerOptions,
    permits: Arc<Semaphore>,
    stop: CancellationToken,
) -> Result<()> {
    let partition = consumer.partition();
    let group = consumer.group().to_string();
    info!(group = %group, partition, "Partition consumer started");

    let mut last_commit = Instant::now();
    let mut dirty = false;
    let mut poll_failures = 0u32;

    loop {
        let permit = tokio::select! {
            _ = stop.cancelled() => break,
            permit = permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let polled = tokio::select! {
            _ = stop.cancelled() => {
                drop(permit);
                break;
            }
            polled = consumer.poll(options.batch_size, options.poll_timeout) => polled,
        };

        match polled {
            Ok(batch) => {
                poll_failures = 0;
                if batch.is_empty() {
                    trace!(group = %group, partition, "Empty poll");
                } else {
                    dirty = true;
                }

                for (offset, wire) in batch {
                    match LogRecord::from_wire(&wire.key, &wire.value) {
                        Ok(record) => handler.handle(record).await,
                        Err(e) => warn!(
                            group = %group,
                            partition,
                            offset,
                            error = %e,
                            "Dropping malformed record"
                        ),
                    }
                }
                drop(permit);
            }
            Err(e) => {
                drop(permit);
                poll_failures += 1;
                if poll_failures >= MAX_POLL_FAILURES {
                    error!(group = %group, partition, error = %e, "Poll failed repeatedly, giving up");
                    stop.cancel();
                    return Err(ConsumerError::Poll(e.to_string()));
                }
                error!(group = %group, partition, error = %e, "Poll failed");
                // Back off before retrying the partition.
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                continue;
            }
        }

        if dirty && last_commit.elapsed() >= options.commit_interval {
            match consumer.commit().await {
                Ok(()) => {
                    dirty = false;
                    last_commit = Instant::now();
                }
                Err(e) => {
                    error!(group = %group, partition, error = %e, "Failed to commit offset");
                }
            }
        }
    }

    if dirty && let Err(e) = consumer.commit().await {
        error!(group = %group, partition, error = %e, "Failed to commit offset at shutdown");
    }

    info!(group = %group, partition, "Partition consumer stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use searchstats_core::{LogRecord, SearchEvent};
    use searchstats_log::PartitionedMemoryLog;

    use super::*;

    /// Collects `(partition, record)` pairs for assertions.
    struct Recording {
        partition: u32,
        seen: Arc<Mutex<Vec<(u32, LogRecord)>>>,
    }

    #[async_trait]
    impl PartitionHandler for Recording {
        async fn handle(&mut self, record: LogRecord) {
            self.seen.lock().unwrap().push((self.partition, record));
        }
    }

    fn event(query: &str, search_type: &str) -> LogRecord {
        LogRecord::Event(SearchEvent {
            query: query.to_string(),
            search_type: search_type.to_string(),
            response_time: 100,
            timestamp: 1_700_000_000_000,
        })
    }

    async fn publish(log: &PartitionedMemoryLog, partition: u32, record: &LogRecord) {
        log.publish(partition, &record.to_wire().unwrap())
            .await
            .unwrap();
    }

    fn test_options(group: &str) -> ConsumerOptions {
        ConsumerOptions::replay(group)
            .with_poll_timeout(Duration::from_millis(20))
            .with_commit_interval(Duration::from_millis(50))
    }

    async fn wait_until(check: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !check() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn delivers_partition_records_in_order() {
        let log = Arc::new(PartitionedMemoryLog::new(2));
        publish(&log, 0, &LogRecord::bof("people")).await;
        publish(&log, 0, &event("luke", "people")).await;
        publish(&log, 0, &LogRecord::eof("people")).await;
        publish(&log, 1, &LogRecord::bof("movies")).await;
        publish(&log, 1, &LogRecord::eof("movies")).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let runtime = {
            let log = Arc::clone(&log);
            let seen = Arc::clone(&seen);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_partition_consumers(
                    log.as_ref(),
                    test_options("order-group"),
                    |partition| Recording {
                        partition,
                        seen: Arc::clone(&seen),
                    },
                    shutdown,
                )
                .await
            })
        };

        {
            let seen = Arc::clone(&seen);
            wait_until(move || seen.lock().unwrap().len() == 5).await;
        }
        shutdown.cancel();
        runtime.await.unwrap().unwrap();

        let recorded = seen.lock().unwrap();
        let partition0: Vec<&LogRecord> = recorded
            .iter()
            .filter(|(p, _)| *p == 0)
            .map(|(_, r)| r)
            .collect();
        assert_eq!(partition0.len(), 3);
        assert_eq!(*partition0[0], LogRecord::bof("people"));
        assert_eq!(*partition0[2], LogRecord::eof("people"));
    }

    #[tokio::test]
    async fn malformed_records_are_dropped_not_fatal() {
        let log = Arc::new(PartitionedMemoryLog::new(1));
        publish(&log, 0, &LogRecord::bof("people")).await;
        log.publish(
            0,
            &searchstats_core::WireRecord {
                key: "people".to_string(),
                value: "not json".to_string(),
            },
        )
        .await
        .unwrap();
        publish(&log, 0, &event("luke", "people")).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let runtime = {
            let log = Arc::clone(&log);
            let seen = Arc::clone(&seen);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_partition_consumers(
                    log.as_ref(),
                    test_options("drop-group"),
                    |partition| Recording {
                        partition,
                        seen: Arc::clone(&seen),
                    },
                    shutdown,
                )
                .await
            })
        };

        {
            let seen = Arc::clone(&seen);
            wait_until(move || seen.lock().unwrap().len() == 2).await;
        }
        shutdown.cancel();
        runtime.await.unwrap().unwrap();

        let recorded = seen.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].1, LogRecord::bof("people"));
        assert!(matches!(recorded[1].1, LogRecord::Event(_)));
    }

    #[tokio::test]
    async fn offsets_commit_on_interval() {
        let log = Arc::new(PartitionedMemoryLog::new(1));
        publish(&log, 0, &LogRecord::bof("people")).await;
        publish(&log, 0, &LogRecord::eof("people")).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let runtime = {
            let log = Arc::clone(&log);
            let seen = Arc::clone(&seen);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_partition_consumers(
                    log.as_ref(),
                    test_options("commit-group").with_commit_interval(Duration::from_millis(20)),
                    |partition| Recording {
                        partition,
                        seen: Arc::clone(&seen),
                    },
                    shutdown,
                )
                .await
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while log.committed_offset("commit-group", 0).await.is_none() {
            assert!(Instant::now() < deadline, "offset was never committed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown.cancel();
        runtime.await.unwrap().unwrap();

        assert_eq!(log.committed_offset("commit-group", 0).await, Some(2));
    }

    /// A log whose consumers never stop failing.
    struct FailingLog;

    struct FailingConsumer {
        partition: u32,
    }

    #[async_trait]
    impl searchstats_log::SearchLog for FailingLog {
        fn partition_count(&self) -> u32 {
            1
        }

        async fn publish(
            &self,
            _partition: u32,
            _record: &searchstats_core::WireRecord,
        ) -> searchstats_log::Result<()> {
            Ok(())
        }

        async fn consumer(
            &self,
            _group: &str,
            partition: u32,
            _start: SeekPosition,
        ) -> searchstats_log::Result<Box<dyn PartitionConsumer>> {
            Ok(Box::new(FailingConsumer { partition }))
        }
    }

    #[async_trait]
    impl PartitionConsumer for FailingConsumer {
        async fn poll(
            &mut self,
            _max_count: usize,
            _timeout: Duration,
        ) -> searchstats_log::Result<Vec<(searchstats_log::Offset, searchstats_core::WireRecord)>>
        {
            Err(searchstats_log::Error::Connection("broker gone".to_string()))
        }

        async fn commit(&mut self) -> searchstats_log::Result<()> {
            Ok(())
        }

        fn partition(&self) -> u32 {
            self.partition
        }

        fn group(&self) -> &str {
            "failing-group"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_poll_failures_stop_the_group() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let result = run_partition_consumers(
            &FailingLog,
            test_options("failing-group"),
            |partition| Recording {
                partition,
                seen: Arc::clone(&seen),
            },
            shutdown,
        )
        .await;

        assert!(matches!(result, Err(ConsumerError::Poll(_))));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fanout_of_one_still_drains_all_partitions() {
        let log = Arc::new(PartitionedMemoryLog::new(3));
        for partition in 0..3 {
            publish(&log, partition, &LogRecord::bof("people")).await;
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let runtime = {
            let log = Arc::clone(&log);
            let seen = Arc::clone(&seen);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_partition_consumers(
                    log.as_ref(),
                    test_options("narrow-group").with_fanout(1),
                    |partition| Recording {
                        partition,
                        seen: Arc::clone(&seen),
                    },
                    shutdown,
                )
                .await
            })
        };

        {
            let seen = Arc::clone(&seen);
            wait_until(move || seen.lock().unwrap().len() == 3).await;
        }
        shutdown.cancel();
        runtime.await.unwrap().unwrap();
    }
}
