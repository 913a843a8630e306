//! The popular-hour aggregator daemon.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use searchstats_core::{LogRecord, PopularHourState};
use searchstats_log::IggySearchLog;
use searchstats_store::{EventStore, RedisEventStore, stats};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::consumer::{ConsumerOptions, PartitionHandler, run_partition_consumers};

/// Per-partition handler folding records into [`PopularHourState`] and
/// overwriting the single popular-hour document on every batch close.
pub struct PopularHourHandler {
    partition: u32,
    state: PopularHourState,
    store: Arc<dyn EventStore>,
}

impl PopularHourHandler {
    pub fn new(partition: u32, store: Arc<dyn EventStore>) -> Self {
        Self {
            partition,
            state: PopularHourState::new(),
            store,
        }
    }
}

#[async_trait]
impl PartitionHandler for PopularHourHandler {
    async fn handle(&mut self, record: LogRecord) {
        let Some(result) = self.state.apply(&record, Utc::now()) else {
            return;
        };

        match stats::write_popular_hour(self.store.as_ref(), &result).await {
            Ok(()) => info!(
                partition = self.partition,
                hour = result.hour,
                period = %result.period,
                count = result.count,
                "Persisted popular hour"
            ),
            Err(e) => error!(
                partition = self.partition,
                error = %e,
                "Failed to persist popular hour"
            ),
        }
    }
}

/// Run the popular-hour aggregator daemon until shutdown.
pub async fn run(config: WorkerConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let store: Arc<dyn EventStore> =
        Arc::new(RedisEventStore::connect(&config.store_url).await?);

    let log = IggySearchLog::new(config.log.clone())?;
    log.connect().await?;
    info!(group = %config.popular_hour_group, "Popular-hour aggregator started");

    let options = ConsumerOptions::replay(&config.popular_hour_group)
        .with_batch_size(config.batch_size)
        .with_poll_timeout(config.poll_timeout)
        .with_commit_interval(config.commit_interval)
        .with_fanout(config.fanout);

    let result = run_partition_consumers(
        &log,
        options,
        |partition| PopularHourHandler::new(partition, Arc::clone(&store)),
        shutdown,
    )
    .await;

    if let Err(e) = log.disconnect().await {
        warn!(error = %e, "Failed to disconnect from log broker");
    }
    result?;

    info!("Popular-hour aggregator stopped");
    Ok(())
}
