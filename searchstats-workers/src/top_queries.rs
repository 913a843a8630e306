//! The top-queries aggregator daemon.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use searchstats_core::{LogRecord, TopQueriesState};
use searchstats_log::IggySearchLog;
use searchstats_store::{EventStore, RedisEventStore, stats};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::consumer::{ConsumerOptions, PartitionHandler, run_partition_consumers};

/// Per-partition handler folding records into [`TopQueriesState`] and
/// persisting each category's document when its batch closes.
pub struct TopQueriesHandler {
    partition: u32,
    state: TopQueriesState,
    store: Arc<dyn EventStore>,
}

impl TopQueriesHandler {
    pub fn new(partition: u32, store: Arc<dyn EventStore>) -> Self {
        Self {
            partition,
            state: TopQueriesState::new(),
            store,
        }
    }
}

#[async_trait]
impl PartitionHandler for TopQueriesHandler {
    async fn handle(&mut self, record: LogRecord) {
        let Some((search_type, result)) = self.state.apply(&record, Utc::now()) else {
            return;
        };

        match stats::write_top_queries(self.store.as_ref(), &search_type, &result).await {
            Ok(()) => info!(
                partition = self.partition,
                search_type = %search_type,
                total_queries = result.total_queries,
                "Persisted top queries"
            ),
            Err(e) => error!(
                partition = self.partition,
                search_type = %search_type,
                error = %e,
                "Failed to persist top queries"
            ),
        }
    }
}

/// Run the top-queries aggregator daemon until shutdown.
pub async fn run(config: WorkerConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let store: Arc<dyn EventStore> =
        Arc::new(RedisEventStore::connect(&config.store_url).await?);

    let log = IggySearchLog::new(config.log.clone())?;
    log.connect().await?;
    info!(group = %config.top_queries_group, "Top-queries aggregator started");

    let options = ConsumerOptions::replay(&config.top_queries_group)
        .with_batch_size(config.batch_size)
        .with_poll_timeout(config.poll_timeout)
        .with_commit_interval(config.commit_interval)
        .with_fanout(config.fanout);

    let result = run_partition_consumers(
        &log,
        options,
        |partition| TopQueriesHandler::new(partition, Arc::clone(&store)),
        shutdown,
    )
    .await;

    if let Err(e) = log.disconnect().await {
        warn!(error = %e, "Failed to disconnect from log broker");
    }
    result?;

    info!("Top-queries aggregator stopped");
    Ok(())
}
