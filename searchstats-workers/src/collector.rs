//! The stats collector: harvests raw telemetry from the store and
//! publishes it as sentinel-framed batches on the log.

use indexmap::IndexMap;
use searchstats_core::{LogRecord, RecordError, SearchEvent};
use searchstats_log::{IggySearchLog, LogConfig, SearchLog};
use searchstats_store::keys::SEARCH_KEY_PATTERN;
use searchstats_store::{EventStore, RedisEventStore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;

/// Errors that abort a collection cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Store(#[from] searchstats_store::Error),

    #[error(transparent)]
    Log(#[from] searchstats_log::Error),

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// What one collection cycle did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Raw keys matched by the scan.
    pub scanned: usize,
    /// Events published inside framed batches.
    pub published: usize,
    /// Malformed records dropped.
    pub dropped: usize,
    /// Categories whose batch was fully published.
    pub categories: usize,
    /// Categories whose batch failed to publish.
    pub failed_categories: usize,
}

/// Run the collector daemon until shutdown.
pub async fn run(config: WorkerConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let store = RedisEventStore::connect(&config.store_url).await?;
    info!(interval = ?config.collect_interval, "Stats collector started");

    // The first tick completes immediately: one collection at startup,
    // then one per interval.
    let mut interval = tokio::time::interval(config.collect_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                match collect_once(&store, &config.log).await {
                    Ok(report) => info!(
                        scanned = report.scanned,
                        published = report.published,
                        dropped = report.dropped,
                        categories = report.categories,
                        failed_categories = report.failed_categories,
                        "Collection cycle complete"
                    ),
                    Err(e) => error!(error = %e, "Collection cycle failed"),
                }
            }
        }
    }

    info!("Stats collector stopped");
    Ok(())
}

/// One collection cycle against a freshly connected log client. The
/// connection is released on completion and on failure alike, so repeated
/// cycles never leak connections.
pub async fn collect_once(
    store: &dyn EventStore,
    log_config: &LogConfig,
) -> Result<CycleReport, CycleError> {
    let log = IggySearchLog::new(log_config.clone())?;

    let result = match log.connect().await {
        Ok(()) => run_cycle(store, &log).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = log.disconnect().await {
        warn!(error = %e, "Failed to disconnect from log broker");
    }
    result
}

/// Scan, group, and publish one cycle's worth of telemetry.
///
/// Each distinct category gets a partition pinned for the whole cycle by
/// first-seen order, so its BOF/EOF framing is observable on a single
/// partition. A malformed record or a failed category batch never aborts
/// the rest of the cycle. Source records are left in place; their expiry
/// is the store's concern.
pub async fn run_cycle(
    store: &dyn EventStore,
    log: &dyn SearchLog,
) -> Result<CycleReport, CycleError> {
    let keys = store.scan_keys(SEARCH_KEY_PATTERN).await?;
    if keys.is_empty() {
        info!("No search telemetry found");
        return Ok(CycleReport::default());
    }

    let mut report = CycleReport {
        scanned: keys.len(),
        ..CycleReport::default()
    };

    let mut groups: IndexMap<String, Vec<SearchEvent>> = IndexMap::new();
    for key in &keys {
        let fields = store.read_hash(key).await?;
        match SearchEvent::from_hash_fields(&fields) {
            Ok(event) => groups
                .entry(event.search_type.clone())
                .or_default()
                .push(event),
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping malformed telemetry record");
                report.dropped += 1;
            }
        }
    }

    for (index, (search_type, events)) in groups.iter().enumerate() {
        let partition = index as u32 % log.partition_count();
        match publish_batch(log, partition, search_type, events).await {
            Ok(()) => {
                info!(
                    search_type = %search_type,
                    partition,
                    events = events.len(),
                    "Published batch"
                );
                report.categories += 1;
                report.published += events.len();
            }
            Err(e) => {
                warn!(
                    search_type = %search_type,
                    partition,
                    error = %e,
                    "Failed to publish batch, continuing with remaining categories"
                );
                report.failed_categories += 1;
            }
        }
    }

    Ok(report)
}

/// Publish one category's batch to its partition: BOF, every event, EOF.
async fn publish_batch(
    log: &dyn SearchLog,
    partition: u32,
    search_type: &str,
    events: &[SearchEvent],
) -> Result<(), CycleError> {
    publish(log, partition, &LogRecord::bof(search_type)).await?;
    for event in events {
        publish(log, partition, &LogRecord::Event(event.clone())).await?;
    }
    publish(log, partition, &LogRecord::eof(search_type)).await?;
    Ok(())
}

async fn publish(
    log: &dyn SearchLog,
    partition: u32,
    record: &LogRecord,
) -> Result<(), CycleError> {
    let wire = record.to_wire()?;
    log.publish(partition, &wire).await?;
    Ok(())
}
