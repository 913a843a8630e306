//! Environment-driven worker configuration.
//!
//! Every knob has a localhost default so the pipeline runs out of the box
//! against a local broker and store.

use std::time::Duration;

use searchstats_log::LogConfig;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Configuration shared by the three workers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Log broker connection and topic layout.
    pub log: LogConfig,
    /// Event store URL.
    pub store_url: String,
    /// Time between collection cycles.
    pub collect_interval: Duration,
    /// Time between consumer offset commits.
    pub commit_interval: Duration,
    /// How long a consumer poll waits for records.
    pub poll_timeout: Duration,
    /// Maximum records per poll.
    pub batch_size: usize,
    /// How many partitions a consumer processes concurrently.
    pub fanout: usize,
    /// Consumer group of the top-queries aggregator.
    pub top_queries_group: String,
    /// Consumer group of the popular-hour aggregator.
    pub popular_hour_group: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            store_url: "redis://127.0.0.1:6379".to_string(),
            collect_interval: Duration::from_secs(5 * 60),
            commit_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(1),
            batch_size: 100,
            fanout: 2,
            top_queries_group: "search-stats-top-queries-group".to_string(),
            popular_hour_group: "search-stats-popular-hour-group".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from the process environment, falling back to
    /// the defaults above for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = get(&lookup, "SEARCHSTATS_LOG_ADDR") {
            config.log = config.log.with_addr(addr);
        }
        if let Some(partitions) = parse(&lookup, "SEARCHSTATS_PARTITIONS")? {
            config.log = config.log.with_partitions(partitions);
        }
        if let Some(url) = get(&lookup, "SEARCHSTATS_STORE_URL") {
            config.store_url = url;
        }
        if let Some(interval) = duration(&lookup, "SEARCHSTATS_COLLECT_INTERVAL")? {
            config.collect_interval = interval;
        }
        if let Some(interval) = duration(&lookup, "SEARCHSTATS_COMMIT_INTERVAL")? {
            config.commit_interval = interval;
        }
        if let Some(timeout) = duration(&lookup, "SEARCHSTATS_POLL_TIMEOUT")? {
            config.poll_timeout = timeout;
        }
        if let Some(batch_size) = parse(&lookup, "SEARCHSTATS_BATCH_SIZE")? {
            config.batch_size = batch_size;
        }
        if let Some(fanout) = parse(&lookup, "SEARCHSTATS_FANOUT")? {
            config.fanout = fanout;
        }
        if let Some(group) = get(&lookup, "SEARCHSTATS_TOP_QUERIES_GROUP") {
            config.top_queries_group = group;
        }
        if let Some(group) = get(&lookup, "SEARCHSTATS_POPULAR_HOUR_GROUP") {
            config.popular_hour_group = group;
        }

        Ok(config)
    }
}

fn get(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Option<String> {
    lookup(var).filter(|value| !value.is_empty())
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(lookup, var)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value })
        })
        .transpose()
}

fn duration(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    get(lookup, var)
        .map(|value| {
            humantime::parse_duration(&value).map_err(|_| ConfigError::Invalid { var, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(entries: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_localhost() {
        let config = WorkerConfig::default();

        assert_eq!(config.log.addr, "127.0.0.1:8090");
        assert_eq!(config.log.partitions, 4);
        assert_eq!(config.store_url, "redis://127.0.0.1:6379");
        assert_eq!(config.collect_interval, Duration::from_secs(300));
        assert_eq!(config.commit_interval, Duration::from_secs(5));
        assert_eq!(config.fanout, 2);
        assert_eq!(config.top_queries_group, "search-stats-top-queries-group");
        assert_eq!(
            config.popular_hour_group,
            "search-stats-popular-hour-group"
        );
    }

    #[test]
    fn environment_overrides_every_knob() {
        let config = WorkerConfig::from_lookup(lookup_from(&[
            ("SEARCHSTATS_LOG_ADDR", "10.0.0.5:8090"),
            ("SEARCHSTATS_PARTITIONS", "8"),
            ("SEARCHSTATS_STORE_URL", "redis://cache:6379"),
            ("SEARCHSTATS_COLLECT_INTERVAL", "1m"),
            ("SEARCHSTATS_COMMIT_INTERVAL", "10s"),
            ("SEARCHSTATS_POLL_TIMEOUT", "250ms"),
            ("SEARCHSTATS_BATCH_SIZE", "50"),
            ("SEARCHSTATS_FANOUT", "4"),
            ("SEARCHSTATS_TOP_QUERIES_GROUP", "tq"),
            ("SEARCHSTATS_POPULAR_HOUR_GROUP", "ph"),
        ]))
        .unwrap();

        assert_eq!(config.log.addr, "10.0.0.5:8090");
        assert_eq!(config.log.partitions, 8);
        assert_eq!(config.store_url, "redis://cache:6379");
        assert_eq!(config.collect_interval, Duration::from_secs(60));
        assert_eq!(config.commit_interval, Duration::from_secs(10));
        assert_eq!(config.poll_timeout, Duration::from_millis(250));
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.fanout, 4);
        assert_eq!(config.top_queries_group, "tq");
        assert_eq!(config.popular_hour_group, "ph");
    }

    #[test]
    fn unparsable_values_are_rejected() {
        let err =
            WorkerConfig::from_lookup(lookup_from(&[("SEARCHSTATS_PARTITIONS", "many")]))
                .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "SEARCHSTATS_PARTITIONS",
                ..
            }
        ));

        assert!(
            WorkerConfig::from_lookup(lookup_from(&[("SEARCHSTATS_COLLECT_INTERVAL", "soon")]))
                .is_err()
        );
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config =
            WorkerConfig::from_lookup(lookup_from(&[("SEARCHSTATS_LOG_ADDR", "")])).unwrap();
        assert_eq!(config.log.addr, "127.0.0.1:8090");
    }
}
