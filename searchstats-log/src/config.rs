//! Configuration for the log transport.

use serde::{Deserialize, Serialize};

/// Configuration for connecting to the partitioned log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// TCP address of the log broker.
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Number of partitions on the topic. Must be at least the number of
    /// distinct search categories.
    #[serde(default = "default_partitions")]
    pub partitions: u32,
}

fn default_addr() -> String {
    "127.0.0.1:8090".to_string()
}

fn default_partitions() -> u32 {
    4
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            partitions: default_partitions(),
        }
    }
}

impl LogConfig {
    /// Create a new config with a custom broker address.
    #[must_use]
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Create a new config with a custom partition count.
    #[must_use]
    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions;
        self
    }
}
