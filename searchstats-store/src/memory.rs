//! In-memory EventStore implementation for testing.
//!
//! Stores values in memory without persistence, with TTL expiry driven by
//! the tokio clock so tests can pause and advance time.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::traits::EventStore;

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-memory implementation of [`EventStore`] for tests.
#[derive(Default)]
pub struct MemoryEventStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Check if the store holds no live keys.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Match a glob pattern supporting `*` wildcards, which is all the
/// pipeline's key patterns use.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut rest = text;

    let first = parts[0];
    if !rest.starts_with(first) {
        return false;
    }
    rest = &rest[first.len()..];

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }

    let last = parts[parts.len() - 1];
    last.is_empty() || rest.ends_with(last)
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        // HashMap iteration order is arbitrary; keep scans deterministic.
        keys.sort();
        Ok(keys)
    }

    async fn read_hash(&self, key: &str) -> Result<HashMap<String, String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.value {
                StoredValue::Hash(fields) => Ok(fields.clone()),
                StoredValue::Text(_) => Err(Error::WrongType {
                    key: key.to_string(),
                    expected: "hash",
                }),
            },
            _ => Ok(HashMap::new()),
        }
    }

    async fn write_hash(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let entry = entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.is_expired(now) {
                    *entry = Entry {
                        value: StoredValue::Hash(HashMap::new()),
                        expires_at: None,
                    };
                }
            })
            .or_insert_with(|| Entry {
                value: StoredValue::Hash(HashMap::new()),
                expires_at: None,
            });

        let StoredValue::Hash(existing) = &mut entry.value else {
            return Err(Error::WrongType {
                key: key.to_string(),
                expected: "hash",
            });
        };
        for (field, value) in fields {
            existing.insert((*field).to_string(), value.clone());
        }
        if let Some(ttl) = ttl {
            entry.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.value {
                StoredValue::Text(value) => Ok(Some(value.clone())),
                StoredValue::Hash(_) => Err(Error::WrongType {
                    key: key.to_string(),
                    expected: "string",
                }),
            },
            _ => Ok(None),
        }
    }

    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Text(value.to_string()),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    async fn increment_hash_field(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let entry = entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.is_expired(now) {
                    *entry = Entry {
                        value: StoredValue::Hash(HashMap::new()),
                        expires_at: None,
                    };
                }
            })
            .or_insert_with(|| Entry {
                value: StoredValue::Hash(HashMap::new()),
                expires_at: None,
            });

        let StoredValue::Hash(fields) = &mut entry.value else {
            return Err(Error::WrongType {
                key: key.to_string(),
                expected: "hash",
            });
        };

        let current = match fields.get(field) {
            Some(raw) => raw.parse::<i64>().map_err(|_| Error::WrongType {
                key: key.to_string(),
                expected: "integer field",
            })?,
            None => 0,
        };
        let next = current + delta;
        fields.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn delete_key(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
