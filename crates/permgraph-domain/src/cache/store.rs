//! Keyed cache store with per-entry TTL and prefix deletion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;

use crate::error::DomainResult;

/// Generic key/value store the permission cache is kept in.
///
/// Values are opaque serialized strings so the same interface fits an
/// in-process cache or a store shared between processes.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the value under `key`, if present and not expired.
    async fn get(&self, key: &str) -> DomainResult<Option<String>>;

    /// Stores `value` under `key`, expiring after `ttl`.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> DomainResult<()>;

    /// Removes every entry whose key starts with `prefix`. Returns how many
    /// entries were removed.
    async fn delete_matching_prefix(&self, prefix: &str) -> DomainResult<u64>;
}

#[derive(Debug, Clone)]
struct TtlValue {
    value: Arc<str>,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, TtlValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &TtlValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &TtlValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process [`CacheStore`] backed by Moka.
///
/// Lock-free concurrent reads, bounded capacity and per-entry TTL.
#[derive(Clone)]
pub struct MokaCacheStore {
    cache: Cache<String, TtlValue>,
}

impl std::fmt::Debug for MokaCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCacheStore")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl MokaCacheStore {
    /// Creates a store holding at most `max_capacity` entries.
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Returns the approximate number of entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending maintenance tasks (evictions). Useful for testing TTL.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for MokaCacheStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl CacheStore for MokaCacheStore {
    async fn get(&self, key: &str) -> DomainResult<Option<String>> {
        Ok(self.cache.get(key).await.map(|v| v.value.to_string()))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> DomainResult<()> {
        self.cache
            .insert(
                key.to_string(),
                TtlValue {
                    value: value.into(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete_matching_prefix(&self, prefix: &str) -> DomainResult<u64> {
        self.cache.run_pending_tasks().await;

        // Note: Moka's iter() returns (Arc<K>, V)
        let keys: Vec<Arc<String>> = self
            .cache
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k)
            .collect();

        let removed = keys.len() as u64;
        for key in keys {
            self.cache.invalidate(key.as_str()).await;
        }
        Ok(removed)
    }
}
