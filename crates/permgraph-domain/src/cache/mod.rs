//! Per-principal permission cache with TTL and global invalidation.
//!
//! # Modes
//!
//! - **Synchronous**: a miss recomputes inline and stores the result.
//!   Invalidation deletes every entry under the key prefix.
//! - **Asynchronous**: invalidation broadcasts a timestamp. A background
//!   refresh worker in each process repopulates entries. A miss blocks,
//!   polling the store until a current entry appears or the wait deadline
//!   passes. Requests never recompute inline.
//!
//! # Coherence
//!
//! Each cache keeps the latest invalidation timestamp it has observed. An
//! entry records the timestamp observed when its computation *started*, and
//! is current only if that is at least the latest observed timestamp. No
//! wall-clock comparison between processes is involved.
//!
//! # Key Design
//!
//! Keys are `<key_prefix><principal_id>`. The prefix carries a format
//! version: bump it when the serialized entry changes and old entries become
//! plain misses. Entries that fail to decode are misses as well.
//!
//! # Example
//!
//! ```rust,ignore
//! use permgraph_domain::cache::{MokaCacheStore, PermissionCache, PermissionCacheConfig};
//! use std::sync::Arc;
//!
//! let cache = PermissionCache::new(
//!     edge_reader,
//!     Arc::new(MokaCacheStore::default()),
//!     PermissionCacheConfig::default(),
//! );
//!
//! let perms = cache.get("user:alice").await?;
//! cache.invalidate(None).await?;
//! ```

mod invalidation;
mod store;
mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::error::{DomainError, DomainResult};
use crate::model::PermissionSet;
use crate::propagation::{EdgeReader, PropagationEngine};

pub use invalidation::{BroadcastInvalidationChannel, InvalidationChannel, DEFAULT_CHANNEL_CAPACITY};
pub use store::{CacheStore, MokaCacheStore};
pub use worker::RefreshWorker;

/// Default entry lifetime: 48 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(172_800);

/// Default versioned key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "perm_v1_";

/// Refresh attempts a waiting `get` makes before returning the worker's error.
const MAX_REFRESH_ATTEMPTS: u32 = 4;

/// How misses and invalidations are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Recompute inline on miss; invalidation deletes entries.
    #[default]
    Synchronous,
    /// Wait for the refresh worker on miss; invalidation is broadcast.
    Asynchronous,
}

/// Configuration for the permission cache.
#[derive(Debug, Clone)]
pub struct PermissionCacheConfig {
    pub mode: CacheMode,
    /// Lifetime of an entry.
    pub ttl: Duration,
    /// Versioned key prefix.
    pub key_prefix: String,
    /// How often a waiting `get` re-reads the store (asynchronous mode).
    pub poll_interval: Duration,
    /// Longest a `get` waits for the refresh worker (asynchronous mode).
    pub wait_deadline: Duration,
}

impl Default for PermissionCacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::Synchronous,
            ttl: DEFAULT_TTL,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            poll_interval: Duration::from_millis(100),
            wait_deadline: Duration::from_secs(30),
        }
    }
}

impl PermissionCacheConfig {
    pub fn with_mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_wait_deadline(mut self, wait_deadline: Duration) -> Self {
        self.wait_deadline = wait_deadline;
        self
    }
}

/// Serialized cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPermissions {
    pub principal_id: String,
    /// Latest invalidation timestamp observed when computation started.
    pub computed_at: u64,
    pub written_at: DateTime<Utc>,
    pub permissions: PermissionSet,
}

/// Current wall-clock time in milliseconds, used as the default
/// invalidation timestamp.
pub fn current_timestamp() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Process-wide cache of propagated permission sets, keyed by principal.
///
/// Shared by handle (`Arc<PermissionCache<..>>`) between the authorizer and,
/// in asynchronous mode, the refresh worker.
///
/// # Thread Safety
///
/// Concurrent `get`s for different principals are independent. Concurrent
/// synchronous misses for the same principal may each recompute; the result
/// is identical, so no per-key lock is taken.
pub struct PermissionCache<E, S = MokaCacheStore> {
    engine: PropagationEngine<E>,
    store: Arc<S>,
    config: PermissionCacheConfig,
    channel: Option<Arc<dyn InvalidationChannel>>,
    latest_invalidation: AtomicU64,
    /// Principals this process has populated; refreshed on every signal.
    known: DashSet<String>,
    /// Principals a waiting `get` needs populated.
    pending: DashSet<String>,
    /// Last refresh error per principal, taken by the waiting `get`.
    failures: DashMap<String, DomainError>,
    demand: Notify,
}

impl<E, S> std::fmt::Debug for PermissionCache<E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCache")
            .field("config", &self.config)
            .field("latest_invalidation", &self.latest_invalidation)
            .field("known_principals", &self.known.len())
            .field("pending_principals", &self.pending.len())
            .field("failed_principals", &self.failures.len())
            .finish()
    }
}

impl<E, S> PermissionCache<E, S>
where
    E: EdgeReader + 'static,
    S: CacheStore + 'static,
{
    pub fn new(edge_reader: Arc<E>, store: Arc<S>, config: PermissionCacheConfig) -> Self {
        Self {
            engine: PropagationEngine::new(edge_reader),
            store,
            config,
            channel: None,
            latest_invalidation: AtomicU64::new(0),
            known: DashSet::new(),
            pending: DashSet::new(),
            failures: DashMap::new(),
            demand: Notify::new(),
        }
    }

    /// Attaches the channel invalidations are published on and the refresh
    /// worker listens to. Required in asynchronous mode.
    pub fn with_invalidation_channel(mut self, channel: Arc<dyn InvalidationChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn config(&self) -> &PermissionCacheConfig {
        &self.config
    }

    pub fn engine(&self) -> &PropagationEngine<E> {
        &self.engine
    }

    /// Latest invalidation timestamp this cache has observed.
    pub fn latest_invalidation(&self) -> u64 {
        self.latest_invalidation.load(Ordering::SeqCst)
    }

    /// Records an invalidation timestamp. Never moves backwards.
    pub fn observe_invalidation(&self, timestamp: u64) {
        self.latest_invalidation
            .fetch_max(timestamp, Ordering::SeqCst);
    }

    fn key_for(&self, principal_id: &str) -> String {
        format!("{}{}", self.config.key_prefix, principal_id)
    }

    /// Returns the permission set of `principal_id`.
    ///
    /// Errors mean the permissions could not be established and the caller
    /// must deny.
    #[instrument(skip(self))]
    pub async fn get(&self, principal_id: &str) -> DomainResult<PermissionSet> {
        if principal_id.is_empty() {
            return Err(DomainError::InvalidIdentifier {
                value: principal_id.to_string(),
            });
        }
        match self.config.mode {
            CacheMode::Synchronous => self.get_or_recompute(principal_id).await,
            CacheMode::Asynchronous => self.wait_for_entry(principal_id).await,
        }
    }

    /// Computes the permission set from the edge store and stores it.
    ///
    /// Edge store failures propagate. Cache store failures are logged in
    /// synchronous mode and propagate in asynchronous mode.
    #[instrument(skip(self))]
    pub async fn recompute(&self, principal_id: &str) -> DomainResult<PermissionSet> {
        let observed = self.latest_invalidation();
        let set = self.engine.compute(principal_id).await?;
        metrics::counter!("permgraph_cache_recomputations_total").increment(1);

        let stored = self.store_entry(principal_id, &set, observed).await;
        match (stored, self.config.mode) {
            (Ok(()), _) => {}
            (Err(e), CacheMode::Synchronous) => {
                warn!(error = %e, "cache store unavailable, result not cached");
            }
            (Err(e), CacheMode::Asynchronous) => return Err(e),
        }
        Ok(set)
    }

    /// Marks every entry computed before `timestamp` (default: now) stale.
    ///
    /// Synchronous mode deletes entries under the key prefix. Asynchronous
    /// mode publishes the timestamp so every process's refresh worker
    /// repopulates its entries.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, timestamp: Option<u64>) -> DomainResult<()> {
        let timestamp = timestamp.unwrap_or_else(current_timestamp);
        self.observe_invalidation(timestamp);

        match self.config.mode {
            CacheMode::Synchronous => {
                match self
                    .store
                    .delete_matching_prefix(&self.config.key_prefix)
                    .await
                {
                    Ok(removed) => debug!(timestamp, removed, "dropped cached permissions"),
                    // Local entries are already stale by timestamp.
                    Err(e) => warn!(error = %e, "failed to drop cached permissions"),
                }
                Ok(())
            }
            CacheMode::Asynchronous => {
                let channel =
                    self.channel
                        .as_ref()
                        .ok_or_else(|| DomainError::InvalidationChannelError {
                            message: "asynchronous mode requires an invalidation channel"
                                .to_string(),
                        })?;
                channel.publish(timestamp).await
            }
        }
    }

    async fn get_or_recompute(&self, principal_id: &str) -> DomainResult<PermissionSet> {
        match self.read_current(principal_id).await {
            Ok(Some(set)) => {
                metrics::counter!("permgraph_cache_hits_total").increment(1);
                return Ok(set);
            }
            Ok(None) => {
                metrics::counter!("permgraph_cache_misses_total").increment(1);
            }
            Err(e) => {
                metrics::counter!("permgraph_cache_misses_total").increment(1);
                warn!(error = %e, "cache store unavailable, recomputing");
            }
        }
        self.recompute(principal_id).await
    }

    async fn wait_for_entry(&self, principal_id: &str) -> DomainResult<PermissionSet> {
        if let Some(set) = self.read_current(principal_id).await? {
            metrics::counter!("permgraph_cache_hits_total").increment(1);
            return Ok(set);
        }
        metrics::counter!("permgraph_cache_misses_total").increment(1);
        self.request_refresh(principal_id);

        let deadline = self.config.wait_deadline;
        match timeout(deadline, self.poll_until_current(principal_id)).await {
            Ok(result) => result,
            Err(_) => {
                metrics::counter!("permgraph_cache_wait_timeouts_total").increment(1);
                warn!(
                    principal_id,
                    waited_ms = deadline.as_millis() as u64,
                    "no current permissions before wait deadline"
                );
                Err(DomainError::CacheWaitTimeout {
                    principal_id: principal_id.to_string(),
                    waited_ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    /// Polls until a current entry appears. A refresh the worker reports as
    /// failed is requested again with exponential backoff, and its error is
    /// returned once `MAX_REFRESH_ATTEMPTS` are used up.
    async fn poll_until_current(&self, principal_id: &str) -> DomainResult<PermissionSet> {
        let mut attempts = 1u32;
        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            if let Some(set) = self.read_current(principal_id).await? {
                return Ok(set);
            }

            let Some((_, error)) = self.failures.remove(principal_id) else {
                continue;
            };
            if attempts >= MAX_REFRESH_ATTEMPTS {
                warn!(principal_id, attempts, error = %error, "giving up on permission refresh");
                return Err(error);
            }
            debug!(principal_id, attempts, error = %error, "permission refresh failed, retrying");
            tokio::time::sleep(self.config.poll_interval * 2u32.pow(attempts)).await;
            attempts += 1;
            self.request_refresh(principal_id);
        }
    }

    /// Asks the refresh worker to populate `principal_id`.
    fn request_refresh(&self, principal_id: &str) {
        self.failures.remove(principal_id);
        self.pending.insert(principal_id.to_string());
        self.demand.notify_one();
    }

    /// Records a failed refresh for a waiting `get` to pick up.
    fn record_failure(&self, principal_id: &str, error: DomainError) {
        self.failures.insert(principal_id.to_string(), error);
    }

    /// Reads the entry for `principal_id` if present, decodable and current.
    async fn read_current(&self, principal_id: &str) -> DomainResult<Option<PermissionSet>> {
        let Some(raw) = self.store.get(&self.key_for(principal_id)).await? else {
            return Ok(None);
        };

        let entry: CachedPermissions = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(principal_id, error = %e, "undecodable cache entry treated as miss");
                return Ok(None);
            }
        };

        if entry.principal_id != principal_id || entry.computed_at < self.latest_invalidation() {
            return Ok(None);
        }
        Ok(Some(entry.permissions))
    }

    async fn store_entry(
        &self,
        principal_id: &str,
        set: &PermissionSet,
        computed_at: u64,
    ) -> DomainResult<()> {
        self.known.insert(principal_id.to_string());

        let entry = CachedPermissions {
            principal_id: principal_id.to_string(),
            computed_at,
            written_at: Utc::now(),
            permissions: set.clone(),
        };
        let raw = serde_json::to_string(&entry).map_err(|e| DomainError::CacheStoreError {
            message: format!("failed to encode cache entry: {e}"),
        })?;

        self.store
            .put(&self.key_for(principal_id), raw, self.config.ttl)
            .await?;
        self.failures.remove(principal_id);
        Ok(())
    }
}

/// Registers permission cache metric descriptions.
///
/// Optional; call once at startup for better exporter documentation.
pub fn register_permission_cache_metrics() {
    metrics::describe_counter!(
        "permgraph_cache_hits_total",
        "Total number of permission cache hits"
    );
    metrics::describe_counter!(
        "permgraph_cache_misses_total",
        "Total number of permission cache misses"
    );
    metrics::describe_counter!(
        "permgraph_cache_recomputations_total",
        "Total number of permission set recomputations"
    );
    metrics::describe_counter!(
        "permgraph_cache_wait_timeouts_total",
        "Total number of asynchronous cache waits that hit the deadline"
    );
}
