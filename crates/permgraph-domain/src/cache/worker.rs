//! Background refresh worker for asynchronous cache mode.
//!
//! One worker runs per process. It listens on the invalidation channel and
//! for demand from waiting `get` calls:
//!
//! - On an invalidation signal it records the timestamp, loads the full
//!   permission graph once and rewrites the entry of every principal this
//!   process is waiting on or has cached and still finds in the store.
//! - On demand it computes each pending principal from its reachable
//!   sub-graph.
//!
//! Failures are recorded for the waiting `get`, which decides whether to
//! ask again.
//!
//! Entries are stamped with the timestamp observed before loading, so a
//! signal arriving mid-refresh leaves them stale and triggers another pass.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{CacheStore, PermissionCache};
use crate::error::{DomainError, DomainResult};
use crate::propagation::{propagate, EdgeReader};

/// Cache writes in flight at once during a full refresh.
const REFRESH_CONCURRENCY: usize = 16;

/// Handle to a running refresh worker.
#[derive(Debug)]
pub struct RefreshWorker {
    handle: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl RefreshWorker {
    /// Stops the worker and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            error!(error = %e, "refresh worker task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<E, S> PermissionCache<E, S>
where
    E: EdgeReader + 'static,
    S: CacheStore + 'static,
{
    /// Starts the refresh worker for this cache.
    ///
    /// Fails if no invalidation channel is attached.
    pub fn spawn_refresh_worker(self: &Arc<Self>) -> DomainResult<RefreshWorker> {
        let channel =
            self.channel
                .as_ref()
                .ok_or_else(|| DomainError::InvalidationChannelError {
                    message: "refresh worker requires an invalidation channel".to_string(),
                })?;
        let mut signals = channel.subscribe();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let cache = Arc::clone(self);

        let handle = tokio::spawn(async move {
            info!("permission refresh worker started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    signal = signals.recv() => match signal {
                        Ok(timestamp) => {
                            cache.observe_invalidation(timestamp);
                            if let Err(e) = cache.refresh_all().await {
                                error!(error = %e, timestamp, "failed to refresh cached permissions");
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "refresh worker lagged behind invalidations");
                            if let Err(e) = cache.refresh_all().await {
                                error!(error = %e, "failed to refresh cached permissions");
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = cache.demand.notified() => cache.refresh_pending().await,
                }
            }
            info!("permission refresh worker stopped");
        });

        Ok(RefreshWorker {
            handle,
            shutdown: Some(shutdown_tx),
        })
    }

    fn drain_pending(&self) -> Vec<String> {
        let ids: Vec<String> = self.pending.iter().map(|id| id.key().clone()).collect();
        for id in &ids {
            self.pending.remove(id);
        }
        ids
    }

    /// Rewrites every known and pending principal from one graph snapshot.
    async fn refresh_all(&self) -> DomainResult<()> {
        let observed = self.latest_invalidation();
        let pending = self.drain_pending();

        let graph = match self.engine.load_full_graph().await {
            Ok(graph) => graph,
            Err(e) => {
                for id in pending {
                    self.record_failure(&id, e.clone());
                    self.pending.insert(id);
                }
                return Err(e);
            }
        };

        let mut principals = self.cached_known_principals().await;
        principals.extend(pending);
        principals.sort();
        principals.dedup();
        let total = principals.len();

        let graph = &graph;
        let results: Vec<(String, DomainResult<()>)> = stream::iter(principals)
            .map(|principal_id: String| async move {
                let set = propagate(&principal_id, graph);
                metrics::counter!("permgraph_cache_recomputations_total").increment(1);
                let result = self.store_entry(&principal_id, &set, observed).await;
                (principal_id, result)
            })
            .buffer_unordered(REFRESH_CONCURRENCY)
            .collect()
            .await;

        let mut failed = 0usize;
        for (principal_id, result) in results {
            if let Err(e) = result {
                warn!(principal_id = %principal_id, error = %e, "failed to store refreshed permissions");
                self.record_failure(&principal_id, e);
                self.pending.insert(principal_id);
                failed += 1;
            }
        }

        debug!(
            refreshed = total - failed,
            failed, observed, "refreshed cached permissions"
        );
        Ok(())
    }

    /// Known principals whose entry is still in the store. Principals whose
    /// entry expired or was evicted are forgotten until they are read again.
    async fn cached_known_principals(&self) -> Vec<String> {
        let known: Vec<String> = self.known.iter().map(|id| id.key().clone()).collect();
        let mut cached = Vec::with_capacity(known.len());
        for principal_id in known {
            match self.store.get(&self.key_for(&principal_id)).await {
                Ok(Some(_)) => cached.push(principal_id),
                Ok(None) => {
                    self.known.remove(&principal_id);
                }
                Err(e) => {
                    debug!(principal_id = %principal_id, error = %e, "cache store unavailable, keeping principal");
                    cached.push(principal_id);
                }
            }
        }
        cached
    }

    /// Computes each principal a waiting `get` asked for.
    async fn refresh_pending(&self) {
        for principal_id in self.drain_pending() {
            let observed = self.latest_invalidation();
            let result = match self.engine.compute(&principal_id).await {
                Ok(set) => self.store_entry(&principal_id, &set, observed).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    metrics::counter!("permgraph_cache_recomputations_total").increment(1);
                    debug!(principal_id = %principal_id, "populated pending permissions");
                }
                Err(e) => {
                    // Retried on the next demand or invalidation.
                    warn!(principal_id = %principal_id, error = %e, "failed to populate pending permissions");
                    self.record_failure(&principal_id, e);
                    self.pending.insert(principal_id);
                }
            }
        }
    }
}
