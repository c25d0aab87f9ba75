//! Authorization service: storage, permission cache and authorizer wired
//! together from configuration.
//!
//! Edge writes go through the service so every change invalidates the
//! permission cache.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use permgraph_domain::cache::{
    register_permission_cache_metrics, BroadcastInvalidationChannel, MokaCacheStore,
    RefreshWorker,
};
use permgraph_domain::model::{AccessRequest, PermissionSet, Principal};
use permgraph_domain::{Authorizer, CacheMode, DomainError, PermissionCache};
use permgraph_storage::{EdgeStore, MemoryEdgeStore, StorageError, StoredEdge};

use crate::adapters::EdgeStoreReader;
use crate::config::{ConfigLoadError, ServerConfig};

/// Errors surfaced by the service layer.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("failed to read seed file {path}: {source}")]
    SeedFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse seed file {path}: {source}")]
    SeedFileParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads a JSON array of edges.
///
/// ```json
/// [{"source_id": "U1", "target_id": "G1", "name": "can_manage"}]
/// ```
///
/// `link_class` defaults to `permission` and `properties` to empty.
pub fn load_seed_file<P: AsRef<Path>>(path: P) -> Result<Vec<StoredEdge>, ServiceError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ServiceError::SeedFileRead {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ServiceError::SeedFileParse {
        path: path.display().to_string(),
        source,
    })
}

/// Permission cache over an `EdgeStore` backend.
pub type StoreCache<S> = PermissionCache<EdgeStoreReader<S>, MokaCacheStore>;

/// Authorization entry point for one process.
pub struct AuthorizationService<S: EdgeStore = MemoryEdgeStore> {
    storage: Arc<S>,
    cache: Arc<StoreCache<S>>,
    authorizer: Authorizer<EdgeStoreReader<S>, MokaCacheStore>,
    worker: Option<RefreshWorker>,
}

impl AuthorizationService<MemoryEdgeStore> {
    /// Builds the service for `config`, loading `storage.seed_file` if set.
    ///
    /// Must run inside a tokio runtime: asynchronous mode spawns the refresh
    /// worker.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, ServiceError> {
        config.validate()?;

        let storage = MemoryEdgeStore::new_shared();
        if let Some(seed_file) = &config.storage.seed_file {
            let edges = load_seed_file(seed_file)?;
            info!(seed_file = %seed_file, edges = edges.len(), "loaded seed edges");
            storage.write_edges(edges, vec![]).await?;
        }

        Self::with_storage(storage, config)
    }
}

impl<S: EdgeStore> AuthorizationService<S> {
    /// Builds the service over an existing backend.
    pub fn with_storage(storage: Arc<S>, config: &ServerConfig) -> Result<Self, ServiceError> {
        register_permission_cache_metrics();

        let reader = Arc::new(EdgeStoreReader::new(Arc::clone(&storage)));
        let cache_config = config.cache.to_cache_config();
        let mode = cache_config.mode;
        let store = Arc::new(MokaCacheStore::new(config.cache.max_capacity));

        let mut cache = PermissionCache::new(Arc::clone(&reader), store, cache_config);
        if mode == CacheMode::Asynchronous {
            cache =
                cache.with_invalidation_channel(Arc::new(BroadcastInvalidationChannel::default()));
        }
        let cache = Arc::new(cache);

        let worker = match mode {
            CacheMode::Asynchronous => Some(cache.spawn_refresh_worker()?),
            CacheMode::Synchronous => None,
        };

        let authorizer = Authorizer::new(
            Arc::clone(&cache),
            reader,
            config.authorization.to_authorizer_config(),
        );

        info!(?mode, "authorization service ready");
        Ok(Self {
            storage,
            cache,
            authorizer,
            worker,
        })
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn cache(&self) -> &Arc<StoreCache<S>> {
        &self.cache
    }

    /// Propagated permissions of `principal_id`.
    pub async fn permissions(&self, principal_id: &str) -> Result<PermissionSet, ServiceError> {
        Ok(self.cache.get(principal_id).await?)
    }

    /// True only if `principal` may perform every request.
    pub async fn check(
        &self,
        principal: &Principal,
        requests: &[AccessRequest],
    ) -> Result<bool, ServiceError> {
        Ok(self.authorizer.can(principal, requests).await?)
    }

    /// Applies edge changes, then invalidates every cached permission set.
    #[instrument(skip_all, fields(writes = writes.len(), deletes = deletes.len()))]
    pub async fn write_edges(
        &self,
        writes: Vec<StoredEdge>,
        deletes: Vec<StoredEdge>,
    ) -> Result<(), ServiceError> {
        self.storage.write_edges(writes, deletes).await?;
        self.cache.invalidate(None).await?;
        Ok(())
    }

    /// Stops the refresh worker, if one is running.
    pub async fn shutdown(self) {
        if let Some(worker) = self.worker {
            worker.shutdown().await;
        }
    }
}
