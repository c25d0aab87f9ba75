//! Adapters that bridge the storage layer to the domain layer.
//!
//! The domain layer (permgraph-domain) reads edges through `EdgeReader`,
//! which speaks grant names and capability masks. The storage layer
//! (permgraph-storage) implements `EdgeStore` with concrete backends.
//!
//! [`EdgeStoreReader`] implements the domain trait on top of any
//! `EdgeStore`.

use std::sync::Arc;

use async_trait::async_trait;

use permgraph_domain::error::{DomainError, DomainResult};
use permgraph_domain::model::PermissionEdge;
use permgraph_domain::propagation::{EdgeQuery, EdgeReader};
use permgraph_storage::{EdgeFilter, EdgeStore, StorageError, StoredEdge};

/// Adapter that implements `EdgeReader` using an `EdgeStore`.
///
/// Only permission-class edges are read.
pub struct EdgeStoreReader<S: EdgeStore> {
    storage: Arc<S>,
}

impl<S: EdgeStore> EdgeStoreReader<S> {
    /// Creates a new adapter wrapping the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}

fn to_filter(query: &EdgeQuery) -> EdgeFilter {
    EdgeFilter {
        source_in: query.source_in.clone(),
        target_in: query.target_in.clone(),
        name_in: query.grant_in.clone(),
        ..EdgeFilter::permissions()
    }
}

fn to_domain_edge(edge: StoredEdge) -> PermissionEdge {
    let mut domain = PermissionEdge::from_grant_name(edge.source_id, edge.target_id, &edge.name);
    domain.properties = edge.properties;
    domain
}

fn storage_error(e: StorageError) -> DomainError {
    DomainError::EdgeStoreError {
        message: format!("storage error: {}", e),
    }
}

#[async_trait]
impl<S: EdgeStore> EdgeReader for EdgeStoreReader<S> {
    async fn find_edges(&self, query: &EdgeQuery) -> DomainResult<Vec<PermissionEdge>> {
        let edges = self
            .storage
            .find_edges(&to_filter(query))
            .await
            .map_err(storage_error)?;

        Ok(edges.into_iter().map(to_domain_edge).collect())
    }
}
