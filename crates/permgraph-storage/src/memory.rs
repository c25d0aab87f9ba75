//! In-memory storage implementation.
//!
//! Edges are indexed by source id so the propagation engine's per-frontier
//! queries (`source_in`) are direct lookups instead of full scans.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use crate::error::{HealthStatus, StorageResult};
use crate::traits::{validate_edge, EdgeFilter, EdgeStore, StoredEdge};

/// In-memory implementation of EdgeStore.
///
/// # Performance Characteristics
///
/// - **Write edge**: O(1) average (HashSet insert)
/// - **Delete edge**: O(1) average (HashSet remove)
/// - **Find edges by source**: O(S) where S is edges of the requested sources
/// - **Find edges without source filter**: O(N) linear scan
#[derive(Debug, Default)]
pub struct MemoryEdgeStore {
    /// Edges keyed by source id.
    by_source: DashMap<String, HashSet<StoredEdge>>,
}

impl MemoryEdgeStore {
    /// Creates a new in-memory edge store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory edge store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the total number of stored edges.
    pub fn edge_count(&self) -> usize {
        self.by_source.iter().map(|e| e.value().len()).sum()
    }
}

#[async_trait]
impl EdgeStore for MemoryEdgeStore {
    #[instrument(skip_all, fields(writes = writes.len(), deletes = deletes.len()))]
    async fn write_edges(
        &self,
        writes: Vec<StoredEdge>,
        deletes: Vec<StoredEdge>,
    ) -> StorageResult<()> {
        for edge in writes.iter().chain(deletes.iter()) {
            validate_edge(edge)?;
        }

        for edge in deletes {
            if let Some(mut edges) = self.by_source.get_mut(&edge.source_id) {
                edges.remove(&edge);
            }
        }
        self.by_source.retain(|_, edges| !edges.is_empty());

        for edge in writes {
            self.by_source
                .entry(edge.source_id.clone())
                .or_default()
                .insert(edge);
        }

        Ok(())
    }

    async fn find_edges(&self, filter: &EdgeFilter) -> StorageResult<Vec<StoredEdge>> {
        let mut found: Vec<StoredEdge> = match &filter.source_in {
            Some(sources) => {
                let unique: HashSet<&String> = sources.iter().collect();
                unique
                    .into_iter()
                    .filter_map(|source| self.by_source.get(source))
                    .flat_map(|edges| {
                        edges
                            .iter()
                            .filter(|e| filter.matches(e))
                            .cloned()
                            .collect::<Vec<_>>()
                    })
                    .collect()
            }
            None => self
                .by_source
                .iter()
                .flat_map(|entry| {
                    entry
                        .value()
                        .iter()
                        .filter(|e| filter.matches(e))
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .collect(),
        };

        // Deterministic order, matching what an ORDER BY would give a SQL backend.
        found.sort_by(|a, b| {
            (&a.source_id, &a.target_id, &a.name).cmp(&(&b.source_id, &b.target_id, &b.name))
        });
        Ok(found)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            latency: std::time::Duration::ZERO,
            message: Some("in-memory storage".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    fn edge(source: &str, target: &str, name: &str) -> StoredEdge {
        StoredEdge::permission(source, target, name)
    }

    #[tokio::test]
    async fn test_memory_store_can_be_created() {
        let store = MemoryEdgeStore::new();
        assert_eq!(store.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_write_and_find_edge() {
        let store = MemoryEdgeStore::new();
        store
            .write_edge(edge("user:u1", "group:g1", "can_read"))
            .await
            .unwrap();

        let found = store
            .find_edges(&EdgeFilter::permissions().with_sources(["user:u1"]))
            .await
            .unwrap();

        assert_eq!(found, vec![edge("user:u1", "group:g1", "can_read")]);
    }

    #[tokio::test]
    async fn test_find_returns_empty_when_no_match() {
        let store = MemoryEdgeStore::new();
        store
            .write_edge(edge("user:u1", "group:g1", "can_read"))
            .await
            .unwrap();

        let found = store
            .find_edges(&EdgeFilter::permissions().with_sources(["user:nobody"]))
            .await
            .unwrap();

        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_filter_by_target_and_name() {
        let store = MemoryEdgeStore::new();
        store
            .write_edges(
                vec![
                    edge("user:u1", "group:g1", "can_read"),
                    edge("user:u1", "group:g2", "can_write"),
                    edge("user:u2", "group:g1", "can_manage"),
                ],
                vec![],
            )
            .await
            .unwrap();

        let found = store
            .find_edges(
                &EdgeFilter::permissions()
                    .with_targets(["group:g1"])
                    .with_names(["can_manage", "can_write"]),
            )
            .await
            .unwrap();

        assert_eq!(found, vec![edge("user:u2", "group:g1", "can_manage")]);
    }

    #[tokio::test]
    async fn test_multiple_edges_between_same_pair_coexist() {
        let store = MemoryEdgeStore::new();
        store
            .write_edges(
                vec![
                    edge("user:u1", "group:g1", "can_read"),
                    edge("user:u1", "group:g1", "can_write"),
                ],
                vec![],
            )
            .await
            .unwrap();

        let found = store
            .find_edges(&EdgeFilter::permissions().with_sources(["user:u1"]))
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let store = MemoryEdgeStore::new();
        let e = edge("user:u1", "group:g1", "can_read");
        store.write_edge(e.clone()).await.unwrap();
        store.write_edge(e).await.unwrap();

        assert_eq!(store.edge_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_edge() {
        let store = MemoryEdgeStore::new();
        let e = edge("user:u1", "group:g1", "can_read");
        store.write_edge(e.clone()).await.unwrap();

        store.delete_edge(e).await.unwrap();

        assert_eq!(store.edge_count(), 0);
        let found = store
            .find_edges(&EdgeFilter::permissions())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryEdgeStore::new();
        let e = edge("user:u1", "group:g1", "can_read");

        store.delete_edge(e.clone()).await.unwrap();
        store.delete_edge(e).await.unwrap();

        assert_eq!(store.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_edge_is_rejected() {
        let store = MemoryEdgeStore::new();
        let result = store.write_edge(edge("", "group:g1", "can_read")).await;

        assert!(matches!(result, Err(StorageError::InvalidInput { .. })));
        assert_eq!(store.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_link_class_filter_excludes_other_classes() {
        let store = MemoryEdgeStore::new();
        let mut signature = edge("user:u1", "user:u1", "signed");
        signature.link_class = "signature".to_string();
        store
            .write_edges(vec![signature, edge("user:u1", "group:g1", "can_read")], vec![])
            .await
            .unwrap();

        let found = store
            .find_edges(&EdgeFilter::permissions())
            .await
            .unwrap();

        assert_eq!(found, vec![edge("user:u1", "group:g1", "can_read")]);
    }

    #[tokio::test]
    async fn test_results_are_sorted() {
        let store = MemoryEdgeStore::new();
        store
            .write_edges(
                vec![
                    edge("user:b", "group:2", "can_read"),
                    edge("user:a", "group:9", "can_read"),
                    edge("user:b", "group:1", "can_read"),
                ],
                vec![],
            )
            .await
            .unwrap();

        let found = store
            .find_edges(&EdgeFilter::default())
            .await
            .unwrap();
        let pairs: Vec<_> = found
            .iter()
            .map(|e| (e.source_id.as_str(), e.target_id.as_str()))
            .collect();

        assert_eq!(
            pairs,
            vec![("user:a", "group:9"), ("user:b", "group:1"), ("user:b", "group:2")]
        );
    }

    #[tokio::test]
    async fn test_concurrent_writes_dont_lose_data() {
        let store = MemoryEdgeStore::new_shared();

        let mut handles = Vec::new();
        for task_id in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    store
                        .write_edge(edge(
                            &format!("user:{task_id}"),
                            &format!("group:{i}"),
                            "can_read",
                        ))
                        .await
                        .unwrap();
                }
            }));
        }
        futures::future::join_all(handles).await;

        assert_eq!(store.edge_count(), 500);
    }

    #[tokio::test]
    async fn test_health_check_is_healthy() {
        let store = MemoryEdgeStore::new();
        let status = store.health_check().await.unwrap();
        assert!(status.healthy);
    }
}
