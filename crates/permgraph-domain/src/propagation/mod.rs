//! Permission propagation engine.
//!
//! Computes, for a starting principal, every group or principal reachable
//! through permission edges together with the capability mask that survives
//! along the way.
//!
//! # Architecture Decisions
//!
//! - **Lazy loading**: the sub-graph reachable from the start is fetched
//!   breadth-first, one `source_in` query per frontier. Each node is fetched
//!   at most once, so cyclic data terminates and the query count is bounded
//!   by the depth of the graph.
//!
//! - **Bulk loading**: [`PropagationEngine::load_full_graph`] fetches every
//!   permission edge once so many principals can be propagated against the
//!   same snapshot. The refresh worker uses this.
//!
//! - **Cycle Detection**: path-local. See [`propagate`].

mod graph;
mod traits;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::DomainResult;
use crate::model::PermissionSet;

pub use graph::{propagate, PermissionGraph};
pub use traits::{EdgeQuery, EdgeReader};

/// Loads edges from an [`EdgeReader`] and runs [`propagate`] over them.
pub struct PropagationEngine<E> {
    edge_reader: Arc<E>,
}

impl<E> PropagationEngine<E>
where
    E: EdgeReader + 'static,
{
    pub fn new(edge_reader: Arc<E>) -> Self {
        Self { edge_reader }
    }

    pub fn edge_reader(&self) -> &Arc<E> {
        &self.edge_reader
    }

    /// Computes the permission set of `start_id` from the live edge store.
    #[instrument(skip(self))]
    pub async fn compute(&self, start_id: &str) -> DomainResult<PermissionSet> {
        let graph = self.load_graph(start_id).await?;
        let set = propagate(start_id, &graph);
        debug!(reachable = set.len(), "propagated permissions");
        Ok(set)
    }

    /// Fetches the sub-graph reachable from `start_id`.
    pub async fn load_graph(&self, start_id: &str) -> DomainResult<PermissionGraph> {
        let mut graph = PermissionGraph::new();
        let mut fetched: HashSet<String> = HashSet::new();
        fetched.insert(start_id.to_string());
        let mut frontier = vec![start_id.to_string()];
        let mut rounds = 0u32;

        while !frontier.is_empty() {
            rounds += 1;
            let edges = self
                .edge_reader
                .find_edges(&EdgeQuery::from_sources(frontier))
                .await?;

            let mut next = Vec::new();
            for edge in &edges {
                if !edge.mask.is_empty() && fetched.insert(edge.target_id.clone()) {
                    next.push(edge.target_id.clone());
                }
            }
            graph.extend(edges);
            frontier = next;
        }

        debug!(
            start_id,
            rounds,
            edges = graph.edge_count(),
            "loaded permission sub-graph"
        );
        Ok(graph)
    }

    /// Fetches every permission edge in one query.
    pub async fn load_full_graph(&self) -> DomainResult<PermissionGraph> {
        let edges = self.edge_reader.find_edges(&EdgeQuery::all()).await?;
        let graph = PermissionGraph::from_edges(edges);
        debug!(edges = graph.edge_count(), "loaded full permission graph");
        Ok(graph)
    }
}

#[cfg(test)]
pub(crate) mod tests;
