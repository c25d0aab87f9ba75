//! Adjacency graph and the mask-narrowing traversal.

use std::collections::{HashMap, HashSet};

use crate::model::{CapabilityMask, PermissionEdge, PermissionSet};

/// Outgoing edges of a node: (head, mask).
type Adjacent = [(String, CapabilityMask)];

/// Adjacency structure `source -> [(target, mask)]`.
#[derive(Debug, Clone, Default)]
pub struct PermissionGraph {
    adjacency: HashMap<String, Vec<(String, CapabilityMask)>>,
    edge_count: usize,
}

impl PermissionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from edges. Edges that grant nothing are skipped.
    pub fn from_edges(edges: impl IntoIterator<Item = PermissionEdge>) -> Self {
        let mut graph = Self::new();
        graph.extend(edges);
        graph
    }

    /// Adds a directed edge. Parallel edges between the same pair are kept.
    pub fn add_edge(
        &mut self,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        mask: CapabilityMask,
    ) {
        self.adjacency
            .entry(source_id.into())
            .or_default()
            .push((target_id.into(), mask));
        self.edge_count += 1;
    }

    pub fn extend(&mut self, edges: impl IntoIterator<Item = PermissionEdge>) {
        for edge in edges {
            if edge.mask.is_empty() {
                continue;
            }
            self.add_edge(edge.source_id, edge.target_id, edge.mask);
        }
    }

    /// Outgoing edges of `id` (empty if none).
    pub fn edges_from(&self, id: &str) -> &Adjacent {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids with at least one outgoing edge.
    pub fn sources(&self) -> impl Iterator<Item = &String> {
        self.adjacency.keys()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count == 0
    }

    /// Node key and outgoing edges, borrowed from the graph, if `id` has any.
    fn expandable(&self, id: &str) -> Option<(&str, &Adjacent)> {
        self.adjacency
            .get_key_value(id)
            .filter(|(_, edges)| !edges.is_empty())
            .map(|(key, edges)| (key.as_str(), edges.as_slice()))
    }
}

/// One node being expanded on the current path.
struct Frame<'g> {
    node: &'g str,
    upstream: CapabilityMask,
    edges: &'g Adjacent,
    next: usize,
}

/// Computes the permission set reachable from `start_id`.
///
/// Depth-first over `graph`. Each capability flows to a head only if it is
/// still held upstream; across sibling edges to the same head capabilities
/// are unioned. What continues below a head is the upstream mask narrowed by
/// the head's merged mask. A node already on the current path is not
/// re-expanded, but the guard is path-local, so the same node reached again
/// through a different branch is explored again.
///
/// Uses an explicit stack, so chain depth is bounded by memory rather than
/// by the thread stack.
pub fn propagate(start_id: &str, graph: &PermissionGraph) -> PermissionSet {
    let mut merged: HashMap<String, CapabilityMask> = HashMap::new();
    merged.insert(start_id.to_string(), CapabilityMask::FULL);

    let mut on_path: HashSet<&str> = HashSet::new();
    let mut stack: Vec<Frame<'_>> = Vec::new();

    if let Some((node, edges)) = graph.expandable(start_id) {
        on_path.insert(node);
        stack.push(Frame {
            node,
            upstream: CapabilityMask::FULL,
            edges,
            next: 0,
        });
    }

    while let Some(frame) = stack.last_mut() {
        let edges = frame.edges;
        let Some((head, edge_mask)) = edges.get(frame.next) else {
            on_path.remove(frame.node);
            stack.pop();
            continue;
        };
        frame.next += 1;
        let upstream = frame.upstream;

        let held = merged.entry(head.clone()).or_default();
        if upstream.read {
            held.read |= edge_mask.read;
        }
        if upstream.write {
            held.write |= edge_mask.write;
        }
        if upstream.manage {
            held.manage |= edge_mask.manage;
        }
        let narrowed = upstream.intersect(held);

        if let Some((node, edges)) = graph.expandable(head) {
            if on_path.insert(node) {
                stack.push(Frame {
                    node,
                    upstream: narrowed,
                    edges,
                    next: 0,
                });
            }
        }
    }

    PermissionSet::from_grants(start_id, merged)
}
