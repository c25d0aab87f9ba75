//! Traits for edge storage operations needed by the propagation engine
//! and the authorization fallback.

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::model::PermissionEdge;

/// Query over permission-class edges.
///
/// `None` fields match anything. Only edges of the permission link class are
/// ever returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeQuery {
    /// Edge source must be one of these ids.
    pub source_in: Option<Vec<String>>,
    /// Edge target must be one of these ids.
    pub target_in: Option<Vec<String>>,
    /// Edge grant name must be one of these (`can_read`, ...).
    pub grant_in: Option<Vec<String>>,
}

impl EdgeQuery {
    /// Every permission edge.
    pub fn all() -> Self {
        Self::default()
    }

    /// Edges leaving any of `sources`.
    pub fn from_sources(sources: Vec<String>) -> Self {
        Self {
            source_in: Some(sources),
            ..Default::default()
        }
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.target_in = Some(targets);
        self
    }

    pub fn with_grants<I, S>(mut self, grants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grant_in = Some(grants.into_iter().map(Into::into).collect());
        self
    }
}

/// Read access to permission edges.
#[async_trait]
pub trait EdgeReader: Send + Sync {
    /// Finds the permission edges matching `query`.
    async fn find_edges(&self, query: &EdgeQuery) -> DomainResult<Vec<PermissionEdge>>;

    /// Returns true if at least one edge matches `query`.
    ///
    /// Backends that can answer existence cheaper than a full fetch should
    /// override this.
    async fn any_edge(&self, query: &EdgeQuery) -> DomainResult<bool> {
        Ok(!self.find_edges(query).await?.is_empty())
    }
}
