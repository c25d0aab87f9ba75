//! EdgeStore trait definition.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{HealthStatus, StorageError, StorageResult};

/// Link class carried by edges that grant capabilities.
pub const PERMISSION_LINK_CLASS: &str = "permission";

/// Maximum length accepted for a source or target identifier.
pub const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Filter for finding edges.
///
/// Every `Some` field narrows the result; `None` matches anything.
/// An empty list matches nothing.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    /// Edge source must be one of these identifiers.
    pub source_in: Option<Vec<String>>,
    /// Edge target must be one of these identifiers.
    pub target_in: Option<Vec<String>>,
    /// Edge name must be one of these (e.g. `can_read`).
    pub name_in: Option<Vec<String>>,
    /// Edge link class must equal this value.
    pub link_class: Option<String>,
}

impl EdgeFilter {
    /// Filter matching every permission-class edge.
    pub fn permissions() -> Self {
        Self {
            link_class: Some(PERMISSION_LINK_CLASS.to_string()),
            ..Default::default()
        }
    }

    /// Restricts the filter to the given sources.
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_in = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts the filter to the given targets.
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_in = Some(targets.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts the filter to the given edge names.
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.name_in = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Returns true if the edge satisfies every constraint of this filter.
    pub fn matches(&self, edge: &StoredEdge) -> bool {
        self.source_in
            .as_ref()
            .map_or(true, |s| s.iter().any(|id| id == &edge.source_id))
            && self
                .target_in
                .as_ref()
                .map_or(true, |t| t.iter().any(|id| id == &edge.target_id))
            && self
                .name_in
                .as_ref()
                .map_or(true, |n| n.iter().any(|name| name == &edge.name))
            && self
                .link_class
                .as_ref()
                .map_or(true, |c| c == &edge.link_class)
    }
}

/// A stored edge.
///
/// `source_id` holds `name` on everything owned by or reachable through
/// `target_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredEdge {
    pub source_id: String,
    pub target_id: String,
    pub name: String,
    #[serde(default = "default_link_class")]
    pub link_class: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_link_class() -> String {
    PERMISSION_LINK_CLASS.to_string()
}

impl StoredEdge {
    /// Creates a permission-class edge without properties.
    pub fn permission(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            name: name.into(),
            link_class: default_link_class(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a property to the edge.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Abstract storage interface for permission edges.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations.
#[async_trait]
pub trait EdgeStore: Send + Sync + 'static {
    /// Writes edges to storage (insert and delete). Both are idempotent.
    async fn write_edges(
        &self,
        writes: Vec<StoredEdge>,
        deletes: Vec<StoredEdge>,
    ) -> StorageResult<()>;

    /// Finds edges matching the filter.
    async fn find_edges(&self, filter: &EdgeFilter) -> StorageResult<Vec<StoredEdge>>;

    /// Writes a single edge.
    async fn write_edge(&self, edge: StoredEdge) -> StorageResult<()> {
        self.write_edges(vec![edge], vec![]).await
    }

    /// Deletes a single edge.
    async fn delete_edge(&self, edge: StoredEdge) -> StorageResult<()> {
        self.write_edges(vec![], vec![edge]).await
    }

    /// Reports backend health.
    async fn health_check(&self) -> StorageResult<HealthStatus>;
}

/// Validates a source or target identifier.
pub fn validate_identifier(field: &str, value: &str) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::InvalidInput {
            message: format!("{field} cannot be empty"),
        });
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!(
                "{field} exceeds maximum length of {MAX_IDENTIFIER_LENGTH} characters"
            ),
        });
    }
    Ok(())
}

/// Validates an edge before it is written.
pub fn validate_edge(edge: &StoredEdge) -> StorageResult<()> {
    validate_identifier("source_id", &edge.source_id)?;
    validate_identifier("target_id", &edge.target_id)?;
    if edge.name.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "name cannot be empty".to_string(),
        });
    }
    if edge.link_class.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "link_class cannot be empty".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_matches_everything() {
        let edge = StoredEdge::permission("user:u1", "group:g1", "can_read");
        assert!(EdgeFilter::default().matches(&edge));
    }

    #[test]
    fn test_filter_requires_all_constraints() {
        let edge = StoredEdge::permission("user:u1", "group:g1", "can_read");

        let filter = EdgeFilter::permissions()
            .with_sources(["user:u1"])
            .with_names(["can_read", "can_write"]);
        assert!(filter.matches(&edge));

        let filter = filter.with_targets(["group:other"]);
        assert!(!filter.matches(&edge));
    }

    #[test]
    fn test_empty_list_matches_nothing() {
        let edge = StoredEdge::permission("user:u1", "group:g1", "can_read");
        let filter = EdgeFilter::default().with_sources(Vec::<String>::new());
        assert!(!filter.matches(&edge));
    }

    #[test]
    fn test_non_permission_class_is_filtered_out() {
        let mut edge = StoredEdge::permission("user:u1", "group:g1", "can_read");
        edge.link_class = "signature".to_string();
        assert!(!EdgeFilter::permissions().matches(&edge));
    }

    #[test]
    fn test_validate_edge_rejects_empty_fields() {
        assert!(validate_edge(&StoredEdge::permission("", "g", "can_read")).is_err());
        assert!(validate_edge(&StoredEdge::permission("u", "", "can_read")).is_err());
        assert!(validate_edge(&StoredEdge::permission("u", "g", "")).is_err());
        assert!(validate_edge(&StoredEdge::permission("u", "g", "can_read")).is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_oversized_values() {
        let long = "x".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let err = validate_identifier("source_id", &long).unwrap_err();
        assert!(err.to_string().contains("maximum length"));
    }
}
