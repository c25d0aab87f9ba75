//! Core type definitions: edges, permission sets, principals and targets.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::mask::{Action, CapabilityMask};

/// A directed permission edge.
///
/// `source_id` holds `mask` on everything owned by or reachable through
/// `target_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionEdge {
    pub source_id: String,
    pub target_id: String,
    pub mask: CapabilityMask,
    pub properties: BTreeMap<String, String>,
}

impl PermissionEdge {
    /// Creates an edge without properties.
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        mask: CapabilityMask,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            mask,
            properties: BTreeMap::new(),
        }
    }

    /// Creates an edge whose mask is derived from a grant name
    /// (`can_read`, `can_write`, `can_manage`).
    pub fn from_grant_name(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        name: &str,
    ) -> Self {
        Self::new(source_id, target_id, CapabilityMask::from_grant_name(name))
    }
}

/// The propagated permissions of one principal: reachable id -> mask.
///
/// Always contains the principal itself with the full mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    principal_id: String,
    grants: HashMap<String, CapabilityMask>,
}

impl PermissionSet {
    /// Creates a set holding only the self-grant.
    pub fn new(principal_id: impl Into<String>) -> Self {
        let principal_id = principal_id.into();
        let mut grants = HashMap::new();
        grants.insert(principal_id.clone(), CapabilityMask::FULL);
        Self {
            principal_id,
            grants,
        }
    }

    /// Builds a set from a computed map. The self-grant is (re)asserted.
    pub fn from_grants(
        principal_id: impl Into<String>,
        mut grants: HashMap<String, CapabilityMask>,
    ) -> Self {
        let principal_id = principal_id.into();
        grants.insert(principal_id.clone(), CapabilityMask::FULL);
        Self {
            principal_id,
            grants,
        }
    }

    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    /// Mask held on `id`, if `id` is reachable.
    pub fn get(&self, id: &str) -> Option<&CapabilityMask> {
        self.grants.get(id)
    }

    /// Whether the set grants `action` on `id`.
    pub fn grants(&self, id: &str, action: &Action) -> bool {
        self.grants.get(id).is_some_and(|mask| mask.grants(action))
    }

    /// Ids on which the set grants `action`, sorted.
    pub fn groups_with(&self, action: &Action) -> Vec<String> {
        let mut ids: Vec<String> = self
            .grants
            .iter()
            .filter(|(_, mask)| mask.grants(action))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CapabilityMask)> {
        self.grants.iter()
    }
}

/// The actor an authorization decision is made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub is_admin: bool,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: false,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: true,
        }
    }
}

/// What an action is requested on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A bare identifier, treated as resolved and ownerless.
    Id(String),
    /// An object that exposes its identifier and possibly an owner.
    Object {
        id: String,
        owner_id: Option<String>,
    },
}

impl Target {
    pub fn id(id: impl Into<String>) -> Self {
        Target::Id(id.into())
    }

    pub fn owned_by(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Target::Object {
            id: id.into(),
            owner_id: Some(owner_id.into()),
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            Target::Id(id) | Target::Object { id, .. } => id,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            Target::Id(_) => None,
            Target::Object { owner_id, .. } => owner_id.as_deref(),
        }
    }
}

/// One (action, target) pair of an authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub action: Action,
    pub target: Target,
}

impl AccessRequest {
    pub fn new(action: impl Into<Action>, target: Target) -> Self {
        Self {
            action: action.into(),
            target,
        }
    }
}

impl From<(Action, Target)> for AccessRequest {
    fn from((action, target): (Action, Target)) -> Self {
        Self { action, target }
    }
}
