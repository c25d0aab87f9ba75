//! Authorization decisions over cached permissions.
//!
//! `can` answers whether a principal may perform every requested
//! `(action, target)` pair. Each pair is checked in order, cheapest first:
//!
//! 1. Admins may do anything.
//! 2. A principal may act on itself.
//! 3. The cached permission set grants the action on the target.
//! 4. The target's owner is the principal, or the cached set grants the
//!    action on the owner.
//! 5. A live edge lookup finds a sufficient grant from the principal, or
//!    from a group it holds the action on, directly to the target.
//!
//! The live lookup closes the window in which the cache lags behind an edge
//! that was just written.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::cache::{CacheStore, MokaCacheStore, PermissionCache};
use crate::error::DomainResult;
use crate::model::{AccessRequest, Action, PermissionSet, Principal};
use crate::propagation::{EdgeQuery, EdgeReader};

/// Configuration for the authorizer.
#[derive(Debug, Clone, Default)]
pub struct AuthorizerConfig {
    /// Group whose read grants apply to every principal in the live lookup.
    pub anonymous_group_id: Option<String>,
}

impl AuthorizerConfig {
    pub fn with_anonymous_group(mut self, group_id: impl Into<String>) -> Self {
        self.anonymous_group_id = Some(group_id.into());
        self
    }
}

/// Answers authorization requests for principals.
pub struct Authorizer<E, S = MokaCacheStore> {
    cache: Arc<PermissionCache<E, S>>,
    edge_reader: Arc<E>,
    config: AuthorizerConfig,
}

impl<E, S> Authorizer<E, S>
where
    E: EdgeReader + 'static,
    S: CacheStore + 'static,
{
    pub fn new(
        cache: Arc<PermissionCache<E, S>>,
        edge_reader: Arc<E>,
        config: AuthorizerConfig,
    ) -> Self {
        Self {
            cache,
            edge_reader,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<PermissionCache<E, S>> {
        &self.cache
    }

    /// Returns true only if every request is allowed.
    ///
    /// An `Err` means a decision could not be made; callers must deny.
    #[instrument(skip(self, requests), fields(principal_id = %principal.id, requests = requests.len()))]
    pub async fn can(&self, principal: &Principal, requests: &[AccessRequest]) -> DomainResult<bool> {
        if principal.is_admin {
            return Ok(true);
        }

        // Fetched on first need, at most once per call.
        let mut cached: Option<PermissionSet> = None;

        for request in requests {
            if !self.allows(principal, request, &mut cached).await? {
                debug!(
                    action = %request.action,
                    target_id = request.target.identifier(),
                    "denied"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn allows(
        &self,
        principal: &Principal,
        request: &AccessRequest,
        cached: &mut Option<PermissionSet>,
    ) -> DomainResult<bool> {
        let action = &request.action;
        let target_id = request.target.identifier();
        let owner_id = request.target.owner();

        if target_id == principal.id {
            return Ok(true);
        }

        let perms = match cached.take() {
            Some(perms) => perms,
            None => self.cache.get(&principal.id).await?,
        };
        let perms = cached.insert(perms);

        if perms.grants(target_id, action) {
            return Ok(true);
        }
        if owner_id == Some(principal.id.as_str()) {
            return Ok(true);
        }
        if owner_id.is_some_and(|owner| perms.grants(owner, action)) {
            return Ok(true);
        }

        self.live_edge_exists(principal, action, target_id, perms)
            .await
    }

    /// Looks for a sufficient grant written after `perms` was computed.
    async fn live_edge_exists(
        &self,
        principal: &Principal,
        action: &Action,
        target_id: &str,
        perms: &PermissionSet,
    ) -> DomainResult<bool> {
        let Some(grants) = action.sufficient_grants() else {
            return Ok(false);
        };

        let mut sources = perms.groups_with(action);
        sources.push(principal.id.clone());
        if *action == Action::Read {
            if let Some(anonymous) = &self.config.anonymous_group_id {
                sources.push(anonymous.clone());
            }
        }

        let query = EdgeQuery::from_sources(sources)
            .with_targets(vec![target_id.to_string()])
            .with_grants(grants.iter().copied());
        self.edge_reader.any_edge(&query).await
    }
}
