//! Identity resolution
//!
//! Maps a bare RADIUS username to the partition that owns it. This is
//! the only source of truth for ownership: a username that is missing
//! or inactive resolves to `NotFound` and callers must reject, never
//! fall back to a guessed partition.

use crate::model::{PartitionName, TenantId, UserRole};
use crate::registry::TenantRegistry;
use dashmap::DashMap;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// One username → partition mapping row.
///
/// Created at credential provisioning; deactivated (never deleted) on
/// revocation so historical accounting still resolves.
#[derive(Debug, Clone)]
pub struct IdentityMapping {
    /// RADIUS username, unique platform-wide
    pub username: String,
    /// Owning partition
    pub partition: PartitionName,
    /// Owning tenant; `None` for platform identities
    pub tenant_id: Option<TenantId>,
    /// Role of the identity
    pub role: UserRole,
    /// Whether the identity may authenticate
    pub active: bool,
}

/// Successful resolution result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Partition owning the username
    pub partition: PartitionName,
    /// Owning tenant; `None` for platform identities
    pub tenant_id: Option<TenantId>,
    /// Role of the identity
    pub role: UserRole,
}

/// Resolution errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    /// No active mapping for the username
    #[error("no active partition mapping for username")]
    NotFound,
}

/// Username → partition resolver with a short-TTL cache on the
/// authentication hot path.
pub struct IdentityResolver {
    mappings: DashMap<String, IdentityMapping>,
    cache: Cache<String, Resolution>,
    registry: Arc<TenantRegistry>,
}

impl IdentityResolver {
    /// New resolver; `cache_ttl` should be on the order of seconds
    pub fn new(registry: Arc<TenantRegistry>, cache_ttl: Duration) -> Self {
        Self {
            mappings: DashMap::new(),
            cache: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(cache_ttl)
                .build(),
            registry,
        }
    }

    /// Resolve a username for authentication and accounting.
    ///
    /// Inactive mappings and mappings of suspended tenants are
    /// `NotFound`; callers must treat that as "reject request".
    pub fn resolve(&self, username: &str) -> Result<Resolution, ResolveError> {
        if let Some(hit) = self.cache.get(username) {
            return Ok(hit);
        }

        let mapping = self.mappings.get(username).ok_or(ResolveError::NotFound)?;
        if !mapping.active {
            return Err(ResolveError::NotFound);
        }
        if let Some(tenant_id) = &mapping.tenant_id {
            match self.registry.get(tenant_id) {
                Some(tenant) if tenant.is_serving() => {}
                _ => return Err(ResolveError::NotFound),
            }
        }

        let resolution = Resolution {
            partition: mapping.partition.clone(),
            tenant_id: mapping.tenant_id,
            role: mapping.role,
        };
        self.cache.insert(username.to_string(), resolution.clone());
        Ok(resolution)
    }

    /// Resolve ignoring the active flag, for historical accounting
    /// lookups on revoked identities. Never cached.
    pub fn resolve_any(&self, username: &str) -> Result<Resolution, ResolveError> {
        let mapping = self.mappings.get(username).ok_or(ResolveError::NotFound)?;
        Ok(Resolution {
            partition: mapping.partition.clone(),
            tenant_id: mapping.tenant_id,
            role: mapping.role,
        })
    }

    /// Insert or replace a mapping (credential provisioned)
    pub fn provision(&self, mapping: IdentityMapping) {
        debug!(username = %mapping.username, partition = %mapping.partition, "identity provisioned");
        self.cache.invalidate(&mapping.username);
        self.mappings.insert(mapping.username.clone(), mapping);
    }

    /// Deactivate a mapping (credential revoked). The row stays so
    /// historical accounting can still resolve through `resolve_any`.
    pub fn revoke(&self, username: &str) {
        if let Some(mut mapping) = self.mappings.get_mut(username) {
            mapping.active = false;
            info!(username = %username, "identity revoked");
        }
        self.cache.invalidate(username);
    }
}
