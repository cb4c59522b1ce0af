//! Tenant registry

use crate::model::{PartitionName, Tenant, TenantId, TenantStatus};
use dashmap::DashMap;
use tracing::info;

/// Registry of all tenants, keyed by id with a partition index.
///
/// Read-mostly: the hot auth path only calls [`TenantRegistry::get`].
pub struct TenantRegistry {
    tenants: DashMap<TenantId, Tenant>,
    by_partition: DashMap<PartitionName, TenantId>,
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No such tenant
    #[error("tenant not found")]
    NotFound,
}

impl TenantRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            tenants: DashMap::new(),
            by_partition: DashMap::new(),
        }
    }

    /// Onboard a new tenant. The partition name is derived once here
    /// and never changes afterwards.
    pub fn create(&self, name: &str) -> Tenant {
        let tenant = Tenant::new(name);
        info!(tenant_id = %tenant.id, partition = %tenant.partition, "tenant created");
        self.by_partition.insert(tenant.partition.clone(), tenant.id);
        self.tenants.insert(tenant.id, tenant.clone());
        tenant
    }

    /// Get a tenant by id
    pub fn get(&self, tenant_id: &TenantId) -> Option<Tenant> {
        self.tenants.get(tenant_id).map(|t| t.clone())
    }

    /// Get a tenant by its partition name
    pub fn get_by_partition(&self, partition: &PartitionName) -> Option<Tenant> {
        let id = *self.by_partition.get(partition)?;
        self.get(&id)
    }

    /// Suspend a tenant; its identities stop resolving
    pub fn suspend(&self, tenant_id: &TenantId) -> Result<(), RegistryError> {
        let mut tenant = self.tenants.get_mut(tenant_id).ok_or(RegistryError::NotFound)?;
        tenant.status = TenantStatus::Suspended;
        info!(tenant_id = %tenant_id, "tenant suspended");
        Ok(())
    }

    /// Reactivate a suspended tenant
    pub fn reactivate(&self, tenant_id: &TenantId) -> Result<(), RegistryError> {
        let mut tenant = self.tenants.get_mut(tenant_id).ok_or(RegistryError::NotFound)?;
        tenant.status = TenantStatus::Active;
        info!(tenant_id = %tenant_id, "tenant reactivated");
        Ok(())
    }

    /// All tenants currently serving subscribers
    pub fn list_active(&self) -> Vec<Tenant> {
        self.tenants
            .iter()
            .filter(|t| t.is_serving())
            .map(|t| t.clone())
            .collect()
    }

    /// Total tenant count
    pub fn count(&self) -> usize {
        self.tenants.len()
    }
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}
