//! Tenant data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant ID
pub type TenantId = Uuid;

/// Reserved partition for platform-level administrative identities
/// and NAS events that are not owned by any tenant.
pub const PLATFORM_PARTITION: &str = "platform";

/// Stable name of a tenant's isolated data partition.
///
/// Immutable after creation: there is deliberately no rename or
/// migrate operation, and names are never reused across tenants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionName(String);

impl PartitionName {
    /// Derive a fresh partition name for a tenant
    pub fn for_tenant(tenant_id: &TenantId) -> Self {
        Self(format!("tenant_{}", &tenant_id.simple().to_string()[..12]))
    }

    /// The platform partition
    pub fn platform() -> Self {
        Self(PLATFORM_PARTITION.to_string())
    }

    /// Name as a str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantStatus {
    /// Serving subscribers
    Active,
    /// Temporarily disabled; identities stop resolving
    Suspended,
}

/// A tenant and its partition bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique tenant ID
    pub id: TenantId,
    /// Display name
    pub name: String,
    /// Isolated data partition owned by this tenant
    pub partition: PartitionName,
    /// Lifecycle status
    pub status: TenantStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a new tenant with a fresh partition name
    pub fn new(name: &str) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            name: name.to_string(),
            partition: PartitionName::for_tenant(&id),
            status: TenantStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Whether identities of this tenant may authenticate
    pub fn is_serving(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

/// Role attached to an identity mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    /// Ordinary subscriber
    Subscriber,
    /// Tenant operator
    Operator,
    /// Platform administrator (resolves to the platform partition)
    PlatformAdmin,
}
