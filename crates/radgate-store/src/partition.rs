//! Store root and per-partition handles

use crate::accounting::{AccountingStore, NasEventLog};
use crate::credentials::CredentialStore;
use crate::postauth::PostAuthStore;
use crate::sessions::SessionStore;
use crate::subscriptions::SubscriptionStore;
use dashmap::DashMap;
use radgate_tenant::PartitionName;
use std::sync::Arc;
use tracing::info;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Partition does not exist or is unreachable
    #[error("partition unavailable: {0}")]
    PartitionUnavailable(String),
    /// Partition already exists
    #[error("partition already exists: {0}")]
    PartitionExists(String),
}

/// All tables belonging to one tenant partition.
///
/// Handles to this struct are the only way to reach tenant data; the
/// struct itself holds no references to other partitions.
pub struct PartitionStore {
    /// Partition this store belongs to
    pub name: PartitionName,
    /// Check- and reply-item tables
    pub credentials: CredentialStore,
    /// Accounting records
    pub accounting: AccountingStore,
    /// Post-auth decision log
    pub postauth: PostAuthStore,
    /// Business-level sessions and disconnection audit
    pub sessions: SessionStore,
    /// Subscriptions with grace-period state
    pub subscriptions: SubscriptionStore,
}

impl PartitionStore {
    fn new(name: PartitionName) -> Self {
        Self {
            name,
            credentials: CredentialStore::new(),
            accounting: AccountingStore::new(),
            postauth: PostAuthStore::new(),
            sessions: SessionStore::new(),
            subscriptions: SubscriptionStore::new(),
        }
    }
}

/// Root of all storage: partition handles plus the platform-level
/// tables (NAS event log, unresolved post-auth log).
pub struct StoreRoot {
    partitions: DashMap<PartitionName, Arc<PartitionStore>>,
    /// NAS Accounting-On/Off events, not partition-scoped
    pub nas_events: NasEventLog,
    /// Post-auth log for usernames that resolved to no partition
    pub platform_postauth: PostAuthStore,
}

impl StoreRoot {
    /// Empty root with a pre-created platform partition
    pub fn new() -> Self {
        let root = Self {
            partitions: DashMap::new(),
            nas_events: NasEventLog::new(),
            platform_postauth: PostAuthStore::new(),
        };
        root.partitions.insert(
            PartitionName::platform(),
            Arc::new(PartitionStore::new(PartitionName::platform())),
        );
        root
    }

    /// Create a tenant partition at onboarding
    pub fn create_partition(&self, name: &PartitionName) -> Result<(), StoreError> {
        if self.partitions.contains_key(name) {
            return Err(StoreError::PartitionExists(name.to_string()));
        }
        info!(partition = %name, "partition created");
        self.partitions
            .insert(name.clone(), Arc::new(PartitionStore::new(name.clone())));
        Ok(())
    }

    /// Explicit partition handle. The only entry point to tenant data.
    pub fn partition(&self, name: &PartitionName) -> Result<Arc<PartitionStore>, StoreError> {
        self.partitions
            .get(name)
            .map(|p| p.clone())
            .ok_or_else(|| StoreError::PartitionUnavailable(name.to_string()))
    }
}

impl Default for StoreRoot {
    fn default() -> Self {
        Self::new()
    }
}
