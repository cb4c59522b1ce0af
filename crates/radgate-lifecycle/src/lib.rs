//! Session lifecycle management
//!
//! The background half of radgate: the expiry and grace-period sweeps,
//! the disconnect dispatcher that turns lifecycle decisions into NAS
//! commands with bounded retry, and the provisioning operations a
//! billing front end drives. The hot RADIUS path never blocks on any
//! of this; sweeps tick on their own tasks and disconnect commands are
//! fire-and-track.

#![warn(missing_docs)]

pub mod dispatch;
pub mod grace;
pub mod reconnect;
pub mod sweep;

pub use dispatch::{DisconnectDispatcher, DisconnectReason, DispatchStats, RetryPolicy};
pub use grace::{GraceReport, GraceSweep};
pub use reconnect::{PlanSpec, Provisioner};
pub use sweep::{ExpirySweep, SweepReport};

use radgate_common::{EventBus, LifecycleConfig};
use radgate_nas::NasDirectory;
use radgate_store::{StoreError, StoreRoot};
use radgate_tenant::{IdentityResolver, TenantRegistry};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Lifecycle-layer failures
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The named partition does not exist or is unavailable
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the background tasks and the dispatcher they share
pub struct LifecycleManager {
    /// Shared disconnect dispatcher
    pub dispatcher: Arc<DisconnectDispatcher>,
    /// Provisioning operations
    pub provisioner: Arc<Provisioner>,
    expiry: Arc<ExpirySweep>,
    grace: Arc<GraceSweep>,
}

impl LifecycleManager {
    /// Wire the lifecycle layer from configuration
    pub fn new(
        config: &LifecycleConfig,
        registry: Arc<TenantRegistry>,
        root: Arc<StoreRoot>,
        resolver: Arc<IdentityResolver>,
        nas: Arc<NasDirectory>,
        events: EventBus,
    ) -> Self {
        let policy = RetryPolicy {
            max_attempts: config.disconnect_attempts,
            base: Duration::from_secs(config.backoff_base_secs),
            cap: Duration::from_secs(config.backoff_cap_secs),
        };
        let dispatcher = Arc::new(DisconnectDispatcher::new(
            root.clone(),
            nas.clone(),
            events.clone(),
            policy,
            config.max_inflight_commands,
        ));
        let expiry = Arc::new(ExpirySweep::new(
            registry.clone(),
            root.clone(),
            dispatcher.clone(),
            Duration::from_secs(config.expiry_sweep_secs),
            Duration::from_secs(config.tenant_budget_secs),
            Duration::from_secs(config.tenant_lease_secs),
        ));
        let grace = Arc::new(GraceSweep::new(
            registry,
            root.clone(),
            dispatcher.clone(),
            events,
            Duration::from_secs(config.grace_sweep_secs),
        ));
        let provisioner = Arc::new(Provisioner::new(root, resolver, nas));
        Self {
            dispatcher,
            provisioner,
            expiry,
            grace,
        }
    }

    /// Spawn the sweep loops; returns their task handles
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.expiry.clone().run()),
            tokio::spawn(self.grace.clone().run()),
        ]
    }
}
