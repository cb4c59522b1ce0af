//! Expiry sweep
//!
//! Periodic pass over every active tenant's sessions: anything past
//! its expected end is marked expired and handed to the dispatcher.
//! Tenants sweep in parallel but never concurrently with themselves
//! (a lease token with a short TTL provides the mutual exclusion,
//! and keeps a wedged sweep from blocking future cycles), and each
//! tenant gets a time budget after which remaining work rolls over to
//! the next tick.

use crate::dispatch::{DisconnectDispatcher, DisconnectReason};
use radgate_store::StoreRoot;
use radgate_tenant::{Tenant, TenantId, TenantRegistry};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome of one sweep cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Tenants actually swept this cycle
    pub tenants_swept: usize,
    /// Tenants skipped because their lease was held
    pub tenants_skipped: usize,
    /// Sessions transitioned to expired
    pub sessions_expired: usize,
    /// Tenants whose budget ran out mid-sweep
    pub budget_exceeded: usize,
}

/// Periodic expiry sweeper
pub struct ExpirySweep {
    registry: Arc<TenantRegistry>,
    root: Arc<StoreRoot>,
    dispatcher: Arc<DisconnectDispatcher>,
    leases: Arc<DashMap<TenantId, Instant>>,
    /// Sweep tick interval
    pub interval: Duration,
    /// Per-tenant time budget
    pub tenant_budget: Duration,
    /// Lease TTL; must exceed the budget
    pub lease_ttl: Duration,
}

impl ExpirySweep {
    /// New sweeper with the given timing
    pub fn new(
        registry: Arc<TenantRegistry>,
        root: Arc<StoreRoot>,
        dispatcher: Arc<DisconnectDispatcher>,
        interval: Duration,
        tenant_budget: Duration,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            root,
            dispatcher,
            leases: Arc::new(DashMap::new()),
            interval,
            tenant_budget,
            lease_ttl,
        }
    }

    /// Run forever on the configured interval
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let report = self.sweep_once().await;
            debug!(?report, "expiry sweep cycle finished");
        }
    }

    /// One sweep cycle across all active tenants
    pub async fn sweep_once(self: &Arc<Self>) -> SweepReport {
        let mut report = SweepReport::default();
        let mut tasks: JoinSet<(TenantId, Option<usize>)> = JoinSet::new();

        for tenant in self.registry.list_active() {
            if !self.try_acquire_lease(&tenant.id) {
                report.tenants_skipped += 1;
                continue;
            }
            let sweeper = self.clone();
            tasks.spawn(async move {
                let result =
                    tokio::time::timeout(sweeper.tenant_budget, sweeper.sweep_tenant(&tenant))
                        .await;
                sweeper.release_lease(&tenant.id);
                match result {
                    Ok(expired) => (tenant.id, Some(expired)),
                    Err(_) => {
                        warn!(tenant_id = %tenant.id, "tenant sweep exceeded its budget; resuming next tick");
                        (tenant.id, None)
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Some(expired))) => {
                    report.tenants_swept += 1;
                    report.sessions_expired += expired;
                }
                Ok((_, None)) => {
                    report.tenants_swept += 1;
                    report.budget_exceeded += 1;
                }
                Err(e) => warn!(error = %e, "tenant sweep task panicked"),
            }
        }
        report
    }

    /// Sweep one tenant, sessions processed sequentially
    async fn sweep_tenant(&self, tenant: &Tenant) -> usize {
        let part = match self.root.partition(&tenant.partition) {
            Ok(part) => part,
            Err(e) => {
                // One tenant's storage failure must not abort the cycle
                warn!(tenant_id = %tenant.id, error = %e, "skipping tenant sweep");
                return 0;
            }
        };

        let now = Utc::now();
        let due = part.sessions.due_for_expiry(now);
        if due.is_empty() {
            return 0;
        }
        info!(tenant_id = %tenant.id, count = due.len(), "found expired sessions");

        let mut expired = 0;
        for session in due {
            if part.sessions.mark_expired(&session.id, now).is_none() {
                continue;
            }
            expired += 1;
            self.dispatcher
                .dispatch(&tenant.partition, &session, DisconnectReason::TimeExpired);
        }
        expired
    }

    fn try_acquire_lease(&self, tenant_id: &TenantId) -> bool {
        let now = Instant::now();
        match self.leases.entry(*tenant_id) {
            dashmap::mapref::entry::Entry::Occupied(mut held) => {
                if now.duration_since(*held.get()) < self.lease_ttl {
                    return false;
                }
                // Stale lease from a stuck sweep; take it over
                held.insert(now);
                true
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    fn release_lease(&self, tenant_id: &TenantId) {
        self.leases.remove(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RetryPolicy;
    use radgate_common::EventBus;
    use radgate_nas::mock::ScriptedNas;
    use radgate_nas::NasDirectory;
    use radgate_store::{DisconnectStatus, SessionStatus};
    use chrono::Duration as ChronoDuration;
    use std::net::Ipv4Addr;

    fn build(nas: Arc<ScriptedNas>) -> (Arc<TenantRegistry>, Arc<StoreRoot>, Arc<ExpirySweep>) {
        let registry = Arc::new(TenantRegistry::new());
        let root = Arc::new(StoreRoot::new());
        let directory = Arc::new(NasDirectory::new());
        directory.register("10.0.0.1".parse().unwrap(), nas);
        let dispatcher = Arc::new(DisconnectDispatcher::new(
            root.clone(),
            directory,
            EventBus::default(),
            RetryPolicy::default(),
            8,
        ));
        let sweep = Arc::new(ExpirySweep::new(
            registry.clone(),
            root.clone(),
            dispatcher,
            Duration::from_secs(60),
            Duration::from_secs(30),
            Duration::from_secs(120),
        ));
        (registry, root, sweep)
    }

    async fn settle() {
        // Let spawned disconnect tasks run to completion
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_sweep_expires_and_disconnects_once() {
        // An over-due active session is expired by one sweep,
        // audited, and the NAS is told exactly once.
        let nas = Arc::new(ScriptedNas::always_ok());
        let (registry, root, sweep) = build(nas.clone());

        let tenant = registry.create("A");
        root.create_partition(&tenant.partition).unwrap();
        let part = root.partition(&tenant.partition).unwrap();
        part.sessions.provision(
            tenant.id,
            "alice",
            "gold",
            Utc::now() - ChronoDuration::minutes(2),
            None,
        );
        part.sessions
            .activate("alice", "sess-1", Ipv4Addr::new(10, 0, 0, 1), None, Utc::now())
            .unwrap();

        let report = sweep.sweep_once().await;
        assert_eq!(report.sessions_expired, 1);
        settle().await;

        let session = part.sessions.get_by_user("alice").unwrap();
        assert_eq!(session.status, SessionStatus::Expired);
        assert_eq!(session.disconnect_status, DisconnectStatus::Done);
        assert_eq!(nas.calls(), 1);

        let audits = part.sessions.disconnections();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].reason, "time expired");

        // A second sweep finds nothing left to do
        let report = sweep.sweep_once().await;
        assert_eq!(report.sessions_expired, 0);
        settle().await;
        assert_eq!(nas.calls(), 1);
    }

    #[tokio::test]
    async fn test_sweep_ignores_live_sessions() {
        let nas = Arc::new(ScriptedNas::always_ok());
        let (registry, root, sweep) = build(nas.clone());

        let tenant = registry.create("A");
        root.create_partition(&tenant.partition).unwrap();
        let part = root.partition(&tenant.partition).unwrap();
        part.sessions.provision(
            tenant.id,
            "bob",
            "gold",
            Utc::now() + ChronoDuration::hours(1),
            None,
        );
        part.sessions
            .activate("bob", "sess-2", Ipv4Addr::new(10, 0, 0, 1), None, Utc::now())
            .unwrap();

        let report = sweep.sweep_once().await;
        assert_eq!(report.sessions_expired, 0);
        assert_eq!(nas.calls(), 0);
    }

    #[tokio::test]
    async fn test_sweep_isolated_per_tenant() {
        // A tenant whose partition is missing must not abort the
        // sweep of other tenants.
        let nas = Arc::new(ScriptedNas::always_ok());
        let (registry, root, sweep) = build(nas.clone());

        let broken = registry.create("Broken");
        // No partition created for `broken`
        let _ = broken;

        let healthy = registry.create("Healthy");
        root.create_partition(&healthy.partition).unwrap();
        let part = root.partition(&healthy.partition).unwrap();
        part.sessions.provision(
            healthy.id,
            "alice",
            "gold",
            Utc::now() - ChronoDuration::minutes(1),
            None,
        );
        part.sessions
            .activate("alice", "sess-3", Ipv4Addr::new(10, 0, 0, 1), None, Utc::now())
            .unwrap();

        let report = sweep.sweep_once().await;
        assert_eq!(report.sessions_expired, 1);
    }

    #[tokio::test]
    async fn test_lease_blocks_concurrent_sweep() {
        let nas = Arc::new(ScriptedNas::always_ok());
        let (registry, _root, sweep) = build(nas);
        let tenant = registry.create("A");

        assert!(sweep.try_acquire_lease(&tenant.id));
        assert!(!sweep.try_acquire_lease(&tenant.id));
        sweep.release_lease(&tenant.id);
        assert!(sweep.try_acquire_lease(&tenant.id));
    }
}
