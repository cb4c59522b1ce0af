//! Payment grace-period sweep
//!
//! Hourly pass over every tenant's past-due subscriptions. Subscribers
//! approaching the end of their grace window get a warning event at
//! two days and again at one day remaining; once the window closes the
//! subscription is suspended and any live session is torn down.

use crate::dispatch::{DisconnectDispatcher, DisconnectReason};
use radgate_common::{EventBus, OutboundEvent};
use radgate_store::{SessionStatus, StoreRoot, Subscription};
use radgate_tenant::{Tenant, TenantRegistry};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Days-remaining thresholds that trigger a warning
const WARN_DAYS: [i64; 2] = [2, 1];

/// Outcome of one grace sweep cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GraceReport {
    /// Warning events emitted
    pub warned: usize,
    /// Subscriptions suspended
    pub suspended: usize,
    /// Live sessions handed to the dispatcher
    pub disconnected: usize,
}

/// Periodic grace-period sweeper
pub struct GraceSweep {
    registry: Arc<TenantRegistry>,
    root: Arc<StoreRoot>,
    dispatcher: Arc<DisconnectDispatcher>,
    events: EventBus,
    /// Sweep tick interval
    pub interval: Duration,
}

impl GraceSweep {
    /// Sweeper over all active tenants on the given tick interval
    pub fn new(
        registry: Arc<TenantRegistry>,
        root: Arc<StoreRoot>,
        dispatcher: Arc<DisconnectDispatcher>,
        events: EventBus,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            root,
            dispatcher,
            events,
            interval,
        }
    }

    /// Run forever on the configured interval
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let report = self.sweep_once(Utc::now());
            debug!(?report, "grace sweep cycle finished");
        }
    }

    /// One sweep cycle across all active tenants
    pub fn sweep_once(&self, now: DateTime<Utc>) -> GraceReport {
        let mut report = GraceReport::default();
        for tenant in self.registry.list_active() {
            self.sweep_tenant(&tenant, now, &mut report);
        }
        report
    }

    fn sweep_tenant(&self, tenant: &Tenant, now: DateTime<Utc>, report: &mut GraceReport) {
        let part = match self.root.partition(&tenant.partition) {
            Ok(part) => part,
            Err(e) => {
                warn!(tenant_id = %tenant.id, error = %e, "skipping grace sweep for tenant");
                return;
            }
        };

        for sub in part.subscriptions.in_grace() {
            let Some(grace_end) = sub.grace_period_ends_at else {
                continue;
            };
            if grace_end <= now {
                continue; // expired; handled below
            }
            if let Some(days) = due_warning(&sub, grace_end, now) {
                part.subscriptions.mark_warned(&sub.username, days);
                self.events.emit(OutboundEvent::GracePeriodWarning {
                    tenant_id: tenant.id,
                    username: sub.username.clone(),
                    days_remaining: days,
                });
                info!(
                    tenant_id = %tenant.id,
                    username = %sub.username,
                    days_remaining = days,
                    "grace period warning sent"
                );
                report.warned += 1;
            }
        }

        for sub in part.subscriptions.grace_expired(now) {
            part.subscriptions.suspend(&sub.username);
            report.suspended += 1;
            info!(
                tenant_id = %tenant.id,
                username = %sub.username,
                "grace period over, suspending service"
            );
            if let Some(session) = part.sessions.get_by_user(&sub.username) {
                if session.status == SessionStatus::Active {
                    self.dispatcher.dispatch(
                        &tenant.partition,
                        &session,
                        DisconnectReason::GracePeriodExpired,
                    );
                    report.disconnected += 1;
                }
            }
        }
    }
}

/// A warning is due when days-remaining first reaches a threshold that
/// has not been warned for yet. `last_warned_days` makes the hourly
/// sweep idempotent per threshold.
fn due_warning(sub: &Subscription, grace_end: DateTime<Utc>, now: DateTime<Utc>) -> Option<i64> {
    let days_remaining = (grace_end - now).num_days();
    if !WARN_DAYS.contains(&days_remaining) {
        return None;
    }
    match sub.last_warned_days {
        Some(warned) if warned <= days_remaining => None,
        _ => Some(days_remaining),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RetryPolicy;
    use radgate_nas::mock::ScriptedNas;
    use radgate_nas::NasDirectory;
    use radgate_store::DisconnectStatus;
    use chrono::Duration as ChronoDuration;
    use std::net::Ipv4Addr;

    fn build(
        nas: Arc<ScriptedNas>,
    ) -> (Arc<TenantRegistry>, Arc<StoreRoot>, Arc<GraceSweep>, EventBus) {
        let registry = Arc::new(TenantRegistry::new());
        let root = Arc::new(StoreRoot::new());
        let directory = Arc::new(NasDirectory::new());
        directory.register("10.0.0.1".parse().unwrap(), nas);
        let events = EventBus::default();
        let dispatcher = Arc::new(DisconnectDispatcher::new(
            root.clone(),
            directory,
            events.clone(),
            RetryPolicy::default(),
            8,
        ));
        let sweep = Arc::new(GraceSweep::new(
            registry.clone(),
            root.clone(),
            dispatcher,
            events.clone(),
            Duration::from_secs(3600),
        ));
        (registry, root, sweep, events)
    }

    #[tokio::test]
    async fn test_warns_once_per_threshold() {
        let nas = Arc::new(ScriptedNas::always_ok());
        let (registry, root, sweep, events) = build(nas);
        let mut rx = events.subscribe();

        let tenant = registry.create("A");
        root.create_partition(&tenant.partition).unwrap();
        let part = root.partition(&tenant.partition).unwrap();

        let now = Utc::now();
        part.subscriptions.create("alice", "gold", now - ChronoDuration::days(1));
        part.subscriptions
            .enter_grace("alice", now + ChronoDuration::days(2) + ChronoDuration::hours(6));

        // Two days remaining: one warning
        let report = sweep.sweep_once(now);
        assert_eq!(report.warned, 1);
        match rx.try_recv().unwrap() {
            OutboundEvent::GracePeriodWarning { days_remaining, .. } => {
                assert_eq!(days_remaining, 2)
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Re-running within the same day stays quiet
        let report = sweep.sweep_once(now + ChronoDuration::hours(1));
        assert_eq!(report.warned, 0);

        // One day remaining: the second warning fires
        let report = sweep.sweep_once(now + ChronoDuration::days(1) + ChronoDuration::hours(1));
        assert_eq!(report.warned, 1);
        match rx.try_recv().unwrap() {
            OutboundEvent::GracePeriodWarning { days_remaining, .. } => {
                assert_eq!(days_remaining, 1)
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_expiry_suspends_and_disconnects() {
        let nas = Arc::new(ScriptedNas::always_ok());
        let (registry, root, sweep, _events) = build(nas.clone());

        let tenant = registry.create("A");
        root.create_partition(&tenant.partition).unwrap();
        let part = root.partition(&tenant.partition).unwrap();

        let now = Utc::now();
        part.subscriptions.create("alice", "gold", now - ChronoDuration::days(4));
        part.subscriptions.enter_grace("alice", now - ChronoDuration::hours(1));
        part.sessions.provision(
            tenant.id,
            "alice",
            "gold",
            now + ChronoDuration::days(30),
            None,
        );
        part.sessions
            .activate("alice", "sess-1", Ipv4Addr::new(10, 0, 0, 1), None, now)
            .unwrap();

        let report = sweep.sweep_once(now);
        assert_eq!(report.suspended, 1);
        assert_eq!(report.disconnected, 1);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let sub = part.subscriptions.get("alice").unwrap();
        assert_eq!(sub.status, radgate_store::SubscriptionStatus::Suspended);
        let session = part.sessions.get_by_user("alice").unwrap();
        assert_eq!(session.status, SessionStatus::Disconnected);
        assert_eq!(session.disconnect_status, DisconnectStatus::Done);
        assert_eq!(nas.calls(), 1);
        let audits = part.sessions.disconnections();
        assert_eq!(audits[0].reason, "grace period expired");
    }

    #[tokio::test]
    async fn test_suspension_without_live_session() {
        let nas = Arc::new(ScriptedNas::always_ok());
        let (registry, root, sweep, _events) = build(nas.clone());

        let tenant = registry.create("A");
        root.create_partition(&tenant.partition).unwrap();
        let part = root.partition(&tenant.partition).unwrap();

        let now = Utc::now();
        part.subscriptions.create("bob", "gold", now - ChronoDuration::days(5));
        part.subscriptions.enter_grace("bob", now - ChronoDuration::days(1));

        let report = sweep.sweep_once(now);
        assert_eq!(report.suspended, 1);
        assert_eq!(report.disconnected, 0);
        assert_eq!(nas.calls(), 0);
    }
}
