//! Retrying disconnect dispatcher
//!
//! Fire-and-track: issuing a command never blocks the caller. Each
//! dispatch claims the session's disconnect slot, then runs in its
//! own task under a bounded semaphore, retrying with exponential
//! backoff. Exhaustion is never silent: the session is marked
//! `Failed` and an alert event goes out, because a failed disconnect
//! leaves a subscriber connected past their entitlement.

use radgate_common::{EventBus, OutboundEvent};
use radgate_nas::{DisconnectRequest, NasDirectory, NasError};
use radgate_store::{Session, StoreRoot};
use radgate_tenant::PartitionName;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Why a session is being cut off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `expected_end` passed
    TimeExpired,
    /// Cumulative bytes reached the plan cap
    DataLimitExceeded,
    /// Payment grace window closed
    GracePeriodExpired,
    /// Operator action
    AdminRequest,
}

impl DisconnectReason {
    /// Reason string stored on the session and audit row
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeExpired => "time expired",
            Self::DataLimitExceeded => "data limit exceeded",
            Self::GracePeriodExpired => "grace period expired",
            Self::AdminRequest => "admin request",
        }
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before giving up
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base: Duration,
    /// Delay ceiling
    pub cap: Duration,
}

impl RetryPolicy {
    /// Delay after the given 1-based attempt number
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
        exp.min(self.cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base: Duration::from_secs(10),
            cap: Duration::from_secs(120),
        }
    }
}

/// Dispatcher counters
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Commands dispatched
    pub issued: AtomicU64,
    /// Commands acknowledged
    pub succeeded: AtomicU64,
    /// Commands that exhausted retries
    pub failed: AtomicU64,
    /// Individual retry attempts
    pub retries: AtomicU64,
}

/// Disconnect command dispatcher
pub struct DisconnectDispatcher {
    root: Arc<StoreRoot>,
    nas: Arc<NasDirectory>,
    events: EventBus,
    policy: RetryPolicy,
    inflight: Arc<Semaphore>,
    /// Counters, shared with in-flight command tasks
    pub stats: Arc<DispatchStats>,
}

impl DisconnectDispatcher {
    /// New dispatcher with the given in-flight bound
    pub fn new(
        root: Arc<StoreRoot>,
        nas: Arc<NasDirectory>,
        events: EventBus,
        policy: RetryPolicy,
        max_inflight: usize,
    ) -> Self {
        Self {
            root,
            nas,
            events,
            policy,
            inflight: Arc::new(Semaphore::new(max_inflight)),
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Issue a disconnect for a session. Returns the tracking handle
    /// when this call won the session's disconnect slot, `None` when
    /// another path already dispatched it.
    pub fn dispatch(
        &self,
        partition: &PartitionName,
        session: &Session,
        reason: DisconnectReason,
    ) -> Option<JoinHandle<()>> {
        let part = match self.root.partition(partition) {
            Ok(part) => part,
            Err(e) => {
                error!(partition = %partition, error = %e, "cannot dispatch disconnect");
                return None;
            }
        };
        if !part.sessions.begin_disconnect(&session.id, reason.as_str()) {
            return None;
        }
        self.stats.issued.fetch_add(1, Ordering::Relaxed);

        let request = DisconnectRequest {
            username: session.username.clone(),
            mac: session.mac.clone(),
            nas_session_id: session.acct_unique_id.clone(),
        };
        let session = session.clone();
        let nas = self.nas.clone();
        let events = self.events.clone();
        let policy = self.policy.clone();
        let inflight = self.inflight.clone();
        let stats = self.stats.clone();

        Some(tokio::spawn(async move {
            let _permit = inflight.acquire_owned().await;

            for attempt in 1..=policy.max_attempts {
                let result = match session.nas_ip {
                    Some(ip) => match nas.client_for(&ip.into()) {
                        Ok(client) => client.disconnect(&request).await,
                        Err(e) => Err(e),
                    },
                    None => Err(NasError::Transport("session has no NAS address".into())),
                };

                match result {
                    Ok(ack) => {
                        info!(
                            session_id = %session.id,
                            username = %session.username,
                            reason = reason.as_str(),
                            attempt,
                            ?ack,
                            "disconnect acknowledged"
                        );
                        part.sessions.complete_disconnect(
                            &session.id,
                            "nas-command",
                            reason.as_str(),
                            Utc::now(),
                        );
                        events.emit(OutboundEvent::SessionDisconnected {
                            tenant_id: session.tenant_id,
                            username: session.username.clone(),
                            session_id: session.id,
                            reason: reason.as_str().to_string(),
                            at: Utc::now(),
                        });
                        stats.succeeded.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    Err(e) => {
                        warn!(
                            session_id = %session.id,
                            username = %session.username,
                            attempt,
                            max_attempts = policy.max_attempts,
                            error = %e,
                            "disconnect attempt failed"
                        );
                        if attempt < policy.max_attempts {
                            stats.retries.fetch_add(1, Ordering::Relaxed);
                            tokio::time::sleep(policy.delay_after(attempt)).await;
                        }
                    }
                }
            }

            // Exhausted. The subscriber may still be connected; this
            // is an operator-paged condition, not a silent drop.
            part.sessions.fail_disconnect(&session.id);
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                session_id = %session.id,
                tenant_id = %session.tenant_id,
                username = %session.username,
                reason = reason.as_str(),
                attempts = policy.max_attempts,
                "disconnect failed permanently; manual intervention required"
            );
            events.emit(OutboundEvent::DisconnectFailed {
                tenant_id: session.tenant_id,
                username: session.username.clone(),
                session_id: session.id,
                attempts: policy.max_attempts,
            });
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radgate_nas::mock::{ScriptedNas, ScriptedOutcome};
    use radgate_nas::DisconnectAck;
    use radgate_store::{DisconnectStatus, SessionStatus};
    use radgate_tenant::Tenant;
    use chrono::Duration as ChronoDuration;
    use std::net::Ipv4Addr;

    fn setup(nas: Arc<ScriptedNas>) -> (Arc<StoreRoot>, Tenant, Session, DisconnectDispatcher, EventBus) {
        let root = Arc::new(StoreRoot::new());
        let tenant = Tenant::new("A");
        root.create_partition(&tenant.partition).unwrap();
        let part = root.partition(&tenant.partition).unwrap();
        part.sessions.provision(
            tenant.id,
            "alice",
            "gold",
            Utc::now() + ChronoDuration::hours(1),
            None,
        );
        let session = part
            .sessions
            .activate("alice", "sess-1", Ipv4Addr::new(10, 0, 0, 1), None, Utc::now())
            .unwrap();

        let directory = Arc::new(NasDirectory::new());
        directory.register("10.0.0.1".parse().unwrap(), nas);

        let events = EventBus::default();
        let dispatcher = DisconnectDispatcher::new(
            root.clone(),
            directory,
            events.clone(),
            RetryPolicy {
                max_attempts: 3,
                base: Duration::from_secs(10),
                cap: Duration::from_secs(120),
            },
            8,
        );
        (root, tenant, session, dispatcher, events)
    }

    #[test]
    fn test_backoff_growth() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(10));
        assert_eq!(policy.delay_after(2), Duration::from_secs(20));
        assert_eq!(policy.delay_after(3), Duration::from_secs(40));
        // Capped
        assert_eq!(policy.delay_after(10), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_successful_dispatch() {
        let nas = Arc::new(ScriptedNas::always_ok());
        let (root, tenant, session, dispatcher, events) = setup(nas.clone());
        let mut rx = events.subscribe();

        let handle = dispatcher
            .dispatch(&tenant.partition, &session, DisconnectReason::DataLimitExceeded)
            .unwrap();
        handle.await.unwrap();

        assert_eq!(nas.calls(), 1);
        let part = root.partition(&tenant.partition).unwrap();
        let s = part.sessions.get(&session.id).unwrap();
        assert_eq!(s.status, SessionStatus::Disconnected);
        assert_eq!(s.disconnect_status, DisconnectStatus::Done);
        assert!(matches!(
            rx.recv().await.unwrap(),
            OutboundEvent::SessionDisconnected { .. }
        ));
    }

    #[tokio::test]
    async fn test_double_dispatch_loses() {
        let nas = Arc::new(ScriptedNas::always_ok());
        let (_root, tenant, session, dispatcher, _events) = setup(nas.clone());

        let first = dispatcher.dispatch(&tenant.partition, &session, DisconnectReason::TimeExpired);
        let second = dispatcher.dispatch(&tenant.partition, &session, DisconnectReason::TimeExpired);
        assert!(first.is_some());
        assert!(second.is_none());

        first.unwrap().await.unwrap();
        assert_eq!(nas.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let nas = Arc::new(ScriptedNas::always_ok());
        nas.push(ScriptedOutcome::Fail("flap".into()));
        nas.push(ScriptedOutcome::Ok(DisconnectAck::AlreadyGone));
        let (root, tenant, session, dispatcher, _events) = setup(nas.clone());

        let handle = dispatcher
            .dispatch(&tenant.partition, &session, DisconnectReason::TimeExpired)
            .unwrap();
        handle.await.unwrap();

        assert_eq!(nas.calls(), 2);
        let part = root.partition(&tenant.partition).unwrap();
        assert_eq!(
            part.sessions.get(&session.id).unwrap().disconnect_status,
            DisconnectStatus::Done
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_marks_failed() {
        // Every attempt fails -> Failed + alert event, and the
        // session does not pretend to be offline.
        let nas = Arc::new(ScriptedNas::always_failing());
        let (root, tenant, session, dispatcher, events) = setup(nas.clone());
        let mut rx = events.subscribe();

        let handle = dispatcher
            .dispatch(&tenant.partition, &session, DisconnectReason::GracePeriodExpired)
            .unwrap();
        handle.await.unwrap();

        assert_eq!(nas.calls(), 3);
        let part = root.partition(&tenant.partition).unwrap();
        let s = part.sessions.get(&session.id).unwrap();
        assert_eq!(s.disconnect_status, DisconnectStatus::Failed);
        assert_eq!(s.status, SessionStatus::Active);
        assert!(part.sessions.disconnections().is_empty());

        match rx.recv().await.unwrap() {
            OutboundEvent::DisconnectFailed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
