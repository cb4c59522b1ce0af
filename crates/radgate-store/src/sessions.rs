//! Business-level sessions and disconnection audit
//!
//! One layer above raw accounting: a session is provisioned when the
//! subscriber's credential is, goes active on the first
//! Accounting-Start, and is driven into a terminal state by the
//! lifecycle manager (or an explicit admin/payment action). Terminal
//! sessions accept no further mutation except the audit trail.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use radgate_tenant::TenantId;
use std::net::Ipv4Addr;
use tracing::{debug, info};
use uuid::Uuid;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Provisioned, no accounting seen yet
    Pending,
    /// Subscriber online
    Active,
    /// Terminal: ran past its expected end
    Expired,
    /// Terminal: cut off (data cap, grace period, admin)
    Disconnected,
}

impl SessionStatus {
    /// Whether the state accepts no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Disconnected)
    }
}

/// Progress of the disconnect command for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectStatus {
    /// No disconnect issued
    None,
    /// Command dispatched, awaiting outcome
    Pending,
    /// NAS acknowledged the disconnect
    Done,
    /// Retries exhausted; needs manual intervention
    Failed,
}

/// A subscriber session
#[derive(Debug, Clone)]
pub struct Session {
    /// Session id
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Subscriber username
    pub username: String,
    /// Plan/package name
    pub plan: String,
    /// Subscriber MAC, as reported by the NAS
    pub mac: Option<String>,
    /// Subscriber IP
    pub ip: Option<Ipv4Addr>,
    /// NAS the session runs on
    pub nas_ip: Option<Ipv4Addr>,
    /// First Accounting-Start time
    pub started_at: Option<DateTime<Utc>>,
    /// When the entitlement runs out
    pub expected_end: DateTime<Utc>,
    /// Current state
    pub status: SessionStatus,
    /// Octets in
    pub bytes_in: u64,
    /// Octets out
    pub bytes_out: u64,
    /// Plan data cap, if the plan has one
    pub data_limit: Option<u64>,
    /// Why the session was cut off
    pub disconnect_reason: Option<String>,
    /// Disconnect command progress
    pub disconnect_status: DisconnectStatus,
    /// Accounting unique id linked on activation
    pub acct_unique_id: Option<String>,
}

impl Session {
    /// Cumulative usage
    pub fn total_bytes(&self) -> u64 {
        self.bytes_in + self.bytes_out
    }
}

/// Audit row written when a session is disconnected
#[derive(Debug, Clone)]
pub struct SessionDisconnection {
    /// Session that was cut off
    pub session_id: Uuid,
    /// How (`nas-command`, `expiry-sweep`, ...)
    pub method: String,
    /// Why (`time expired`, `data limit exceeded`, ...)
    pub reason: String,
    /// When
    pub at: DateTime<Utc>,
    /// Session duration in seconds
    pub duration_secs: i64,
    /// Total bytes used
    pub data_used: u64,
}

/// Returned by [`SessionStore::record_usage`] exactly when cumulative
/// bytes cross the plan's data limit from below.
#[derive(Debug, Clone)]
pub struct CapBreach {
    /// Breaching session
    pub session: Session,
    /// The limit that was crossed
    pub limit: u64,
}

/// Per-partition session store
pub struct SessionStore {
    sessions: DashMap<Uuid, Session>,
    by_user: DashMap<String, Uuid>,
    disconnections: RwLock<Vec<SessionDisconnection>>,
}

impl SessionStore {
    /// Empty store
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            by_user: DashMap::new(),
            disconnections: RwLock::new(Vec::new()),
        }
    }

    /// Provision a pending session for a subscriber
    #[allow(clippy::too_many_arguments)]
    pub fn provision(
        &self,
        tenant_id: TenantId,
        username: &str,
        plan: &str,
        expected_end: DateTime<Utc>,
        data_limit: Option<u64>,
    ) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            tenant_id,
            username: username.to_string(),
            plan: plan.to_string(),
            mac: None,
            ip: None,
            nas_ip: None,
            started_at: None,
            expected_end,
            status: SessionStatus::Pending,
            bytes_in: 0,
            bytes_out: 0,
            data_limit,
            disconnect_reason: None,
            disconnect_status: DisconnectStatus::None,
            acct_unique_id: None,
        };
        debug!(session_id = %session.id, username = %username, "session provisioned");
        self.by_user.insert(username.to_string(), session.id);
        self.sessions.insert(session.id, session.clone());
        session
    }

    /// Transition Pending → Active on the first Accounting-Start
    pub fn activate(
        &self,
        username: &str,
        acct_unique_id: &str,
        nas_ip: Ipv4Addr,
        mac: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<Session> {
        let id = *self.by_user.get(username)?;
        let mut session = self.sessions.get_mut(&id)?;
        if session.status.is_terminal() {
            return None;
        }
        if session.status == SessionStatus::Pending {
            session.status = SessionStatus::Active;
            session.started_at = Some(now);
        }
        session.nas_ip = Some(nas_ip);
        session.acct_unique_id = Some(acct_unique_id.to_string());
        if mac.is_some() {
            session.mac = mac;
        }
        Some(session.clone())
    }

    /// Update cumulative usage from an accounting update.
    ///
    /// Returns a [`CapBreach`] exactly when the new total crosses the
    /// plan's data limit from below, so the caller can disconnect on
    /// this very update instead of waiting for a sweep.
    pub fn record_usage(&self, username: &str, bytes_in: u64, bytes_out: u64) -> Option<CapBreach> {
        let id = *self.by_user.get(username)?;
        let mut session = self.sessions.get_mut(&id)?;
        if session.status != SessionStatus::Active {
            return None;
        }

        let before = session.total_bytes();
        session.bytes_in = bytes_in;
        session.bytes_out = bytes_out;
        let after = session.total_bytes();

        let limit = session.data_limit?;
        if before < limit && after >= limit {
            info!(
                session_id = %session.id,
                username = %username,
                total = after,
                limit,
                "data cap breached"
            );
            return Some(CapBreach {
                session: session.clone(),
                limit,
            });
        }
        None
    }

    /// Active sessions whose expected end has passed
    pub fn due_for_expiry(&self, now: DateTime<Utc>) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Active && s.expected_end <= now)
            .map(|s| s.clone())
            .collect()
    }

    /// Mark an active session expired; duration is computed from the
    /// accounting start. No-op if already terminal.
    pub fn mark_expired(&self, session_id: &Uuid, now: DateTime<Utc>) -> Option<Session> {
        let mut session = self.sessions.get_mut(session_id)?;
        if session.status.is_terminal() {
            return None;
        }
        session.status = SessionStatus::Expired;
        session.disconnect_reason = Some("time expired".into());
        info!(session_id = %session_id, at = %now, "session expired");
        Some(session.clone())
    }

    /// Claim the right to issue the disconnect command for a session.
    ///
    /// Only the `None → Pending` transition wins, so two sweeps (or a
    /// sweep racing the data-cap path) can never double-dispatch.
    pub fn begin_disconnect(&self, session_id: &Uuid, reason: &str) -> bool {
        let Some(mut session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        if session.disconnect_status != DisconnectStatus::None {
            return false;
        }
        session.disconnect_status = DisconnectStatus::Pending;
        session.disconnect_reason = Some(reason.to_string());
        true
    }

    /// Record a NAS-acknowledged disconnect: terminal state plus the
    /// audit row.
    pub fn complete_disconnect(
        &self,
        session_id: &Uuid,
        method: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Option<SessionDisconnection> {
        let mut session = self.sessions.get_mut(session_id)?;
        session.disconnect_status = DisconnectStatus::Done;
        if !session.status.is_terminal() {
            session.status = SessionStatus::Disconnected;
        }
        let duration_secs = session
            .started_at
            .map(|start| (now - start).num_seconds())
            .unwrap_or(0);
        let audit = SessionDisconnection {
            session_id: *session_id,
            method: method.to_string(),
            reason: reason.to_string(),
            at: now,
            duration_secs,
            data_used: session.total_bytes(),
        };
        info!(
            session_id = %session_id,
            username = %session.username,
            reason = %reason,
            duration_secs,
            "session disconnected"
        );
        drop(session);
        self.disconnections.write().push(audit.clone());
        Some(audit)
    }

    /// Mark the disconnect command as permanently failed. The session
    /// is deliberately NOT moved to a state that implies the
    /// subscriber is offline.
    pub fn fail_disconnect(&self, session_id: &Uuid) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.disconnect_status = DisconnectStatus::Failed;
        }
    }

    /// Reconnect flow: clear disconnect state and return to Active
    /// with a new entitlement window.
    pub fn reactivate(
        &self,
        username: &str,
        plan: &str,
        expected_end: DateTime<Utc>,
        data_limit: Option<u64>,
    ) -> Option<Session> {
        let id = *self.by_user.get(username)?;
        let mut session = self.sessions.get_mut(&id)?;
        session.status = SessionStatus::Active;
        session.plan = plan.to_string();
        session.expected_end = expected_end;
        session.data_limit = data_limit;
        session.bytes_in = 0;
        session.bytes_out = 0;
        session.disconnect_reason = None;
        session.disconnect_status = DisconnectStatus::None;
        info!(session_id = %session.id, username = %username, plan = %plan, "session reactivated");
        Some(session.clone())
    }

    /// Session by id
    pub fn get(&self, session_id: &Uuid) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Session for a username
    pub fn get_by_user(&self, username: &str) -> Option<Session> {
        let id = *self.by_user.get(username)?;
        self.get(&id)
    }

    /// All disconnection audit rows
    pub fn disconnections(&self) -> Vec<SessionDisconnection> {
        self.disconnections.read().clone()
    }

    /// Extend a session's entitlement (plan change)
    pub fn update_plan(
        &self,
        username: &str,
        plan: &str,
        expected_end: DateTime<Utc>,
        data_limit: Option<u64>,
    ) -> Option<Session> {
        let id = *self.by_user.get(username)?;
        let mut session = self.sessions.get_mut(&id)?;
        if session.status.is_terminal() {
            return None;
        }
        session.plan = plan.to_string();
        session.expected_end = expected_end;
        session.data_limit = data_limit;
        Some(session.clone())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience: an entitlement window of `hours` from `now`
pub fn entitlement_end(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    now + Duration::hours(hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_active(data_limit: Option<u64>) -> (SessionStore, Session) {
        let store = SessionStore::new();
        let tenant = Uuid::new_v4();
        let end = Utc::now() + Duration::hours(1);
        store.provision(tenant, "alice", "gold", end, data_limit);
        let session = store
            .activate("alice", "sess-123", Ipv4Addr::new(10, 0, 0, 1), None, Utc::now())
            .unwrap();
        (store, session)
    }

    #[test]
    fn test_activation() {
        let (_store, session) = store_with_active(None);
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.started_at.is_some());
        assert_eq!(session.acct_unique_id.as_deref(), Some("sess-123"));
    }

    #[test]
    fn test_cap_breach_fires_once_on_crossing() {
        // The breach fires on the update that crosses the limit,
        // and only on that update.
        let (store, _) = store_with_active(Some(10_000));

        assert!(store.record_usage("alice", 2_000, 3_000).is_none());
        let breach = store.record_usage("alice", 4_000, 7_000).unwrap();
        assert_eq!(breach.limit, 10_000);
        // Further updates past the limit do not re-fire
        assert!(store.record_usage("alice", 5_000, 8_000).is_none());
    }

    #[test]
    fn test_no_cap_no_breach() {
        let (store, _) = store_with_active(None);
        assert!(store.record_usage("alice", u64::MAX / 2, 0).is_none());
    }

    #[test]
    fn test_expiry_transition_and_audit() {
        let store = SessionStore::new();
        let end = Utc::now() - Duration::minutes(2);
        store.provision(Uuid::new_v4(), "alice", "gold", end, None);
        store
            .activate("alice", "sess-1", Ipv4Addr::new(10, 0, 0, 1), None, Utc::now())
            .unwrap();

        let due = store.due_for_expiry(Utc::now());
        assert_eq!(due.len(), 1);

        let now = Utc::now();
        let session = store.mark_expired(&due[0].id, now).unwrap();
        assert_eq!(session.status, SessionStatus::Expired);

        assert!(store.begin_disconnect(&session.id, "time expired"));
        store.complete_disconnect(&session.id, "nas-command", "time expired", now);

        let audits = store.disconnections();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].reason, "time expired");
        // Terminal state survives: still Expired, not Disconnected
        assert_eq!(store.get(&session.id).unwrap().status, SessionStatus::Expired);
        assert_eq!(
            store.get(&session.id).unwrap().disconnect_status,
            DisconnectStatus::Done
        );
    }

    #[test]
    fn test_begin_disconnect_single_winner() {
        let (store, session) = store_with_active(None);
        assert!(store.begin_disconnect(&session.id, "data limit exceeded"));
        assert!(!store.begin_disconnect(&session.id, "time expired"));
        assert_eq!(
            store.get(&session.id).unwrap().disconnect_reason.as_deref(),
            Some("data limit exceeded")
        );
    }

    #[test]
    fn test_failed_disconnect_does_not_imply_success() {
        let (store, session) = store_with_active(None);
        store.begin_disconnect(&session.id, "grace period expired");
        store.fail_disconnect(&session.id);

        let s = store.get(&session.id).unwrap();
        assert_eq!(s.disconnect_status, DisconnectStatus::Failed);
        // Still Active: nothing pretends the subscriber is offline
        assert_eq!(s.status, SessionStatus::Active);
        assert!(store.disconnections().is_empty());
    }

    #[test]
    fn test_terminal_sessions_reject_usage() {
        let (store, session) = store_with_active(Some(1_000));
        store.begin_disconnect(&session.id, "admin");
        store.complete_disconnect(&session.id, "nas-command", "admin", Utc::now());
        assert!(store.record_usage("alice", 9_999, 9_999).is_none());
    }

    #[test]
    fn test_reactivate_clears_disconnect_state() {
        let (store, session) = store_with_active(Some(1_000));
        store.begin_disconnect(&session.id, "grace period expired");
        store.complete_disconnect(&session.id, "nas-command", "grace period expired", Utc::now());

        let end = Utc::now() + Duration::hours(24);
        let s = store.reactivate("alice", "silver", end, Some(5_000)).unwrap();
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.disconnect_status, DisconnectStatus::None);
        assert_eq!(s.plan, "silver");
        assert_eq!(s.total_bytes(), 0);
    }
}
