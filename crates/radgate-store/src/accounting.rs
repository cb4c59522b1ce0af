//! Accounting records (radacct equivalent)
//!
//! Idempotency key is the NAS-supplied unique session id within a
//! partition. A retransmitting NAS must never duplicate a row, a
//! Start must never overwrite a Stop, and Update/Stop must never
//! create a row that Start should have created.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::net::Ipv4Addr;
use tracing::warn;

/// One accounting row, keyed by the NAS-supplied unique session id.
#[derive(Debug, Clone)]
pub struct AccountingRecord {
    /// NAS-supplied unique session id
    pub unique_id: String,
    /// Subscriber username
    pub username: String,
    /// NAS the session runs on
    pub nas_ip: Ipv4Addr,
    /// Framed IP handed to the subscriber
    pub framed_ip: Option<Ipv4Addr>,
    /// Session start (NAS epoch, converted once at the boundary)
    pub start_time: DateTime<Utc>,
    /// Last interim update
    pub update_time: Option<DateTime<Utc>>,
    /// Stop time; set exactly once
    pub stop_time: Option<DateTime<Utc>>,
    /// Session seconds as reported by the NAS
    pub session_time: u32,
    /// Octets in, gigawords already merged
    pub input_octets: u64,
    /// Octets out, gigawords already merged
    pub output_octets: u64,
    /// Terminate cause, set on Stop
    pub terminate_cause: Option<String>,
}

impl AccountingRecord {
    /// Whether the record is terminal
    pub fn is_stopped(&self) -> bool {
        self.stop_time.is_some()
    }
}

/// Counter update carried by Interim-Update and Stop
#[derive(Debug, Clone, Default)]
pub struct CounterUpdate {
    /// New framed IP, if reported
    pub framed_ip: Option<Ipv4Addr>,
    /// Session seconds, if reported
    pub session_time: Option<u32>,
    /// Input octets, if reported
    pub input_octets: Option<u64>,
    /// Output octets, if reported
    pub output_octets: Option<u64>,
}

/// Result of applying an interim update or stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterimOutcome {
    /// Counters applied
    Applied,
    /// No record for the unique id; logged as anomaly, not an error
    Missing,
    /// Record already stopped; retransmission, no-op
    AlreadyStopped,
}

/// Per-partition accounting store
pub struct AccountingStore {
    records: DashMap<String, AccountingRecord>,
}

impl AccountingStore {
    /// Empty store
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Idempotent insert on Accounting-Start. Returns `true` when a
    /// new row was created, `false` on a duplicate (retransmission).
    pub fn start(&self, record: AccountingRecord) -> bool {
        match self.records.entry(record.unique_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                warn!(
                    unique_id = %record.unique_id,
                    username = %record.username,
                    stopped = existing.get().is_stopped(),
                    "duplicate Accounting-Start ignored"
                );
                false
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Apply an Interim-Update
    pub fn interim(&self, unique_id: &str, update: CounterUpdate, now: DateTime<Utc>) -> InterimOutcome {
        let Some(mut record) = self.records.get_mut(unique_id) else {
            warn!(unique_id = %unique_id, "interim update for unknown session");
            return InterimOutcome::Missing;
        };
        if record.is_stopped() {
            warn!(unique_id = %unique_id, "interim update after stop ignored");
            return InterimOutcome::AlreadyStopped;
        }
        apply_counters(&mut record, &update);
        record.update_time = Some(now);
        InterimOutcome::Applied
    }

    /// Apply an Accounting-Stop. Immutable once stopped.
    pub fn stop(
        &self,
        unique_id: &str,
        update: CounterUpdate,
        stop_time: DateTime<Utc>,
        terminate_cause: Option<String>,
    ) -> InterimOutcome {
        let Some(mut record) = self.records.get_mut(unique_id) else {
            warn!(unique_id = %unique_id, "stop for unknown session");
            return InterimOutcome::Missing;
        };
        if record.is_stopped() {
            warn!(unique_id = %unique_id, "duplicate Accounting-Stop ignored");
            return InterimOutcome::AlreadyStopped;
        }
        apply_counters(&mut record, &update);
        record.stop_time = Some(stop_time);
        if terminate_cause.is_some() {
            record.terminate_cause = terminate_cause;
        }
        InterimOutcome::Applied
    }

    /// Record by unique id
    pub fn get(&self, unique_id: &str) -> Option<AccountingRecord> {
        self.records.get(unique_id).map(|r| r.clone())
    }

    /// Open (not yet stopped) records for a username
    pub fn open_for_user(&self, username: &str) -> Vec<AccountingRecord> {
        self.records
            .iter()
            .filter(|r| r.username == username && !r.is_stopped())
            .map(|r| r.clone())
            .collect()
    }

    /// Total record count
    pub fn count(&self) -> usize {
        self.records.len()
    }
}

fn apply_counters(record: &mut AccountingRecord, update: &CounterUpdate) {
    if update.framed_ip.is_some() {
        record.framed_ip = update.framed_ip;
    }
    if let Some(t) = update.session_time {
        record.session_time = t;
    }
    if let Some(octets) = update.input_octets {
        record.input_octets = octets;
    }
    if let Some(octets) = update.output_octets {
        record.output_octets = octets;
    }
}

impl Default for AccountingStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One NAS-level accounting event (Accounting-On/Off).
///
/// These carry no username and are recorded at the platform level
/// since one NAS may serve several tenants.
#[derive(Debug, Clone)]
pub struct NasEvent {
    /// NAS that rebooted or shut down
    pub nas_ip: Ipv4Addr,
    /// Event cause (`NAS-Reboot`, `NAS-Request`, ...)
    pub cause: String,
    /// NAS-reported event time
    pub at: DateTime<Utc>,
}

/// Platform-level log of NAS on/off events
pub struct NasEventLog {
    events: RwLock<Vec<NasEvent>>,
}

impl NasEventLog {
    /// Empty log
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    /// Append an event
    pub fn record(&self, event: NasEvent) {
        self.events.write().push(event);
    }

    /// Snapshot of all events
    pub fn all(&self) -> Vec<NasEvent> {
        self.events.read().clone()
    }
}

impl Default for NasEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> AccountingRecord {
        AccountingRecord {
            unique_id: id.into(),
            username: "alice".into(),
            nas_ip: Ipv4Addr::new(10, 0, 0, 1),
            framed_ip: None,
            start_time: Utc::now(),
            update_time: None,
            stop_time: None,
            session_time: 0,
            input_octets: 0,
            output_octets: 0,
            terminate_cause: None,
        }
    }

    #[test]
    fn test_idempotent_start() {
        // Replaying Accounting-Start N times yields one record
        let store = AccountingStore::new();
        assert!(store.start(record("sess-123")));
        assert!(!store.start(record("sess-123")));
        assert!(!store.start(record("sess-123")));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_interim_then_stop() {
        let store = AccountingStore::new();
        store.start(record("sess-123"));

        let now = Utc::now();
        let outcome = store.interim(
            "sess-123",
            CounterUpdate {
                session_time: Some(60),
                input_octets: Some(1_000),
                output_octets: Some(5_000),
                ..Default::default()
            },
            now,
        );
        assert_eq!(outcome, InterimOutcome::Applied);

        let outcome = store.stop(
            "sess-123",
            CounterUpdate {
                session_time: Some(120),
                input_octets: Some(2_000),
                output_octets: Some(9_000),
                ..Default::default()
            },
            now,
            Some("User-Request".into()),
        );
        assert_eq!(outcome, InterimOutcome::Applied);

        let rec = store.get("sess-123").unwrap();
        assert!(rec.is_stopped());
        assert_eq!(rec.session_time, 120);
        assert_eq!(rec.output_octets, 9_000);
        assert_eq!(rec.terminate_cause.as_deref(), Some("User-Request"));
    }

    #[test]
    fn test_orphan_update_is_noop() {
        let store = AccountingStore::new();
        let outcome = store.interim("nope", CounterUpdate::default(), Utc::now());
        assert_eq!(outcome, InterimOutcome::Missing);
        // Update must never create the row Start should have created
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_stop_is_terminal() {
        let store = AccountingStore::new();
        store.start(record("sess-123"));
        store.stop("sess-123", CounterUpdate::default(), Utc::now(), Some("User-Request".into()));

        // Retransmitted stop and late interim are no-ops
        let again = store.stop(
            "sess-123",
            CounterUpdate {
                output_octets: Some(999_999),
                ..Default::default()
            },
            Utc::now(),
            Some("Lost-Carrier".into()),
        );
        assert_eq!(again, InterimOutcome::AlreadyStopped);
        assert_eq!(
            store.interim("sess-123", CounterUpdate::default(), Utc::now()),
            InterimOutcome::AlreadyStopped
        );

        let rec = store.get("sess-123").unwrap();
        assert_eq!(rec.terminate_cause.as_deref(), Some("User-Request"));
        assert_ne!(rec.output_octets, 999_999);
    }

    #[test]
    fn test_nas_event_log() {
        let log = NasEventLog::new();
        log.record(NasEvent {
            nas_ip: Ipv4Addr::new(10, 0, 0, 1),
            cause: "NAS-Reboot".into(),
            at: Utc::now(),
        });
        assert_eq!(log.all().len(), 1);
        assert_eq!(log.all()[0].cause, "NAS-Reboot");
    }
}
