//! Post-auth decision log

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Authentication decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Access-Accept sent
    Accept,
    /// Access-Reject sent
    Reject,
}

/// One post-auth log row
#[derive(Debug, Clone)]
pub struct PostAuthEntry {
    /// Username that authenticated (or tried to)
    pub username: String,
    /// Decision
    pub outcome: AuthOutcome,
    /// Short human-readable detail (reply attributes, reject reason)
    pub detail: String,
    /// Decision time
    pub at: DateTime<Utc>,
}

/// Append-only per-partition post-auth log.
///
/// Unresolved usernames land in the platform-level instance instead.
pub struct PostAuthStore {
    entries: RwLock<Vec<PostAuthEntry>>,
}

impl PostAuthStore {
    /// Empty log
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Append a decision
    pub fn record(&self, username: &str, outcome: AuthOutcome, detail: impl Into<String>) {
        self.entries.write().push(PostAuthEntry {
            username: username.to_string(),
            outcome,
            detail: detail.into(),
            at: Utc::now(),
        });
    }

    /// All rows for a username
    pub fn for_user(&self, username: &str) -> Vec<PostAuthEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.username == username)
            .cloned()
            .collect()
    }

    /// Total rows logged
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }
}

impl Default for PostAuthStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_and_filter() {
        let log = PostAuthStore::new();
        log.record("alice", AuthOutcome::Accept, "Session-Timeout=3600");
        log.record("mallory", AuthOutcome::Reject, "credential mismatch");
        log.record("alice", AuthOutcome::Reject, "credential mismatch");

        assert_eq!(log.count(), 3);
        let alice = log.for_user("alice");
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].outcome, AuthOutcome::Accept);
    }
}
