//! Scripted NAS client for tests

use crate::{DisconnectAck, DisconnectRequest, NasClient, NasError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Outcome a [`ScriptedNas`] will produce for one call
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Return an ACK
    Ok(DisconnectAck),
    /// Return a transport error
    Fail(String),
}

/// NAS client that plays back a programmed outcome queue and counts
/// invocations. Once the queue drains, the last configured default
/// repeats forever.
pub struct ScriptedNas {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    default: ScriptedOutcome,
    calls: AtomicU64,
    nudges: AtomicU64,
}

impl ScriptedNas {
    /// Client that always ACKs
    pub fn always_ok() -> Self {
        Self::with_default(ScriptedOutcome::Ok(DisconnectAck::Removed))
    }

    /// Client that always fails
    pub fn always_failing() -> Self {
        Self::with_default(ScriptedOutcome::Fail("device unreachable".into()))
    }

    /// Client with a repeating default outcome
    pub fn with_default(default: ScriptedOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default,
            calls: AtomicU64::new(0),
            nudges: AtomicU64::new(0),
        }
    }

    /// Queue an outcome ahead of the default
    pub fn push(&self, outcome: ScriptedOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Disconnect invocations so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Nudge invocations so far
    pub fn nudges(&self) -> u64 {
        self.nudges.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> ScriptedOutcome {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl NasClient for ScriptedNas {
    async fn disconnect(&self, _req: &DisconnectRequest) -> Result<DisconnectAck, NasError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_outcome() {
            ScriptedOutcome::Ok(ack) => Ok(ack),
            ScriptedOutcome::Fail(msg) => Err(NasError::Transport(msg)),
        }
    }

    async fn nudge_reauth(&self, _req: &DisconnectRequest) -> Result<(), NasError> {
        self.nudges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
