//! Outbound event bus
//!
//! Transitions the core must surface (disconnections, grace warnings,
//! failed commands) are published here for the external notification
//! subsystem to consume. Delivery is at-least-once per subscriber as
//! long as the subscriber keeps up; a lagging subscriber loses old
//! events rather than blocking the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by the core for external collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutboundEvent {
    /// A session was disconnected
    SessionDisconnected {
        /// Owning tenant
        tenant_id: Uuid,
        /// Subscriber username
        username: String,
        /// Session id
        session_id: Uuid,
        /// Disconnect reason
        reason: String,
        /// When the disconnect completed
        at: DateTime<Utc>,
    },
    /// A subscription is approaching the end of its grace period
    GracePeriodWarning {
        /// Owning tenant
        tenant_id: Uuid,
        /// Subscriber username
        username: String,
        /// Whole days until forced disconnect
        days_remaining: i64,
    },
    /// A disconnect command exhausted its retries; operator action needed
    DisconnectFailed {
        /// Owning tenant
        tenant_id: Uuid,
        /// Subscriber username
        username: String,
        /// Session id
        session_id: Uuid,
        /// Attempts made before giving up
        attempts: u32,
    },
    /// Accounting anomaly worth alerting on if sustained
    AccountingAnomaly {
        /// Partition the event targeted, if resolved
        partition: Option<String>,
        /// NAS-supplied unique session id
        unique_id: String,
        /// What went wrong
        detail: String,
    },
}

/// Broadcast bus for outbound events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OutboundEvent>,
}

impl EventBus {
    /// Create a bus with the given buffer depth
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Fire-and-forget: no subscribers is not an error.
    pub fn emit(&self, event: OutboundEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(OutboundEvent::GracePeriodWarning {
            tenant_id: Uuid::new_v4(),
            username: "alice".into(),
            days_remaining: 2,
        });

        match rx.recv().await.unwrap() {
            OutboundEvent::GracePeriodWarning { days_remaining, .. } => {
                assert_eq!(days_remaining, 2)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        // Must not panic or error
        bus.emit(OutboundEvent::AccountingAnomaly {
            partition: None,
            unique_id: "sess-1".into(),
            detail: "orphan interim".into(),
        });
    }
}
