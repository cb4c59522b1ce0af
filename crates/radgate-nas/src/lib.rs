//! NAS control channel
//!
//! The lifecycle manager needs one thing from a network access
//! server: drop a subscriber's session now. Different vendors expose
//! that through different control channels, so the command sits
//! behind the [`NasClient`] trait and devices register in a
//! [`NasDirectory`] keyed by their IP.
//!
//! Disconnecting a client that is already gone is an ACK, not an
//! error; the command must be safe to repeat.

#![warn(missing_docs)]

pub mod mock;
pub mod routeros;

use async_trait::async_trait;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// A disconnect instruction for one subscriber session
#[derive(Debug, Clone)]
pub struct DisconnectRequest {
    /// Subscriber username
    pub username: String,
    /// Subscriber MAC, when the NAS keys sessions by it
    pub mac: Option<String>,
    /// NAS-side session id, when known
    pub nas_session_id: Option<String>,
}

/// Acknowledgement of a disconnect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectAck {
    /// Session was found and removed
    Removed,
    /// No such session on the device; treated as success
    AlreadyGone,
}

/// NAS command errors
#[derive(Debug, thiserror::Error)]
pub enum NasError {
    /// Device did not answer within the command timeout
    #[error("NAS command timed out after {0:?}")]
    Timeout(Duration),
    /// Transport-level failure
    #[error("NAS transport error: {0}")]
    Transport(String),
    /// Device refused the command
    #[error("NAS rejected command: {0}")]
    Rejected(String),
    /// No client registered for the session's NAS
    #[error("unknown NAS device: {0}")]
    UnknownDevice(IpAddr),
    /// The client does not implement this command
    #[error("command not supported by this NAS client")]
    Unsupported,
}

/// Vendor-agnostic NAS control client
#[async_trait]
pub trait NasClient: Send + Sync {
    /// Drop the subscriber's session. Idempotent at the device level.
    async fn disconnect(&self, req: &DisconnectRequest) -> Result<DisconnectAck, NasError>;

    /// Best-effort attribute refresh after a plan change. RADIUS has
    /// no push-reconnect primitive; this merely nudges the device to
    /// re-read attributes on its next re-auth or CoA cycle.
    async fn nudge_reauth(&self, _req: &DisconnectRequest) -> Result<(), NasError> {
        Err(NasError::Unsupported)
    }

    /// Client name for logs
    fn name(&self) -> &str;
}

/// Registry of NAS clients keyed by device IP
pub struct NasDirectory {
    clients: DashMap<IpAddr, Arc<dyn NasClient>>,
}

impl NasDirectory {
    /// Empty directory
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Register the client controlling a device
    pub fn register(&self, nas_ip: IpAddr, client: Arc<dyn NasClient>) {
        self.clients.insert(nas_ip, client);
    }

    /// Client for a device
    pub fn client_for(&self, nas_ip: &IpAddr) -> Result<Arc<dyn NasClient>, NasError> {
        self.clients
            .get(nas_ip)
            .map(|c| c.clone())
            .ok_or(NasError::UnknownDevice(*nas_ip))
    }
}

impl Default for NasDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a NAS command under a hard timeout so one unreachable device
/// cannot stall the sweep of other tenants' sessions.
pub async fn with_timeout<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, NasError>>,
) -> Result<T, NasError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(NasError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedNas;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_directory_lookup() {
        let dir = NasDirectory::new();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(matches!(dir.client_for(&ip), Err(NasError::UnknownDevice(_))));

        dir.register(ip, Arc::new(ScriptedNas::always_ok()));
        assert_ok!(dir.client_for(&ip));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(DisconnectAck::Removed)
        };
        let result = with_timeout(Duration::from_secs(5), slow).await;
        assert!(matches!(result, Err(NasError::Timeout(_))));
    }
}
