//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Top-level configuration for the radgate daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Authentication listener address
    pub auth_addr: String,
    /// Accounting listener address
    pub acct_addr: String,
    /// Default RADIUS shared secret
    pub default_secret: String,
    /// Per-NAS shared secrets, keyed by source IP
    pub nas_secrets: HashMap<IpAddr, String>,
    /// Resolver cache TTL in seconds
    pub resolver_cache_ttl_secs: u64,
    /// Lifecycle sweep settings
    pub lifecycle: LifecycleConfig,
    /// NAS command settings
    pub nas: NasConfig,
}

/// Sweep and dispatch tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Expiry sweep interval in seconds
    pub expiry_sweep_secs: u64,
    /// Grace-period sweep interval in seconds
    pub grace_sweep_secs: u64,
    /// Per-tenant sweep time budget in seconds
    pub tenant_budget_secs: u64,
    /// Per-tenant sweep lease in seconds
    pub tenant_lease_secs: u64,
    /// Max in-flight NAS commands
    pub max_inflight_commands: usize,
    /// Disconnect retry attempts
    pub disconnect_attempts: u32,
    /// Initial retry backoff in seconds
    pub backoff_base_secs: u64,
    /// Backoff ceiling in seconds
    pub backoff_cap_secs: u64,
}

/// NAS control channel tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NasConfig {
    /// Per-command timeout in seconds
    pub command_timeout_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            auth_addr: "0.0.0.0:1812".into(),
            acct_addr: "0.0.0.0:1813".into(),
            default_secret: "testing123".into(),
            nas_secrets: HashMap::new(),
            resolver_cache_ttl_secs: 5,
            lifecycle: LifecycleConfig::default(),
            nas: NasConfig::default(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            expiry_sweep_secs: 60,
            grace_sweep_secs: 3600,
            tenant_budget_secs: 30,
            tenant_lease_secs: 120,
            max_inflight_commands: 32,
            disconnect_attempts: 4,
            backoff_base_secs: 10,
            backoff_cap_secs: 120,
        }
    }
}

impl Default for NasConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 5,
        }
    }
}

impl CoreConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self, crate::RadError> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| crate::RadError::Config(e.to_string()))
    }

    /// Shared secret for a NAS, falling back to the default
    pub fn secret_for(&self, nas: &IpAddr) -> &str {
        self.nas_secrets
            .get(nas)
            .map(|s| s.as_str())
            .unwrap_or(&self.default_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_fallback() {
        let mut config = CoreConfig::default();
        let nas: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(config.secret_for(&nas), "testing123");

        config.nas_secrets.insert(nas, "s3cret".into());
        assert_eq!(config.secret_for(&nas), "s3cret");
    }

    #[test]
    fn test_config_roundtrip() {
        let config = CoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: CoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.auth_addr, "0.0.0.0:1812");
        assert_eq!(back.lifecycle.disconnect_attempts, 4);
    }
}
