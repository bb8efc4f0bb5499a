//! Configuration types and utilities

use crate::lifecycle::LifecyclePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings of the interception layer itself.
/// Set once at registration; the allowlist is compiled in and not part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Scope reported in status replies
    pub scope: String,
    /// Emit diagnostic records
    pub diagnostics_enabled: bool,
    /// Lifecycle behaviour on install
    pub lifecycle: LifecyclePolicy,
    /// Capacity of the control message queue
    pub control_buffer: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            scope: "/".to_string(),
            diagnostics_enabled: true,
            lifecycle: LifecyclePolicy::default(),
            control_buffer: 32,
        }
    }
}

/// Static Proxy Startup Configuration
/// These settings are set at startup and do not change during runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address to listen on
    pub listen_address: String,
    /// Port to listen on
    pub listen_port: u16,
    /// Admin API port
    pub admin_port: u16,
    /// Directory holding the CA certificate and key
    pub ca_dir: PathBuf,
    /// Request bodies above this size are streamed instead of buffered
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Clients silent for this long are dropped from the registry
    #[serde(default = "default_client_idle_secs")]
    pub client_idle_secs: u64,
}

fn default_max_body_size() -> usize {
    crate::handlers::DEFAULT_MAX_BODY_SIZE
}

fn default_client_idle_secs() -> u64 {
    600
}

impl ProxyConfig {
    pub fn client_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.client_idle_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 8080,
            admin_port: 9091,
            ca_dir: PathBuf::from("./certs"),
            max_body_size: default_max_body_size(),
            client_idle_secs: default_client_idle_secs(),
        }
    }
}
