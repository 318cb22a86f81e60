//! Configuration types for mfsprobe.
//! Parsed from ~/.mfsprobe/config.toml; every field has a default.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use mfsprobe_protocol::DEFAULTS;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub master: MasterSection,
    #[serde(default)]
    pub connection: ConnectionSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterSection {
    /// One or more hostnames separated by `;`, `,` or whitespace.
    #[serde(default = "default_hosts")]
    pub hosts: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Previously known leader address; probed first when set.
    pub leader_hint: Option<Ipv4Addr>,
}

impl Default for MasterSection {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            port: default_port(),
            leader_hint: None,
        }
    }
}

/// Budgets for one resilient connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSection {
    #[serde(default = "default_1000")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_1000")]
    pub io_timeout_ms: u64,
    #[serde(default = "default_command_retries")]
    pub command_retries: u32,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 1000,
            connect_attempts: DEFAULTS.connect_attempts,
            io_timeout_ms: 1000,
            command_retries: DEFAULTS.command_retries,
        }
    }
}

/// Budgets for fan-out operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    /// Shared wall-clock budget of one fan-out.
    #[serde(default = "default_5000")]
    pub deadline_ms: u64,
    #[serde(default = "default_2000")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_3000")]
    pub reconnect_timeout_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            deadline_ms: 5000,
            connect_timeout_ms: 2000,
            reconnect_timeout_ms: 3000,
        }
    }
}

impl DispatchSection {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

// Default value functions
fn default_hosts() -> String {
    "mfsmaster".into()
}
fn default_port() -> u16 {
    DEFAULTS.master_client_port
}
fn default_connect_attempts() -> u32 {
    DEFAULTS.connect_attempts
}
fn default_command_retries() -> u32 {
    DEFAULTS.command_retries
}
fn default_1000() -> u64 {
    1000
}
fn default_2000() -> u64 {
    2000
}
fn default_3000() -> u64 {
    3000
}
fn default_5000() -> u64 {
    5000
}

impl ProbeConfig {
    /// Load config from file, or use defaults if missing.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ProbeConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}
