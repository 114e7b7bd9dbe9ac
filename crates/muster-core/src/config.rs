//! Runtime configuration for the Muster controller.
//!
//! Configuration is parsed once at boot (TOML file plus CLI overrides) and
//! injected into every component. No component reads timeouts, thresholds,
//! cycle intervals or capacity limits from ambient global state.

use crate::{MusterError, MusterResult};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level controller configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MusterConfig {
    /// Directory for durable record storage. When unset, all stores are
    /// in-memory and state does not survive a restart.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Base64-encoded 32-byte sealing key for encrypted-at-rest payloads.
    /// Required to serve; generate one with `muster seal-key`.
    #[serde(default)]
    pub seal_key: Option<String>,
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Agent liveness and command timeout settings.
    #[serde(default)]
    pub fleet: FleetConfig,
    /// Campaign orchestrator settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl MusterConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> MusterResult<Self> {
        toml::from_str(text).map_err(|e| MusterError::Validation(format!("config parse: {e}")))
    }
}

impl Default for MusterConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            seal_key: None,
            server: ServerConfig::default(),
            fleet: FleetConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Agent liveness and command timeout settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    /// Seconds since last contact within which an agent counts as online.
    #[serde(default = "default_liveness_threshold_secs")]
    pub liveness_threshold_secs: u64,
    /// Seconds a command may sit non-terminal before the sweep times it out.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Seconds between timeout sweep passes.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl FleetConfig {
    /// The liveness window as a [`chrono::Duration`] for timestamp math.
    pub fn liveness_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.liveness_threshold_secs).unwrap_or(i64::MAX))
    }

    /// The command execution horizon as a [`chrono::Duration`].
    pub fn command_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.command_timeout_secs).unwrap_or(i64::MAX))
    }

    /// The sweep cadence as a [`std::time::Duration`] for interval timers.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            liveness_threshold_secs: default_liveness_threshold_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Campaign orchestrator settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Seconds between campaign manager cycles.
    #[serde(default = "default_campaign_cycle_secs")]
    pub campaign_cycle_secs: u64,
    /// Maximum concurrently running workers across all families.
    #[serde(default = "default_worker_ceiling")]
    pub worker_ceiling: usize,
}

impl OrchestratorConfig {
    /// The campaign cycle as a [`std::time::Duration`] for interval timers.
    pub fn campaign_cycle(&self) -> Duration {
        Duration::from_secs(self.campaign_cycle_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            campaign_cycle_secs: default_campaign_cycle_secs(),
            worker_ceiling: default_worker_ceiling(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_liveness_threshold_secs() -> u64 {
    300
}
fn default_command_timeout_secs() -> u64 {
    900
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_campaign_cycle_secs() -> u64 {
    3600
}
fn default_worker_ceiling() -> usize {
    64
}
