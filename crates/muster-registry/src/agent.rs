use chrono::{DateTime, Duration, Utc};
use muster_core::{
    AgentKind, AgentStatus, CapabilitySet, MusterError, MusterResult, Platform, ResourceProfile,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attributes an agent presents on every registration.
///
/// Everything here is overwritten on re-registration; only the identifier,
/// `first_seen` and `last_contact` live outside the profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub kind: AgentKind,
    pub hostname: String,
    #[serde(default)]
    pub ip_address: String,
    pub platform: Platform,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub capabilities: CapabilitySet,
    #[serde(default)]
    pub resources: ResourceProfile,
    #[serde(default = "default_status")]
    pub status: AgentStatus,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_status() -> AgentStatus {
    AgentStatus::Online
}

/// A registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Stable identifier the agent derives from its host attributes.
    pub id: String,
    pub kind: AgentKind,
    pub hostname: String,
    pub ip_address: String,
    pub platform: Platform,
    pub architecture: String,
    pub capabilities: CapabilitySet,
    pub resources: ResourceProfile,
    /// Soft status the agent self-reports. Liveness is derived from
    /// `last_contact`, never from this field.
    pub status: AgentStatus,
    pub first_seen: DateTime<Utc>,
    pub last_contact: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentRecord {
    pub fn new(id: impl Into<String>, profile: AgentProfile, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            kind: profile.kind,
            hostname: profile.hostname,
            ip_address: profile.ip_address,
            platform: profile.platform,
            architecture: profile.architecture,
            capabilities: profile.capabilities,
            resources: profile.resources,
            status: profile.status,
            first_seen: now,
            last_contact: now,
            metadata: profile.metadata,
        }
    }

    /// Overwrites the mutable attributes on re-registration and refreshes
    /// `last_contact`. `first_seen` is preserved.
    pub fn apply(&mut self, profile: AgentProfile, now: DateTime<Utc>) {
        self.kind = profile.kind;
        self.hostname = profile.hostname;
        self.ip_address = profile.ip_address;
        self.platform = profile.platform;
        self.architecture = profile.architecture;
        self.capabilities = profile.capabilities;
        self.resources = profile.resources;
        self.status = profile.status;
        self.metadata = profile.metadata;
        self.last_contact = now;
    }

    /// Whether the agent counts as online at `now` given the configured
    /// liveness window. Liveness is always computed, never stored.
    pub fn is_online_at(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now.signed_duration_since(self.last_contact) < threshold
    }
}

/// Aggregate fleet counts for the operator surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub by_platform: HashMap<String, usize>,
}

/// Validates an agent identifier.
///
/// Identifiers become file names in the file-backed store, so the charset is
/// restricted to path-safe characters.
pub fn validate_agent_id(id: &str) -> MusterResult<()> {
    if id.is_empty() || id.len() > 64 {
        return Err(MusterError::Validation(
            "agent id must be 1-64 characters".to_string(),
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(MusterError::Validation(format!(
            "agent id '{id}' contains characters outside [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}
