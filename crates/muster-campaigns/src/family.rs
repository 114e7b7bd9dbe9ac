use chrono::{DateTime, Utc};
use muster_core::{CapabilitySet, MusterError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A capability family the orchestrator can run workers for.
///
/// Families share one orchestration contract; they differ only in the
/// handler that produces their units of work and in which capability flag
/// gates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Hash-computation workloads; gated on `can_mine`.
    Mining,
    /// Request-flood workloads; gated on `can_flood`.
    Flood,
    /// Search-traffic workloads; gated on `can_boost`.
    Boost,
}

impl Family {
    /// The lowercase wire name, used in routes and aggregation keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Mining => "mining",
            Family::Flood => "flood",
            Family::Boost => "boost",
        }
    }

    /// Whether an agent's declared capabilities admit this family.
    pub fn permitted_by(&self, caps: &CapabilitySet) -> bool {
        match self {
            Family::Mining => caps.can_mine,
            Family::Flood => caps.can_flood,
            Family::Boost => caps.can_boost,
        }
    }
}

impl std::str::FromStr for Family {
    type Err = MusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mining" => Ok(Family::Mining),
            "flood" => Ok(Family::Flood),
            "boost" => Ok(Family::Boost),
            other => Err(MusterError::Validation(format!(
                "unknown campaign family '{other}'"
            ))),
        }
    }
}

/// Parameters for a worker or a campaign. One bag across families; each
/// handler validates the fields it needs at start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerParams {
    /// Search keyword (boost family).
    #[serde(default)]
    pub keyword: Option<String>,
    /// Target identifier (flood family). Simulation handlers never contact it.
    #[serde(default)]
    pub target: Option<String>,
    /// Hash algorithm label (mining family).
    #[serde(default)]
    pub algorithm: Option<String>,
    /// Work intensity, 1-100.
    #[serde(default = "default_intensity")]
    pub intensity: u8,
}

impl Default for WorkerParams {
    fn default() -> Self {
        Self {
            keyword: None,
            target: None,
            algorithm: None,
            intensity: default_intensity(),
        }
    }
}

fn default_intensity() -> u8 {
    50
}

/// A named, time-bounded aggregate operation over one family.
#[derive(Debug, Clone)]
pub struct CampaignSpec {
    /// Unique among active campaigns.
    pub name: String,
    pub family: Family,
    pub params: WorkerParams,
    /// Maximum agents the campaign keeps a worker on per cycle.
    pub agent_count: usize,
    /// How long the campaign runs before draining its workers.
    pub duration: Duration,
}

/// Outcome of a worker start. Repeating a start is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Outcome of a worker or campaign stop. Stopping something idle is not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

/// Outcome of a campaign start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignOutcome {
    #[serde(rename = "campaign_started")]
    Started,
    #[serde(rename = "campaign_exists")]
    AlreadyExists,
}

/// Live stats for a campaign, derived from the worker table at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStats {
    pub campaign: String,
    pub family: Family,
    pub keyword: Option<String>,
    /// Workers currently running work that matches this campaign.
    pub active_workers: usize,
    /// Units produced by those workers so far.
    pub units_produced: u64,
    pub running_secs: i64,
    pub status: String,
}

/// Per-family slice of the orchestrator overview.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FamilyActivity {
    pub workers: usize,
    pub units: u64,
}

/// Snapshot of everything the orchestrator is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorOverview {
    pub total_workers: usize,
    pub worker_ceiling: usize,
    pub by_family: HashMap<String, FamilyActivity>,
    pub campaigns: Vec<CampaignStats>,
}

/// When a worker started, for stats derivation.
pub(crate) fn running_secs(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(started_at).num_seconds()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn family_wire_names_round_trip() {
        for family in [Family::Mining, Family::Flood, Family::Boost] {
            let parsed: Family = family.as_str().parse().unwrap();
            assert_eq!(parsed, family);
        }
        assert!("delivery".parse::<Family>().is_err());
    }

    #[test]
    fn families_map_to_their_capability_flags() {
        let caps = CapabilitySet {
            can_boost: true,
            ..CapabilitySet::default()
        };
        assert!(Family::Boost.permitted_by(&caps));
        assert!(!Family::Mining.permitted_by(&caps));
        assert!(!Family::Flood.permitted_by(&caps));
    }

    #[test]
    fn outcome_wire_words() {
        assert_eq!(
            serde_json::to_string(&StartOutcome::AlreadyRunning).unwrap(),
            "\"already_running\""
        );
        assert_eq!(
            serde_json::to_string(&CampaignOutcome::AlreadyExists).unwrap(),
            "\"campaign_exists\""
        );
        assert_eq!(
            serde_json::to_string(&StopOutcome::NotRunning).unwrap(),
            "\"not_running\""
        );
    }

    #[test]
    fn params_default_to_mid_intensity() {
        let params = WorkerParams::default();
        assert_eq!(params.intensity, 50);
        assert!(params.keyword.is_none());
    }
}
