use chrono::{DateTime, Utc};
use muster_core::CommandKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle status of a dispatched command.
///
/// `pending → executing → completed | failed` is the normal path; the sweep
/// moves overdue `pending` or `executing` commands to `timeout`. The three
/// terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Timeout,
}

impl CommandStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Timeout
        )
    }

    /// The lowercase wire name, used as an aggregation key in stats.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Executing => "executing",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
            CommandStatus::Timeout => "timeout",
        }
    }
}

/// A single dispatched command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub agent_id: String,
    pub kind: CommandKind,
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    /// Execution output sealed with the process key. The plaintext an agent
    /// reports is encrypted immediately and never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed_output: Option<Vec<u8>>,
}

impl Command {
    pub fn new(
        agent_id: impl Into<String>,
        kind: CommandKind,
        name: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            kind,
            name: name.into(),
            params,
            status: CommandStatus::Pending,
            created_at: Utc::now(),
            executed_at: None,
            completed_at: None,
            error: None,
            exit_code: None,
            sealed_output: None,
        }
    }

    /// Whether the command still counts against an agent's open work.
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            CommandStatus::Pending | CommandStatus::Executing
        )
    }
}

/// Result payload an agent reports after running a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReport {
    /// Captured output. Sealed at report time; empty output stores nothing.
    #[serde(default)]
    pub output: String,
    /// Error text, kept in clear for triage.
    #[serde(default)]
    pub error: Option<String>,
    pub exit_code: i32,
}

/// Aggregate command counts for the operator surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandStats {
    pub total: usize,
    pub by_status: HashMap<String, usize>,
}
