use crate::command::{Command, CommandReport, CommandStats, CommandStatus};
use crate::store::CommandStore;
use chrono::{DateTime, Duration, Utc};
use muster_core::seal::Sealer;
use muster_core::{CommandKind, MusterError, MusterResult};
use muster_registry::Registry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Dispatch queue for the fleet.
///
/// Owns the command state machine. All transitions serialize on one lock so
/// a check-then-write pair can never interleave with another transition; the
/// stores only ever see whole-record writes.
pub struct CommandQueue {
    store: Arc<dyn CommandStore>,
    registry: Arc<Registry>,
    sealer: Sealer,
    command_timeout: Duration,
    transitions: Mutex<()>,
}

impl CommandQueue {
    pub fn new(
        store: Arc<dyn CommandStore>,
        registry: Arc<Registry>,
        sealer: Sealer,
        command_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            sealer,
            command_timeout,
            transitions: Mutex::new(()),
        }
    }

    /// Queues a command for an agent.
    ///
    /// The agent must be registered and must have declared the capability the
    /// command kind requires; gated work is rejected at enqueue time rather
    /// than left to rot unclaimed.
    pub async fn enqueue(
        &self,
        agent_id: &str,
        kind: CommandKind,
        name: &str,
        params: serde_json::Value,
    ) -> MusterResult<Command> {
        if name.is_empty() {
            return Err(MusterError::Validation(
                "command name is required".to_string(),
            ));
        }
        let agent = self.registry.get(agent_id).await?;
        if !agent.capabilities.permits(kind) {
            return Err(MusterError::CapabilityMismatch(format!(
                "agent {agent_id} did not declare the capability required by {} commands",
                kind.as_str()
            )));
        }
        let command = Command::new(agent_id, kind, name, params);
        self.store.put(&command).await?;
        info!(
            command_id = %command.id,
            agent_id,
            kind = kind.as_str(),
            name,
            "command enqueued"
        );
        Ok(command)
    }

    /// Open commands (`pending` and `executing`) in dispatch order.
    ///
    /// With an agent filter this is the agent's poll: it also refreshes the
    /// agent's `last_contact`. Without a filter it is the operator view.
    /// Polling never mutates command status.
    pub async fn poll_pending(&self, agent_id: Option<&str>) -> MusterResult<Vec<Command>> {
        if let Some(id) = agent_id {
            self.registry.touch(id).await?;
        }
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(Command::is_open)
            .filter(|c| agent_id.map_or(true, |id| c.agent_id == id))
            .collect())
    }

    /// Advisory `pending → executing` transition, stamping `executed_at`.
    pub async fn begin(&self, id: Uuid) -> MusterResult<Command> {
        let _guard = self.transitions.lock().await;
        let mut command = self.fetch(id).await?;
        if command.status != CommandStatus::Pending {
            return Err(invalid_transition(&command, CommandStatus::Executing));
        }
        command.status = CommandStatus::Executing;
        command.executed_at = Some(Utc::now());
        self.store.put(&command).await?;
        Ok(command)
    }

    /// Records an agent's result and moves the command to its terminal state:
    /// `completed` on exit code 0, `failed` otherwise.
    ///
    /// A report on a still-`pending` command implies the begin transition.
    /// Reports on terminal commands are rejected; reporting is not
    /// idempotent. Non-empty output is sealed before it is stored.
    pub async fn report(&self, id: Uuid, report: CommandReport) -> MusterResult<Command> {
        let _guard = self.transitions.lock().await;
        let mut command = self.fetch(id).await?;
        if command.status.is_terminal() {
            return Err(MusterError::InvalidTransition(format!(
                "command {id} already {}",
                command.status.as_str()
            )));
        }
        let now = Utc::now();
        command.status = if report.exit_code == 0 {
            CommandStatus::Completed
        } else {
            CommandStatus::Failed
        };
        if command.executed_at.is_none() {
            command.executed_at = Some(now);
        }
        command.completed_at = Some(now);
        command.exit_code = Some(report.exit_code);
        command.error = report.error.filter(|e| !e.is_empty());
        command.sealed_output = if report.output.is_empty() {
            None
        } else {
            Some(self.sealer.seal(report.output.as_bytes())?)
        };
        self.store.put(&command).await?;
        info!(
            command_id = %id,
            agent_id = %command.agent_id,
            status = command.status.as_str(),
            exit_code = report.exit_code,
            "command reported"
        );
        Ok(command)
    }

    /// Decrypts a command's stored output on demand.
    pub async fn output(&self, id: Uuid) -> MusterResult<Vec<u8>> {
        let command = self.fetch(id).await?;
        let sealed = command
            .sealed_output
            .as_deref()
            .ok_or_else(|| MusterError::NotFound(format!("command {id} has no stored output")))?;
        self.sealer.open(sealed)
    }

    pub async fn get(&self, id: Uuid) -> MusterResult<Command> {
        self.fetch(id).await
    }

    pub async fn list(&self) -> MusterResult<Vec<Command>> {
        self.store.list().await
    }

    /// The `n` most recently created commands, newest first.
    pub async fn recent(&self, n: usize) -> MusterResult<Vec<Command>> {
        let mut all = self.store.list().await?;
        all.reverse();
        all.truncate(n);
        Ok(all)
    }

    /// Aggregate counts by status for the operator surface.
    pub async fn stats(&self) -> MusterResult<CommandStats> {
        let all = self.store.list().await?;
        let mut by_status: HashMap<String, usize> = HashMap::new();
        for command in &all {
            *by_status
                .entry(command.status.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(CommandStats {
            total: all.len(),
            by_status,
        })
    }

    /// One sweep pass: any open command older than the execution horizon
    /// moves to `timeout`. Age counts from `executed_at` once executing,
    /// otherwise from `created_at`. Returns how many commands were swept.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> MusterResult<usize> {
        let _guard = self.transitions.lock().await;
        let mut swept = 0;
        for mut command in self.store.list().await? {
            if !command.is_open() {
                continue;
            }
            let since = command.executed_at.unwrap_or(command.created_at);
            if now.signed_duration_since(since) >= self.command_timeout {
                command.status = CommandStatus::Timeout;
                command.completed_at = Some(now);
                self.store.put(&command).await?;
                warn!(
                    command_id = %command.id,
                    agent_id = %command.agent_id,
                    "command timed out"
                );
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn fetch(&self, id: Uuid) -> MusterResult<Command> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| MusterError::NotFound(format!("command {id}")))
    }
}

fn invalid_transition(command: &Command, to: CommandStatus) -> MusterError {
    MusterError::InvalidTransition(format!(
        "command {}: {} -> {}",
        command.id,
        command.status.as_str(),
        to.as_str()
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryCommandStore;
    use muster_core::seal;
    use muster_core::{AgentKind, AgentStatus, CapabilitySet, Platform, ResourceProfile};
    use muster_registry::{AgentProfile, InMemoryRegistryStore};

    async fn queue_with_agent(agent_id: &str, capabilities: CapabilitySet) -> CommandQueue {
        let registry = Arc::new(Registry::new(
            Arc::new(InMemoryRegistryStore::new()),
            Duration::seconds(300),
        ));
        registry
            .register(
                agent_id,
                AgentProfile {
                    kind: AgentKind::Native,
                    hostname: format!("host-{agent_id}"),
                    ip_address: String::new(),
                    platform: Platform::Linux,
                    architecture: "x86_64".to_string(),
                    capabilities,
                    resources: ResourceProfile::default(),
                    status: AgentStatus::Online,
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap();
        CommandQueue::new(
            Arc::new(InMemoryCommandStore::new()),
            registry,
            Sealer::new(&[7u8; seal::KEY_LEN]),
            Duration::seconds(900),
        )
    }

    fn report_ok(output: &str) -> CommandReport {
        CommandReport {
            output: output.to_string(),
            error: None,
            exit_code: 0,
        }
    }

    #[tokio::test]
    async fn test_enqueue_unknown_agent_is_not_found() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        let err = queue
            .enqueue("ghost", CommandKind::System, "hostname", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_enqueue_gates_on_capabilities() {
        // Declares data collection only; mining work must be refused.
        let caps = CapabilitySet {
            can_collect: true,
            ..CapabilitySet::default()
        };
        let queue = queue_with_agent("bot-7", caps).await;

        let err = queue
            .enqueue("bot-7", CommandKind::Mining, "start_hashing", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::CapabilityMismatch(_)));

        queue
            .enqueue("bot-7", CommandKind::Data, "collect_files", serde_json::json!({}))
            .await
            .unwrap();
        queue
            .enqueue("bot-7", CommandKind::System, "hostname", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(queue.poll_pending(Some("bot-7")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_poll_returns_open_commands_in_dispatch_order() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        let first = queue
            .enqueue("a1", CommandKind::System, "first", serde_json::json!({}))
            .await
            .unwrap();
        let second = queue
            .enqueue("a1", CommandKind::System, "second", serde_json::json!({}))
            .await
            .unwrap();

        // An executing command still shows up in the poll.
        queue.begin(first.id).await.unwrap();

        let open = queue.poll_pending(Some("a1")).await.unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].id, first.id);
        assert_eq!(open[1].id, second.id);

        // Polling did not mutate status.
        assert_eq!(open[0].status, CommandStatus::Executing);
        assert_eq!(open[1].status, CommandStatus::Pending);
    }

    #[tokio::test]
    async fn test_poll_filters_by_agent() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        queue
            .enqueue("a1", CommandKind::System, "only", serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(queue.poll_pending(Some("other")).await.unwrap().len(), 0);
        assert_eq!(queue.poll_pending(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_begin_then_report_completes() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        let command = queue
            .enqueue("a1", CommandKind::System, "uptime", serde_json::json!({}))
            .await
            .unwrap();

        let executing = queue.begin(command.id).await.unwrap();
        assert_eq!(executing.status, CommandStatus::Executing);
        assert!(executing.executed_at.is_some());

        let done = queue.report(command.id, report_ok("up 3 days")).await.unwrap();
        assert_eq!(done.status, CommandStatus::Completed);
        assert_eq!(done.exit_code, Some(0));
        assert!(done.completed_at.unwrap() >= done.executed_at.unwrap());
    }

    #[tokio::test]
    async fn test_nonzero_exit_code_fails_the_command() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        let command = queue
            .enqueue("a1", CommandKind::System, "broken", serde_json::json!({}))
            .await
            .unwrap();

        let done = queue
            .report(
                command.id,
                CommandReport {
                    output: String::new(),
                    error: Some("no such file".to_string()),
                    exit_code: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, CommandStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("no such file"));
        assert!(done.sealed_output.is_none());
    }

    #[tokio::test]
    async fn test_report_from_pending_implies_begin() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        let command = queue
            .enqueue("a1", CommandKind::System, "quick", serde_json::json!({}))
            .await
            .unwrap();

        let done = queue.report(command.id, report_ok("done")).await.unwrap();
        assert_eq!(done.status, CommandStatus::Completed);
        assert!(done.executed_at.is_some());
    }

    #[tokio::test]
    async fn test_second_report_is_rejected() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        let command = queue
            .enqueue("a1", CommandKind::System, "once", serde_json::json!({}))
            .await
            .unwrap();

        queue.report(command.id, report_ok("first")).await.unwrap();
        let err = queue
            .report(command.id, report_ok("second"))
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::InvalidTransition(_)));

        // The stored result is still the first report's.
        assert_eq!(queue.output(command.id).await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_begin_on_terminal_command_is_rejected() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        let command = queue
            .enqueue("a1", CommandKind::System, "done", serde_json::json!({}))
            .await
            .unwrap();
        queue.report(command.id, report_ok("x")).await.unwrap();

        let err = queue.begin(command.id).await.unwrap_err();
        assert!(matches!(err, MusterError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_output_is_sealed_at_rest_and_decrypted_on_demand() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        let command = queue
            .enqueue("a1", CommandKind::System, "env", serde_json::json!({}))
            .await
            .unwrap();

        let done = queue
            .report(command.id, report_ok("PATH=/usr/bin"))
            .await
            .unwrap();

        // Nothing stored resembles the plaintext.
        let sealed = done.sealed_output.unwrap();
        assert_ne!(sealed.as_slice(), b"PATH=/usr/bin".as_slice());

        assert_eq!(queue.output(command.id).await.unwrap(), b"PATH=/usr/bin");
    }

    #[tokio::test]
    async fn test_output_missing_is_not_found() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        let command = queue
            .enqueue("a1", CommandKind::System, "silent", serde_json::json!({}))
            .await
            .unwrap();
        queue.report(command.id, report_ok("")).await.unwrap();

        let err = queue.output(command.id).await.unwrap_err();
        assert!(matches!(err, MusterError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sweep_times_out_overdue_commands() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        let stuck = queue
            .enqueue("a1", CommandKind::System, "stuck", serde_json::json!({}))
            .await
            .unwrap();
        queue.begin(stuck.id).await.unwrap();
        let fresh = queue
            .enqueue("a1", CommandKind::System, "fresh", serde_json::json!({}))
            .await
            .unwrap();
        let done = queue
            .enqueue("a1", CommandKind::System, "done", serde_json::json!({}))
            .await
            .unwrap();
        queue.report(done.id, report_ok("ok")).await.unwrap();

        // Far future: the executing command and the never-claimed pending one
        // are both past the horizon; the terminal one must not change.
        let later = Utc::now() + Duration::seconds(3600);
        let swept = queue.sweep_once(later).await.unwrap();
        assert_eq!(swept, 2);

        assert_eq!(queue.get(stuck.id).await.unwrap().status, CommandStatus::Timeout);
        assert_eq!(queue.get(fresh.id).await.unwrap().status, CommandStatus::Timeout);
        assert_eq!(queue.get(done.id).await.unwrap().status, CommandStatus::Completed);

        // Swept commands drop out of the poll.
        assert!(queue.poll_pending(Some("a1")).await.unwrap().is_empty());

        // And a report on a swept command is an invalid transition.
        let err = queue.report(stuck.id, report_ok("late")).await.unwrap_err();
        assert!(matches!(err, MusterError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_sweep_leaves_fresh_commands_alone() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        let command = queue
            .enqueue("a1", CommandKind::System, "new", serde_json::json!({}))
            .await
            .unwrap();

        let swept = queue.sweep_once(Utc::now()).await.unwrap();
        assert_eq!(swept, 0);
        assert_eq!(
            queue.get(command.id).await.unwrap().status,
            CommandStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_stats_count_by_status() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        let a = queue
            .enqueue("a1", CommandKind::System, "a", serde_json::json!({}))
            .await
            .unwrap();
        queue
            .enqueue("a1", CommandKind::System, "b", serde_json::json!({}))
            .await
            .unwrap();
        queue.report(a.id, report_ok("x")).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.get("completed"), Some(&1));
        assert_eq!(stats.by_status.get("pending"), Some(&1));
    }

    #[tokio::test]
    async fn test_recent_returns_newest_first() {
        let queue = queue_with_agent("a1", CapabilitySet::default()).await;
        queue
            .enqueue("a1", CommandKind::System, "old", serde_json::json!({}))
            .await
            .unwrap();
        queue
            .enqueue("a1", CommandKind::System, "new", serde_json::json!({}))
            .await
            .unwrap();

        let recent = queue.recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].name, "new");
    }
}
