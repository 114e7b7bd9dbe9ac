use crate::queue::CommandQueue;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawns the background timeout sweep.
///
/// Every `interval` the sweep moves overdue open commands to `timeout`. The
/// sweep is the only way a command reaches a terminal state without an agent
/// report. Runs until `shutdown` fires.
pub fn spawn_sweep(
    queue: Arc<CommandQueue>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("timeout sweep stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match queue.sweep_once(Utc::now()).await {
                        Ok(0) => {}
                        Ok(swept) => info!(swept, "timeout sweep transitioned commands"),
                        Err(e) => warn!(error = %e, "timeout sweep pass failed"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::command::CommandStatus;
    use crate::store::InMemoryCommandStore;
    use muster_core::seal::{Sealer, KEY_LEN};
    use muster_core::{
        AgentKind, AgentStatus, CapabilitySet, CommandKind, Platform, ResourceProfile,
    };
    use muster_registry::{AgentProfile, InMemoryRegistryStore, Registry};

    async fn short_timeout_queue() -> Arc<CommandQueue> {
        let registry = Arc::new(Registry::new(
            Arc::new(InMemoryRegistryStore::new()),
            chrono::Duration::seconds(300),
        ));
        registry
            .register(
                "a1",
                AgentProfile {
                    kind: AgentKind::Native,
                    hostname: "h1".to_string(),
                    ip_address: String::new(),
                    platform: Platform::Linux,
                    architecture: String::new(),
                    capabilities: CapabilitySet::default(),
                    resources: ResourceProfile::default(),
                    status: AgentStatus::Online,
                    metadata: std::collections::HashMap::new(),
                },
            )
            .await
            .unwrap();
        Arc::new(CommandQueue::new(
            Arc::new(InMemoryCommandStore::new()),
            registry,
            Sealer::new(&[1u8; KEY_LEN]),
            chrono::Duration::zero(),
        ))
    }

    #[tokio::test]
    async fn test_sweep_task_runs_and_stops() {
        let queue = short_timeout_queue().await;
        let command = queue
            .enqueue("a1", CommandKind::System, "will_expire", serde_json::json!({}))
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = spawn_sweep(queue.clone(), Duration::from_millis(10), shutdown.clone());

        // Zero horizon: the first pass should sweep it almost immediately.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            queue.get(command.id).await.unwrap().status,
            CommandStatus::Timeout
        );

        shutdown.cancel();
        handle.await.unwrap();
    }
}
