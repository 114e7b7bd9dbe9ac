use crate::agent::{validate_agent_id, AgentProfile, AgentRecord, FleetStats};
use crate::store::RegistryStore;
use chrono::{Duration, Utc};
use muster_core::{MusterError, MusterResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Fleet registry service.
///
/// Registration is an idempotent upsert keyed by the agent's derived
/// identifier, so a re-installed or restarted agent reclaims its record
/// instead of creating a duplicate.
pub struct Registry {
    store: Arc<dyn RegistryStore>,
    liveness_threshold: Duration,
}

impl Registry {
    pub fn new(store: Arc<dyn RegistryStore>, liveness_threshold: Duration) -> Self {
        Self {
            store,
            liveness_threshold,
        }
    }

    /// Registers an agent, or refreshes it if the identifier is known.
    pub async fn register(&self, id: &str, profile: AgentProfile) -> MusterResult<AgentRecord> {
        validate_agent_id(id)?;
        if profile.hostname.is_empty() {
            return Err(MusterError::Validation("hostname is required".to_string()));
        }
        let now = Utc::now();
        let agent = match self.store.get(id).await? {
            Some(mut existing) => {
                existing.apply(profile, now);
                debug!(agent_id = %id, "agent re-registered");
                existing
            }
            None => {
                let agent = AgentRecord::new(id, profile, now);
                info!(
                    agent_id = %id,
                    hostname = %agent.hostname,
                    platform = agent.platform.as_str(),
                    "agent registered"
                );
                agent
            }
        };
        self.store.put(&agent).await?;
        Ok(agent)
    }

    /// Refreshes `last_contact`; errors if the agent was never registered.
    pub async fn heartbeat(&self, id: &str) -> MusterResult<AgentRecord> {
        let mut agent = self.get(id).await?;
        agent.last_contact = Utc::now();
        self.store.put(&agent).await?;
        Ok(agent)
    }

    /// Refreshes `last_contact` if the agent exists; unknown ids are a no-op.
    ///
    /// Used on the command-poll path, where an unknown agent simply has no
    /// pending work.
    pub async fn touch(&self, id: &str) -> MusterResult<()> {
        if let Some(mut agent) = self.store.get(id).await? {
            agent.last_contact = Utc::now();
            self.store.put(&agent).await?;
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> MusterResult<AgentRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| MusterError::NotFound(format!("agent {id}")))
    }

    pub async fn exists(&self, id: &str) -> MusterResult<bool> {
        Ok(self.store.get(id).await?.is_some())
    }

    pub async fn list(&self) -> MusterResult<Vec<AgentRecord>> {
        self.store.list().await
    }

    /// Whether the agent counts as online right now.
    pub fn is_online(&self, agent: &AgentRecord) -> bool {
        agent.is_online_at(Utc::now(), self.liveness_threshold)
    }

    /// Agents currently inside the liveness window.
    pub async fn online_agents(&self) -> MusterResult<Vec<AgentRecord>> {
        let now = Utc::now();
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|a| a.is_online_at(now, self.liveness_threshold))
            .collect())
    }

    /// Aggregate counts for the operator surface. Online counts are derived
    /// from `last_contact` at call time.
    pub async fn fleet_stats(&self) -> MusterResult<FleetStats> {
        let agents = self.list().await?;
        let now = Utc::now();
        let mut by_platform: HashMap<String, usize> = HashMap::new();
        let mut online = 0;
        for agent in &agents {
            *by_platform.entry(agent.platform.as_str().to_string()).or_insert(0) += 1;
            if agent.is_online_at(now, self.liveness_threshold) {
                online += 1;
            }
        }
        Ok(FleetStats {
            total: agents.len(),
            online,
            offline: agents.len() - online,
            by_platform,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryRegistryStore;
    use muster_core::{AgentKind, AgentStatus, CapabilitySet, Platform, ResourceProfile};

    fn registry() -> Registry {
        Registry::new(
            Arc::new(InMemoryRegistryStore::new()),
            Duration::seconds(300),
        )
    }

    fn profile(hostname: &str) -> AgentProfile {
        AgentProfile {
            kind: AgentKind::Native,
            hostname: hostname.to_string(),
            ip_address: "192.0.2.10".to_string(),
            platform: Platform::Windows,
            architecture: "x86_64".to_string(),
            capabilities: CapabilitySet {
                can_mine: true,
                ..CapabilitySet::default()
            },
            resources: ResourceProfile {
                cpu_cores: 8,
                memory_bytes: 16 << 30,
                disk_bytes: 512 << 30,
            },
            status: AgentStatus::Online,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn register_twice_is_one_agent() {
        let registry = registry();
        let first = registry.register("agent-1", profile("h1")).await.unwrap();

        let mut updated = profile("h1-renamed");
        updated.capabilities.can_collect = true;
        let second = registry.register("agent-1", updated).await.unwrap();

        assert_eq!(registry.list().await.unwrap().len(), 1);
        assert_eq!(second.first_seen, first.first_seen);
        assert_eq!(second.hostname, "h1-renamed");
        assert!(second.capabilities.can_collect);
        assert!(second.last_contact >= first.last_contact);
    }

    #[tokio::test]
    async fn register_validates_inputs() {
        let registry = registry();
        let err = registry.register("", profile("h")).await.unwrap_err();
        assert!(matches!(err, MusterError::Validation(_)));

        let mut nameless = profile("h");
        nameless.hostname = String::new();
        let err = registry.register("agent-1", nameless).await.unwrap_err();
        assert!(matches!(err, MusterError::Validation(_)));
    }

    #[tokio::test]
    async fn heartbeat_unknown_agent_is_not_found() {
        let registry = registry();
        let err = registry.heartbeat("ghost").await.unwrap_err();
        assert!(matches!(err, MusterError::NotFound(_)));
    }

    #[tokio::test]
    async fn touch_unknown_agent_is_silent() {
        let registry = registry();
        registry.touch("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn heartbeat_advances_last_contact() {
        let registry = registry();
        let before = registry.register("agent-1", profile("h1")).await.unwrap();
        let after = registry.heartbeat("agent-1").await.unwrap();
        assert!(after.last_contact >= before.last_contact);
    }

    #[tokio::test]
    async fn fleet_stats_derive_liveness_from_last_contact() {
        let store = Arc::new(InMemoryRegistryStore::new());
        let registry = Registry::new(store.clone(), Duration::seconds(300));

        registry.register("fresh", profile("h1")).await.unwrap();

        // A stale record: registered long ago and never heard from since.
        let mut stale = AgentRecord::new("stale", profile("h2"), Utc::now());
        stale.last_contact = Utc::now() - Duration::seconds(600);
        store.put(&stale).await.unwrap();

        let stats = registry.fleet_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.online, 1);
        assert_eq!(stats.offline, 1);
        assert_eq!(stats.by_platform.get("windows"), Some(&2));

        let online = registry.online_agents().await.unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].id, "fresh");
    }
}
