use crate::agent::{validate_agent_id, AgentRecord};
use async_trait::async_trait;
use muster_core::{MusterError, MusterResult};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Storage backend for agent records.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn put(&self, agent: &AgentRecord) -> MusterResult<()>;
    async fn get(&self, id: &str) -> MusterResult<Option<AgentRecord>>;
    async fn list(&self) -> MusterResult<Vec<AgentRecord>>;
}

/// In-memory registry store. State does not survive a restart.
pub struct InMemoryRegistryStore {
    agents: RwLock<HashMap<String, AgentRecord>>,
}

impl InMemoryRegistryStore {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn put(&self, agent: &AgentRecord) -> MusterResult<()> {
        let mut agents = self.agents.write().await;
        agents.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> MusterResult<Option<AgentRecord>> {
        let agents = self.agents.read().await;
        Ok(agents.get(id).cloned())
    }

    async fn list(&self) -> MusterResult<Vec<AgentRecord>> {
        let agents = self.agents.read().await;
        let mut all: Vec<AgentRecord> = agents.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

/// File-based registry store (one JSON file per agent).
pub struct FileRegistryStore {
    dir: PathBuf,
}

impl FileRegistryStore {
    pub async fn new(dir: PathBuf) -> MusterResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn agent_path(&self, id: &str) -> MusterResult<PathBuf> {
        // Ids land on disk as file names; reject anything path-unsafe.
        validate_agent_id(id)?;
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl RegistryStore for FileRegistryStore {
    async fn put(&self, agent: &AgentRecord) -> MusterResult<()> {
        let path = self.agent_path(&agent.id)?;
        let json = serde_json::to_string_pretty(agent)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> MusterResult<Option<AgentRecord>> {
        let path = self.agent_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let agent: AgentRecord = serde_json::from_str(&data)
            .map_err(|e| MusterError::Storage(format!("Failed to parse agent {id}: {e}")))?;
        Ok(Some(agent))
    }

    async fn list(&self) -> MusterResult<Vec<AgentRecord>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut all = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !name.ends_with(".json") {
                continue;
            }
            let data = tokio::fs::read_to_string(entry.path()).await?;
            let agent: AgentRecord = serde_json::from_str(&data)
                .map_err(|e| MusterError::Storage(format!("Failed to parse {name}: {e}")))?;
            all.push(agent);
        }
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::agent::AgentProfile;
    use chrono::Utc;
    use muster_core::{AgentKind, AgentStatus, CapabilitySet, Platform, ResourceProfile};
    use std::collections::HashMap;

    fn record(id: &str) -> AgentRecord {
        AgentRecord::new(
            id,
            AgentProfile {
                kind: AgentKind::Script,
                hostname: format!("host-{id}"),
                ip_address: String::new(),
                platform: Platform::Linux,
                architecture: "aarch64".to_string(),
                capabilities: CapabilitySet::default(),
                resources: ResourceProfile::default(),
                status: AgentStatus::Online,
                metadata: HashMap::new(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn memory_store_put_get_list() {
        let store = InMemoryRegistryStore::new();
        store.put(&record("b2")).await.unwrap();
        store.put(&record("a1")).await.unwrap();

        let got = store.get("a1").await.unwrap().unwrap();
        assert_eq!(got.hostname, "host-a1");
        assert!(store.get("missing").await.unwrap().is_none());

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "a1");
        assert_eq!(all[1].id, "b2");
    }

    #[tokio::test]
    async fn file_store_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRegistryStore::new(dir.path().to_path_buf()).await.unwrap();

        store.put(&record("a1")).await.unwrap();
        let got = store.get("a1").await.unwrap().unwrap();
        assert_eq!(got.id, "a1");
        assert_eq!(got.platform, Platform::Linux);

        // Overwrite is an update, not a duplicate.
        let mut changed = record("a1");
        changed.hostname = "renamed".to_string();
        store.put(&changed).await.unwrap();
        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].hostname, "renamed");
    }

    #[tokio::test]
    async fn file_store_rejects_path_unsafe_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRegistryStore::new(dir.path().to_path_buf()).await.unwrap();
        assert!(store.get("../../etc/passwd").await.is_err());
    }
}
