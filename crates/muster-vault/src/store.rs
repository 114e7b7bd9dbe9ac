use crate::artifact::ArtifactRecord;
use async_trait::async_trait;
use muster_core::{MusterError, MusterResult};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage backend for artifact records.
///
/// `list` returns artifacts ordered by `created_at` (id as tiebreaker).
#[async_trait]
pub trait VaultStore: Send + Sync {
    async fn put(&self, artifact: &ArtifactRecord) -> MusterResult<()>;
    async fn get(&self, id: Uuid) -> MusterResult<Option<ArtifactRecord>>;
    async fn list(&self) -> MusterResult<Vec<ArtifactRecord>>;
}

fn sort_by_upload_order(artifacts: &mut [ArtifactRecord]) {
    artifacts.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// In-memory vault store. State does not survive a restart.
pub struct InMemoryVaultStore {
    artifacts: RwLock<HashMap<Uuid, ArtifactRecord>>,
}

impl InMemoryVaultStore {
    pub fn new() -> Self {
        Self {
            artifacts: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVaultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VaultStore for InMemoryVaultStore {
    async fn put(&self, artifact: &ArtifactRecord) -> MusterResult<()> {
        let mut artifacts = self.artifacts.write().await;
        artifacts.insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> MusterResult<Option<ArtifactRecord>> {
        let artifacts = self.artifacts.read().await;
        Ok(artifacts.get(&id).cloned())
    }

    async fn list(&self) -> MusterResult<Vec<ArtifactRecord>> {
        let artifacts = self.artifacts.read().await;
        let mut all: Vec<ArtifactRecord> = artifacts.values().cloned().collect();
        sort_by_upload_order(&mut all);
        Ok(all)
    }
}

/// File-based vault store (one JSON file per artifact, payload sealed).
pub struct FileVaultStore {
    dir: PathBuf,
}

impl FileVaultStore {
    pub async fn new(dir: PathBuf) -> MusterResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn artifact_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl VaultStore for FileVaultStore {
    async fn put(&self, artifact: &ArtifactRecord) -> MusterResult<()> {
        let path = self.artifact_path(artifact.id);
        let json = serde_json::to_string(artifact)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> MusterResult<Option<ArtifactRecord>> {
        let path = self.artifact_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let artifact: ArtifactRecord = serde_json::from_str(&data)
            .map_err(|e| MusterError::Storage(format!("Failed to parse artifact {id}: {e}")))?;
        Ok(Some(artifact))
    }

    async fn list(&self) -> MusterResult<Vec<ArtifactRecord>> {
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
            let artifact: ArtifactRecord = serde_json::from_str(&data)
                .map_err(|e| MusterError::Storage(format!("Failed to parse {name}: {e}")))?;
            all.push(artifact);
        }
        sort_by_upload_order(&mut all);
        Ok(all)
    }
}
