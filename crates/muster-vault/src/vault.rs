use crate::artifact::{ArtifactKind, ArtifactMeta, ArtifactRecord};
use crate::store::VaultStore;
use chrono::Utc;
use muster_core::seal::{checksum_hex, Sealer};
use muster_core::{MusterError, MusterResult};
use muster_registry::Registry;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Encrypted artifact pipeline.
///
/// `put` is checksum, then seal, then persist; `open` is fetch, decrypt,
/// verify. Plaintext exists only in transit through these two calls.
pub struct Vault {
    store: Arc<dyn VaultStore>,
    registry: Arc<Registry>,
    sealer: Sealer,
}

impl Vault {
    pub fn new(store: Arc<dyn VaultStore>, registry: Arc<Registry>, sealer: Sealer) -> Self {
        Self {
            store,
            registry,
            sealer,
        }
    }

    /// Stores a payload an agent returned. The agent must be registered.
    pub async fn put(
        &self,
        agent_id: &str,
        kind: ArtifactKind,
        payload: &[u8],
        filename: Option<String>,
        description: Option<String>,
    ) -> MusterResult<ArtifactMeta> {
        self.registry.get(agent_id).await?;
        if payload.is_empty() {
            return Err(MusterError::Validation(
                "artifact payload is empty".to_string(),
            ));
        }
        let checksum = checksum_hex(payload);
        let sealed_payload = self.sealer.seal(payload)?;
        let record = ArtifactRecord {
            id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            kind,
            filename,
            description,
            size: payload.len(),
            checksum,
            created_at: Utc::now(),
            sealed_payload,
        };
        self.store.put(&record).await?;
        info!(
            artifact_id = %record.id,
            agent_id,
            size = record.size,
            "artifact stored"
        );
        Ok(ArtifactMeta::from(&record))
    }

    /// Decrypts an artifact on demand and verifies its checksum against the
    /// recorded one before handing the plaintext out.
    pub async fn open(&self, id: Uuid) -> MusterResult<(ArtifactMeta, Vec<u8>)> {
        let record = self.fetch(id).await?;
        let plaintext = self.sealer.open(&record.sealed_payload)?;
        if checksum_hex(&plaintext) != record.checksum {
            return Err(MusterError::Sealing(format!(
                "artifact {id} failed checksum verification"
            )));
        }
        Ok((ArtifactMeta::from(&record), plaintext))
    }

    pub async fn meta(&self, id: Uuid) -> MusterResult<ArtifactMeta> {
        Ok(ArtifactMeta::from(&self.fetch(id).await?))
    }

    /// Metadata listing, optionally filtered by agent. Never decrypts.
    pub async fn list(&self, agent_id: Option<&str>) -> MusterResult<Vec<ArtifactMeta>> {
        Ok(self
            .store
            .list()
            .await?
            .iter()
            .filter(|a| agent_id.map_or(true, |id| a.agent_id == id))
            .map(ArtifactMeta::from)
            .collect())
    }

    /// The `n` most recently stored artifacts, newest first. Never decrypts.
    pub async fn recent(&self, n: usize) -> MusterResult<Vec<ArtifactMeta>> {
        let mut metas: Vec<ArtifactMeta> =
            self.store.list().await?.iter().map(ArtifactMeta::from).collect();
        metas.reverse();
        metas.truncate(n);
        Ok(metas)
    }

    async fn fetch(&self, id: Uuid) -> MusterResult<ArtifactRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| MusterError::NotFound(format!("artifact {id}")))
    }
}
