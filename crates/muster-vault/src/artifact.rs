use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of an uploaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// A file collected from the host.
    File,
    /// Host/system information dumps.
    System,
    /// Network scans and captures.
    Network,
    /// Browser-sourced data.
    Browser,
    /// Log excerpts.
    Log,
    /// Anything else.
    Other,
}

/// A stored artifact: metadata plus the sealed payload.
///
/// The payload is sealed before it reaches a store and opened only on
/// explicit retrieval. `checksum` is SHA-256 over the plaintext, computed
/// before sealing, and never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: Uuid,
    pub agent_id: String,
    pub kind: ArtifactKind,
    pub filename: Option<String>,
    pub description: Option<String>,
    /// Plaintext size in bytes.
    pub size: usize,
    /// Hex SHA-256 of the plaintext.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    /// The sealed payload (`nonce || ciphertext`).
    pub sealed_payload: Vec<u8>,
}

/// The listing view of an artifact: everything except the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub id: Uuid,
    pub agent_id: String,
    pub kind: ArtifactKind,
    pub filename: Option<String>,
    pub description: Option<String>,
    pub size: usize,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl ArtifactMeta {
    /// The name a download of this artifact is served under.
    pub fn download_name(&self) -> String {
        self.filename
            .clone()
            .unwrap_or_else(|| format!("{}.bin", self.id))
    }
}

impl From<&ArtifactRecord> for ArtifactMeta {
    fn from(record: &ArtifactRecord) -> Self {
        Self {
            id: record.id,
            agent_id: record.agent_id.clone(),
            kind: record.kind,
            filename: record.filename.clone(),
            description: record.description.clone(),
            size: record.size,
            checksum: record.checksum.clone(),
            created_at: record.created_at,
        }
    }
}
