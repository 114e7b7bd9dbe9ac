//! Artifact vault: encrypted-at-rest storage for payloads agents return.

/// Artifact records and metadata views.
pub mod artifact;
/// Storage backends for artifact records.
pub mod store;
/// The vault service.
pub mod vault;

pub use artifact::{ArtifactKind, ArtifactMeta, ArtifactRecord};
pub use store::{FileVaultStore, InMemoryVaultStore, VaultStore};
pub use vault::Vault;
