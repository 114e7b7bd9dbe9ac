use crate::command::Command;
use async_trait::async_trait;
use muster_core::{MusterError, MusterResult};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage backend for command records.
///
/// `list` returns commands ordered by `created_at` (id as tiebreaker), which
/// is the dispatch order agents see.
#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn put(&self, command: &Command) -> MusterResult<()>;
    async fn get(&self, id: Uuid) -> MusterResult<Option<Command>>;
    async fn list(&self) -> MusterResult<Vec<Command>>;
}

fn sort_by_dispatch_order(commands: &mut [Command]) {
    commands.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// In-memory command store. State does not survive a restart.
pub struct InMemoryCommandStore {
    commands: RwLock<HashMap<Uuid, Command>>,
}

impl InMemoryCommandStore {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCommandStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandStore for InMemoryCommandStore {
    async fn put(&self, command: &Command) -> MusterResult<()> {
        let mut commands = self.commands.write().await;
        commands.insert(command.id, command.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> MusterResult<Option<Command>> {
        let commands = self.commands.read().await;
        Ok(commands.get(&id).cloned())
    }

    async fn list(&self) -> MusterResult<Vec<Command>> {
        let commands = self.commands.read().await;
        let mut all: Vec<Command> = commands.values().cloned().collect();
        sort_by_dispatch_order(&mut all);
        Ok(all)
    }
}

/// File-based command store (one JSON file per command).
pub struct FileCommandStore {
    dir: PathBuf,
}

impl FileCommandStore {
    pub async fn new(dir: PathBuf) -> MusterResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn command_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl CommandStore for FileCommandStore {
    async fn put(&self, command: &Command) -> MusterResult<()> {
        let path = self.command_path(command.id);
        let json = serde_json::to_string_pretty(command)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> MusterResult<Option<Command>> {
        let path = self.command_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let command: Command = serde_json::from_str(&data)
            .map_err(|e| MusterError::Storage(format!("Failed to parse command {id}: {e}")))?;
        Ok(Some(command))
    }

    async fn list(&self) -> MusterResult<Vec<Command>> {
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
            let command: Command = serde_json::from_str(&data)
                .map_err(|e| MusterError::Storage(format!("Failed to parse {name}: {e}")))?;
            all.push(command);
        }
        sort_by_dispatch_order(&mut all);
        Ok(all)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use muster_core::CommandKind;

    #[tokio::test]
    async fn test_memory_store_orders_by_creation_time() {
        let store = InMemoryCommandStore::new();

        let mut late = Command::new("a1", CommandKind::System, "late", serde_json::json!({}));
        late.created_at = late.created_at + Duration::seconds(10);
        let early = Command::new("a1", CommandKind::System, "early", serde_json::json!({}));

        store.put(&late).await.unwrap();
        store.put(&early).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all[0].name, "early");
        assert_eq!(all[1].name, "late");
    }

    #[tokio::test]
    async fn test_file_store_round_trips_sealed_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCommandStore::new(dir.path().to_path_buf()).await.unwrap();

        let mut command = Command::new("a1", CommandKind::Data, "inventory", serde_json::json!({}));
        command.sealed_output = Some(vec![9, 8, 7, 6]);
        store.put(&command).await.unwrap();

        let got = store.get(command.id).await.unwrap().unwrap();
        assert_eq!(got.sealed_output.as_deref(), Some([9, 8, 7, 6].as_slice()));
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
