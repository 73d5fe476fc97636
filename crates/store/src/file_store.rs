//! File-based store — one pretty-printed JSON document per conversation.
//!
//! Layout: `<dir>/<conversation_id>.json`. Writes go to a temporary file in
//! the same directory and are renamed into place, so a reader never sees a
//! half-written snapshot.
//!
//! Default location: `~/.parley/conversations/`

use async_trait::async_trait;
use parley_core::collaborator::StateStore;
use parley_core::error::StoreError;
use parley_core::state::ConversationState;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const EXTENSION: &str = "json";

pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// A store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "File state store opened");
        Self { dir }
    }

    /// Default directory: `~/.parley/conversations`
    pub fn default_dir() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".parley").join("conversations")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, conversation_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !conversation_id.is_empty()
            && conversation_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !conversation_id.starts_with('.');
        if !valid {
            return Err(StoreError::Storage(format!(
                "conversation id '{conversation_id}' cannot be used as a file name"
            )));
        }
        Ok(self.dir.join(format!("{conversation_id}.{EXTENSION}")))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let path = self.path_for(&state.conversation_id)?;
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::Storage(format!("Failed to create {}: {e}", self.dir.display()))
        })?;

        let json = state
            .to_json()
            .map_err(|e| StoreError::Storage(format!("Failed to serialize conversation: {e}")))?;

        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, json.as_bytes())
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::Storage(format!(
                "Failed to move snapshot into {}: {e}",
                path.display()
            )));
        }

        debug!(conversation = %state.conversation_id, path = %path.display(), "Conversation saved");
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        let path = self.path_for(conversation_id)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let state = ConversationState::from_json(&content).map_err(|e| {
            warn!(conversation = conversation_id, error = %e, "Corrupted conversation snapshot");
            StoreError::Corrupted {
                conversation_id: conversation_id.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Some(state))
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool, StoreError> {
        let path = self.path_for(conversation_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Storage(format!(
                "Failed to delete {}: {e}",
                path.display()
            ))),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to list {}: {e}",
                    self.dir.display()
                )));
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to list conversations: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::value::FieldValue;

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("conversations"));

        let mut state = ConversationState::with_id("c-1", "collect_info", 10);
        state
            .collected_data
            .insert("company_size".into(), FieldValue::Int(40));
        state.turn = 2;
        store.save(&state).await.unwrap();

        let loaded = store.load("c-1").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(dir.path().join("conversations/c-1.json").exists());
    }

    #[tokio::test]
    async fn missing_conversation_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        assert!(store.load("nobody").await.unwrap().is_none());
        assert!(!store.delete("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn list_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        for id in ["beta", "alpha"] {
            store
                .save(&ConversationState::with_id(id, "greeting", 10))
                .await
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn list_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupted_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let store = FileStateStore::new(dir.path());

        let err = store.load("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { ref conversation_id, .. } if conversation_id == "bad"));
    }

    #[tokio::test]
    async fn rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let state = ConversationState::with_id("../escape", "greeting", 10);
        assert!(store.save(&state).await.is_err());
        assert!(store.load("a/b").await.is_err());
    }

    #[tokio::test]
    async fn save_overwrites_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let mut state = ConversationState::with_id("c", "greeting", 10);
        store.save(&state).await.unwrap();
        state.current_state = "closing".into();
        store.save(&state).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(store.load("c").await.unwrap().unwrap().current_state, "closing");
    }
}
