//! In-memory store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use parley_core::collaborator::StateStore;
use parley_core::error::StoreError;
use parley_core::state::ConversationState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps conversations in a map for the life of the process.
pub struct InMemoryStateStore {
    states: Arc<RwLock<HashMap<String, ConversationState>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        self.states
            .write()
            .await
            .insert(state.conversation_id.clone(), state.clone());
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.states.read().await.get(conversation_id).cloned())
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool, StoreError> {
        Ok(self.states.write().await.remove(conversation_id).is_some())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.states.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_load() {
        let store = InMemoryStateStore::new();
        let mut state = ConversationState::with_id("c-1", "greeting", 10);
        state.turn = 3;
        store.save(&state).await.unwrap();

        let loaded = store.load("c-1").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(store.load("c-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_replaces() {
        let store = InMemoryStateStore::new();
        let mut state = ConversationState::with_id("c-1", "greeting", 10);
        store.save(&state).await.unwrap();
        state.current_state = "pitch".into();
        store.save(&state).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.load("c-1").await.unwrap().unwrap().current_state, "pitch");
    }

    #[tokio::test]
    async fn delete_and_list() {
        let store = InMemoryStateStore::new();
        for id in ["b", "a", "c"] {
            store
                .save(&ConversationState::with_id(id, "greeting", 10))
                .await
                .unwrap();
        }
        assert_eq!(store.list().await.unwrap(), vec!["a", "b", "c"]);

        assert!(store.delete("b").await.unwrap());
        assert!(!store.delete("b").await.unwrap());
        assert_eq!(store.list().await.unwrap(), vec!["a", "c"]);
    }
}
