//! External collaborator traits.
//!
//! The decision engine never performs I/O inside a turn. Classification runs
//! strictly before a turn starts, response generation strictly after it ends,
//! and persistence happens between turns. These traits are the seams; their
//! implementations (LLM clients, chat transports, databases) live outside the
//! engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CollaboratorError, StoreError};
use crate::ids::{ActionId, IntentId, StateId};
use crate::state::ConversationState;
use crate::value::DataMap;

/// What the classifier is told about the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierContext {
    pub conversation_id: String,
    pub current_state: StateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<ActionId>,
    pub turn: u32,
    /// The closed intent vocabulary declared by the flow.
    pub allowed_intents: Vec<IntentId>,
}

/// Classifier output: one intent label plus any extracted fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub intent: IntentId,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub extracted_data: DataMap,
}

fn default_confidence() -> f32 {
    1.0
}

/// Turns raw user text into an intent and extracted data.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(
        &self,
        text: &str,
        context: &ClassifierContext,
    ) -> Result<Classification, CollaboratorError>;
}

/// Everything a response generator needs to render the chosen action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRequest {
    pub conversation_id: String,
    pub action: ActionId,
    pub state: StateId,
    pub goal: String,
    pub missing_fields: Vec<String>,
    pub collected_data: DataMap,
    pub user_text: String,
}

/// Renders a symbolic action into prose.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &ResponseRequest) -> Result<String, CollaboratorError>;
}

/// Persists conversation snapshots between turns.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Backend name (e.g. "in_memory", "file").
    fn name(&self) -> &str;

    /// Insert or replace the snapshot for `state.conversation_id`.
    async fn save(&self, state: &ConversationState) -> Result<(), StoreError>;

    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError>;

    /// Returns `true` if a snapshot existed.
    async fn delete(&self, conversation_id: &str) -> Result<bool, StoreError>;

    /// All stored conversation ids, sorted.
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}
