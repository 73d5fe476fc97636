//! Session — a conversation turn with its external collaborators attached.
//!
//! The orchestrator itself does no I/O. A session classifies the user's text
//! before the turn, runs the turn, and renders the chosen action afterwards.
//! Collaborator failures never fail the turn: a classifier error is treated
//! as the flow's unknown intent, a generator error yields no text.

use crate::orchestrator::{Orchestrator, RawContext, TurnInput, TurnOutcome};
use parley_core::collaborator::{
    Classification, ClassifierContext, IntentClassifier, ResponseGenerator, ResponseRequest,
    StateStore,
};
use parley_core::error::{CollaboratorError, Result, StoreError};
use parley_core::state::ConversationState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default time allowed for each collaborator call.
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one session turn.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub outcome: TurnOutcome,
    /// Rendered response, if the generator succeeded.
    pub text: Option<String>,
    /// What the classifier returned, if it succeeded.
    pub classification: Option<Classification>,
}

pub struct Session {
    orchestrator: Arc<Orchestrator>,
    classifier: Arc<dyn IntentClassifier>,
    generator: Arc<dyn ResponseGenerator>,
    store: Option<Arc<dyn StateStore>>,
    timeout: Duration,
}

impl Session {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        classifier: Arc<dyn IntentClassifier>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        Self {
            orchestrator,
            classifier,
            generator,
            store: None,
            timeout: DEFAULT_COLLABORATOR_TIMEOUT,
        }
    }

    /// Persist conversations between turns in `store`.
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Classify `text`, run the turn on `state`, render the chosen action.
    pub async fn turn(&self, state: &mut ConversationState, text: &str) -> TurnReply {
        let graph = self.orchestrator.flow().current();

        let context = ClassifierContext {
            conversation_id: state.conversation_id.clone(),
            current_state: state.current_state.clone(),
            last_action: state.last_action().cloned(),
            turn: state.turn + 1,
            allowed_intents: graph.intents().cloned().collect(),
        };

        let classification = match self.classify(text, &context).await {
            Ok(classification) => Some(classification),
            Err(e) => {
                warn!(
                    conversation = %state.conversation_id,
                    classifier = self.classifier.name(),
                    error = %e,
                    "Classification failed, using unknown intent"
                );
                None
            }
        };

        let input = match &classification {
            Some(c) => TurnInput::new(c.intent.clone()).with_extracted(c.extracted_data.clone()),
            None => TurnInput::new(graph.engine().unknown_intent.clone()),
        }
        .with_raw_context(RawContext {
            last_bot_action: context.last_action.clone(),
            last_bot_state: Some(context.current_state.clone()),
            turn_number: Some(context.turn),
        });

        let outcome = self.orchestrator.process_turn(state, input);

        let request = ResponseRequest {
            conversation_id: state.conversation_id.clone(),
            action: outcome.decision.action.clone(),
            state: outcome.view.state.clone(),
            goal: outcome.view.goal.clone(),
            missing_fields: outcome.view.missing_required.clone(),
            collected_data: state.collected_data.clone(),
            user_text: text.to_string(),
        };
        let text = match self.generate(&request).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(
                    conversation = %state.conversation_id,
                    generator = self.generator.name(),
                    action = %request.action,
                    error = %e,
                    "Response generation failed"
                );
                None
            }
        };

        TurnReply {
            outcome,
            text,
            classification,
        }
    }

    /// Load (or start) a stored conversation, run one turn, save it back.
    pub async fn respond(&self, conversation_id: &str, text: &str) -> Result<TurnReply> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| CollaboratorError::NotConfigured("state store".into()))?;

        let mut state = match store.load(conversation_id).await? {
            Some(state) => state,
            None => {
                info!(conversation = conversation_id, "Starting new conversation");
                self.orchestrator.start_conversation_with_id(conversation_id)
            }
        };

        let reply = self.turn(&mut state, text).await;
        store.save(&state).await?;
        Ok(reply)
    }

    /// Forget a stored conversation.
    pub async fn forget(&self, conversation_id: &str) -> Result<()> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| CollaboratorError::NotConfigured("state store".into()))?;
        if store.delete(conversation_id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(conversation_id.to_string()).into())
        }
    }

    async fn classify(
        &self,
        text: &str,
        context: &ClassifierContext,
    ) -> std::result::Result<Classification, CollaboratorError> {
        match tokio::time::timeout(self.timeout, self.classifier.classify(text, context)).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout {
                name: self.classifier.name().to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn generate(
        &self,
        request: &ResponseRequest,
    ) -> std::result::Result<String, CollaboratorError> {
        match tokio::time::timeout(self.timeout, self.generator.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout {
                name: self.generator.name().to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}
