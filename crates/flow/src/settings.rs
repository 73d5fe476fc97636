//! Typed, validated settings for the engine, built-in sources, and guards.

use parley_core::ids::{ActionId, IntentId, StateId};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_action: ActionId,
    pub escalation_action: ActionId,
    pub unknown_intent: IntentId,
    pub history_limit: usize,
    pub unclear_category: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceSettings {
    pub questions: Option<QuestionSettings>,
    pub rejection: Option<RejectionSettings>,
}

#[derive(Debug, Clone)]
pub struct QuestionSettings {
    pub enabled: bool,
    pub category: String,
    pub answers: BTreeMap<IntentId, ActionId>,
    pub default_answer: Option<ActionId>,
}

impl QuestionSettings {
    /// The answering action for a question intent.
    pub fn answer_for(&self, intent: &IntentId) -> Option<&ActionId> {
        self.answers.get(intent).or(self.default_answer.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct RejectionSettings {
    pub enabled: bool,
    pub category: String,
    pub action: ActionId,
}

#[derive(Debug, Clone, Default)]
pub struct GuardSettings {
    pub stall: Option<StallSettings>,
    pub conversation_loop: Option<LoopSettings>,
    pub objection: Option<ObjectionSettings>,
}

#[derive(Debug, Clone)]
pub struct StallSettings {
    pub enabled: bool,
    pub max_turns_in_state: u32,
    pub offer_skip_action: ActionId,
    pub skip_action: ActionId,
    pub exit_action: ActionId,
    pub skip_state: Option<StateId>,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub enabled: bool,
    pub max_repeats: u32,
    pub window: usize,
    pub informative_category: Option<String>,
    pub nudge_action: ActionId,
    pub rephrase_action: ActionId,
    pub exit_action: ActionId,
}

#[derive(Debug, Clone)]
pub struct ObjectionSettings {
    pub enabled: bool,
    /// Counted by the objection counters even when the guard is disabled.
    pub category: String,
    pub max_consecutive: u32,
    pub max_total: u32,
    pub action: ActionId,
}
