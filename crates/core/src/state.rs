//! Conversation state — the single-owner, per-conversation record.
//!
//! The orchestrator owns the only mutable reference. Knowledge sources only
//! ever see an immutable per-turn snapshot built from it.

use crate::decision::DecisionRecord;
use crate::ids::{ActionId, IntentId, StateId};
use crate::value::DataMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use uuid::Uuid;

/// Default number of turns kept in the rolling history.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Guard escalation tier. Declaration order is escalation order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GuardTier {
    #[default]
    Normal,
    Nudge,
    OfferAlternative,
    ForcedExit,
}

impl GuardTier {
    /// The next tier up; `ForcedExit` saturates.
    pub fn next(self) -> Self {
        match self {
            GuardTier::Normal => GuardTier::Nudge,
            GuardTier::Nudge => GuardTier::OfferAlternative,
            GuardTier::OfferAlternative | GuardTier::ForcedExit => GuardTier::ForcedExit,
        }
    }
}

impl fmt::Display for GuardTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GuardTier::Normal => "normal",
            GuardTier::Nudge => "nudge",
            GuardTier::OfferAlternative => "offer_alternative",
            GuardTier::ForcedExit => "forced_exit",
        };
        f.pad(s)
    }
}

/// Per-conversation counters read by the guard sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardCounters {
    /// Consecutive completed turns processed in the current state.
    pub same_state_streak: u32,
    /// Consecutive completed turns whose intent was an objection.
    pub consecutive_objections: u32,
    /// All objection turns in this conversation.
    pub total_objections: u32,
    /// Consecutive completed turns whose intent was unclear.
    pub consecutive_unclear: u32,
}

/// One completed turn in the rolling history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn: u32,
    /// The state the turn was processed in.
    pub state: StateId,
    pub intent: IntentId,
    pub action: ActionId,
    pub next_state: StateId,
}

/// Mutable state of a single conversation.
///
/// Serializes to a flat JSON document; restoring it and continuing is
/// indistinguishable from never having stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    pub current_state: StateId,
    #[serde(default)]
    pub collected_data: DataMap,
    /// Number of completed turns.
    #[serde(default)]
    pub turn: u32,
    #[serde(default)]
    pub history: VecDeque<TurnRecord>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub counters: GuardCounters,
    #[serde(default)]
    pub guard_tiers: BTreeMap<String, GuardTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decision: Option<DecisionRecord>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl ConversationState {
    /// Start a new conversation with a fresh id.
    pub fn new(initial_state: impl Into<StateId>, history_limit: usize) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), initial_state, history_limit)
    }

    /// Start a new conversation with a caller-chosen id.
    pub fn with_id(
        conversation_id: impl Into<String>,
        initial_state: impl Into<StateId>,
        history_limit: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            current_state: initial_state.into(),
            collected_data: DataMap::new(),
            turn: 0,
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
            counters: GuardCounters::default(),
            guard_tiers: BTreeMap::new(),
            last_decision: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Current escalation tier for a guard (`Normal` if it never fired).
    pub fn guard_tier(&self, guard: &str) -> GuardTier {
        self.guard_tiers.get(guard).copied().unwrap_or_default()
    }

    /// Record a guard tier. Tiers never move down; a lower tier is ignored.
    pub fn raise_guard_tier(&mut self, guard: &str, tier: GuardTier) -> bool {
        let current = self.guard_tier(guard);
        if tier > current {
            self.guard_tiers.insert(guard.to_string(), tier);
            true
        } else {
            false
        }
    }

    /// Append a completed turn, dropping the oldest beyond the limit.
    pub fn push_history(&mut self, record: TurnRecord) {
        self.history.push_back(record);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// The most recent `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &TurnRecord> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip)
    }

    /// The action chosen on the previous turn, if any.
    pub fn last_action(&self) -> Option<&ActionId> {
        self.history.back().map(|r| &r.action)
    }

    /// Explicit conversation reset: back to the initial state with all data,
    /// counters, and guard tiers cleared. The conversation id is kept; the
    /// history limit is taken from the flow in force now.
    pub fn reset(&mut self, initial_state: impl Into<StateId>, history_limit: usize) {
        let id = std::mem::take(&mut self.conversation_id);
        *self = Self::with_id(id, initial_state, history_limit);
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
