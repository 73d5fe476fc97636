//! Resolved decisions and the per-turn audit trace.

use crate::ids::{ActionId, StateId};
use crate::proposal::Priority;
use crate::value::DataMap;
use serde::{Deserialize, Serialize};

/// Which partition a traced proposal belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    Action,
    Transition,
}

/// What happened to a proposal during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOutcome {
    /// Head of its partition.
    Won,
    /// Lost, but its reason code is kept (same tier or informational).
    Retained,
    /// Lost to a higher-ordered proposal.
    Overridden,
    /// Transition discarded because the winning action was non-combinable.
    Suppressed,
}

/// One line of the decision trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub source: String,
    pub kind: ProposalKind,
    /// Action id or target state id.
    pub value: String,
    pub priority: Priority,
    pub rank: u32,
    pub reason_code: String,
    pub outcome: TraceOutcome,
}

/// The outcome of one turn: exactly one action and one next state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDecision {
    pub action: ActionId,
    /// May equal the state the turn was processed in.
    pub next_state: StateId,
    /// Reason codes of every proposal that was not overridden, winner first.
    pub reason_codes: Vec<String>,
    /// `true` when a non-combinable action discarded all transitions.
    pub transitions_suppressed: bool,
    /// `true` when the turn fell back to the escalation action.
    #[serde(default)]
    pub degraded: bool,
    /// Source of the winning action (`None` for configured fallbacks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_source: Option<String>,
    /// Fields that changed when the turn was committed.
    #[serde(default)]
    pub data_updates: DataMap,
    /// Every proposal considered this turn.
    #[serde(default)]
    pub trace: Vec<TraceEntry>,
}

impl ResolvedDecision {
    pub fn has_reason(&self, reason_code: &str) -> bool {
        self.reason_codes.iter().any(|r| r == reason_code)
    }

    pub fn trace_mentions(&self, reason_code: &str) -> bool {
        self.trace.iter().any(|t| t.reason_code == reason_code)
    }
}

/// The last decision, kept on the conversation for status inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub turn: u32,
    pub decision: ResolvedDecision,
}
