//! Proposal model — the typed vocabulary every knowledge source speaks.
//!
//! A proposal is a *candidate*: an action to take or a state to move to,
//! tagged with a priority, a rank for ordering inside a priority tier, and a
//! reason code for the decision trace. Sources emit proposals; only the
//! resolver decides which of them win.

use crate::ids::{ActionId, StateId};
use crate::state::GuardTier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Proposal priority. Declaration order gives `Critical > High > Normal > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.pad(s)
    }
}

/// A guard escalation carried by the proposal that caused it.
///
/// The commit step records the tier on the conversation; tiers only move up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub guard: String,
    pub tier: GuardTier,
}

/// A candidate response action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionProposal {
    pub action: ActionId,
    pub priority: Priority,
    /// Secondary ordering inside a priority tier (lower first).
    #[serde(default)]
    pub rank: u32,
    /// `false` means "this action demands we stay in the current state".
    #[serde(default = "default_true")]
    pub combinable: bool,
    pub reason_code: String,
    /// Informational proposals keep their reason code in the decision even
    /// when they lose.
    #[serde(default)]
    pub informational: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Escalation>,
}

fn default_true() -> bool {
    true
}

impl ActionProposal {
    pub fn new(
        action: impl Into<ActionId>,
        priority: Priority,
        reason_code: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            priority,
            rank: 0,
            combinable: true,
            reason_code: reason_code.into(),
            informational: false,
            escalation: None,
        }
    }

    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }

    pub fn non_combinable(mut self) -> Self {
        self.combinable = false;
        self
    }

    pub fn informational(mut self) -> Self {
        self.informational = true;
        self
    }

    pub fn escalating(mut self, guard: impl Into<String>, tier: GuardTier) -> Self {
        self.escalation = Some(Escalation {
            guard: guard.into(),
            tier,
        });
        self
    }
}

/// A candidate next state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionProposal {
    pub target: StateId,
    pub priority: Priority,
    #[serde(default)]
    pub rank: u32,
    pub reason_code: String,
    #[serde(default)]
    pub informational: bool,
}

impl TransitionProposal {
    pub fn new(
        target: impl Into<StateId>,
        priority: Priority,
        reason_code: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            priority,
            rank: 0,
            reason_code: reason_code.into(),
            informational: false,
        }
    }

    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }

    pub fn informational(mut self) -> Self {
        self.informational = true;
        self
    }
}

/// Either kind of proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Proposal {
    Action(ActionProposal),
    Transition(TransitionProposal),
}

impl Proposal {
    pub fn priority(&self) -> Priority {
        match self {
            Proposal::Action(a) => a.priority,
            Proposal::Transition(t) => t.priority,
        }
    }

    pub fn rank(&self) -> u32 {
        match self {
            Proposal::Action(a) => a.rank,
            Proposal::Transition(t) => t.rank,
        }
    }

    pub fn reason_code(&self) -> &str {
        match self {
            Proposal::Action(a) => &a.reason_code,
            Proposal::Transition(t) => &t.reason_code,
        }
    }

    pub fn is_informational(&self) -> bool {
        match self {
            Proposal::Action(a) => a.informational,
            Proposal::Transition(t) => t.informational,
        }
    }
}

impl From<ActionProposal> for Proposal {
    fn from(a: ActionProposal) -> Self {
        Proposal::Action(a)
    }
}

impl From<TransitionProposal> for Proposal {
    fn from(t: TransitionProposal) -> Self {
        Proposal::Transition(t)
    }
}
