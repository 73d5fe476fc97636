//! Knowledge sources — the independent rule providers behind every turn.
//!
//! A source reads the [`ContextSnapshot`] and writes proposals into a
//! [`ProposalSink`]. It never sees conversation state mutably and never
//! decides anything on its own; the resolver does that.

use crate::guards::{ConversationLoopGuard, ObjectionRepetitionGuard, StallGuard};
use crate::snapshot::ContextSnapshot;
use crate::sources::{DataCollector, Fallback, QuestionResponder, RejectionHandler, StateRules};
use parley_core::ids::StateId;
use parley_core::proposal::{ActionProposal, Proposal, TransitionProposal};

/// Why a source could not contribute this turn.
///
/// Contained by the orchestrator: the faulting source's proposals are
/// discarded and the turn goes on without them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceFault {
    #[error("state '{0}' is not in the flow")]
    UnknownState(StateId),

    #[error("missing setting: {0}")]
    MissingSetting(String),

    #[error("{0}")]
    Failed(String),
}

/// The core knowledge source trait.
///
/// Each built-in provider (question responder, state rules, data collector,
/// rejection handler, fallback) and each guard implements this trait and is
/// registered, in order, in a [`SourceRegistry`].
pub trait KnowledgeSource: Send + Sync {
    /// Unique name, used in the decision trace and guard tiers.
    fn name(&self) -> &str;

    /// Cheap applicability check. Must not have side effects.
    fn should_contribute(&self, _snapshot: &ContextSnapshot) -> bool {
        true
    }

    /// Write zero or more proposals.
    fn contribute(
        &self,
        snapshot: &ContextSnapshot,
        sink: &mut ProposalSink,
    ) -> Result<(), SourceFault>;
}

/// Collects the proposals of one source for one turn.
#[derive(Debug, Default)]
pub struct ProposalSink {
    proposals: Vec<Proposal>,
}

impl ProposalSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(&mut self, proposal: ActionProposal) {
        self.proposals.push(Proposal::Action(proposal));
    }

    pub fn transition(&mut self, proposal: TransitionProposal) {
        self.proposals.push(Proposal::Transition(proposal));
    }

    pub fn push(&mut self, proposal: impl Into<Proposal>) {
        self.proposals.push(proposal.into());
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    pub fn into_proposals(self) -> Vec<Proposal> {
        self.proposals
    }
}

/// An ordered set of knowledge sources.
///
/// Registration order is evaluation order and the last tie-breaker of
/// resolution; it never affects anything else.
pub struct SourceRegistry {
    sources: Vec<Box<dyn KnowledgeSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// The built-in sources followed by the guards.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(QuestionResponder));
        registry.register(Box::new(StateRules));
        registry.register(Box::new(DataCollector));
        registry.register(Box::new(RejectionHandler));
        registry.register(Box::new(Fallback));
        registry.register(Box::new(StallGuard));
        registry.register(Box::new(ConversationLoopGuard));
        registry.register(Box::new(ObjectionRepetitionGuard));
        registry
    }

    /// Append a source. It is evaluated after every source already registered.
    pub fn register(&mut self, source: Box<dyn KnowledgeSource>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn KnowledgeSource> {
        self.sources.iter().map(|s| s.as_ref())
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
