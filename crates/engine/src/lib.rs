//! # Parley Engine
//!
//! The decision engine: independent knowledge sources propose actions and
//! state transitions, a deterministic resolver picks exactly one of each, and
//! the orchestrator commits the result to the conversation.
//!
//! ```text
//! TurnInput ──▶ begin_turn ──▶ ContextSnapshot
//!                                   │
//!               ┌───────────────────┼────────────────────┐
//!               ▼                   ▼                    ▼
//!        QuestionResponder     StateRules  ...   guards (stall, loop, objection)
//!               └───────────── proposals ────────────────┘
//!                                   │
//!                                   ▼
//!                               resolve ──▶ commit ──▶ TurnOutcome
//! ```
//!
//! Guards are ordinary sources. They escalate through tiers (nudge, offer an
//! alternative, forced exit) that are stored on the conversation and never
//! move down until the conversation is reset.

pub mod guards;
pub mod orchestrator;
pub mod resolver;
pub mod session;
pub mod snapshot;
pub mod source;
pub mod sources;
pub mod status;

#[cfg(test)]
mod testing;

pub use guards::{ConversationLoopGuard, ObjectionRepetitionGuard, StallGuard};
pub use orchestrator::{
    CompatibilityView, FlowHandle, Orchestrator, RawContext, SourceFaultRecord, TurnInput,
    TurnOutcome,
};
pub use resolver::{CollectedProposal, FallbackRules, ResolutionExhausted, resolve};
pub use session::{Session, TurnReply};
pub use snapshot::ContextSnapshot;
pub use source::{KnowledgeSource, ProposalSink, SourceFault, SourceRegistry};
pub use sources::{DataCollector, Fallback, QuestionResponder, RejectionHandler, StateRules};
pub use status::StatusReport;
