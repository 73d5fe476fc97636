//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley conversational
//! decision engine. This crate has **no engine logic** — it defines the
//! vocabulary that the flow loader, the engine, and the stores share.
//!
//! ## Design Philosophy
//!
//! - Identifiers are typed newtypes, validated against the loaded flow.
//! - [`ConversationState`] is single-owner and only ever mutated by the
//!   orchestrator's commit step.
//! - Every external collaborator (classifier, generator, store) is a trait
//!   here; implementations live elsewhere.

pub mod collaborator;
pub mod decision;
pub mod error;
pub mod event;
pub mod ids;
pub mod proposal;
pub mod state;
pub mod value;

// Re-export key types at crate root for ergonomics
pub use collaborator::{
    Classification, ClassifierContext, IntentClassifier, ResponseGenerator, ResponseRequest,
    StateStore,
};
pub use decision::{DecisionRecord, ProposalKind, ResolvedDecision, TraceEntry, TraceOutcome};
pub use error::{CollaboratorError, Error, Result, StoreError};
pub use event::{DomainEvent, EventBus};
pub use ids::{ActionId, IntentId, StateId};
pub use proposal::{ActionProposal, Escalation, Priority, Proposal, TransitionProposal};
pub use state::{ConversationState, GuardCounters, GuardTier, TurnRecord};
pub use value::{DataMap, FieldValue};
