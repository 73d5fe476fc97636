//! The turn pipeline.
//!
//! Every turn runs the same strictly sequential steps:
//!
//! 1. **Begin**: capture the current flow, sanitize the input, build the snapshot
//! 2. **Evaluate**: ask every registered source for proposals
//! 3. **Resolve**: pick one action and one next state
//! 4. **Commit**: merge data, move the state pointer, record history and tiers
//! 5. **Count**: update the guard counters
//! 6. **Project**: build the view downstream components read
//! 7. **End**: log, publish, return
//!
//! Nothing in a turn can fail outward. A faulting source is dropped for the
//! turn; a turn with no possible decision falls back to the configured
//! escalation action and is flagged as degraded.

use crate::resolver::{CollectedProposal, FallbackRules, resolve};
use crate::snapshot::{ContextSnapshot, is_objection, is_unclear};
use crate::source::{ProposalSink, SourceRegistry};
use chrono::Utc;
use parley_core::decision::{
    DecisionRecord, ProposalKind, ResolvedDecision, TraceEntry, TraceOutcome,
};
use parley_core::event::{DomainEvent, EventBus};
use parley_core::ids::{ActionId, IntentId, StateId};
use parley_core::proposal::{Priority, Proposal};
use parley_core::state::{ConversationState, TurnRecord};
use parley_core::value::{DataMap, FieldValue};
use parley_flow::FlowGraph;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Shared, atomically swappable flow.
///
/// Readers clone the `Arc` and keep it for as long as they need; a reload
/// never changes a graph someone is already holding.
pub struct FlowHandle {
    current: RwLock<Arc<FlowGraph>>,
}

impl FlowHandle {
    pub fn new(graph: FlowGraph) -> Self {
        Self {
            current: RwLock::new(Arc::new(graph)),
        }
    }

    /// The flow in effect right now.
    pub fn current(&self) -> Arc<FlowGraph> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish a new validated flow. Turns already in progress keep theirs.
    pub fn reload(&self, graph: FlowGraph) {
        let states = graph.state_count();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(graph);
        info!(states, "Flow reloaded");
    }
}

/// Context the caller has about the previous bot turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawContext {
    #[serde(default)]
    pub last_bot_action: Option<ActionId>,
    #[serde(default)]
    pub last_bot_state: Option<StateId>,
    #[serde(default)]
    pub turn_number: Option<u32>,
}

/// One user turn, already classified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnInput {
    pub intent: IntentId,
    #[serde(default)]
    pub extracted_data: DataMap,
    #[serde(default)]
    pub raw_context: Option<RawContext>,
}

impl TurnInput {
    pub fn new(intent: impl Into<IntentId>) -> Self {
        Self {
            intent: intent.into(),
            extracted_data: DataMap::new(),
            raw_context: None,
        }
    }

    pub fn with_data(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.extracted_data.insert(field.into(), value.into());
        self
    }

    pub fn with_extracted(mut self, data: DataMap) -> Self {
        self.extracted_data.extend(data);
        self
    }

    pub fn with_raw_context(mut self, raw: RawContext) -> Self {
        self.raw_context = Some(raw);
        self
    }
}

/// The committed-state view legacy consumers read after each turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityView {
    pub state: StateId,
    pub goal: String,
    pub missing_required: Vec<String>,
    pub is_terminal: bool,
    pub turn: u32,
    pub last_action: Option<ActionId>,
}

/// A source that failed during a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFaultRecord {
    pub source: String,
    pub reason: String,
}

/// Everything a turn produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub decision: ResolvedDecision,
    pub view: CompatibilityView,
    pub faults: Vec<SourceFaultRecord>,
}

const DEGRADED_SOURCE: &str = "orchestrator";
const DEGRADED_REASON: &str = "degraded";

/// Drives one conversation turn at a time.
///
/// `Send + Sync`; one orchestrator serves any number of conversations, each
/// owned by its caller and passed in by `&mut`.
pub struct Orchestrator {
    flow: Arc<FlowHandle>,
    registry: SourceRegistry,
    events: Option<Arc<EventBus>>,
}

impl Orchestrator {
    /// An orchestrator with the standard source registry.
    pub fn new(flow: Arc<FlowHandle>) -> Self {
        Self {
            flow,
            registry: SourceRegistry::standard(),
            events: None,
        }
    }

    /// Replace the source registry.
    pub fn with_registry(mut self, registry: SourceRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Publish domain events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn flow(&self) -> &Arc<FlowHandle> {
        &self.flow
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Swap in a new flow; the next turn to begin sees it.
    pub fn reload(&self, graph: FlowGraph) {
        let states = graph.state_count();
        self.flow.reload(graph);
        self.publish(DomainEvent::FlowReloaded {
            states,
            timestamp: Utc::now(),
        });
    }

    /// A fresh conversation in the flow's initial state.
    pub fn start_conversation(&self) -> ConversationState {
        let graph = self.flow.current();
        ConversationState::new(graph.initial_state().clone(), graph.engine().history_limit)
    }

    /// A fresh conversation under a caller-chosen id.
    pub fn start_conversation_with_id(&self, conversation_id: &str) -> ConversationState {
        let graph = self.flow.current();
        ConversationState::with_id(
            conversation_id,
            graph.initial_state().clone(),
            graph.engine().history_limit,
        )
    }

    /// Back to the initial state with data, counters, and guard tiers cleared.
    pub fn reset(&self, state: &mut ConversationState) {
        let graph = self.flow.current();
        state.reset(graph.initial_state().clone(), graph.engine().history_limit);
        info!(conversation = %state.conversation_id, "Conversation reset");
    }

    /// Process one user turn.
    pub fn process_turn(&self, state: &mut ConversationState, input: TurnInput) -> TurnOutcome {
        let snapshot = self.begin_turn(state, input);
        let graph = snapshot.graph();

        let (proposals, faults) = if snapshot.state_def().is_some() {
            self.evaluate_sources(&snapshot)
        } else {
            (Vec::new(), Vec::new())
        };

        let mut decision = self.decide(&snapshot, graph, &proposals);
        self.commit(state, &snapshot, &mut decision, &proposals);
        update_counters(state, &snapshot, graph, &decision);
        let view = project_compatibility(state, graph);
        self.end_turn(&snapshot, decision, view, faults)
    }

    /// The committed-state view of a conversation, outside of a turn.
    pub fn compatibility_view(&self, state: &ConversationState) -> CompatibilityView {
        project_compatibility(state, &self.flow.current())
    }

    // ── Pipeline steps ───────────────────────────────────────────

    fn begin_turn(&self, state: &ConversationState, input: TurnInput) -> ContextSnapshot {
        let graph = self.flow.current();

        let intent = if graph.is_intent(input.intent.as_str()) {
            input.intent
        } else {
            warn!(
                conversation = %state.conversation_id,
                intent = %input.intent,
                "Unknown intent, treating as {}",
                graph.engine().unknown_intent
            );
            graph.engine().unknown_intent.clone()
        };

        if let Some(raw) = &input.raw_context {
            if let Some(reported) = raw.turn_number {
                if reported != state.turn + 1 {
                    debug!(
                        conversation = %state.conversation_id,
                        reported,
                        expected = state.turn + 1,
                        "Caller turn number disagrees with conversation state"
                    );
                }
            }
            if let Some(last) = &raw.last_bot_action {
                if state.last_action() != Some(last) {
                    debug!(
                        conversation = %state.conversation_id,
                        reported = %last,
                        "Caller last action disagrees with conversation state"
                    );
                }
            }
        }

        ContextSnapshot::capture(graph, state, intent, input.extracted_data)
    }

    fn evaluate_sources(
        &self,
        snapshot: &ContextSnapshot,
    ) -> (Vec<CollectedProposal>, Vec<SourceFaultRecord>) {
        let mut collected = Vec::new();
        let mut faults = Vec::new();

        for (source_index, source) in self.registry.iter().enumerate() {
            if !source.should_contribute(snapshot) {
                continue;
            }
            let mut sink = ProposalSink::new();
            match source.contribute(snapshot, &mut sink) {
                Ok(()) => {
                    debug!(source = source.name(), proposals = sink.len(), "Source contributed");
                    collected.extend(sink.into_proposals().into_iter().enumerate().map(
                        |(seq, proposal)| CollectedProposal {
                            source: source.name().to_string(),
                            source_index,
                            seq,
                            proposal,
                        },
                    ));
                }
                Err(fault) => {
                    warn!(
                        conversation = %snapshot.conversation_id,
                        source = source.name(),
                        "Source fault, discarding its proposals: {fault}"
                    );
                    self.publish(DomainEvent::SourceFaulted {
                        conversation_id: snapshot.conversation_id.clone(),
                        source: source.name().to_string(),
                        reason: fault.to_string(),
                        timestamp: Utc::now(),
                    });
                    faults.push(SourceFaultRecord {
                        source: source.name().to_string(),
                        reason: fault.to_string(),
                    });
                }
            }
        }
        (collected, faults)
    }

    fn decide(
        &self,
        snapshot: &ContextSnapshot,
        graph: &FlowGraph,
        proposals: &[CollectedProposal],
    ) -> ResolvedDecision {
        if snapshot.state_def().is_none() {
            warn!(
                conversation = %snapshot.conversation_id,
                state = %snapshot.current_state,
                "Current state is not in the flow"
            );
            return degraded(snapshot, graph, proposals, "unknown_state");
        }

        let fallback = FallbackRules {
            default_action: Some(graph.engine().default_action.clone()),
        };
        match resolve(proposals, &snapshot.current_state, &fallback) {
            Ok(decision) => decision,
            Err(err) => {
                warn!(conversation = %snapshot.conversation_id, "Resolution failed: {err}");
                degraded(snapshot, graph, proposals, "resolution_exhausted")
            }
        }
    }

    fn commit(
        &self,
        state: &mut ConversationState,
        snapshot: &ContextSnapshot,
        decision: &mut ResolvedDecision,
        proposals: &[CollectedProposal],
    ) {
        for (field, value) in &snapshot.prospective {
            if snapshot.committed.get(field) != Some(value) {
                decision.data_updates.insert(field.clone(), value.clone());
            }
        }
        state.collected_data = snapshot.prospective.clone();

        state.push_history(TurnRecord {
            turn: snapshot.turn,
            state: snapshot.current_state.clone(),
            intent: snapshot.intent.clone(),
            action: decision.action.clone(),
            next_state: decision.next_state.clone(),
        });
        state.current_state = decision.next_state.clone();

        // Every guard that fired escalates, whether or not it won.
        for collected in proposals {
            let Proposal::Action(action) = &collected.proposal else {
                continue;
            };
            let Some(escalation) = &action.escalation else {
                continue;
            };
            if state.raise_guard_tier(&escalation.guard, escalation.tier) {
                info!(
                    conversation = %state.conversation_id,
                    guard = %escalation.guard,
                    tier = %escalation.tier,
                    "Guard escalated"
                );
                self.publish(DomainEvent::GuardEscalated {
                    conversation_id: state.conversation_id.clone(),
                    guard: escalation.guard.clone(),
                    tier: escalation.tier,
                    timestamp: Utc::now(),
                });
            }
        }

        state.last_decision = Some(DecisionRecord {
            turn: snapshot.turn,
            decision: decision.clone(),
        });
        state.updated_at = Utc::now();
    }

    fn end_turn(
        &self,
        snapshot: &ContextSnapshot,
        decision: ResolvedDecision,
        view: CompatibilityView,
        faults: Vec<SourceFaultRecord>,
    ) -> TurnOutcome {
        info!(
            conversation = %snapshot.conversation_id,
            turn = snapshot.turn,
            intent = %snapshot.intent,
            action = %decision.action,
            from = %snapshot.current_state,
            to = %decision.next_state,
            degraded = decision.degraded,
            "Turn resolved"
        );
        self.publish(DomainEvent::TurnResolved {
            conversation_id: snapshot.conversation_id.clone(),
            turn: snapshot.turn,
            action: decision.action.to_string(),
            next_state: decision.next_state.to_string(),
            degraded: decision.degraded,
            timestamp: Utc::now(),
        });
        TurnOutcome {
            decision,
            view,
            faults,
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

fn degraded(
    snapshot: &ContextSnapshot,
    graph: &FlowGraph,
    proposals: &[CollectedProposal],
    cause: &str,
) -> ResolvedDecision {
    let action = graph.engine().escalation_action.clone();
    let mut trace: Vec<TraceEntry> = proposals
        .iter()
        .map(|p| TraceEntry {
            source: p.source.clone(),
            kind: match p.proposal {
                Proposal::Action(_) => ProposalKind::Action,
                Proposal::Transition(_) => ProposalKind::Transition,
            },
            value: match &p.proposal {
                Proposal::Action(a) => a.action.to_string(),
                Proposal::Transition(t) => t.target.to_string(),
            },
            priority: p.proposal.priority(),
            rank: p.proposal.rank(),
            reason_code: p.proposal.reason_code().to_string(),
            outcome: TraceOutcome::Overridden,
        })
        .collect();
    trace.push(TraceEntry {
        source: DEGRADED_SOURCE.to_string(),
        kind: ProposalKind::Action,
        value: action.to_string(),
        priority: Priority::Critical,
        rank: 0,
        reason_code: DEGRADED_REASON.to_string(),
        outcome: TraceOutcome::Won,
    });

    ResolvedDecision {
        action,
        next_state: snapshot.current_state.clone(),
        reason_codes: vec![DEGRADED_REASON.to_string(), cause.to_string()],
        transitions_suppressed: true,
        degraded: true,
        winning_source: Some(DEGRADED_SOURCE.to_string()),
        data_updates: DataMap::new(),
        trace,
    }
}

fn update_counters(
    state: &mut ConversationState,
    snapshot: &ContextSnapshot,
    graph: &FlowGraph,
    decision: &ResolvedDecision,
) {
    let counters = &mut state.counters;
    counters.same_state_streak = if decision.next_state == snapshot.current_state {
        counters.same_state_streak + 1
    } else {
        0
    };
    if is_objection(graph, &snapshot.intent) {
        counters.consecutive_objections += 1;
        counters.total_objections += 1;
    } else {
        counters.consecutive_objections = 0;
    }
    counters.consecutive_unclear = if is_unclear(graph, &snapshot.intent) {
        counters.consecutive_unclear + 1
    } else {
        0
    };
    state.turn = snapshot.turn;
}

fn project_compatibility(state: &ConversationState, graph: &FlowGraph) -> CompatibilityView {
    let def = graph.state(&state.current_state);
    CompatibilityView {
        state: state.current_state.clone(),
        goal: def.map(|d| d.goal.clone()).unwrap_or_default(),
        missing_required: graph.missing_required(&state.current_state, &state.collected_data),
        is_terminal: def.is_some_and(|d| d.terminal),
        turn: state.turn,
        last_action: state.last_action().cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{KnowledgeSource, SourceFault};
    use crate::sources::Fallback;
    use crate::testing::{SALES_FLOW, graph};

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Arc::new(FlowHandle::new(graph(SALES_FLOW))))
    }

    struct Broken;

    impl KnowledgeSource for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn contribute(
            &self,
            _snapshot: &ContextSnapshot,
            _sink: &mut ProposalSink,
        ) -> Result<(), SourceFault> {
            Err(SourceFault::Failed("boom".into()))
        }
    }

    #[test]
    fn starts_in_initial_state() {
        let engine = orchestrator();
        let conversation = engine.start_conversation_with_id("c-1");
        assert_eq!(conversation.conversation_id, "c-1");
        assert_eq!(conversation.current_state, "greeting");
        assert_eq!(conversation.turn, 0);
    }

    #[test]
    fn unknown_intent_is_treated_as_unclear() {
        let engine = orchestrator();
        let mut conversation = engine.start_conversation();
        let outcome = engine.process_turn(&mut conversation, TurnInput::new("sarcasm"));
        assert!(!outcome.decision.degraded);
        assert_eq!(conversation.history.back().unwrap().intent, "unclear");
        assert_eq!(conversation.counters.consecutive_unclear, 1);
    }

    #[test]
    fn faulting_source_is_contained() {
        let mut registry = SourceRegistry::new();
        registry.register(Box::new(Broken));
        registry.register(Box::new(Fallback));
        let engine = orchestrator().with_registry(registry);
        let mut conversation = engine.start_conversation();

        let outcome = engine.process_turn(&mut conversation, TurnInput::new("greeting"));

        assert_eq!(outcome.faults.len(), 1);
        assert_eq!(outcome.faults[0].source, "broken");
        assert_eq!(outcome.decision.action, "greet");
        assert!(!outcome.decision.degraded);
    }

    #[test]
    fn unknown_state_degrades_to_escalation() {
        let engine = orchestrator();
        let mut conversation = ConversationState::with_id("c", "vanished", 20);

        let outcome = engine.process_turn(&mut conversation, TurnInput::new("greeting"));

        assert!(outcome.decision.degraded);
        assert_eq!(outcome.decision.action, "escalate_to_human");
        assert_eq!(outcome.decision.next_state, "vanished");
        assert!(outcome.decision.has_reason("degraded"));
        assert!(outcome.decision.trace_mentions("degraded"));
        assert_eq!(conversation.turn, 1);
    }

    #[test]
    fn commit_moves_state_and_records_history() {
        let engine = orchestrator();
        let mut conversation = engine.start_conversation();

        let outcome = engine.process_turn(&mut conversation, TurnInput::new("agreement"));

        assert_eq!(conversation.current_state, "collect_info");
        assert_eq!(conversation.turn, 1);
        assert_eq!(conversation.counters.same_state_streak, 0);
        assert_eq!(conversation.history.len(), 1);
        assert_eq!(outcome.view.state, "collect_info");
        assert_eq!(outcome.view.missing_required, vec!["company_size".to_string()]);
        assert_eq!(
            conversation.last_decision.as_ref().map(|d| d.turn),
            Some(1)
        );
    }

    #[test]
    fn data_updates_list_only_changed_fields() {
        let engine = orchestrator();
        let mut conversation = engine.start_conversation();
        engine.process_turn(&mut conversation, TurnInput::new("agreement"));

        let outcome = engine.process_turn(
            &mut conversation,
            TurnInput::new("info_provided")
                .with_data("industry", "logistics")
                .with_data("unknown_field", "dropped"),
        );
        assert_eq!(
            outcome.decision.data_updates.get("industry"),
            Some(&FieldValue::from("logistics"))
        );
        assert!(!conversation.collected_data.contains_key("unknown_field"));

        let outcome = engine.process_turn(
            &mut conversation,
            TurnInput::new("info_provided").with_data("industry", "logistics"),
        );
        assert!(outcome.decision.data_updates.is_empty());
    }

    #[test]
    fn objection_counters_track_streaks() {
        let engine = orchestrator();
        let mut conversation = ConversationState::with_id("c", "presentation", 20);

        engine.process_turn(&mut conversation, TurnInput::new("price_objection"));
        engine.process_turn(&mut conversation, TurnInput::new("timing_objection"));
        assert_eq!(conversation.counters.consecutive_objections, 2);

        engine.process_turn(&mut conversation, TurnInput::new("faq_question"));
        assert_eq!(conversation.counters.consecutive_objections, 0);
        assert_eq!(conversation.counters.total_objections, 2);
        assert_eq!(conversation.counters.same_state_streak, 3);
    }

    #[test]
    fn reload_applies_to_next_turn() {
        let engine = orchestrator();
        let mut conversation = engine.start_conversation();
        let replaced = SALES_FLOW.replace(
            "[states.greeting.rules]\ngreeting = \"greet\"",
            "[states.greeting.rules]\ngreeting = \"present\"",
        );
        assert_ne!(replaced, SALES_FLOW);

        engine.reload(graph(&replaced));
        let outcome = engine.process_turn(&mut conversation, TurnInput::new("greeting"));
        assert_eq!(outcome.decision.action, "present");
    }

    #[test]
    fn events_are_published() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let engine = orchestrator().with_event_bus(Arc::clone(&bus));
        let mut conversation = engine.start_conversation();

        engine.process_turn(&mut conversation, TurnInput::new("greeting"));

        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event.as_ref(),
            DomainEvent::TurnResolved { turn: 1, .. }
        ));
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let engine = orchestrator();
        let mut conversation = engine.start_conversation_with_id("keep");
        engine.process_turn(&mut conversation, TurnInput::new("agreement"));

        engine.reset(&mut conversation);

        assert_eq!(conversation.conversation_id, "keep");
        assert_eq!(conversation.current_state, "greeting");
        assert_eq!(conversation.turn, 0);
        assert!(conversation.history.is_empty());
    }

    #[test]
    fn reset_picks_up_the_reloaded_history_limit() {
        let engine = orchestrator();
        let mut conversation = engine.start_conversation();
        assert_eq!(conversation.history_limit, 20);

        let roomier = SALES_FLOW.replace("[engine]\n", "[engine]\nhistory_limit = 40\n");
        assert_ne!(roomier, SALES_FLOW);
        engine.reload(graph(&roomier));
        engine.reset(&mut conversation);

        assert_eq!(conversation.history_limit, 40);
    }
}
