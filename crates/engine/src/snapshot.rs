//! The per-turn context snapshot.
//!
//! Built once in `begin_turn`, shared read-only with every knowledge source,
//! and dropped when the turn ends. Helper views that mention "the current
//! turn" count it as if it had already happened, so a source can reason
//! about thresholds without reaching for mutable state.

use parley_core::ids::{IntentId, StateId};
use parley_core::state::{ConversationState, GuardCounters, GuardTier, TurnRecord};
use parley_core::value::{DataMap, FieldValue};
use parley_flow::{FieldKind, FlowGraph, MergePolicy, StateDef, TurnFacts};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a knowledge source may look at during one turn.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    graph: Arc<FlowGraph>,
    pub conversation_id: String,
    /// The state this turn is processed in.
    pub current_state: StateId,
    pub intent: IntentId,
    /// This turn's extracted data, already checked against field declarations.
    pub extracted: DataMap,
    /// Data committed by earlier turns.
    pub committed: DataMap,
    /// `committed` with `extracted` merged in under each field's merge policy.
    pub prospective: DataMap,
    /// 1-based number of the turn being processed.
    pub turn: u32,
    history: Vec<TurnRecord>,
    counters: GuardCounters,
    guard_tiers: BTreeMap<String, GuardTier>,
}

impl ContextSnapshot {
    /// Capture the snapshot for the next turn of `state`.
    ///
    /// `intent` must already be in the flow's vocabulary. `extracted` is
    /// checked against the field declarations here; undeclared fields and
    /// values of the wrong kind are dropped.
    pub fn capture(
        graph: Arc<FlowGraph>,
        state: &ConversationState,
        intent: IntentId,
        extracted: DataMap,
    ) -> Self {
        let extracted = sanitize(&graph, &state.conversation_id, extracted);
        let prospective = merge(&graph, &state.collected_data, &extracted);
        Self {
            graph,
            conversation_id: state.conversation_id.clone(),
            current_state: state.current_state.clone(),
            intent,
            extracted,
            committed: state.collected_data.clone(),
            prospective,
            turn: state.turn + 1,
            history: state.history.iter().cloned().collect(),
            counters: state.counters.clone(),
            guard_tiers: state.guard_tiers.clone(),
        }
    }

    /// The flow captured when the turn began.
    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    /// `None` only when the stored state vanished from a reloaded flow.
    pub fn state_def(&self) -> Option<&StateDef> {
        self.graph.state(&self.current_state)
    }

    /// Is this turn's intent in the named category?
    pub fn in_category(&self, category: &str) -> bool {
        self.graph.in_category(category, &self.intent)
    }

    /// Required fields of the current state still missing from prospective data.
    pub fn missing_required(&self) -> Vec<String> {
        self.graph.missing_required(&self.current_state, &self.prospective)
    }

    /// Facts for condition evaluation, over prospective data.
    pub fn facts(&self) -> TurnFacts<'_> {
        TurnFacts {
            data: &self.prospective,
            intent: &self.intent,
            state: &self.current_state,
            turn: self.turn,
        }
    }

    /// Completed turns, oldest first.
    pub fn history(&self) -> &[TurnRecord] {
        &self.history
    }

    /// The last `n` completed turns, oldest first.
    pub fn recent(&self, n: usize) -> &[TurnRecord] {
        let skip = self.history.len().saturating_sub(n);
        &self.history[skip..]
    }

    pub fn counters(&self) -> &GuardCounters {
        &self.counters
    }

    /// The committed tier of a guard (`Normal` if it never fired).
    pub fn guard_tier(&self, guard: &str) -> GuardTier {
        self.guard_tiers.get(guard).copied().unwrap_or_default()
    }

    /// Turns processed in the current state, this one included.
    pub fn turns_in_state(&self) -> u32 {
        self.counters.same_state_streak + 1
    }

    pub fn is_objection(&self) -> bool {
        is_objection(&self.graph, &self.intent)
    }

    pub fn is_unclear(&self) -> bool {
        is_unclear(&self.graph, &self.intent)
    }

    /// Consecutive objections ending with this turn (0 if this turn is not one).
    pub fn consecutive_objections(&self) -> u32 {
        if self.is_objection() {
            self.counters.consecutive_objections + 1
        } else {
            0
        }
    }

    /// All objections in the conversation, this turn included.
    pub fn total_objections(&self) -> u32 {
        self.counters.total_objections + u32::from(self.is_objection())
    }

    /// Consecutive unclear turns ending with this turn.
    pub fn consecutive_unclear(&self) -> u32 {
        if self.is_unclear() {
            self.counters.consecutive_unclear + 1
        } else {
            0
        }
    }
}

/// Keep only declared, well-typed, non-blank fields.
fn sanitize(graph: &FlowGraph, conversation_id: &str, extracted: DataMap) -> DataMap {
    let mut clean = DataMap::new();
    for (name, value) in extracted {
        let Some(decl) = graph.field(&name) else {
            warn!(
                conversation = %conversation_id,
                field = %name,
                "Dropping undeclared extracted field"
            );
            continue;
        };
        if value.is_blank() {
            debug!(conversation = %conversation_id, field = %name, "Ignoring blank value");
            continue;
        }
        match coerce(decl.kind, value) {
            Ok(value) => {
                clean.insert(name, value);
            }
            Err(value) => warn!(
                conversation = %conversation_id,
                field = %name,
                expected = %decl.kind,
                got = value.kind_name(),
                "Dropping extracted field of the wrong kind"
            ),
        }
    }
    clean
}

/// Ints widen to floats; a scalar becomes a one-element list.
fn coerce(kind: FieldKind, value: FieldValue) -> Result<FieldValue, FieldValue> {
    match (kind, value) {
        (FieldKind::Bool, v @ FieldValue::Bool(_))
        | (FieldKind::Int, v @ FieldValue::Int(_))
        | (FieldKind::Float, v @ FieldValue::Float(_))
        | (FieldKind::Text, v @ FieldValue::Text(_))
        | (FieldKind::List, v @ FieldValue::List(_)) => Ok(v),
        (FieldKind::Float, FieldValue::Int(i)) => Ok(FieldValue::Float(i as f64)),
        (FieldKind::List, scalar) => Ok(FieldValue::List(vec![scalar])),
        (_, other) => Err(other),
    }
}

/// Committed data with this turn's extraction applied.
fn merge(graph: &FlowGraph, committed: &DataMap, extracted: &DataMap) -> DataMap {
    let mut merged = committed.clone();
    for (name, value) in extracted {
        let policy = graph.field(name).map(|d| d.merge).unwrap_or_default();
        let next = match policy {
            MergePolicy::Replace => value.clone(),
            MergePolicy::Accumulate => FieldValue::accumulate(committed.get(name), value.clone()),
        };
        merged.insert(name.clone(), next);
    }
    merged
}

/// Objections are the intents in the objection guard's category.
pub(crate) fn is_objection(graph: &FlowGraph, intent: &IntentId) -> bool {
    graph
        .guards()
        .objection
        .as_ref()
        .is_some_and(|o| graph.in_category(&o.category, intent))
}

/// Unclear turns are intents in `engine.unclear_category`, or the unknown
/// intent when no category is configured.
pub(crate) fn is_unclear(graph: &FlowGraph, intent: &IntentId) -> bool {
    match &graph.engine().unclear_category {
        Some(category) => graph.in_category(category, intent),
        None => *intent == graph.engine().unknown_intent,
    }
}
