//! The current state's own rule and transition tables.

use crate::snapshot::ContextSnapshot;
use crate::source::{KnowledgeSource, ProposalSink, SourceFault};
use parley_core::proposal::{ActionProposal, Priority, TransitionProposal};

pub struct StateRules;

fn reason(base: &str, condition: Option<&str>) -> String {
    match condition {
        Some(name) => format!("{base}:{name}"),
        None => base.to_string(),
    }
}

impl KnowledgeSource for StateRules {
    fn name(&self) -> &str {
        "state_rules"
    }

    fn contribute(
        &self,
        snapshot: &ContextSnapshot,
        sink: &mut ProposalSink,
    ) -> Result<(), SourceFault> {
        let graph = snapshot.graph();
        let state = snapshot
            .state_def()
            .ok_or_else(|| SourceFault::UnknownState(snapshot.current_state.clone()))?;
        let facts = snapshot.facts();
        let intent = snapshot.intent.as_str();

        if let Some(selected) = state
            .rules
            .get(intent)
            .and_then(|outcome| graph.select(outcome, &facts))
        {
            sink.action(ActionProposal::new(
                selected.target.clone(),
                Priority::Normal,
                reason("state_rule", selected.condition),
            ));
        }

        if let Some(selected) = state
            .transitions
            .get(intent)
            .and_then(|outcome| graph.select(outcome, &facts))
        {
            sink.transition(TransitionProposal::new(
                selected.target.clone(),
                Priority::Normal,
                reason("state_transition", selected.condition),
            ));
        }
        Ok(())
    }
}
