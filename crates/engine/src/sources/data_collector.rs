//! Moves on once the current state has every field it requires.

use crate::snapshot::ContextSnapshot;
use crate::source::{KnowledgeSource, ProposalSink, SourceFault};
use parley_core::proposal::{Priority, TransitionProposal};
use parley_flow::DATA_COMPLETE_TRIGGER;

pub struct DataCollector;

impl KnowledgeSource for DataCollector {
    fn name(&self) -> &str {
        "data_collector"
    }

    fn should_contribute(&self, snapshot: &ContextSnapshot) -> bool {
        snapshot.state_def().is_some_and(|state| {
            !state.required_data.is_empty() && state.transitions.contains_key(DATA_COMPLETE_TRIGGER)
        })
    }

    fn contribute(
        &self,
        snapshot: &ContextSnapshot,
        sink: &mut ProposalSink,
    ) -> Result<(), SourceFault> {
        if !snapshot.missing_required().is_empty() {
            return Ok(());
        }
        let state = snapshot
            .state_def()
            .ok_or_else(|| SourceFault::UnknownState(snapshot.current_state.clone()))?;
        let Some(outcome) = state.transitions.get(DATA_COMPLETE_TRIGGER) else {
            return Ok(());
        };
        if let Some(selected) = snapshot.graph().select(outcome, &snapshot.facts()) {
            sink.transition(TransitionProposal::new(
                selected.target.clone(),
                Priority::High,
                "data_complete",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sales_graph, snapshot_in};
    use parley_core::proposal::Proposal;
    use parley_core::state::ConversationState;
    use parley_core::value::{DataMap, FieldValue};

    #[test]
    fn only_states_with_requirements_apply() {
        assert!(!DataCollector.should_contribute(&snapshot_in("greeting", "info_provided")));
        assert!(DataCollector.should_contribute(&snapshot_in("collect_info", "info_provided")));
    }

    #[test]
    fn silent_while_data_is_missing() {
        let mut sink = ProposalSink::new();
        DataCollector
            .contribute(&snapshot_in("collect_info", "info_provided"), &mut sink)
            .unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn proposes_data_complete_target() {
        let conversation = ConversationState::with_id("c", "collect_info", 20);
        let mut extracted = DataMap::new();
        extracted.insert("company_size".into(), FieldValue::Int(10));
        let snap =
            ContextSnapshot::capture(sales_graph(), &conversation, "info_provided".into(), extracted);

        let mut sink = ProposalSink::new();
        DataCollector.contribute(&snap, &mut sink).unwrap();
        let proposals = sink.into_proposals();
        let Proposal::Transition(t) = &proposals[0] else {
            panic!("expected a transition");
        };
        assert_eq!(t.target, "presentation");
        assert_eq!(t.priority, Priority::High);
    }
}
