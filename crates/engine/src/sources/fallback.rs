//! Always has something to say: the state's default action, and staying put.

use crate::snapshot::ContextSnapshot;
use crate::source::{KnowledgeSource, ProposalSink, SourceFault};
use parley_core::proposal::{ActionProposal, Priority, TransitionProposal};

pub struct Fallback;

impl KnowledgeSource for Fallback {
    fn name(&self) -> &str {
        "fallback"
    }

    fn contribute(
        &self,
        snapshot: &ContextSnapshot,
        sink: &mut ProposalSink,
    ) -> Result<(), SourceFault> {
        let action = snapshot
            .state_def()
            .and_then(|state| state.default_action.clone())
            .unwrap_or_else(|| snapshot.graph().engine().default_action.clone());

        sink.action(ActionProposal::new(action, Priority::Low, "fallback_default"));
        sink.transition(TransitionProposal::new(
            snapshot.current_state.clone(),
            Priority::Low,
            "stay_in_state",
        ));
        Ok(())
    }
}
