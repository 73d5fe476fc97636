//! Closes the conversation politely when the user says no.

use crate::snapshot::ContextSnapshot;
use crate::source::{KnowledgeSource, ProposalSink, SourceFault};
use parley_core::proposal::{ActionProposal, Priority};

pub struct RejectionHandler;

impl KnowledgeSource for RejectionHandler {
    fn name(&self) -> &str {
        "rejection_handler"
    }

    fn should_contribute(&self, snapshot: &ContextSnapshot) -> bool {
        snapshot
            .graph()
            .sources()
            .rejection
            .as_ref()
            .is_some_and(|r| r.enabled && snapshot.in_category(&r.category))
    }

    fn contribute(
        &self,
        snapshot: &ContextSnapshot,
        sink: &mut ProposalSink,
    ) -> Result<(), SourceFault> {
        let rejection = snapshot
            .graph()
            .sources()
            .rejection
            .as_ref()
            .ok_or_else(|| SourceFault::MissingSetting("sources.rejection".into()))?;
        sink.action(
            ActionProposal::new(rejection.action.clone(), Priority::Critical, "rejection")
                .non_combinable(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::snapshot_in;
    use parley_core::proposal::Proposal;

    #[test]
    fn rejection_is_critical_and_non_combinable() {
        let snap = snapshot_in("presentation", "rejection");
        assert!(RejectionHandler.should_contribute(&snap));
        let mut sink = ProposalSink::new();
        RejectionHandler.contribute(&snap, &mut sink).unwrap();
        let proposals = sink.into_proposals();
        let Proposal::Action(a) = &proposals[0] else {
            panic!("expected an action");
        };
        assert_eq!(a.action, "soft_close");
        assert_eq!(a.priority, Priority::Critical);
        assert!(!a.combinable);
    }

    #[test]
    fn category_members_all_count() {
        assert!(RejectionHandler.should_contribute(&snapshot_in("greeting", "goodbye")));
        assert!(!RejectionHandler.should_contribute(&snapshot_in("greeting", "agreement")));
    }
}
