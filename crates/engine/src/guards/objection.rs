//! Objection limit: past a point, stop arguing and close softly.

use crate::snapshot::ContextSnapshot;
use crate::source::{KnowledgeSource, ProposalSink, SourceFault};
use parley_core::proposal::{ActionProposal, Priority};
use parley_core::state::GuardTier;
use parley_flow::ObjectionSettings;
use tracing::debug;

const NAME: &str = "objection_repetition";

pub struct ObjectionRepetitionGuard;

fn settings(snapshot: &ContextSnapshot) -> Option<&ObjectionSettings> {
    snapshot
        .graph()
        .guards()
        .objection
        .as_ref()
        .filter(|s| s.enabled)
}

impl KnowledgeSource for ObjectionRepetitionGuard {
    fn name(&self) -> &str {
        NAME
    }

    fn should_contribute(&self, snapshot: &ContextSnapshot) -> bool {
        let Some(settings) = settings(snapshot) else {
            return false;
        };
        snapshot.is_objection()
            && (snapshot.consecutive_objections() > settings.max_consecutive
                || snapshot.total_objections() > settings.max_total)
    }

    fn contribute(
        &self,
        snapshot: &ContextSnapshot,
        sink: &mut ProposalSink,
    ) -> Result<(), SourceFault> {
        let settings = settings(snapshot)
            .ok_or_else(|| SourceFault::MissingSetting("guards.objection".into()))?;
        debug!(
            consecutive = snapshot.consecutive_objections(),
            total = snapshot.total_objections(),
            "Objection limit reached"
        );
        sink.action(
            ActionProposal::new(settings.action.clone(), Priority::Critical, "objection_limit")
                .non_combinable()
                .escalating(NAME, GuardTier::ForcedExit),
        );
        Ok(())
    }
}
