//! Stall detection: too many turns spent in one state.

use super::next_tier;
use crate::snapshot::ContextSnapshot;
use crate::source::{KnowledgeSource, ProposalSink, SourceFault};
use parley_core::ids::StateId;
use parley_core::proposal::{ActionProposal, Priority, TransitionProposal};
use parley_core::state::GuardTier;
use parley_flow::{STALLED_TRIGGER, StallSettings};
use tracing::{debug, warn};

const NAME: &str = "stall";

pub struct StallGuard;

fn settings(snapshot: &ContextSnapshot) -> Option<&StallSettings> {
    snapshot
        .graph()
        .guards()
        .stall
        .as_ref()
        .filter(|s| s.enabled)
}

/// The state's own `stalled` transition, else the guard's `skip_state`.
fn skip_target(snapshot: &ContextSnapshot, stall: &StallSettings) -> Option<StateId> {
    let from_state = snapshot.state_def().and_then(|state| {
        let outcome = state.transitions.get(STALLED_TRIGGER)?;
        snapshot
            .graph()
            .select(outcome, &snapshot.facts())
            .map(|selected| selected.target.clone())
    });
    from_state.or_else(|| stall.skip_state.clone())
}

impl KnowledgeSource for StallGuard {
    fn name(&self) -> &str {
        NAME
    }

    fn should_contribute(&self, snapshot: &ContextSnapshot) -> bool {
        let Some(stall) = settings(snapshot) else {
            return false;
        };
        let terminal = snapshot.state_def().is_some_and(|s| s.terminal);
        !terminal && snapshot.turns_in_state() > stall.max_turns_in_state
    }

    fn contribute(
        &self,
        snapshot: &ContextSnapshot,
        sink: &mut ProposalSink,
    ) -> Result<(), SourceFault> {
        let stall =
            settings(snapshot).ok_or_else(|| SourceFault::MissingSetting("guards.stall".into()))?;
        let tier = next_tier(snapshot, NAME);
        debug!(
            state = %snapshot.current_state,
            turns = snapshot.turns_in_state(),
            %tier,
            "Stall detected"
        );

        match tier {
            GuardTier::Normal | GuardTier::Nudge => sink.action(
                ActionProposal::new(stall.offer_skip_action.clone(), Priority::High, "stall_nudge")
                    .escalating(NAME, GuardTier::Nudge),
            ),
            GuardTier::OfferAlternative => {
                sink.action(
                    ActionProposal::new(
                        stall.skip_action.clone(),
                        Priority::High,
                        "stall_offer_alternative",
                    )
                    .escalating(NAME, tier),
                );
                if let Some(target) = skip_target(snapshot, stall) {
                    sink.transition(TransitionProposal::new(
                        target,
                        Priority::High,
                        "stall_offer_alternative",
                    ));
                }
            }
            GuardTier::ForcedExit => {
                // The exit stays combinable so the forced transition can ride along.
                sink.action(
                    ActionProposal::new(
                        stall.exit_action.clone(),
                        Priority::Critical,
                        "stall_forced_exit",
                    )
                    .escalating(NAME, tier),
                );
                match skip_target(snapshot, stall) {
                    Some(target) => sink.transition(TransitionProposal::new(
                        target,
                        Priority::Critical,
                        "stall_forced_exit",
                    )),
                    None => warn!(
                        state = %snapshot.current_state,
                        "Stall ceiling reached with no state to leave for"
                    ),
                }
            }
        }
        Ok(())
    }
}
