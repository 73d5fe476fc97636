//! Loop detection: the same intent in the same state, over and over,
//! with nothing informative in between.

use super::next_tier;
use crate::snapshot::ContextSnapshot;
use crate::source::{KnowledgeSource, ProposalSink, SourceFault};
use parley_core::proposal::{ActionProposal, Priority};
use parley_core::state::GuardTier;
use parley_flow::LoopSettings;
use tracing::debug;

const NAME: &str = "conversation_loop";

pub struct ConversationLoopGuard;

fn settings(snapshot: &ContextSnapshot) -> Option<&LoopSettings> {
    snapshot
        .graph()
        .guards()
        .conversation_loop
        .as_ref()
        .filter(|s| s.enabled)
}

/// What the guard sees in its window (the current turn included).
struct WindowView {
    repeats: u32,
    informative: bool,
}

fn inspect(snapshot: &ContextSnapshot, settings: &LoopSettings) -> WindowView {
    let past = snapshot.recent(settings.window.saturating_sub(1));
    let repeats = past
        .iter()
        .filter(|r| r.state == snapshot.current_state && r.intent == snapshot.intent)
        .count() as u32
        + 1;
    let informative = settings.informative_category.as_deref().is_some_and(|category| {
        snapshot.in_category(category)
            || past
                .iter()
                .any(|r| snapshot.graph().in_category(category, &r.intent))
    });
    WindowView {
        repeats,
        informative,
    }
}

impl KnowledgeSource for ConversationLoopGuard {
    fn name(&self) -> &str {
        NAME
    }

    fn should_contribute(&self, snapshot: &ContextSnapshot) -> bool {
        settings(snapshot).is_some() && !snapshot.state_def().is_some_and(|s| s.terminal)
    }

    fn contribute(
        &self,
        snapshot: &ContextSnapshot,
        sink: &mut ProposalSink,
    ) -> Result<(), SourceFault> {
        let settings =
            settings(snapshot).ok_or_else(|| SourceFault::MissingSetting("guards.loop".into()))?;
        let view = inspect(snapshot, settings);
        if view.repeats <= settings.max_repeats || view.informative {
            return Ok(());
        }
        let tier = next_tier(snapshot, NAME);
        debug!(
            state = %snapshot.current_state,
            intent = %snapshot.intent,
            %tier,
            "Conversation loop detected"
        );

        let proposal = match tier {
            GuardTier::Normal | GuardTier::Nudge => {
                ActionProposal::new(settings.nudge_action.clone(), Priority::High, "loop_nudge")
                    .escalating(NAME, GuardTier::Nudge)
            }
            GuardTier::OfferAlternative => ActionProposal::new(
                settings.rephrase_action.clone(),
                Priority::High,
                "loop_rephrase",
            )
            .escalating(NAME, tier),
            GuardTier::ForcedExit => ActionProposal::new(
                settings.exit_action.clone(),
                Priority::Critical,
                "loop_forced_exit",
            )
            .non_combinable()
            .escalating(NAME, tier),
        };
        sink.action(proposal);
        Ok(())
    }
}
