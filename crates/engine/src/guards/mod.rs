//! Safety guards — knowledge sources that detect a conversation going
//! nowhere and escalate out of it.
//!
//! Guards speak the same proposal language as every other source. Each
//! time a guard fires it proposes the tier after the one it last reached,
//! carried on the proposal's `escalation`:
//!
//! ```text
//! Normal → Nudge → OfferAlternative → ForcedExit
//! ```
//!
//! The orchestrator records the tier when it commits the turn. Tiers only go
//! up; an explicit conversation reset is the only way back to `Normal`.

mod conversation_loop;
mod objection;
mod stall;

pub use conversation_loop::ConversationLoopGuard;
pub use objection::ObjectionRepetitionGuard;
pub use stall::StallGuard;

use crate::snapshot::ContextSnapshot;
use parley_core::state::GuardTier;

/// The tier a guard escalates to if it fires this turn.
pub(crate) fn next_tier(snapshot: &ContextSnapshot, guard: &str) -> GuardTier {
    snapshot.guard_tier(guard).next()
}
