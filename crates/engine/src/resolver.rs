//! Conflict resolution — many proposals in, one decision out.
//!
//! Pure and deterministic: the same proposals in the same order always
//! produce the same decision and the same trace. Ordering inside each
//! partition (actions, transitions) is
//!
//! ```text
//! priority desc, rank asc, source registration order, emission order
//! ```
//!
//! A non-combinable winning action pins the conversation to its current
//! state: every transition is discarded.

use parley_core::decision::{ProposalKind, ResolvedDecision, TraceEntry, TraceOutcome};
use parley_core::ids::{ActionId, StateId};
use parley_core::proposal::{Priority, Proposal};
use parley_core::value::DataMap;
use std::cmp::Ordering;

/// A proposal tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedProposal {
    pub source: String,
    /// Position of the source in the registry.
    pub source_index: usize,
    /// Position of the proposal within its source's output.
    pub seq: usize,
    pub proposal: Proposal,
}

/// What to do when no source proposes an action.
#[derive(Debug, Clone, Default)]
pub struct FallbackRules {
    pub default_action: Option<ActionId>,
}

/// No action was proposed and there is no default to fall back on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no action was proposed and no default action is configured")]
pub struct ResolutionExhausted;

const DEFAULT_ACTION_REASON: &str = "default_action";

fn order(a: &CollectedProposal, b: &CollectedProposal) -> Ordering {
    b.proposal
        .priority()
        .cmp(&a.proposal.priority())
        .then_with(|| a.proposal.rank().cmp(&b.proposal.rank()))
        .then_with(|| a.source_index.cmp(&b.source_index))
        .then_with(|| a.seq.cmp(&b.seq))
}

/// Sort one partition and record each member's outcome.
///
/// Returns the partition's indices into `proposals`, in resolution order.
fn rank_partition(
    proposals: &[CollectedProposal],
    kind: ProposalKind,
    suppressed: bool,
    outcomes: &mut [Option<TraceOutcome>],
) -> Vec<usize> {
    let mut indices: Vec<usize> = proposals
        .iter()
        .enumerate()
        .filter(|(_, p)| kind_of(&p.proposal) == kind)
        .map(|(i, _)| i)
        .collect();
    indices.sort_by(|&a, &b| order(&proposals[a], &proposals[b]));

    let winning_priority: Option<Priority> =
        indices.first().map(|&i| proposals[i].proposal.priority());
    for (position, &i) in indices.iter().enumerate() {
        let p = &proposals[i].proposal;
        outcomes[i] = Some(if suppressed {
            TraceOutcome::Suppressed
        } else if position == 0 {
            TraceOutcome::Won
        } else if Some(p.priority()) == winning_priority || p.is_informational() {
            TraceOutcome::Retained
        } else {
            TraceOutcome::Overridden
        });
    }
    indices
}

fn kind_of(proposal: &Proposal) -> ProposalKind {
    match proposal {
        Proposal::Action(_) => ProposalKind::Action,
        Proposal::Transition(_) => ProposalKind::Transition,
    }
}

/// Resolve one turn's proposals into a decision.
pub fn resolve(
    proposals: &[CollectedProposal],
    current_state: &StateId,
    fallback: &FallbackRules,
) -> Result<ResolvedDecision, ResolutionExhausted> {
    let mut outcomes: Vec<Option<TraceOutcome>> = vec![None; proposals.len()];

    let actions = rank_partition(proposals, ProposalKind::Action, false, &mut outcomes);
    let head = actions.first().and_then(|&i| match &proposals[i].proposal {
        Proposal::Action(a) => Some((a, &proposals[i].source)),
        Proposal::Transition(_) => None,
    });
    let (action, combinable, winning_source, lead_reason) = match head {
        Some((a, source)) => (
            a.action.clone(),
            a.combinable,
            Some(source.clone()),
            a.reason_code.clone(),
        ),
        None => {
            let default = fallback.default_action.clone().ok_or(ResolutionExhausted)?;
            (default, true, None, DEFAULT_ACTION_REASON.to_string())
        }
    };

    let transitions =
        rank_partition(proposals, ProposalKind::Transition, !combinable, &mut outcomes);
    let next_state = match (combinable, transitions.first()) {
        (true, Some(&i)) => match &proposals[i].proposal {
            Proposal::Transition(t) => t.target.clone(),
            Proposal::Action(_) => current_state.clone(),
        },
        _ => current_state.clone(),
    };

    // Winner first, then same-tier and informational reasons, actions
    // before transitions.
    let mut reason_codes = vec![lead_reason];
    for &i in actions.iter().chain(transitions.iter()) {
        if outcomes[i] == Some(TraceOutcome::Won) || outcomes[i] == Some(TraceOutcome::Retained) {
            let reason = proposals[i].proposal.reason_code();
            if !reason_codes.iter().any(|r| r == reason) {
                reason_codes.push(reason.to_string());
            }
        }
    }

    let trace = proposals
        .iter()
        .zip(outcomes)
        .map(|(p, outcome)| trace_entry(p, outcome.unwrap_or(TraceOutcome::Overridden)))
        .collect();

    Ok(ResolvedDecision {
        action,
        next_state,
        reason_codes,
        transitions_suppressed: !combinable,
        degraded: false,
        winning_source,
        data_updates: DataMap::new(),
        trace,
    })
}

fn trace_entry(collected: &CollectedProposal, outcome: TraceOutcome) -> TraceEntry {
    let (kind, value) = match &collected.proposal {
        Proposal::Action(a) => (ProposalKind::Action, a.action.to_string()),
        Proposal::Transition(t) => (ProposalKind::Transition, t.target.to_string()),
    };
    TraceEntry {
        source: collected.source.clone(),
        kind,
        value,
        priority: collected.proposal.priority(),
        rank: collected.proposal.rank(),
        reason_code: collected.proposal.reason_code().to_string(),
        outcome,
    }
}
