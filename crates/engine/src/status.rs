//! Read-only status report for a conversation.

use chrono::{DateTime, Utc};
use parley_core::decision::DecisionRecord;
use parley_core::ids::StateId;
use parley_core::state::{ConversationState, GuardCounters, GuardTier};
use parley_core::value::DataMap;
use parley_flow::FlowGraph;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Everything an operator wants to know about one conversation.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub conversation_id: String,
    pub state: StateId,
    pub goal: String,
    pub is_terminal: bool,
    pub turn: u32,
    pub collected_data: DataMap,
    pub missing_required: Vec<String>,
    pub counters: GuardCounters,
    pub guard_tiers: BTreeMap<String, GuardTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_decision: Option<DecisionRecord>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StatusReport {
    pub fn build(state: &ConversationState, graph: &FlowGraph) -> Self {
        let def = graph.state(&state.current_state);
        Self {
            conversation_id: state.conversation_id.clone(),
            state: state.current_state.clone(),
            goal: def.map(|d| d.goal.clone()).unwrap_or_default(),
            is_terminal: def.is_some_and(|d| d.terminal),
            turn: state.turn,
            collected_data: state.collected_data.clone(),
            missing_required: graph.missing_required(&state.current_state, &state.collected_data),
            counters: state.counters.clone(),
            guard_tiers: state.guard_tiers.clone(),
            last_decision: state.last_decision.clone(),
            started_at: state.started_at,
            updated_at: state.updated_at,
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Conversation: {}", self.conversation_id)?;
        write!(f, "  State:      {}", self.state)?;
        if self.is_terminal {
            write!(f, " (terminal)")?;
        }
        writeln!(f)?;
        if !self.goal.is_empty() {
            writeln!(f, "  Goal:       {}", self.goal)?;
        }
        writeln!(f, "  Turn:       {}", self.turn)?;

        if self.collected_data.is_empty() {
            writeln!(f, "  Data:       (none)")?;
        } else {
            writeln!(f, "  Data:")?;
            for (field, value) in &self.collected_data {
                writeln!(f, "    {field} = {value}")?;
            }
        }
        if !self.missing_required.is_empty() {
            writeln!(f, "  Missing:    {}", self.missing_required.join(", "))?;
        }

        let c = &self.counters;
        writeln!(
            f,
            "  Counters:   streak={} objections={}/{} unclear={}",
            c.same_state_streak, c.consecutive_objections, c.total_objections, c.consecutive_unclear
        )?;
        for (guard, tier) in &self.guard_tiers {
            writeln!(f, "  Guard:      {guard} at {tier}")?;
        }

        if let Some(record) = &self.last_decision {
            let d = &record.decision;
            writeln!(
                f,
                "  Last turn:  #{} {} -> {} [{}]",
                record.turn,
                d.action,
                d.next_state,
                d.reason_codes.join(", ")
            )?;
        }
        write!(f, "  Updated:    {}", self.updated_at.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sales_graph;
    use parley_core::value::FieldValue;

    #[test]
    fn reports_missing_and_goal() {
        let graph = sales_graph();
        let mut state = ConversationState::with_id("c-9", "collect_info", 20);
        state.collected_data.insert("industry".into(), FieldValue::from("retail"));
        state.raise_guard_tier("stall", GuardTier::Nudge);

        let report = StatusReport::build(&state, &graph);

        assert_eq!(report.goal, "Learn about the customer");
        assert_eq!(report.missing_required, vec!["company_size".to_string()]);
        assert!(!report.is_terminal);

        let text = report.to_string();
        assert!(text.contains("Conversation: c-9"));
        assert!(text.contains("Missing:    company_size"));
        assert!(text.contains("stall at nudge"));
    }

    #[test]
    fn serializes_to_json() {
        let graph = sales_graph();
        let state = ConversationState::with_id("c", "closing", 20);
        let json = serde_json::to_value(StatusReport::build(&state, &graph)).unwrap();
        assert_eq!(json["is_terminal"], true);
        assert!(json.get("last_decision").is_none());
    }
}
