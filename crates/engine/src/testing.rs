//! Shared fixtures for the engine's unit tests.

use crate::snapshot::ContextSnapshot;
use parley_core::state::ConversationState;
use parley_core::value::DataMap;
use parley_flow::FlowGraph;
use std::sync::Arc;

/// A small sales conversation exercising every built-in source and guard.
pub(crate) const SALES_FLOW: &str = r#"
initial_state = "greeting"
intents = [
  "greeting", "agreement", "info_provided", "price_question", "faq_question",
  "price_objection", "timing_objection", "rejection", "goodbye", "unclear",
]
actions = [
  "continue", "escalate_to_human", "greet", "ask_for_info", "ask_company_size",
  "present", "answer_price", "answer_faq", "handle_objection", "soft_close",
  "offer_skip", "skip_question", "close_conversation", "nudge", "rephrase",
  "schedule_demo",
]

[engine]
unclear_category = "unclear_intents"

[fields.company_size]
kind = "int"
[fields.industry]
kind = "text"
[fields.email]
kind = "text"
[fields.pain_points]
kind = "list"
merge = "accumulate"

[categories]
questions = ["price_question", "faq_question"]
objections = ["price_objection", "timing_objection"]
informative = ["info_provided", "agreement", "@questions"]
rejections = ["rejection", "goodbye"]
unclear_intents = ["unclear"]

[conditions]
big_company = "data.company_size >= 50"

[states.greeting]
goal = "Open the conversation"
default_action = "greet"
[states.greeting.transitions]
agreement = "collect_info"
info_provided = "collect_info"
[states.greeting.rules]
greeting = "greet"

[states.collect_info]
goal = "Learn about the customer"
required_data = ["company_size"]
optional_data = ["industry", "pain_points", "email"]
default_action = "ask_for_info"
[states.collect_info.transitions]
data_complete = "presentation"
stalled = "presentation"
[states.collect_info.rules]
info_provided = [{ when = "big_company", then = "present" }, { then = "ask_for_info" }]
unclear = "ask_company_size"

[states.presentation]
goal = "Present the product"
default_action = "present"
[states.presentation.transitions]
agreement = "closing"
[states.presentation.rules]
price_objection = "handle_objection"
timing_objection = "handle_objection"

[states.closing]
goal = "Book a demo"
default_action = "schedule_demo"
terminal = true

[sources.questions]
category = "questions"
answers = { price_question = "answer_price" }
default_answer = "answer_faq"

[sources.rejection]
category = "rejections"

[guards.stall]
max_turns_in_state = 6
offer_skip_action = "offer_skip"
skip_action = "skip_question"
exit_action = "close_conversation"
skip_state = "closing"

[guards.loop]
max_repeats = 4
window = 6
informative_category = "informative"
nudge_action = "nudge"
rephrase_action = "rephrase"
exit_action = "close_conversation"

[guards.objection]
category = "objections"
max_consecutive = 3
max_total = 5
action = "soft_close"
"#;

pub(crate) fn graph(toml: &str) -> FlowGraph {
    FlowGraph::from_toml(toml).unwrap()
}

pub(crate) fn sales_graph() -> Arc<FlowGraph> {
    Arc::new(graph(SALES_FLOW))
}

pub(crate) fn snapshot_in(state: &str, intent: &str) -> ContextSnapshot {
    let conversation = ConversationState::with_id("test", state, 20);
    ContextSnapshot::capture(sales_graph(), &conversation, intent.into(), DataMap::new())
}

pub(crate) fn snapshot_of(conversation: &ConversationState, intent: &str) -> ContextSnapshot {
    ContextSnapshot::capture(sales_graph(), conversation, intent.into(), DataMap::new())
}
