//! End-to-end conversations through the full turn pipeline.

use parley_core::decision::TraceOutcome;
use parley_core::state::{ConversationState, GuardTier};
use parley_core::value::FieldValue;
use parley_engine::{FlowHandle, Orchestrator, TurnInput, TurnOutcome};
use parley_flow::{ConfigViolation, ConfigurationError, FlowGraph};
use std::sync::Arc;

const FLOW: &str = r#"
initial_state = "greeting"
intents = [
  "greeting", "agreement", "info_provided", "price_question", "faq_question",
  "price_objection", "rejection", "unclear",
]
actions = [
  "continue", "escalate_to_human", "greet", "ask_for_info", "ask_company_size",
  "present", "answer_price", "answer_faq", "handle_objection", "soft_close",
  "offer_skip", "skip_question", "close_conversation", "nudge", "rephrase",
  "schedule_demo",
]

[fields.company_size]
kind = "int"

[categories]
questions = ["price_question", "faq_question"]
objections = ["price_objection"]
informative = ["info_provided", "agreement", "@questions"]

[conditions]
late = "turn >= 4"

[states.greeting]
goal = "Open the conversation"
default_action = "greet"
[states.greeting.transitions]
agreement = "collect_info"
[states.greeting.rules]
greeting = "greet"
price_question = "greet"

[states.collect_info]
goal = "Learn the company size"
required_data = ["company_size"]
default_action = "ask_for_info"
[states.collect_info.transitions]
data_complete = "presentation"
[states.collect_info.rules]
info_provided = "ask_for_info"
unclear = "ask_company_size"

[states.presentation]
goal = "Present the product"
default_action = "present"
[states.presentation.transitions]
agreement = "closing"
price_objection = [{ when = "late", then = "closing" }]
[states.presentation.rules]
price_objection = "handle_objection"

[states.closing]
default_action = "schedule_demo"
terminal = true

[sources.questions]
category = "questions"
answers = { price_question = "answer_price" }
default_answer = "answer_faq"

[guards.stall]
max_turns_in_state = 10
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
max_total = 10
action = "soft_close"
"#;

fn orchestrator() -> Orchestrator {
    let graph = FlowGraph::from_toml(FLOW).unwrap();
    Orchestrator::new(Arc::new(FlowHandle::new(graph)))
}

fn conversation_in(engine: &Orchestrator, state: &str) -> ConversationState {
    let mut conversation = engine.start_conversation_with_id("scenario");
    conversation.current_state = state.into();
    conversation
}

fn run(engine: &Orchestrator, conversation: &mut ConversationState, intents: &[&str]) -> Vec<TurnOutcome> {
    intents
        .iter()
        .map(|intent| engine.process_turn(conversation, TurnInput::new(*intent)))
        .collect()
}

#[test]
fn question_outranks_state_rules() {
    let engine = orchestrator();
    let mut conversation = conversation_in(&engine, "greeting");

    let outcome = engine.process_turn(&mut conversation, TurnInput::new("price_question"));

    assert_eq!(outcome.decision.action, "answer_price");
    assert_eq!(outcome.decision.winning_source.as_deref(), Some("question_responder"));
    assert!(outcome.decision.has_reason("question_answered"));
    assert_eq!(conversation.current_state, "greeting");
}

#[test]
fn completed_data_follows_data_complete_transition() {
    let engine = orchestrator();
    let mut conversation = conversation_in(&engine, "collect_info");

    let outcome = engine.process_turn(
        &mut conversation,
        TurnInput::new("info_provided").with_data("company_size", 10i64),
    );

    assert_eq!(conversation.collected_data.get("company_size"), Some(&FieldValue::Int(10)));
    assert_eq!(outcome.decision.next_state, "presentation");
    assert_eq!(conversation.current_state, "presentation");
    assert_eq!(
        outcome.decision.data_updates.get("company_size"),
        Some(&FieldValue::Int(10))
    );
    assert!(outcome.decision.has_reason("data_complete"));
}

#[test]
fn repeated_unclear_turns_trigger_the_loop_guard() {
    let engine = orchestrator();
    let mut conversation = conversation_in(&engine, "collect_info");

    let outcomes = run(&engine, &mut conversation, &["unclear"; 5]);

    for early in &outcomes[..4] {
        assert_eq!(early.decision.action, "ask_company_size");
        assert!(!early.decision.trace_mentions("loop_nudge"));
    }
    let fifth = &outcomes[4].decision;
    assert_eq!(fifth.action, "nudge");
    assert!(fifth.has_reason("loop_nudge"));
    assert!(fifth.trace_mentions("loop_nudge"));
    assert_eq!(conversation.guard_tier("conversation_loop"), GuardTier::Nudge);
}

#[test]
fn loop_guard_escalates_one_tier_per_turn() {
    let engine = orchestrator();
    let mut conversation = conversation_in(&engine, "collect_info");

    let outcomes = run(&engine, &mut conversation, &["unclear"; 8]);

    let actions: Vec<&str> = outcomes[4..]
        .iter()
        .map(|o| o.decision.action.as_str())
        .collect();
    assert_eq!(
        actions,
        vec!["nudge", "rephrase", "close_conversation", "close_conversation"]
    );
    assert!(outcomes[6].decision.transitions_suppressed);
    assert_eq!(
        conversation.guard_tier("conversation_loop"),
        GuardTier::ForcedExit
    );
}

#[test]
fn informative_turns_suppress_the_loop_guard() {
    let engine = orchestrator();
    let mut conversation = conversation_in(&engine, "collect_info");

    let outcomes = run(
        &engine,
        &mut conversation,
        &["unclear", "info_provided", "info_provided", "info_provided", "unclear"],
    );

    let fifth = &outcomes[4].decision;
    assert_eq!(fifth.action, "ask_company_size");
    assert!(!fifth.trace.iter().any(|t| t.reason_code.starts_with("loop_")));
    assert_eq!(conversation.guard_tier("conversation_loop"), GuardTier::Normal);
}

#[test]
fn repeated_objections_force_a_soft_close() {
    let engine = orchestrator();
    let mut conversation = conversation_in(&engine, "presentation");

    let outcomes = run(&engine, &mut conversation, &["price_objection"; 5]);

    for early in &outcomes[..3] {
        assert_eq!(early.decision.action, "handle_objection");
    }
    for late in &outcomes[3..] {
        let decision = &late.decision;
        assert_eq!(decision.action, "soft_close");
        assert!(decision.has_reason("objection_limit"));
        assert!(decision.transitions_suppressed);
        assert_eq!(decision.next_state, "presentation");
        // The `late` transition to closing was proposed and discarded.
        assert!(decision.trace.iter().any(|t| t.value == "closing"
            && t.outcome == TraceOutcome::Suppressed));
    }
    assert_eq!(conversation.current_state, "presentation");
    assert_eq!(conversation.counters.consecutive_objections, 5);
}

#[test]
fn dangling_transition_is_rejected_at_load() {
    let broken = FLOW.replace(
        "agreement = \"collect_info\"",
        "agreement = \"nonexistent_state\"",
    );

    let err = FlowGraph::from_toml(&broken).unwrap_err();

    let ConfigurationError::Invalid(violations) = &err else {
        panic!("expected validation failure, got {err}");
    };
    assert!(violations.contains(&ConfigViolation::DanglingTransition {
        state: "greeting".into(),
        intent: "agreement".into(),
        target: "nonexistent_state".into(),
    }));
    let message = err.to_string();
    assert!(message.contains("nonexistent_state"));
    assert!(message.contains("greeting"));
}

#[test]
fn resuming_from_json_matches_uninterrupted_run() {
    let engine = orchestrator();
    let script: Vec<TurnInput> = vec![
        TurnInput::new("agreement"),
        TurnInput::new("unclear"),
        TurnInput::new("unclear"),
        TurnInput::new("info_provided").with_data("company_size", 75i64),
        TurnInput::new("price_objection"),
        TurnInput::new("price_question"),
        TurnInput::new("agreement"),
    ];

    let mut straight = engine.start_conversation_with_id("resume");
    let expected: Vec<_> = script
        .iter()
        .map(|input| engine.process_turn(&mut straight, input.clone()).decision)
        .collect();

    let mut resumed = engine.start_conversation_with_id("resume");
    let mut actual = Vec::new();
    for (i, input) in script.iter().enumerate() {
        if i % 2 == 1 {
            let json = resumed.to_json().unwrap();
            resumed = ConversationState::from_json(&json).unwrap();
        }
        actual.push(engine.process_turn(&mut resumed, input.clone()).decision);
    }

    assert_eq!(actual, expected);
    assert_eq!(resumed.current_state, straight.current_state);
    assert_eq!(resumed.current_state, "closing");
    assert_eq!(resumed.collected_data, straight.collected_data);
    assert_eq!(resumed.history, straight.history);
    assert_eq!(resumed.counters, straight.counters);
    assert_eq!(resumed.guard_tiers, straight.guard_tiers);
}

#[test]
fn stalled_conversation_is_moved_on() {
    let tight = FLOW.replace("max_turns_in_state = 10", "max_turns_in_state = 3");
    let engine = Orchestrator::new(Arc::new(FlowHandle::new(
        FlowGraph::from_toml(&tight).unwrap(),
    )));
    let mut conversation = conversation_in(&engine, "greeting");

    let intents = ["unclear", "greeting"].repeat(6);
    let outcomes = run(&engine, &mut conversation, &intents);

    for early in &outcomes[..3] {
        assert_eq!(early.decision.next_state, "greeting");
    }
    assert_eq!(outcomes[3].decision.action, "offer_skip");
    let offer = &outcomes[4].decision;
    assert_eq!(offer.action, "skip_question");
    assert_eq!(offer.next_state, "closing");
    assert_eq!(conversation.current_state, "closing");
}

#[test]
fn stall_ceiling_forces_the_state_change() {
    let engine = orchestrator();
    let mut conversation = conversation_in(&engine, "greeting");
    // The alternative was already offered and the conversation stayed put.
    conversation.counters.same_state_streak = 12;
    conversation.raise_guard_tier("stall", GuardTier::OfferAlternative);

    let outcome = engine.process_turn(&mut conversation, TurnInput::new("unclear"));

    let decision = &outcome.decision;
    assert_eq!(decision.action, "close_conversation");
    assert!(decision.has_reason("stall_forced_exit"));
    assert!(!decision.transitions_suppressed);
    assert_eq!(decision.next_state, "closing");
    assert_ne!(conversation.current_state, "greeting");
    assert_eq!(conversation.guard_tier("stall"), GuardTier::ForcedExit);
}
