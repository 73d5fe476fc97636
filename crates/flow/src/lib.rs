//! Parley flows — declarative conversation graphs.
//!
//! A flow file describes the states a conversation moves through, the rules
//! that pick actions in each state, the intent categories and named
//! conditions those rules use, and the settings of the built-in sources and
//! guards. Loading validates the whole file up front: the engine never sees
//! a dangling reference.
//!
//! # Example Flow
//!
//! ```toml
//! initial_state = "greeting"
//! intents = ["greeting", "agreement", "info_provided", "price_question", "unclear"]
//! actions = ["continue", "escalate_to_human", "greet", "ask_for_info", "answer_price"]
//!
//! [fields.company_size]
//! kind = "int"
//!
//! [categories]
//! questions = ["price_question"]
//!
//! [conditions]
//! big_company = "data.company_size >= 50"
//!
//! [states.greeting]
//! goal = "Open the conversation"
//! default_action = "greet"
//! [states.greeting.transitions]
//! agreement = "collect_info"
//!
//! [states.collect_info]
//! goal = "Learn about the customer"
//! required_data = ["company_size"]
//! [states.collect_info.rules]
//! info_provided = [{ when = "big_company", then = "greet" }, { then = "ask_for_info" }]
//!
//! [sources.questions]
//! category = "questions"
//! answers = { price_question = "answer_price" }
//! ```

pub mod condition;
mod error;
mod graph;
pub mod model;
mod settings;

pub use condition::{Condition, EvalContext, parse_condition};
pub use error::{ConfigViolation, ConfigurationError};
pub use graph::{
    Clause, DATA_COMPLETE_TRIGGER, FlowGraph, NamedCondition, Outcome, STALLED_TRIGGER, Selected,
    StateDef, TurnFacts,
};
pub use model::{FieldDecl, FieldKind, FlowConfig, MergePolicy};
pub use settings::{
    EngineSettings, GuardSettings, LoopSettings, ObjectionSettings, QuestionSettings,
    RejectionSettings, SourceSettings, StallSettings,
};
