//! Built-in knowledge sources.
//!
//! Each source is a unit struct: everything it knows comes from the flow
//! captured in the snapshot, so a reloaded flow takes effect on the next
//! turn without rebuilding the registry.

mod data_collector;
mod fallback;
mod question_responder;
mod rejection;
mod state_rules;

pub use data_collector::DataCollector;
pub use fallback::Fallback;
pub use question_responder::QuestionResponder;
pub use rejection::RejectionHandler;
pub use state_rules::StateRules;
