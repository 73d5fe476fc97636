//! Flow loading errors.

use std::fmt;

/// Why a flow file could not be turned into a [`FlowGraph`](crate::FlowGraph).
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("failed to read flow file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse flow file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("flow configuration has {} violation(s): {}", .0.len(), render(.0))]
    Invalid(Vec<ConfigViolation>),
}

impl ConfigurationError {
    /// The individual violations, empty for read and parse failures.
    pub fn violations(&self) -> &[ConfigViolation] {
        match self {
            ConfigurationError::Invalid(v) => v,
            _ => &[],
        }
    }
}

fn render(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One problem found while validating a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigViolation {
    /// A transition (or guard skip target) names a state that does not exist.
    DanglingTransition {
        state: String,
        intent: String,
        target: String,
    },
    UnknownInitialState {
        state: String,
    },
    UnknownCategory {
        context: String,
        name: String,
    },
    CategoryCycle {
        name: String,
    },
    UnknownCondition {
        context: String,
        name: String,
    },
    MalformedCondition {
        name: String,
        detail: String,
    },
    MalformedChain {
        context: String,
        detail: String,
    },
    UnknownAction {
        context: String,
        action: String,
    },
    UnknownIntent {
        context: String,
        intent: String,
    },
    UnknownField {
        context: String,
        field: String,
    },
    DuplicateId {
        kind: &'static str,
        id: String,
    },
    InvalidSetting {
        setting: String,
        reason: String,
    },
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigViolation::DanglingTransition {
                state,
                intent,
                target,
            } => write!(
                f,
                "state '{state}' transition on '{intent}' points to unknown state '{target}'"
            ),
            ConfigViolation::UnknownInitialState { state } => {
                write!(f, "initial_state '{state}' is not a declared state")
            }
            ConfigViolation::UnknownCategory { context, name } => {
                write!(f, "{context} references unknown category '@{name}'")
            }
            ConfigViolation::CategoryCycle { name } => {
                write!(f, "category '@{name}' includes itself")
            }
            ConfigViolation::UnknownCondition { context, name } => {
                write!(f, "{context} references unknown condition '{name}'")
            }
            ConfigViolation::MalformedCondition { name, detail } => {
                write!(f, "condition '{name}' does not parse: {detail}")
            }
            ConfigViolation::MalformedChain { context, detail } => {
                write!(f, "{context}: {detail}")
            }
            ConfigViolation::UnknownAction { context, action } => {
                write!(f, "{context} uses undeclared action '{action}'")
            }
            ConfigViolation::UnknownIntent { context, intent } => {
                write!(f, "{context} uses undeclared intent '{intent}'")
            }
            ConfigViolation::UnknownField { context, field } => {
                write!(f, "{context} uses undeclared field '{field}'")
            }
            ConfigViolation::DuplicateId { kind, id } => {
                write!(f, "{kind} '{id}' is declared more than once")
            }
            ConfigViolation::InvalidSetting { setting, reason } => {
                write!(f, "{setting}: {reason}")
            }
        }
    }
}
