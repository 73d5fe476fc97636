//! Flow file data model — the raw TOML shape, before validation.
//!
//! Everything here is plain strings. [`FlowGraph::build`](crate::FlowGraph::build)
//! turns a [`FlowConfig`] into typed, cross-checked ids.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A complete flow file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// State every new (or reset) conversation starts in.
    pub initial_state: String,

    /// The closed intent vocabulary.
    #[serde(default)]
    pub intents: Vec<String>,

    /// The closed action vocabulary.
    #[serde(default)]
    pub actions: Vec<String>,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Declared data fields, keyed by field name.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDecl>,

    /// Intent categories. Members are intent ids or `@other` category refs.
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,

    /// Named conditions, written in the condition DSL.
    #[serde(default)]
    pub conditions: BTreeMap<String, String>,

    pub states: BTreeMap<String, StateConfig>,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub guards: GuardsConfig,
}

impl FlowConfig {
    /// Parse the raw TOML without validating references.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

/// `[engine]`: engine-wide fallbacks and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Action used when nothing (not even the fallback source) proposes one.
    #[serde(default = "default_default_action")]
    pub default_action: String,

    /// Action used when resolution fails outright.
    #[serde(default = "default_escalation_action")]
    pub escalation_action: String,

    /// Intent substituted for labels outside the vocabulary.
    #[serde(default = "default_unknown_intent")]
    pub unknown_intent: String,

    /// Turns kept in the rolling history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Category counted by the consecutive-unclear counter.
    #[serde(default)]
    pub unclear_category: Option<String>,
}

fn default_default_action() -> String {
    "continue".into()
}
fn default_escalation_action() -> String {
    "escalate_to_human".into()
}
fn default_unknown_intent() -> String {
    "unclear".into()
}
fn default_history_limit() -> usize {
    parley_core::state::DEFAULT_HISTORY_LIMIT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_action: default_default_action(),
            escalation_action: default_escalation_action(),
            unknown_intent: default_unknown_intent(),
            history_limit: default_history_limit(),
            unclear_category: None,
        }
    }
}

/// The value kind a declared field accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    #[default]
    Text,
    List,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Text => "text",
            FieldKind::List => "list",
        };
        f.write_str(s)
    }
}

/// How a new value for a field combines with the collected one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Last write wins.
    #[default]
    Replace,
    /// Values pile up in a list.
    Accumulate,
}

/// `[fields.<name>]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldDecl {
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub merge: MergePolicy,
    #[serde(default)]
    pub description: String,
}

/// `[states.<id>]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub required_data: Vec<String>,
    #[serde(default)]
    pub optional_data: Vec<String>,
    /// Keyed by intent id, or by the reserved triggers `data_complete` and
    /// `stalled`.
    #[serde(default)]
    pub transitions: BTreeMap<String, OutcomeSpec>,
    /// Keyed by intent id.
    #[serde(default)]
    pub rules: BTreeMap<String, OutcomeSpec>,
    #[serde(default)]
    pub default_action: Option<String>,
    #[serde(default)]
    pub terminal: bool,
}

/// A rule or transition target: either a plain id or an ordered chain of
/// conditional clauses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutcomeSpec {
    Direct(String),
    Chain(Vec<ChainClause>),
}

/// One clause of a conditional chain. A clause without `when` always
/// matches and must come last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainClause {
    #[serde(default)]
    pub when: Option<String>,
    pub then: String,
}

// ── Sources ──────────────────────────────────────────────────────────

/// `[sources.*]`: a built-in source is active when its section is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub questions: Option<QuestionSourceConfig>,
    #[serde(default)]
    pub rejection: Option<RejectionSourceConfig>,
}

/// `[sources.questions]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Category whose intents count as questions.
    pub category: String,
    /// Question intent → answering action.
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    /// Used for question intents with no entry in `answers`.
    #[serde(default)]
    pub default_answer: Option<String>,
}

/// `[sources.rejection]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub category: String,
    #[serde(default = "default_soft_close")]
    pub action: String,
}

fn default_true() -> bool {
    true
}
fn default_soft_close() -> String {
    "soft_close".into()
}

// ── Guards ───────────────────────────────────────────────────────────

/// `[guards.*]`: a guard is active when its section is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardsConfig {
    #[serde(default)]
    pub stall: Option<StallGuardConfig>,
    #[serde(default, rename = "loop")]
    pub conversation_loop: Option<LoopGuardConfig>,
    #[serde(default)]
    pub objection: Option<ObjectionGuardConfig>,
}

/// `[guards.stall]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StallGuardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_turns_in_state")]
    pub max_turns_in_state: u32,
    pub offer_skip_action: String,
    pub skip_action: String,
    pub exit_action: String,
    /// Where to go when offering the alternative or forcing the exit, for
    /// states without a `stalled` transition. Required unless every
    /// non-terminal state has one.
    #[serde(default)]
    pub skip_state: Option<String>,
}

fn default_max_turns_in_state() -> u32 {
    10
}

/// `[guards.loop]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopGuardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_repeats")]
    pub max_repeats: u32,
    #[serde(default = "default_window")]
    pub window: usize,
    /// Intents in this category mean the conversation is still progressing.
    #[serde(default)]
    pub informative_category: Option<String>,
    pub nudge_action: String,
    pub rephrase_action: String,
    pub exit_action: String,
}

fn default_max_repeats() -> u32 {
    4
}
fn default_window() -> usize {
    10
}

/// `[guards.objection]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectionGuardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub category: String,
    #[serde(default = "default_max_consecutive")]
    pub max_consecutive: u32,
    #[serde(default = "default_max_total")]
    pub max_total: u32,
    #[serde(default = "default_soft_close")]
    pub action: String,
}

fn default_max_consecutive() -> u32 {
    3
}
fn default_max_total() -> u32 {
    6
}
