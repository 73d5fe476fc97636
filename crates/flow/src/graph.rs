//! The validated flow graph.
//!
//! [`FlowGraph::build`] checks a whole [`FlowConfig`] at once and reports
//! every problem it finds. A graph that exists is internally consistent:
//! every transition target is a state, every action and intent is declared,
//! every category is expanded, and every named condition is parsed.

use crate::condition::{Condition, EvalContext, parse_condition};
use crate::error::{ConfigViolation, ConfigurationError};
use crate::model::{FieldDecl, FlowConfig, OutcomeSpec};
use crate::settings::{
    EngineSettings, GuardSettings, LoopSettings, ObjectionSettings, QuestionSettings,
    RejectionSettings, SourceSettings, StallSettings,
};
use parley_core::ids::{ActionId, IntentId, StateId};
use parley_core::value::DataMap;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Transition key fired by the data collector once required data is in.
pub const DATA_COMPLETE_TRIGGER: &str = "data_complete";
/// Transition key used by the stall guard when offering a way out.
pub const STALLED_TRIGGER: &str = "stalled";

const BUILTIN_ALWAYS: &str = "always";
const BUILTIN_DATA_COMPLETE: &str = "data_complete";

/// A rule or transition outcome with ids resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Direct(T),
    Chain(Vec<Clause<T>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause<T> {
    /// Named condition; `None` always matches.
    pub when: Option<String>,
    pub then: T,
}

/// The outcome picked for a turn, and the condition that picked it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selected<'g, T> {
    pub target: &'g T,
    pub condition: Option<&'g str>,
}

/// A single validated state.
#[derive(Debug, Clone)]
pub struct StateDef {
    pub id: StateId,
    pub goal: String,
    pub required_data: Vec<String>,
    pub optional_data: Vec<String>,
    /// Keyed by intent or a reserved trigger.
    pub transitions: BTreeMap<String, Outcome<StateId>>,
    /// Keyed by intent.
    pub rules: BTreeMap<String, Outcome<ActionId>>,
    pub default_action: Option<ActionId>,
    pub terminal: bool,
}

/// A named condition after parsing.
#[derive(Debug, Clone)]
pub enum NamedCondition {
    Always,
    /// Every required field of the state is present.
    DataComplete,
    Expr(Condition),
}

/// The facts a condition is checked against.
pub struct TurnFacts<'a> {
    pub data: &'a DataMap,
    pub intent: &'a IntentId,
    pub state: &'a StateId,
    pub turn: u32,
}

/// An immutable, validated conversation flow.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    initial_state: StateId,
    states: BTreeMap<StateId, StateDef>,
    intents: BTreeSet<IntentId>,
    actions: BTreeSet<ActionId>,
    fields: BTreeMap<String, FieldDecl>,
    categories: BTreeMap<String, BTreeSet<IntentId>>,
    conditions: BTreeMap<String, NamedCondition>,
    engine: EngineSettings,
    sources: SourceSettings,
    guards: GuardSettings,
}

impl FlowGraph {
    /// Parse and validate a flow from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigurationError> {
        Self::from_toml_named(toml_str, "<inline>")
    }

    /// Read, parse, and validate a flow file.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigurationError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_toml_named(&content, &path.display().to_string())
    }

    fn from_toml_named(toml_str: &str, name: &str) -> Result<Self, ConfigurationError> {
        let config = FlowConfig::from_toml(toml_str).map_err(|e| ConfigurationError::Parse {
            path: name.to_string(),
            reason: e.to_string(),
        })?;
        Self::build(config)
    }

    /// Validate a parsed flow. Fails with every violation found.
    pub fn build(config: FlowConfig) -> Result<Self, ConfigurationError> {
        let mut v = Validator::new(&config);
        let categories = v.expand_categories();
        let conditions = v.compile_conditions(&categories);
        let engine = v.engine_settings(&categories);

        if !config.states.contains_key(&config.initial_state) {
            v.violate(ConfigViolation::UnknownInitialState {
                state: config.initial_state.clone(),
            });
        }

        let states = config
            .states
            .iter()
            .map(|(id, raw)| {
                let def = v.state_def(id, raw, &conditions);
                (StateId::from(id.as_str()), def)
            })
            .collect();

        let sources = v.source_settings(&categories);
        let guards = v.guard_settings(&categories, engine.history_limit);

        if !v.violations.is_empty() {
            return Err(ConfigurationError::Invalid(v.violations));
        }

        let graph = Self {
            initial_state: StateId::from(config.initial_state.as_str()),
            states,
            intents: v.intents,
            actions: v.actions,
            fields: config.fields,
            categories,
            conditions,
            engine,
            sources,
            guards,
        };
        debug!(
            states = graph.states.len(),
            intents = graph.intents.len(),
            actions = graph.actions.len(),
            "Flow graph validated"
        );
        Ok(graph)
    }

    // ── Lookups ──────────────────────────────────────────────────

    pub fn initial_state(&self) -> &StateId {
        &self.initial_state
    }

    pub fn state(&self, id: &StateId) -> Option<&StateDef> {
        self.states.get(id)
    }

    pub fn has_state(&self, id: &StateId) -> bool {
        self.states.contains_key(id)
    }

    pub fn states(&self) -> impl Iterator<Item = &StateDef> {
        self.states.values()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn is_intent(&self, intent: &str) -> bool {
        self.intents.contains(intent)
    }

    pub fn intents(&self) -> impl Iterator<Item = &IntentId> {
        self.intents.iter()
    }

    pub fn is_action(&self, action: &str) -> bool {
        self.actions.contains(action)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionId> {
        self.actions.iter()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.get(name)
    }

    pub fn category(&self, name: &str) -> Option<&BTreeSet<IntentId>> {
        self.categories.get(name)
    }

    /// `false` for unknown categories.
    pub fn in_category(&self, name: &str, intent: &IntentId) -> bool {
        self.categories
            .get(name)
            .is_some_and(|members| members.contains(intent))
    }

    pub fn engine(&self) -> &EngineSettings {
        &self.engine
    }

    pub fn sources(&self) -> &SourceSettings {
        &self.sources
    }

    pub fn guards(&self) -> &GuardSettings {
        &self.guards
    }

    /// Required fields of `state` not present (or blank) in `data`.
    pub fn missing_required(&self, state: &StateId, data: &DataMap) -> Vec<String> {
        self.state(state)
            .map(|def| {
                def.required_data
                    .iter()
                    .filter(|f| data.get(f.as_str()).is_none_or(|v| v.is_blank()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Evaluation ───────────────────────────────────────────────

    /// Check a named condition. Unknown names are `false`.
    pub fn condition_holds(&self, name: &str, facts: &TurnFacts<'_>) -> bool {
        match self.conditions.get(name) {
            Some(NamedCondition::Always) => true,
            Some(NamedCondition::DataComplete) => {
                self.missing_required(facts.state, facts.data).is_empty()
            }
            Some(NamedCondition::Expr(cond)) => cond.evaluate(&EvalContext {
                data: facts.data,
                intent: facts.intent,
                state: facts.state,
                turn: facts.turn,
                categories: &self.categories,
            }),
            None => false,
        }
    }

    /// Pick the outcome for this turn: the direct target, or the first chain
    /// clause whose condition holds.
    pub fn select<'g, T>(
        &'g self,
        outcome: &'g Outcome<T>,
        facts: &TurnFacts<'_>,
    ) -> Option<Selected<'g, T>> {
        match outcome {
            Outcome::Direct(target) => Some(Selected {
                target,
                condition: None,
            }),
            Outcome::Chain(clauses) => clauses.iter().find_map(|clause| match &clause.when {
                None => Some(Selected {
                    target: &clause.then,
                    condition: None,
                }),
                Some(name) if self.condition_holds(name, facts) => Some(Selected {
                    target: &clause.then,
                    condition: Some(name.as_str()),
                }),
                Some(_) => None,
            }),
        }
    }
}

// ─── Validation ──────────────────────────────────────────────────────

struct Validator<'c> {
    config: &'c FlowConfig,
    intents: BTreeSet<IntentId>,
    actions: BTreeSet<ActionId>,
    violations: Vec<ConfigViolation>,
}

impl<'c> Validator<'c> {
    fn new(config: &'c FlowConfig) -> Self {
        let mut violations = Vec::new();
        let intents = collect_vocabulary(&config.intents, "intent", &mut violations);
        let actions = collect_vocabulary(&config.actions, "action", &mut violations);
        Self {
            config,
            intents,
            actions,
            violations,
        }
    }

    fn violate(&mut self, violation: ConfigViolation) {
        self.violations.push(violation);
    }

    fn action(&mut self, context: impl FnOnce() -> String, raw: &str) -> ActionId {
        if !self.actions.contains(raw) {
            self.violate(ConfigViolation::UnknownAction {
                context: context(),
                action: raw.to_string(),
            });
        }
        ActionId::from(raw)
    }

    fn intent(&mut self, context: impl FnOnce() -> String, raw: &str) -> IntentId {
        if !self.intents.contains(raw) {
            self.violate(ConfigViolation::UnknownIntent {
                context: context(),
                intent: raw.to_string(),
            });
        }
        IntentId::from(raw)
    }

    fn field(&mut self, context: impl FnOnce() -> String, raw: &str) {
        if !self.config.fields.contains_key(raw) {
            self.violate(ConfigViolation::UnknownField {
                context: context(),
                field: raw.to_string(),
            });
        }
    }

    fn category(
        &mut self,
        categories: &BTreeMap<String, BTreeSet<IntentId>>,
        context: impl FnOnce() -> String,
        name: &str,
    ) -> String {
        if !categories.contains_key(name) {
            self.violate(ConfigViolation::UnknownCategory {
                context: context(),
                name: name.to_string(),
            });
        }
        name.to_string()
    }

    fn state_ref(&mut self, state: &str, trigger: &str, target: &str) -> StateId {
        if !self.config.states.contains_key(target) {
            self.violate(ConfigViolation::DanglingTransition {
                state: state.to_string(),
                intent: trigger.to_string(),
                target: target.to_string(),
            });
        }
        StateId::from(target)
    }

    // ── Categories ───────────────────────────────────────────────

    fn expand_categories(&mut self) -> BTreeMap<String, BTreeSet<IntentId>> {
        let mut expanded = BTreeMap::new();
        let mut cyclic = BTreeSet::new();
        let config = self.config;
        for name in config.categories.keys() {
            let mut visiting = Vec::new();
            let members = self.expand_category(name, &mut visiting, &mut cyclic);
            expanded.insert(name.clone(), members);
        }
        for name in cyclic {
            self.violate(ConfigViolation::CategoryCycle { name });
        }
        expanded
    }

    fn expand_category(
        &mut self,
        name: &str,
        visiting: &mut Vec<String>,
        cyclic: &mut BTreeSet<String>,
    ) -> BTreeSet<IntentId> {
        if visiting.iter().any(|v| v == name) {
            cyclic.insert(name.to_string());
            return BTreeSet::new();
        }
        let config = self.config;
        let Some(members) = config.categories.get(name) else {
            return BTreeSet::new();
        };
        visiting.push(name.to_string());
        let mut out = BTreeSet::new();
        for member in members {
            if let Some(inner) = member.strip_prefix('@') {
                if config.categories.contains_key(inner) {
                    out.extend(self.expand_category(inner, visiting, cyclic));
                } else if visiting.len() == 1 {
                    // Reported once, from the outermost expansion.
                    self.violate(ConfigViolation::UnknownCategory {
                        context: format!("category '@{name}'"),
                        name: inner.to_string(),
                    });
                }
            } else if self.intents.contains(member.as_str()) {
                out.insert(IntentId::from(member.as_str()));
            } else if visiting.len() == 1 {
                self.violate(ConfigViolation::UnknownIntent {
                    context: format!("category '@{name}'"),
                    intent: member.clone(),
                });
            }
        }
        visiting.pop();
        out
    }

    // ── Conditions ───────────────────────────────────────────────

    fn compile_conditions(
        &mut self,
        categories: &BTreeMap<String, BTreeSet<IntentId>>,
    ) -> BTreeMap<String, NamedCondition> {
        let mut compiled = BTreeMap::new();
        compiled.insert(BUILTIN_ALWAYS.to_string(), NamedCondition::Always);
        compiled.insert(
            BUILTIN_DATA_COMPLETE.to_string(),
            NamedCondition::DataComplete,
        );

        let config = self.config;
        for (name, expr) in &config.conditions {
            if name == BUILTIN_ALWAYS || name == BUILTIN_DATA_COMPLETE {
                self.violate(ConfigViolation::DuplicateId {
                    kind: "condition",
                    id: name.clone(),
                });
                continue;
            }
            match parse_condition(expr) {
                Ok(cond) => {
                    let refs = cond.references();
                    for field in &refs.fields {
                        self.field(|| format!("condition '{name}'"), field);
                    }
                    for category in &refs.categories {
                        self.category(categories, || format!("condition '{name}'"), category);
                    }
                    compiled.insert(name.clone(), NamedCondition::Expr(cond));
                }
                Err(detail) => self.violate(ConfigViolation::MalformedCondition {
                    name: name.clone(),
                    detail,
                }),
            }
        }
        compiled
    }

    // ── Engine ───────────────────────────────────────────────────

    fn engine_settings(
        &mut self,
        categories: &BTreeMap<String, BTreeSet<IntentId>>,
    ) -> EngineSettings {
        let config = self.config;
        let raw = &config.engine;
        let default_action = self.action(|| "engine.default_action".into(), &raw.default_action);
        let escalation_action =
            self.action(|| "engine.escalation_action".into(), &raw.escalation_action);
        let unknown_intent = self.intent(|| "engine.unknown_intent".into(), &raw.unknown_intent);
        if raw.history_limit == 0 {
            self.violate(ConfigViolation::InvalidSetting {
                setting: "engine.history_limit".into(),
                reason: "must be at least 1".into(),
            });
        }
        let unclear_category = raw
            .unclear_category
            .as_deref()
            .map(|c| self.category(categories, || "engine.unclear_category".into(), c));
        EngineSettings {
            default_action,
            escalation_action,
            unknown_intent,
            history_limit: raw.history_limit,
            unclear_category,
        }
    }

    // ── States ───────────────────────────────────────────────────

    fn state_def(
        &mut self,
        id: &str,
        raw: &crate::model::StateConfig,
        conditions: &BTreeMap<String, NamedCondition>,
    ) -> StateDef {
        for field in raw.required_data.iter().chain(&raw.optional_data) {
            self.field(|| format!("state '{id}'"), field);
        }
        let default_action = raw
            .default_action
            .as_deref()
            .map(|a| self.action(|| format!("state '{id}' default_action"), a));

        let mut transitions = BTreeMap::new();
        for (trigger, spec) in &raw.transitions {
            if trigger != DATA_COMPLETE_TRIGGER && trigger != STALLED_TRIGGER {
                self.intent(|| format!("state '{id}' transitions"), trigger);
            }
            let context = format!("state '{id}' transition on '{trigger}'");
            let outcome = self.outcome(spec, &context, conditions, |v, target| {
                v.state_ref(id, trigger, target)
            });
            transitions.insert(trigger.clone(), outcome);
        }

        let mut rules = BTreeMap::new();
        for (intent, spec) in &raw.rules {
            self.intent(|| format!("state '{id}' rules"), intent);
            let context = format!("state '{id}' rule on '{intent}'");
            let outcome = self.outcome(spec, &context, conditions, |v, action| {
                v.action(|| format!("state '{id}' rule on '{intent}'"), action)
            });
            rules.insert(intent.clone(), outcome);
        }

        StateDef {
            id: StateId::from(id),
            goal: raw.goal.clone(),
            required_data: raw.required_data.clone(),
            optional_data: raw.optional_data.clone(),
            transitions,
            rules,
            default_action,
            terminal: raw.terminal,
        }
    }

    fn outcome<T>(
        &mut self,
        spec: &OutcomeSpec,
        context: &str,
        conditions: &BTreeMap<String, NamedCondition>,
        mut resolve: impl FnMut(&mut Self, &str) -> T,
    ) -> Outcome<T> {
        match spec {
            OutcomeSpec::Direct(target) => Outcome::Direct(resolve(self, target)),
            OutcomeSpec::Chain(clauses) => {
                if clauses.is_empty() {
                    self.violate(ConfigViolation::MalformedChain {
                        context: context.to_string(),
                        detail: "chain has no clauses".into(),
                    });
                }
                let last = clauses.len().saturating_sub(1);
                let mut out = Vec::with_capacity(clauses.len());
                for (i, clause) in clauses.iter().enumerate() {
                    match &clause.when {
                        Some(name) if !conditions.contains_key(name) => {
                            self.violate(ConfigViolation::UnknownCondition {
                                context: context.to_string(),
                                name: name.clone(),
                            });
                        }
                        None if i != last => {
                            self.violate(ConfigViolation::MalformedChain {
                                context: context.to_string(),
                                detail: format!(
                                    "unconditional clause {} must be the last clause",
                                    i + 1
                                ),
                            });
                        }
                        _ => {}
                    }
                    out.push(Clause {
                        when: clause.when.clone(),
                        then: resolve(self, &clause.then),
                    });
                }
                Outcome::Chain(out)
            }
        }
    }

    // ── Sources and guards ───────────────────────────────────────

    fn source_settings(
        &mut self,
        categories: &BTreeMap<String, BTreeSet<IntentId>>,
    ) -> SourceSettings {
        let config = self.config;
        let sources = &config.sources;
        let questions = sources.questions.as_ref().map(|raw| {
            let category =
                self.category(categories, || "sources.questions.category".into(), &raw.category);
            let answers = raw
                .answers
                .iter()
                .map(|(intent, action)| {
                    let ctx = || format!("sources.questions.answers.{intent}");
                    (self.intent(ctx, intent), self.action(ctx, action))
                })
                .collect();
            let default_answer = raw
                .default_answer
                .as_deref()
                .map(|a| self.action(|| "sources.questions.default_answer".into(), a));
            QuestionSettings {
                enabled: raw.enabled,
                category,
                answers,
                default_answer,
            }
        });
        let rejection = sources.rejection.as_ref().map(|raw| RejectionSettings {
            enabled: raw.enabled,
            category: self.category(categories, || "sources.rejection.category".into(), &raw.category),
            action: self.action(|| "sources.rejection.action".into(), &raw.action),
        });
        SourceSettings {
            questions,
            rejection,
        }
    }

    fn guard_settings(
        &mut self,
        categories: &BTreeMap<String, BTreeSet<IntentId>>,
        history_limit: usize,
    ) -> GuardSettings {
        let config = self.config;
        let guards = &config.guards;

        if let Some(raw) = guards.stall.as_ref().filter(|s| s.enabled && s.skip_state.is_none()) {
            // The forced exit needs somewhere to go from every state it can fire in.
            let stuck = config
                .states
                .iter()
                .find(|(_, s)| !s.terminal && !s.transitions.contains_key(STALLED_TRIGGER));
            if let Some((state, _)) = stuck {
                self.violate(ConfigViolation::InvalidSetting {
                    setting: "guards.stall.skip_state".into(),
                    reason: format!(
                        "required because state '{state}' has no '{STALLED_TRIGGER}' transition \
                         (max_turns_in_state = {})",
                        raw.max_turns_in_state
                    ),
                });
            }
        }

        let stall = guards.stall.as_ref().map(|raw| StallSettings {
            enabled: raw.enabled,
            max_turns_in_state: raw.max_turns_in_state,
            offer_skip_action: self.action(
                || "guards.stall.offer_skip_action".into(),
                &raw.offer_skip_action,
            ),
            skip_action: self.action(|| "guards.stall.skip_action".into(), &raw.skip_action),
            exit_action: self.action(|| "guards.stall.exit_action".into(), &raw.exit_action),
            skip_state: raw
                .skip_state
                .as_deref()
                .map(|s| self.state_ref("guards.stall", "skip_state", s)),
        });

        let conversation_loop = guards.conversation_loop.as_ref().map(|raw| {
            if raw.window == 0 {
                self.violate(ConfigViolation::InvalidSetting {
                    setting: "guards.loop.window".into(),
                    reason: "must be at least 1".into(),
                });
            } else if raw.window > history_limit {
                self.violate(ConfigViolation::InvalidSetting {
                    setting: "guards.loop.window".into(),
                    reason: format!(
                        "window {} exceeds engine.history_limit {history_limit}",
                        raw.window
                    ),
                });
            }
            LoopSettings {
                enabled: raw.enabled,
                max_repeats: raw.max_repeats,
                window: raw.window,
                informative_category: raw.informative_category.as_deref().map(|c| {
                    self.category(categories, || "guards.loop.informative_category".into(), c)
                }),
                nudge_action: self.action(|| "guards.loop.nudge_action".into(), &raw.nudge_action),
                rephrase_action: self.action(
                    || "guards.loop.rephrase_action".into(),
                    &raw.rephrase_action,
                ),
                exit_action: self.action(|| "guards.loop.exit_action".into(), &raw.exit_action),
            }
        });

        let objection = guards.objection.as_ref().map(|raw| ObjectionSettings {
            enabled: raw.enabled,
            category: self.category(categories, || "guards.objection.category".into(), &raw.category),
            max_consecutive: raw.max_consecutive,
            max_total: raw.max_total,
            action: self.action(|| "guards.objection.action".into(), &raw.action),
        });

        GuardSettings {
            stall,
            conversation_loop,
            objection,
        }
    }
}

fn collect_vocabulary<T>(
    raw: &[String],
    kind: &'static str,
    violations: &mut Vec<ConfigViolation>,
) -> BTreeSet<T>
where
    T: for<'a> From<&'a str> + Ord,
{
    let mut out = BTreeSet::new();
    for id in raw {
        if !out.insert(T::from(id.as_str())) {
            violations.push(ConfigViolation::DuplicateId {
                kind,
                id: id.clone(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::value::FieldValue;

    const FLOW: &str = r#"
initial_state = "greeting"
intents = ["greeting", "agreement", "info_provided", "price_question", "faq_question", "rejection", "unclear"]
actions = ["continue", "escalate_to_human", "greet", "ask_for_info", "present", "answer_price", "answer_faq", "soft_close"]

[fields.company_size]
kind = "int"

[fields.industry]
kind = "text"

[categories]
questions = ["price_question", "faq_question"]
informative = ["info_provided", "@questions"]
rejection_intents = ["rejection"]

[conditions]
big_company = "data.company_size >= 50"

[states.greeting]
goal = "Say hello"
default_action = "greet"
[states.greeting.transitions]
agreement = "collect_info"

[states.collect_info]
goal = "Learn about the customer"
required_data = ["company_size"]
optional_data = ["industry"]
[states.collect_info.transitions]
data_complete = "presentation"
info_provided = [
  { when = "big_company", then = "presentation" },
  { then = "collect_info" },
]
[states.collect_info.rules]
info_provided = "ask_for_info"

[states.presentation]
goal = "Present the product"
terminal = true
[states.presentation.rules]
agreement = "present"

[sources.questions]
category = "questions"
default_answer = "answer_faq"
answers = { price_question = "answer_price" }

[sources.rejection]
category = "rejection_intents"
"#;

    fn flow() -> String {
        FLOW.to_string()
    }

    fn facts<'a>(data: &'a DataMap, intent: &'a IntentId, state: &'a StateId) -> TurnFacts<'a> {
        TurnFacts {
            data,
            intent,
            state,
            turn: 1,
        }
    }

    #[test]
    fn valid_flow_builds() {
        let graph = FlowGraph::from_toml(&flow()).unwrap();
        assert_eq!(graph.initial_state(), "greeting");
        assert_eq!(graph.state_count(), 3);
        assert!(graph.is_action("soft_close"));
        assert!(graph.is_intent("unclear"));
        assert!(graph.state(&"presentation".into()).unwrap().terminal);
    }

    #[test]
    fn nested_categories_expand() {
        let graph = FlowGraph::from_toml(&flow()).unwrap();
        let informative = graph.category("informative").unwrap();
        assert!(informative.contains("info_provided"));
        assert!(informative.contains("price_question"));
        assert!(informative.contains("faq_question"));
        assert!(graph.in_category("questions", &"price_question".into()));
        assert!(!graph.in_category("nope", &"price_question".into()));
    }

    #[test]
    fn chain_picks_first_matching_clause() {
        let graph = FlowGraph::from_toml(&flow()).unwrap();
        let state: StateId = "collect_info".into();
        let intent: IntentId = "info_provided".into();
        let outcome = &graph.state(&state).unwrap().transitions["info_provided"];

        let mut data = DataMap::new();
        data.insert("company_size".into(), FieldValue::Int(120));
        let picked = graph.select(outcome, &facts(&data, &intent, &state)).unwrap();
        assert_eq!(picked.target, "presentation");
        assert_eq!(picked.condition, Some("big_company"));

        data.insert("company_size".into(), FieldValue::Int(5));
        let picked = graph.select(outcome, &facts(&data, &intent, &state)).unwrap();
        assert_eq!(picked.target, "collect_info");
        assert_eq!(picked.condition, None);
    }

    #[test]
    fn data_complete_builtin_uses_required_fields() {
        let graph = FlowGraph::from_toml(&flow()).unwrap();
        let state: StateId = "collect_info".into();
        let intent: IntentId = "info_provided".into();
        let mut data = DataMap::new();
        assert!(!graph.condition_holds("data_complete", &facts(&data, &intent, &state)));
        assert_eq!(graph.missing_required(&state, &data), vec!["company_size"]);
        data.insert("company_size".into(), FieldValue::Int(3));
        assert!(graph.condition_holds("data_complete", &facts(&data, &intent, &state)));
        assert!(graph.condition_holds("always", &facts(&data, &intent, &state)));
    }

    #[test]
    fn question_answers_fall_back_to_default() {
        let graph = FlowGraph::from_toml(&flow()).unwrap();
        let questions = graph.sources().questions.as_ref().unwrap();
        assert_eq!(
            questions.answer_for(&"price_question".into()).unwrap(),
            "answer_price"
        );
        assert_eq!(
            questions.answer_for(&"faq_question".into()).unwrap(),
            "answer_faq"
        );
        assert_eq!(graph.sources().rejection.as_ref().unwrap().action, "soft_close");
    }

    #[test]
    fn dangling_transition_is_rejected_with_state_and_target() {
        let bad = flow().replace(
            "agreement = \"collect_info\"",
            "agreement = \"collect_info\"\nprice_question = \"nonexistent_state\"",
        );
        let err = FlowGraph::from_toml(&bad).unwrap_err();
        assert!(err.violations().contains(&ConfigViolation::DanglingTransition {
            state: "greeting".into(),
            intent: "price_question".into(),
            target: "nonexistent_state".into(),
        }));
        let msg = err.to_string();
        assert!(msg.contains("greeting"));
        assert!(msg.contains("nonexistent_state"));
    }

    #[test]
    fn every_violation_is_reported() {
        let bad = flow()
            .replace("initial_state = \"greeting\"", "initial_state = \"start\"")
            .replace("default_action = \"greet\"", "default_action = \"wave\"")
            .replace("required_data = [\"company_size\"]", "required_data = [\"budget\"]");
        let err = FlowGraph::from_toml(&bad).unwrap_err();
        let v = err.violations();
        assert!(v.contains(&ConfigViolation::UnknownInitialState {
            state: "start".into()
        }));
        assert!(v.iter().any(|x| matches!(
            x,
            ConfigViolation::UnknownAction { action, .. } if action == "wave"
        )));
        assert!(v.iter().any(|x| matches!(
            x,
            ConfigViolation::UnknownField { field, .. } if field == "budget"
        )));
    }

    #[test]
    fn category_cycle_is_rejected() {
        let bad = flow().replace(
            "questions = [\"price_question\", \"faq_question\"]",
            "questions = [\"price_question\", \"@informative\"]",
        );
        let err = FlowGraph::from_toml(&bad).unwrap_err();
        assert!(err
            .violations()
            .iter()
            .any(|x| matches!(x, ConfigViolation::CategoryCycle { .. })));
    }

    #[test]
    fn unconditional_clause_must_be_last() {
        let bad = flow().replace(
            "  { when = \"big_company\", then = \"presentation\" },\n  { then = \"collect_info\" },",
            "  { then = \"collect_info\" },\n  { when = \"big_company\", then = \"presentation\" },",
        );
        let err = FlowGraph::from_toml(&bad).unwrap_err();
        assert!(err
            .violations()
            .iter()
            .any(|x| matches!(x, ConfigViolation::MalformedChain { .. })));
    }

    #[test]
    fn unknown_condition_and_malformed_condition() {
        let bad = flow()
            .replace("when = \"big_company\"", "when = \"huge_company\"")
            .replace(
                "big_company = \"data.company_size >= 50\"",
                "big_company = \"data.company_size >=\"",
            );
        let err = FlowGraph::from_toml(&bad).unwrap_err();
        let v = err.violations();
        assert!(v.iter().any(|x| matches!(
            x,
            ConfigViolation::UnknownCondition { name, .. } if name == "huge_company"
        )));
        assert!(v.iter().any(|x| matches!(
            x,
            ConfigViolation::MalformedCondition { name, .. } if name == "big_company"
        )));
    }

    #[test]
    fn duplicate_intent_is_rejected() {
        let bad = flow().replace(
            "intents = [\"greeting\",",
            "intents = [\"greeting\", \"greeting\",",
        );
        let err = FlowGraph::from_toml(&bad).unwrap_err();
        assert!(err.violations().contains(&ConfigViolation::DuplicateId {
            kind: "intent",
            id: "greeting".into(),
        }));
    }

    #[test]
    fn loop_window_must_fit_history() {
        let bad = format!(
            "{}\n[guards.loop]\nwindow = 50\nnudge_action = \"continue\"\nrephrase_action = \"continue\"\nexit_action = \"soft_close\"\n",
            flow()
        );
        let err = FlowGraph::from_toml(&bad).unwrap_err();
        assert!(err.violations().iter().any(|x| matches!(
            x,
            ConfigViolation::InvalidSetting { setting, .. } if setting == "guards.loop.window"
        )));
    }

    const STALL: &str = "\n[guards.stall]\nmax_turns_in_state = 4\noffer_skip_action = \"continue\"\nskip_action = \"continue\"\nexit_action = \"soft_close\"\n";

    #[test]
    fn stall_guard_needs_a_way_out_of_every_state() {
        // No state in this flow has a `stalled` transition.
        let bad = format!("{}{STALL}", flow());
        let err = FlowGraph::from_toml(&bad).unwrap_err();
        assert!(err.violations().iter().any(|x| matches!(
            x,
            ConfigViolation::InvalidSetting { setting, reason }
                if setting == "guards.stall.skip_state" && reason.contains("collect_info")
        )));

        let good = format!("{}{STALL}skip_state = \"presentation\"\n", flow());
        let graph = FlowGraph::from_toml(&good).unwrap();
        let stall = graph.guards().stall.as_ref().unwrap();
        assert_eq!(stall.skip_state.as_ref().unwrap(), "presentation");
    }

    #[test]
    fn disabled_stall_guard_needs_no_skip_state() {
        let off = format!("{}{STALL}", flow()).replace("max_turns_in_state = 4", "enabled = false");
        assert!(FlowGraph::from_toml(&off).is_ok());
    }

    #[test]
    fn parse_and_read_errors() {
        assert!(matches!(
            FlowGraph::from_toml("initial_state = "),
            Err(ConfigurationError::Parse { .. })
        ));
        assert!(matches!(
            FlowGraph::load(Path::new("/definitely/not/here.toml")),
            Err(ConfigurationError::Read { .. })
        ));
    }
}
