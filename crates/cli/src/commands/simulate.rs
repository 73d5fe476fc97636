//! `parley simulate` — run a scripted conversation through the engine.
//!
//! Script format:
//!
//! ```toml
//! conversation_id = "demo"   # optional
//!
//! [[turn]]
//! intent = "info_provided"
//! data = { company_size = 40 }
//! ```

use super::{CliResult, load_config, load_flow, open_store};
use parley_core::decision::TraceOutcome;
use parley_core::ids::IntentId;
use parley_core::state::ConversationState;
use parley_core::value::DataMap;
use parley_engine::{FlowHandle, Orchestrator, TurnInput, TurnOutcome};
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default, rename = "turn")]
    pub turns: Vec<ScriptTurn>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptTurn {
    pub intent: IntentId,
    #[serde(default)]
    pub data: DataMap,
}

impl Script {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read script {}: {e}", path.display()))?;
        Self::from_toml(&content)
            .map_err(|e| format!("Failed to parse script {}: {e}", path.display()).into())
    }
}

pub async fn run(script: PathBuf, flow: Option<PathBuf>, save: bool, trace: bool) -> CliResult {
    let config = load_config()?;
    let graph = load_flow(&config, flow.as_deref())?;
    let script = Script::load(&script)?;
    let engine = Orchestrator::new(Arc::new(FlowHandle::new(graph)));

    let store = save.then(|| open_store(&config));
    let mut state = match (&store, &script.conversation_id) {
        (Some(store), Some(id)) => match store.load(id).await? {
            Some(existing) => {
                println!("Resuming conversation {id} at turn {}", existing.turn);
                existing
            }
            None => engine.start_conversation_with_id(id),
        },
        (None, Some(id)) => engine.start_conversation_with_id(id),
        (_, None) => engine.start_conversation(),
    };

    println!(
        "Conversation {} ({} turns scripted)\n",
        state.conversation_id,
        script.turns.len()
    );
    for outcome in play(&engine, &mut state, &script.turns) {
        print!("{}", render(&outcome, trace));
    }

    if let Some(store) = store {
        store.save(&state).await?;
        println!("Saved conversation {} ({} store)", state.conversation_id, store.name());
    }
    Ok(())
}

/// Run every scripted turn against `state`.
pub fn play(
    engine: &Orchestrator,
    state: &mut ConversationState,
    turns: &[ScriptTurn],
) -> Vec<TurnOutcome> {
    turns
        .iter()
        .map(|turn| {
            let input = TurnInput::new(turn.intent.clone()).with_extracted(turn.data.clone());
            engine.process_turn(state, input)
        })
        .collect()
}

/// Human-readable summary of one turn.
pub fn render(outcome: &TurnOutcome, with_trace: bool) -> String {
    let d = &outcome.decision;
    let mut out = String::new();
    let _ = write!(out, "turn {:>2}  {:<20} -> {}", outcome.view.turn, d.action, d.next_state);
    if d.degraded {
        out.push_str("  [degraded]");
    }
    if d.transitions_suppressed {
        out.push_str("  [stay]");
    }
    out.push('\n');
    let _ = writeln!(out, "         reasons: {}", d.reason_codes.join(", "));
    if !d.data_updates.is_empty() {
        let updates: Vec<String> = d
            .data_updates
            .iter()
            .map(|(field, value)| format!("{field}={value}"))
            .collect();
        let _ = writeln!(out, "         data: {}", updates.join(", "));
    }
    for fault in &outcome.faults {
        let _ = writeln!(out, "         fault: {} ({})", fault.source, fault.reason);
    }
    if with_trace {
        for entry in &d.trace {
            let marker = match entry.outcome {
                TraceOutcome::Won => "*",
                TraceOutcome::Retained => "+",
                TraceOutcome::Overridden => "-",
                TraceOutcome::Suppressed => "x",
            };
            let _ = writeln!(
                out,
                "         {marker} {:<20} {:<10} {:<20} {:<8} {}",
                entry.source,
                format!("{:?}", entry.kind).to_lowercase(),
                entry.value,
                entry.priority,
                entry.reason_code
            );
        }
    }
    out
}
