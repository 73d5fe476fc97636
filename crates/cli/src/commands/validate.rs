//! `parley validate` — load a flow and report every violation.

use super::{CliResult, load_config};
use parley_flow::{ConfigurationError, FlowGraph};
use std::path::PathBuf;

pub async fn run(flow: Option<PathBuf>) -> CliResult {
    let path = match flow {
        Some(path) => path,
        None => load_config()?.flow_path,
    };
    println!("Validating {}", path.display());

    match FlowGraph::load(&path) {
        Ok(graph) => {
            println!(
                "  ok: {} states, {} intents, {} actions",
                graph.state_count(),
                graph.intents().count(),
                graph.actions().count()
            );
            println!("  initial state: {}", graph.initial_state());
            Ok(())
        }
        Err(ConfigurationError::Invalid(violations)) => {
            for violation in &violations {
                println!("  error: {violation}");
            }
            Err(format!("{} violation(s) in {}", violations.len(), path.display()).into())
        }
        Err(e) => Err(e.into()),
    }
}
