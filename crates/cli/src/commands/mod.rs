//! CLI subcommands and the helpers they share.

pub mod doctor;
pub mod init;
pub mod reset;
pub mod simulate;
pub mod status;
pub mod validate;

use parley_config::AppConfig;
use parley_core::collaborator::StateStore;
use parley_flow::FlowGraph;
use parley_store::{FileStateStore, InMemoryStateStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Flow written by `parley init`.
pub const SAMPLE_FLOW: &str = include_str!("../../assets/sample_flow.toml");

/// Script written by `parley init`, runnable against [`SAMPLE_FLOW`].
pub const SAMPLE_SCRIPT: &str = include_str!("../../assets/sample_script.toml");

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn load_config() -> CliResult<AppConfig> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}

/// The flow at `path`, or at the configured `flow_path`.
pub fn load_flow(config: &AppConfig, path: Option<&Path>) -> CliResult<FlowGraph> {
    let path: PathBuf = path.map_or_else(|| config.flow_path.clone(), Path::to_path_buf);
    Ok(FlowGraph::load(&path)?)
}

/// The configured state store.
pub fn open_store(config: &AppConfig) -> Arc<dyn StateStore> {
    match config.store.backend.as_str() {
        "memory" => Arc::new(InMemoryStateStore::new()),
        _ => Arc::new(FileStateStore::new(config.store.dir.clone())),
    }
}
