//! `parley reset` — send a stored conversation back to its initial state.

use super::{CliResult, load_config, load_flow, open_store};
use parley_engine::{FlowHandle, Orchestrator};
use std::sync::Arc;

pub async fn run(conversation_id: String) -> CliResult {
    let config = load_config()?;
    let store = open_store(&config);
    let mut state = store
        .load(&conversation_id)
        .await?
        .ok_or_else(|| format!("No conversation '{conversation_id}' in the {} store", store.name()))?;

    let engine = Orchestrator::new(Arc::new(FlowHandle::new(load_flow(&config, None)?)));
    engine.reset(&mut state);
    store.save(&state).await?;

    println!("Conversation {conversation_id} reset to '{}'", state.current_state);
    Ok(())
}
