//! `parley status` — show a stored conversation, or list them all.

use super::{CliResult, load_config, load_flow, open_store};
use parley_engine::StatusReport;

pub async fn run(conversation_id: Option<String>, json: bool) -> CliResult {
    let config = load_config()?;
    let store = open_store(&config);

    let Some(id) = conversation_id else {
        let ids = store.list().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&ids)?);
        } else if ids.is_empty() {
            println!("No stored conversations ({} store)", store.name());
        } else {
            println!("Stored conversations ({} store):", store.name());
            for id in ids {
                println!("  {id}");
            }
        }
        return Ok(());
    };

    let state = store
        .load(&id)
        .await?
        .ok_or_else(|| format!("No conversation '{id}' in the {} store", store.name()))?;
    let graph = load_flow(&config, None)?;
    let report = StatusReport::build(&state, &graph);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}
