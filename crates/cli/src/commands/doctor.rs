//! `parley doctor` — diagnose the local setup.

use super::CliResult;
use parley_config::AppConfig;
use parley_flow::{ConfigurationError, FlowGraph};

pub async fn run() -> CliResult {
    println!("Parley Doctor — setup diagnostics");
    println!("=================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    let config = if config_path.exists() {
        match AppConfig::load() {
            Ok(config) => {
                println!("  ok    config file valid");
                config
            }
            Err(e) => {
                println!("  FAIL  config file invalid: {e}");
                return Err("config file invalid".into());
            }
        }
    } else {
        println!("  warn  no config file, using defaults (run `parley init`)");
        issues += 1;
        AppConfig::default()
    };

    match FlowGraph::load(&config.flow_path) {
        Ok(graph) => println!(
            "  ok    flow {} ({} states)",
            config.flow_path.display(),
            graph.state_count()
        ),
        Err(ConfigurationError::Invalid(violations)) => {
            println!(
                "  FAIL  flow {} has {} violation(s); run `parley validate`",
                config.flow_path.display(),
                violations.len()
            );
            issues += 1;
        }
        Err(e) => {
            println!("  FAIL  {e}");
            issues += 1;
        }
    }

    match config.store.backend.as_str() {
        "memory" => println!("  ok    memory store (conversations are not persisted)"),
        _ if config.store.dir.is_dir() => {
            println!("  ok    file store at {}", config.store.dir.display())
        }
        _ => println!(
            "  ok    file store at {} (created on first save)",
            config.store.dir.display()
        ),
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
