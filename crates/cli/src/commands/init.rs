//! `parley init` — write a starter config, flow, and script.

use super::{CliResult, SAMPLE_FLOW, SAMPLE_SCRIPT};
use parley_config::AppConfig;
use std::path::Path;

pub async fn run(force: bool) -> CliResult {
    let config_dir = AppConfig::config_dir();

    println!("Parley — setup");
    println!("==============\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    let written = write_starter_files(&config_dir, force)?;
    for name in &written {
        println!("  Wrote {}", config_dir.join(name).display());
    }
    if written.len() < 3 {
        println!("\n  Existing files were kept; pass --force to overwrite them.");
    }

    println!("\nNext steps:");
    println!("  1. Edit {}", config_dir.join("flow.toml").display());
    println!("  2. Run: parley validate");
    println!(
        "  3. Run: parley simulate --script {}",
        config_dir.join("script.toml").display()
    );
    Ok(())
}

/// Write config.toml, flow.toml, and script.toml into `dir`.
/// Returns the names of the files written.
pub fn write_starter_files(dir: &Path, force: bool) -> CliResult<Vec<&'static str>> {
    let config_toml = AppConfig::default_toml();
    let files: [(&'static str, &str); 3] = [
        ("config.toml", &config_toml),
        ("flow.toml", SAMPLE_FLOW),
        ("script.toml", SAMPLE_SCRIPT),
    ];

    let mut written = Vec::new();
    for (name, content) in files {
        let path = dir.join(name);
        if path.exists() && !force {
            continue;
        }
        std::fs::write(&path, content)?;
        written.push(name);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_flow::FlowGraph;

    #[test]
    fn sample_flow_is_valid() {
        let graph = FlowGraph::from_toml(SAMPLE_FLOW).unwrap();
        assert_eq!(graph.initial_state(), "greeting");
        assert!(graph.state_count() >= 5);
    }

    #[test]
    fn starter_files_respect_force() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(write_starter_files(dir.path(), false).unwrap().len(), 3);

        std::fs::write(dir.path().join("flow.toml"), "edited").unwrap();
        assert!(write_starter_files(dir.path(), false).unwrap().is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("flow.toml")).unwrap(),
            "edited"
        );

        assert_eq!(write_starter_files(dir.path(), true).unwrap().len(), 3);
        let flow = std::fs::read_to_string(dir.path().join("flow.toml")).unwrap();
        assert_eq!(flow, SAMPLE_FLOW);
    }
}
