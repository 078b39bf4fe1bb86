//! Configuration view and validation commands - `revsync config`.

use anyhow::Result;
use console::style;
use std::path::Path;

use revsync::config::{EffectiveConfig, RevsyncToml};
use revsync::paths;

use super::context::resolve_repo_root;
use super::output::print_json;
use crate::ConfigCommands;

pub fn cmd_config(
    repo_root: Option<&Path>,
    command: Option<ConfigCommands>,
    json: bool,
) -> Result<()> {
    let repo_root = resolve_repo_root(repo_root)?;
    let config_path = paths::config_file(&repo_root);

    match command {
        None | Some(ConfigCommands::Show) => {
            let config = EffectiveConfig::resolve(&config_path)?;
            if json {
                return print_json(&config);
            }
            println!();
            println!("Revsync Configuration");
            println!("=====================");
            println!();
            if config.file_exists {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No revsync.toml found at {}", config_path.display());
            }
            println!();
            println!("Effective values (with env overrides):");
            for (key, value, origin) in config.rows() {
                println!("  {:<24} = {:<8} {}", key, value, style(format!("({})", origin)).dim());
            }
            println!();
            if !config.file_exists {
                println!("Run 'revsync config init' to create a revsync.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            let exists = config_path.exists();
            let toml = RevsyncToml::load_or_default(&config_path)?;
            let warnings = toml.validate();
            if json {
                return print_json(&serde_json::json!({
                    "file": config_path,
                    "file_exists": exists,
                    "valid": warnings.is_empty(),
                    "warnings": warnings,
                }));
            }
            if !exists {
                println!("No revsync.toml found. Using defaults (valid).");
            } else if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Init) => {
            RevsyncToml::default().save_new(&config_path)?;
            if json {
                return print_json(&serde_json::json!({ "created": config_path }));
            }
            println!("Created revsync.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [lock] max_retries, stale_after_secs");
            println!("  - [wait] poll_interval_ms, timeout_secs");
        }
    }

    Ok(())
}
