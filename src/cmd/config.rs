//! Configuration view and validation commands: `governor config`.

use anyhow::{Context, Result};
use console::style;

use pipeline_governor::config::{GovernanceToml, GovernorConfig};

use super::super::ConfigCommands;
use super::Outcome;

pub fn cmd_config(config: &GovernorConfig, command: Option<ConfigCommands>) -> Result<Outcome> {
    let config_path = config.config_path();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Governance Configuration");
            println!("========================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No governance.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let toml = &config.toml;
            println!("[catalog]");
            println!("  path = \"{}\"", toml.catalog.path.display());
            println!("  min_version = \"{}\"", toml.catalog.min_version);
            println!();
            println!("[sandbox]");
            println!("  resolve_symlinks = {}", toml.sandbox.resolve_symlinks);
            println!();
            println!("[logging]");
            println!("  level = \"{}\"", toml.logging.level);
            println!("  format = \"{}\"", toml.logging.format);
            println!();
            if let Some(baseline) = &toml.report.baseline {
                println!("[report]");
                println!("  baseline = \"{}\"", baseline.display());
                println!();
            }
            for (pipeline, settings) in &toml.pipelines {
                if let Some(phases_file) = &settings.phases_file {
                    println!("[pipelines.{}]", pipeline);
                    println!("  phases_file = \"{}\"", phases_file.display());
                    println!();
                }
            }

            println!("Effective values (with env/CLI overrides):");
            println!("  repo_root = \"{}\"", config.repo_root.display());
            println!("  catalog = \"{}\"", config.catalog_path().display());
            println!("  log_filter = \"{}\"", config.log_filter());
            println!("  runs_dir = \"{}\"", config.runs_dir().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("{}", style("Configuration is valid.").green());
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("governance.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(Outcome::Ok);
            }

            std::fs::create_dir_all(&config.governance_dir).with_context(|| {
                format!(
                    "Failed to create governance directory: {}",
                    config.governance_dir.display()
                )
            })?;
            GovernanceToml::default().save(&config_path)?;

            println!("Created governance.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [catalog] path, min_version");
            println!("  - [sandbox] resolve_symlinks");
            println!("  - [logging] level, format");
            println!("  - [pipelines.<id>] phases_file for a custom phase table");
            println!();
        }
    }

    Ok(Outcome::Ok)
}
