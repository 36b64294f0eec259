//! Project initialization: `governor init`.

use anyhow::Result;
use console::style;

use pipeline_governor::config::GovernorConfig;
use pipeline_governor::init::{init_governance, is_initialized};

use super::Outcome;

pub fn cmd_init(config: &GovernorConfig, force: bool) -> Result<Outcome> {
    let was_initialized = is_initialized(&config.repo_root);

    let result = init_governance(&config.repo_root, force)?;

    if result.created {
        println!(
            "Initialized governance at {}",
            result.governance_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .governance/");
        println!("  ├── governance.toml   # Catalog, sandbox, logging, and report settings");
        println!("  ├── mcp-catalog.json  # Capability catalog (tools, levels, failure routing)");
        println!("  └── runs/             # Per-pipeline phase results, approvals, history");
        println!();
        println!("Next steps:");
        println!("  1. Review the catalog and adjust tool allow-lists");
        println!("  2. Run `governor report` to self-test the configuration");
        println!("  3. Run `governor status` to see every pipeline's phases");
    } else if was_initialized {
        println!(
            "Governance already initialized at {}",
            result.governance_dir.display()
        );
        if result.config_written || result.catalog_written {
            println!("{} rewrote:", style("force").yellow());
        }
    } else {
        println!(
            "Completed governance initialization at {}",
            result.governance_dir.display()
        );
    }

    if !result.created {
        if result.config_written {
            println!("  {} governance.toml", style("wrote").green());
        }
        if result.catalog_written {
            println!("  {} mcp-catalog.json", style("wrote").green());
        }
    }

    Ok(Outcome::Ok)
}
