//! `governor init`: create the `.governance/` directory in a factory repository.
//!
//! ```text
//! .governance/
//! ├── governance.toml   # Layered configuration (file layer)
//! ├── mcp-catalog.json  # Capability catalog, copied from the bundled one
//! └── runs/             # Per-pipeline run state and history
//! ```
//!
//! Existing files are left alone unless `force` is set.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::catalog::BUNDLED_CATALOG;
use crate::config::{CONFIG_FILE, DEFAULT_CATALOG_FILE, GOVERNANCE_DIR, GovernanceToml};

#[derive(Debug)]
pub struct InitResult {
    pub governance_dir: PathBuf,
    /// False if the directory already existed
    pub created: bool,
    pub config_written: bool,
    pub catalog_written: bool,
}

pub fn init_governance(repo_root: &Path, force: bool) -> Result<InitResult> {
    let governance_dir = repo_root.join(GOVERNANCE_DIR);
    let created = !governance_dir.exists();

    let runs_dir = governance_dir.join("runs");
    std::fs::create_dir_all(&runs_dir)
        .with_context(|| format!("Failed to create runs directory: {}", runs_dir.display()))?;

    let config_path = governance_dir.join(CONFIG_FILE);
    let config_written = force || !config_path.exists();
    if config_written {
        GovernanceToml::default().save(&config_path)?;
    }

    let catalog_path = governance_dir.join(DEFAULT_CATALOG_FILE);
    let catalog_written = force || !catalog_path.exists();
    if catalog_written {
        std::fs::write(&catalog_path, BUNDLED_CATALOG)
            .with_context(|| format!("Failed to write catalog: {}", catalog_path.display()))?;
    }

    tracing::info!(
        dir = %governance_dir.display(),
        created,
        config_written,
        catalog_written,
        "Initialized governance directory"
    );

    Ok(InitResult {
        governance_dir,
        created,
        config_written,
        catalog_written,
    })
}

pub fn is_initialized(repo_root: &Path) -> bool {
    repo_root.join(GOVERNANCE_DIR).join(CONFIG_FILE).exists()
}
