//! Configuration for the governor, read from `.governance/governance.toml`.
//!
//! Settings are layered: file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [catalog]
//! path = "mcp-catalog.json"
//! min_version = "2.0.0"
//!
//! [sandbox]
//! resolve_symlinks = true
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//!
//! [report]
//! baseline = "baseline.toml"
//!
//! [pipelines.dapp-factory]
//! phases_file = "phases/dapp-factory.json"
//! ```
//!
//! Relative paths are resolved against the `.governance/` directory.
//!
//! # Environment
//!
//! - `GOVERNOR_CATALOG`: catalog path, overrides `[catalog] path`
//! - `GOVERNOR_LOG`: log filter, overrides `[logging] level`
//! - `GOVERNOR_REPO_ROOT`: repository root, defaults to the working directory

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::catalog::{CapabilityCatalog, MIN_CATALOG_VERSION, parse_version, version_at_least};
use crate::gate::EnvSource;
use crate::path_guard::PathGuard;
use crate::pipeline::PipelineId;
use crate::run::RunStore;

pub const GOVERNANCE_DIR: &str = ".governance";
pub const CONFIG_FILE: &str = "governance.toml";
pub const DEFAULT_CATALOG_FILE: &str = "mcp-catalog.json";

pub const ENV_CATALOG: &str = "GOVERNOR_CATALOG";
pub const ENV_LOG: &str = "GOVERNOR_LOG";
pub const ENV_REPO_ROOT: &str = "GOVERNOR_REPO_ROOT";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSection {
    /// Catalog file, relative to `.governance/`
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    /// Reject catalogs older than this version
    #[serde(default = "default_min_version")]
    pub min_version: String,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from(DEFAULT_CATALOG_FILE)
}

fn default_min_version() -> String {
    MIN_CATALOG_VERSION.to_string()
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            min_version: default_min_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSection {
    /// Canonicalize existing path components before the containment check
    #[serde(default = "default_resolve_symlinks")]
    pub resolve_symlinks: bool,
}

fn default_resolve_symlinks() -> bool {
    true
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            resolve_symlinks: default_resolve_symlinks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSection {
    /// Permission baseline TOML; the built-in baseline is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Custom phase table replacing the built-in one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases_file: Option<PathBuf>,
}

/// The complete governance.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceToml {
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub report: ReportSection,
    #[serde(default)]
    pub pipelines: BTreeMap<PipelineId, PipelineSettings>,
}

impl GovernanceToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse governance.toml")
    }

    /// Load `governance.toml` from `governance_dir`, or defaults when absent.
    pub fn load_or_default(governance_dir: &Path) -> Result<Self> {
        let path = governance_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize governance.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match parse_version(&self.catalog.min_version) {
            None => warnings.push(format!(
                "Invalid catalog.min_version '{}': expected a dotted numeric version",
                self.catalog.min_version
            )),
            Some(v) if !version_at_least(&v, MIN_CATALOG_VERSION) => warnings.push(format!(
                "catalog.min_version {} is below the supported minimum {}; {} applies",
                self.catalog.min_version, MIN_CATALOG_VERSION, MIN_CATALOG_VERSION
            )),
            Some(_) => {}
        }

        if !is_valid_log_level(&self.logging.level) {
            warnings.push(format!(
                "Invalid logging.level '{}': expected one of {} or an EnvFilter directive",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }

        if !self.sandbox.resolve_symlinks {
            warnings.push(
                "sandbox.resolve_symlinks is disabled: links inside allowed directories are not followed"
                    .to_string(),
            );
        }

        warnings
    }
}

/// A bare level, or a directive list such as `pipeline_governor=debug,warn`.
fn is_valid_log_level(level: &str) -> bool {
    let level = level.trim();
    if level.is_empty() {
        return false;
    }
    level.split(',').all(|directive| {
        let lvl = directive.rsplit('=').next().unwrap_or_default();
        LOG_LEVELS.contains(&lvl.trim().to_lowercase().as_str())
    })
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub repo_root: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub verbose: bool,
}

/// Resolved configuration: file → environment → CLI.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub repo_root: PathBuf,
    pub governance_dir: PathBuf,
    pub toml: GovernanceToml,
    catalog_path: PathBuf,
    log_filter: String,
}

impl GovernorConfig {
    pub fn resolve(cli: CliOverrides, env: &dyn EnvSource) -> Result<Self> {
        let repo_root = match cli
            .repo_root
            .or_else(|| env.get(ENV_REPO_ROOT).filter(|v| !v.is_empty()).map(PathBuf::from))
        {
            Some(root) => root,
            None => std::env::current_dir().context("Failed to determine working directory")?,
        };
        let repo_root = repo_root
            .canonicalize()
            .with_context(|| format!("Failed to resolve repository root: {}", repo_root.display()))?;

        let governance_dir = repo_root.join(GOVERNANCE_DIR);
        let toml = GovernanceToml::load_or_default(&governance_dir)?;

        let catalog_path = cli
            .catalog
            .or_else(|| env.get(ENV_CATALOG).filter(|v| !v.is_empty()).map(PathBuf::from))
            .unwrap_or_else(|| governance_dir.join(&toml.catalog.path));

        let log_filter = if cli.verbose {
            "debug".to_string()
        } else {
            env.get(ENV_LOG)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| toml.logging.level.clone())
        };

        Ok(Self {
            repo_root,
            governance_dir,
            toml,
            catalog_path,
            log_filter,
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.governance_dir.join(CONFIG_FILE)
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn log_format(&self) -> LogFormat {
        self.toml.logging.format
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.governance_dir.join("runs")
    }

    pub fn run_store(&self) -> RunStore {
        RunStore::new(self.runs_dir())
    }

    pub fn baseline_path(&self) -> Option<PathBuf> {
        self.toml
            .report
            .baseline
            .as_ref()
            .map(|p| self.governance_dir.join(p))
    }

    pub fn phases_file(&self, pipeline: PipelineId) -> Option<PathBuf> {
        self.toml
            .pipelines
            .get(&pipeline)
            .and_then(|s| s.phases_file.as_ref())
            .map(|p| self.governance_dir.join(p))
    }

    pub fn path_guard(&self) -> PathGuard {
        PathGuard::new(self.repo_root.clone())
            .with_symlink_resolution(self.toml.sandbox.resolve_symlinks)
    }

    /// Load and validate the catalog, enforcing `catalog.min_version`.
    pub fn load_catalog(&self) -> Result<CapabilityCatalog> {
        let catalog = CapabilityCatalog::load(&self.catalog_path)?;
        let configured_min = parse_version(&self.toml.catalog.min_version);
        if let (Some(version), Some(_)) = (parse_version(catalog.version()), configured_min)
            && !version_at_least(&version, &self.toml.catalog.min_version)
        {
            anyhow::bail!(
                "Catalog version {} is older than catalog.min_version {} in {}",
                catalog.version(),
                self.toml.catalog.min_version,
                self.config_path().display()
            );
        }
        Ok(catalog)
    }

    /// Warnings from the file plus checks that need the filesystem.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if !self.catalog_path.exists() {
            warnings.push(format!(
                "Catalog not found at {} (run `governor init`)",
                self.catalog_path.display()
            ));
        }
        if let Some(baseline) = self.baseline_path()
            && !baseline.exists()
        {
            warnings.push(format!("Baseline not found at {}", baseline.display()));
        }
        for pipeline in PipelineId::ALL {
            if let Some(path) = self.phases_file(pipeline)
                && !path.exists()
            {
                warnings.push(format!(
                    "Phases file for {} not found at {}; built-in phases apply",
                    pipeline,
                    path.display()
                ));
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    fn cli_for(root: &Path) -> CliOverrides {
        CliOverrides {
            repo_root: Some(root.to_path_buf()),
            ..Default::default()
        }
    }

    // =========================================
    // GovernanceToml
    // =========================================

    #[test]
    fn test_defaults() {
        let toml = GovernanceToml::default();
        assert_eq!(toml.catalog.path, PathBuf::from("mcp-catalog.json"));
        assert_eq!(toml.catalog.min_version, "2.0.0");
        assert!(toml.sandbox.resolve_symlinks);
        assert_eq!(toml.logging.format, LogFormat::Pretty);
        assert!(toml.report.baseline.is_none());
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_full_file() {
        let toml = GovernanceToml::parse(
            r#"
[catalog]
path = "catalogs/prod.json"
min_version = "2.1"

[sandbox]
resolve_symlinks = false

[logging]
level = "pipeline_governor=debug,warn"
format = "json"

[report]
baseline = "baseline.toml"

[pipelines.dapp-factory]
phases_file = "phases/dapp.json"
"#,
        )
        .unwrap();
        assert_eq!(toml.catalog.path, PathBuf::from("catalogs/prod.json"));
        assert!(!toml.sandbox.resolve_symlinks);
        assert_eq!(toml.logging.format, LogFormat::Json);
        assert_eq!(
            toml.pipelines[&PipelineId::DappFactory].phases_file,
            Some(PathBuf::from("phases/dapp.json"))
        );
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("resolve_symlinks"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let toml = GovernanceToml::parse("[logging]\nformat = \"json\"\n").unwrap();
        assert_eq!(toml.logging.level, "warn");
        assert_eq!(toml.catalog.min_version, MIN_CATALOG_VERSION);
    }

    #[test]
    fn test_validate_flags_bad_values() {
        let mut toml = GovernanceToml::default();
        toml.catalog.min_version = "1.0.0".into();
        toml.logging.level = "loud".into();
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("below the supported minimum")));
        assert!(warnings.iter().any(|w| w.contains("Invalid logging.level 'loud'")));
    }

    #[test]
    fn test_parse_rejects_unknown_pipeline() {
        let err = GovernanceToml::parse("[pipelines.game-factory]\n").unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse governance.toml"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = GovernanceToml::default();
        toml.report.baseline = Some(PathBuf::from("baseline.toml"));
        toml.save(&path).unwrap();
        let loaded = GovernanceToml::load(&path).unwrap();
        assert_eq!(loaded.report.baseline, Some(PathBuf::from("baseline.toml")));
    }

    #[test]
    fn test_log_level_directives() {
        assert!(is_valid_log_level("info"));
        assert!(is_valid_log_level("WARN"));
        assert!(is_valid_log_level("pipeline_governor=trace,error"));
        assert!(!is_valid_log_level(""));
        assert!(!is_valid_log_level("verbose"));
    }

    // =========================================
    // GovernorConfig layering
    // =========================================

    #[test]
    fn test_resolve_defaults_to_governance_dir() {
        let dir = tempdir().unwrap();
        let config = GovernorConfig::resolve(cli_for(dir.path()), &no_env()).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.repo_root, root);
        assert_eq!(config.catalog_path(), root.join(".governance/mcp-catalog.json"));
        assert_eq!(config.runs_dir(), root.join(".governance/runs"));
        assert_eq!(config.log_filter(), "warn");
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(GOVERNANCE_DIR)).unwrap();
        fs::write(
            dir.path().join(GOVERNANCE_DIR).join(CONFIG_FILE),
            "[logging]\nlevel = \"info\"\n",
        )
        .unwrap();

        let env: HashMap<String, String> = [
            (ENV_LOG.to_string(), "trace".to_string()),
            (ENV_CATALOG.to_string(), "/opt/catalog.json".to_string()),
        ]
        .into_iter()
        .collect();
        let config = GovernorConfig::resolve(cli_for(dir.path()), &env).unwrap();
        assert_eq!(config.log_filter(), "trace");
        assert_eq!(config.catalog_path(), Path::new("/opt/catalog.json"));
    }

    #[test]
    fn test_cli_overrides_env() {
        let dir = tempdir().unwrap();
        let env: HashMap<String, String> =
            [(ENV_CATALOG.to_string(), "/opt/catalog.json".to_string())]
                .into_iter()
                .collect();
        let cli = CliOverrides {
            repo_root: Some(dir.path().to_path_buf()),
            catalog: Some(PathBuf::from("/srv/catalog.json")),
            verbose: true,
        };
        let config = GovernorConfig::resolve(cli, &env).unwrap();
        assert_eq!(config.catalog_path(), Path::new("/srv/catalog.json"));
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_repo_root_from_env() {
        let dir = tempdir().unwrap();
        let env: HashMap<String, String> = [(
            ENV_REPO_ROOT.to_string(),
            dir.path().to_string_lossy().to_string(),
        )]
        .into_iter()
        .collect();
        let config = GovernorConfig::resolve(CliOverrides::default(), &env).unwrap();
        assert_eq!(config.repo_root, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_missing_repo_root_is_error() {
        let cli = CliOverrides {
            repo_root: Some(PathBuf::from("/nonexistent/factory")),
            ..Default::default()
        };
        let err = GovernorConfig::resolve(cli, &no_env()).unwrap_err();
        assert!(err.to_string().contains("Failed to resolve repository root"));
    }

    #[test]
    fn test_validate_reports_missing_catalog() {
        let dir = tempdir().unwrap();
        let config = GovernorConfig::resolve(cli_for(dir.path()), &no_env()).unwrap();
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("Catalog not found")));
    }

    #[test]
    fn test_load_catalog_enforces_min_version() {
        let dir = tempdir().unwrap();
        let gov = dir.path().join(GOVERNANCE_DIR);
        fs::create_dir_all(&gov).unwrap();
        fs::write(gov.join(DEFAULT_CATALOG_FILE), crate::catalog::BUNDLED_CATALOG).unwrap();
        fs::write(gov.join(CONFIG_FILE), "[catalog]\nmin_version = \"3.0.0\"\n").unwrap();

        let config = GovernorConfig::resolve(cli_for(dir.path()), &no_env()).unwrap();
        let err = config.load_catalog().unwrap_err();
        assert!(err.to_string().contains("older than catalog.min_version 3.0.0"));
    }

    #[test]
    fn test_load_catalog_bundled_copy() {
        let dir = tempdir().unwrap();
        let gov = dir.path().join(GOVERNANCE_DIR);
        fs::create_dir_all(&gov).unwrap();
        fs::write(gov.join(DEFAULT_CATALOG_FILE), crate::catalog::BUNDLED_CATALOG).unwrap();
        let config = GovernorConfig::resolve(cli_for(dir.path()), &no_env()).unwrap();
        let catalog = config.load_catalog().unwrap();
        assert!(catalog.tool("github").is_some());
    }

    #[test]
    fn test_phases_file_resolves_under_governance_dir() {
        let dir = tempdir().unwrap();
        let gov = dir.path().join(GOVERNANCE_DIR);
        fs::create_dir_all(&gov).unwrap();
        fs::write(
            gov.join(CONFIG_FILE),
            "[pipelines.agent-factory]\nphases_file = \"agent.json\"\n",
        )
        .unwrap();
        let config = GovernorConfig::resolve(cli_for(dir.path()), &no_env()).unwrap();
        assert_eq!(
            config.phases_file(PipelineId::AgentFactory),
            Some(config.governance_dir.join("agent.json"))
        );
        assert!(config.phases_file(PipelineId::AppFactory).is_none());
    }
}
