//! Phase vocabulary, phase definitions, and phase results.
//!
//! This module provides:
//! - `PhaseName`, the closed vocabulary of phase names a catalog may reference
//! - `Phase`, a single node of a pipeline's phase graph
//! - `PhaseStatus` and `PhaseResult`, the audit record of a phase attempt
//! - `PhasesFile` for loading custom phase tables from JSON

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::pipeline::PipelineId;

/// The fixed phase vocabulary shared by every pipeline and the capability catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseName {
    Research,
    Build,
    Verify,
    Deploy,
    /// Iterative polish/QA loop run after verification.
    Ralph,
}

impl PhaseName {
    /// Every phase name, in canonical pipeline order.
    pub const ALL: [PhaseName; 5] = [
        PhaseName::Research,
        PhaseName::Build,
        PhaseName::Verify,
        PhaseName::Deploy,
        PhaseName::Ralph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseName::Research => "research",
            PhaseName::Build => "build",
            PhaseName::Verify => "verify",
            PhaseName::Deploy => "deploy",
            PhaseName::Ralph => "ralph",
        }
    }
}

impl std::fmt::Display for PhaseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PhaseName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "research" => Ok(PhaseName::Research),
            "build" => Ok(PhaseName::Build),
            "verify" => Ok(PhaseName::Verify),
            "deploy" => Ok(PhaseName::Deploy),
            "ralph" => Ok(PhaseName::Ralph),
            _ => anyhow::bail!(
                "Invalid phase name '{}'. Valid values: research, build, verify, deploy, ralph",
                s
            ),
        }
    }
}

/// A single phase of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Phase {
    /// Unique id within the pipeline (the built-in tables use the phase vocabulary)
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Whether completion of this phase is required for the pipeline to complete
    #[serde(default = "default_mandatory")]
    pub mandatory: bool,
    /// Ids of phases that must be `completed` before this one may run
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_mandatory() -> bool {
    true
}

impl Phase {
    /// Create a mandatory phase with no dependencies.
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            mandatory: true,
            depends_on: Vec::new(),
        }
    }

    /// Create an optional phase with no dependencies.
    pub fn optional(id: &str, name: &str) -> Self {
        Self {
            mandatory: false,
            ..Self::new(id, name)
        }
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    /// The vocabulary name of this phase, when its id is drawn from the vocabulary.
    pub fn phase_name(&self) -> Option<PhaseName> {
        self.id.parse().ok()
    }
}

/// Lifecycle status of a single phase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub const ALL: [PhaseStatus; 5] = [
        PhaseStatus::Pending,
        PhaseStatus::Running,
        PhaseStatus::Completed,
        PhaseStatus::Failed,
        PhaseStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Running => "running",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Skipped => "skipped",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseStatus::Completed | PhaseStatus::Skipped)
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PhaseStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PhaseStatus::Pending),
            "running" => Ok(PhaseStatus::Running),
            "completed" => Ok(PhaseStatus::Completed),
            "failed" => Ok(PhaseStatus::Failed),
            "skipped" => Ok(PhaseStatus::Skipped),
            _ => anyhow::bail!(
                "Invalid phase status '{}'. Valid values: pending, running, completed, failed, skipped",
                s
            ),
        }
    }
}

/// Audit record of the latest attempt of a phase.
///
/// Results are only produced by the state machine; callers persist them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase_id: String,
    pub status: PhaseStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds between `started_at` and `completed_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl PhaseResult {
    pub(crate) fn pending(phase_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            phase_id: phase_id.to_string(),
            status: PhaseStatus::Pending,
            started_at: now,
            completed_at: None,
            duration_ms: None,
        }
    }
}

/// Latest result per phase id for one run. Owned by the caller.
pub type RunResults = HashMap<String, PhaseResult>;

/// JSON file format for a custom phase table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasesFile {
    pub pipeline: PipelineId,
    pub phases: Vec<Phase>,
}

impl PhasesFile {
    /// Load phases from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read phases file: {}", path.display()))?;

        let phases_file: PhasesFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse phases JSON: {}", path.display()))?;

        Ok(phases_file)
    }

    /// Save phases to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize phases to JSON")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write phases file: {}", path.display()))?;

        Ok(())
    }
}

/// Load a custom phase table, falling back to the pipeline's built-in phases.
pub fn load_phases_or_default(pipeline: PipelineId, phases_file: Option<&Path>) -> Result<Vec<Phase>> {
    match phases_file {
        Some(path) if path.exists() => {
            let pf = PhasesFile::load(path)?;
            if pf.pipeline != pipeline {
                anyhow::bail!(
                    "Phases file {} is for pipeline '{}', not '{}'",
                    path.display(),
                    pf.pipeline,
                    pipeline
                );
            }
            Ok(pf.phases)
        }
        _ => Ok(crate::pipeline::default_phases()),
    }
}
