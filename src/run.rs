//! Persisted run state, so the CLI can act as the executor across invocations.
//!
//! Each pipeline has one current run under `.governance/runs/`:
//! - `<pipeline>.json` holds the phase results and the approval ledger
//! - `<pipeline>.log` is an append-only `phase|status|timestamp` history

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::gate::ApprovalLedger;
use crate::phase::{PhaseStatus, RunResults};
use crate::pipeline::PipelineId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub pipeline: PipelineId,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub results: RunResults,
    #[serde(default)]
    pub approvals: ApprovalLedger,
}

impl RunState {
    pub fn new(pipeline: PipelineId) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            pipeline,
            started_at: Utc::now(),
            results: RunResults::new(),
            approvals: ApprovalLedger::new(),
        }
    }

    pub fn status_of(&self, phase_id: &str) -> PhaseStatus {
        self.results
            .get(phase_id)
            .map(|r| r.status)
            .unwrap_or_default()
    }
}

/// One line of the history log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub phase: String,
    pub status: PhaseStatus,
    pub timestamp: DateTime<Utc>,
}

/// Directory of per-pipeline run files.
#[derive(Debug, Clone)]
pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self, pipeline: PipelineId) -> PathBuf {
        self.dir.join(format!("{}.json", pipeline))
    }

    fn history_path(&self, pipeline: PipelineId) -> PathBuf {
        self.dir.join(format!("{}.log", pipeline))
    }

    pub fn load(&self, pipeline: PipelineId) -> Result<Option<RunState>> {
        let path = self.state_path(pipeline);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read run state: {}", path.display()))?;
        let state: RunState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run state: {}", path.display()))?;
        if state.pipeline != pipeline {
            anyhow::bail!(
                "Run state {} belongs to pipeline '{}', not '{}'",
                path.display(),
                state.pipeline,
                pipeline
            );
        }
        Ok(Some(state))
    }

    /// The current run, or a fresh one when none has been saved.
    pub fn load_or_new(&self, pipeline: PipelineId) -> Result<RunState> {
        match self.load(pipeline)? {
            Some(state) => Ok(state),
            None => {
                let state = RunState::new(pipeline);
                tracing::info!(pipeline = %pipeline, run_id = %state.run_id, "Starting new run");
                Ok(state)
            }
        }
    }

    pub fn save(&self, state: &RunState) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create run directory: {}", self.dir.display()))?;
        let path = self.state_path(state.pipeline);
        let content = serde_json::to_string_pretty(state).context("Failed to serialize run state")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write run state: {}", path.display()))?;
        Ok(())
    }

    pub fn append_history(&self, pipeline: PipelineId, phase: &str, status: PhaseStatus) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create run directory: {}", self.dir.display()))?;
        let entry = format!("{}|{}|{}\n", phase, status, Utc::now().to_rfc3339());
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path(pipeline))
            .context("Failed to open history log")?
            .write_all(entry.as_bytes())
            .context("Failed to write history entry")?;
        Ok(())
    }

    /// History entries in write order. Malformed lines are skipped.
    pub fn history(&self, pipeline: PipelineId) -> Result<Vec<HistoryEntry>> {
        let path = self.history_path(pipeline);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read history log: {}", path.display()))?;
        Ok(content.lines().filter_map(parse_history_line).collect())
    }

    /// Discard the current run and its history.
    pub fn reset(&self, pipeline: PipelineId) -> Result<()> {
        for path in [self.state_path(pipeline), self.history_path(pipeline)] {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }
}

fn parse_history_line(line: &str) -> Option<HistoryEntry> {
    let mut parts = line.splitn(3, '|');
    let phase = parts.next()?.to_string();
    let status = parts.next()?.parse().ok()?;
    let timestamp = DateTime::parse_from_rfc3339(parts.next()?)
        .ok()?
        .with_timezone(&Utc);
    Some(HistoryEntry {
        phase,
        status,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseResult;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = RunStore::new(dir.path().join("runs"));
        assert!(store.load(PipelineId::AppFactory).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_run() {
        let dir = tempdir().unwrap();
        let store = RunStore::new(dir.path().join("runs"));
        let mut state = RunState::new(PipelineId::DappFactory);
        state.results.insert(
            "research".into(),
            PhaseResult {
                phase_id: "research".into(),
                status: PhaseStatus::Completed,
                started_at: Utc::now(),
                completed_at: Some(Utc::now()),
                duration_ms: Some(12),
            },
        );
        state.approvals.record("stripe", PipelineId::DappFactory, "alice");
        store.save(&state).unwrap();

        let loaded = store.load(PipelineId::DappFactory).unwrap().unwrap();
        assert_eq!(loaded.run_id, state.run_id);
        assert_eq!(loaded.status_of("research"), PhaseStatus::Completed);
        assert_eq!(loaded.status_of("build"), PhaseStatus::Pending);
        assert!(loaded.approvals.get("stripe", PipelineId::DappFactory).is_some());
    }

    #[test]
    fn test_load_rejects_mismatched_pipeline() {
        let dir = tempdir().unwrap();
        let store = RunStore::new(dir.path());
        let state = RunState::new(PipelineId::AppFactory);
        let json = serde_json::to_string(&state).unwrap();
        fs::write(dir.path().join("dapp-factory.json"), json).unwrap();
        let err = store.load(PipelineId::DappFactory).unwrap_err();
        assert!(err.to_string().contains("belongs to pipeline 'app-factory'"));
    }

    #[test]
    fn test_history_round_trip() {
        let dir = tempdir().unwrap();
        let store = RunStore::new(dir.path());
        store
            .append_history(PipelineId::AgentFactory, "research", PhaseStatus::Running)
            .unwrap();
        store
            .append_history(PipelineId::AgentFactory, "research", PhaseStatus::Completed)
            .unwrap();
        let history = store.history(PipelineId::AgentFactory).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, PhaseStatus::Completed);
        assert!(store.history(PipelineId::AppFactory).unwrap().is_empty());
    }

    #[test]
    fn test_history_skips_malformed_lines() {
        assert!(parse_history_line("garbage").is_none());
        assert!(parse_history_line("build|exploded|2026-01-01T00:00:00Z").is_none());
        assert!(parse_history_line("build|failed|2026-01-01T00:00:00Z").is_some());
    }

    #[test]
    fn test_reset_removes_files() {
        let dir = tempdir().unwrap();
        let store = RunStore::new(dir.path());
        store.save(&RunState::new(PipelineId::PluginFactory)).unwrap();
        store
            .append_history(PipelineId::PluginFactory, "build", PhaseStatus::Running)
            .unwrap();
        store.reset(PipelineId::PluginFactory).unwrap();
        assert!(store.load(PipelineId::PluginFactory).unwrap().is_none());
        assert!(store.history(PipelineId::PluginFactory).unwrap().is_empty());
    }
}
