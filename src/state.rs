//! Phase state machine and pipeline status derivation.
//!
//! Valid phase transitions:
//!
//! | From        | To                       |
//! |-------------|--------------------------|
//! | `pending`   | `running`, `skipped`     |
//! | `running`   | `completed`, `failed`    |
//! | `failed`    | `pending` (retry)        |
//! | `completed` | none                     |
//! | `skipped`   | none                     |
//!
//! Entering `running` additionally requires every dependency to be `completed`.
//! Pipeline status is never stored; it is derived from the results on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::GovernanceError;
use crate::graph::PhaseGraph;
use crate::phase::{Phase, PhaseResult, PhaseStatus, RunResults};

/// Overall status of a pipeline run, derived from its phase results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Pending => "pending",
            PipelineStatus::InProgress => "in_progress",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Statuses reachable in one step from `from`.
pub fn allowed_transitions(from: PhaseStatus) -> &'static [PhaseStatus] {
    match from {
        PhaseStatus::Pending => &[PhaseStatus::Running, PhaseStatus::Skipped],
        PhaseStatus::Running => &[PhaseStatus::Completed, PhaseStatus::Failed],
        PhaseStatus::Failed => &[PhaseStatus::Pending],
        PhaseStatus::Completed | PhaseStatus::Skipped => &[],
    }
}

pub fn is_valid_transition(from: PhaseStatus, to: PhaseStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Validate a requested status change and return the phase's new result.
///
/// `current` is the phase's latest result; `None` means the phase has never
/// been attempted and is treated as a fresh `pending` result. `results` holds
/// the latest result of every other phase and is only read for dependency gating.
pub fn transition_phase(
    phase: &Phase,
    current: Option<&PhaseResult>,
    requested: PhaseStatus,
    results: &RunResults,
) -> Result<PhaseResult, GovernanceError> {
    transition_phase_at(phase, current, requested, results, Utc::now())
}

/// [`transition_phase`] with an explicit clock.
pub fn transition_phase_at(
    phase: &Phase,
    current: Option<&PhaseResult>,
    requested: PhaseStatus,
    results: &RunResults,
    now: DateTime<Utc>,
) -> Result<PhaseResult, GovernanceError> {
    let current = current
        .cloned()
        .unwrap_or_else(|| PhaseResult::pending(&phase.id, now));
    let from = current.status;

    if !is_valid_transition(from, requested) {
        tracing::warn!(phase = %phase.id, %from, to = %requested, "rejected phase transition");
        return Err(GovernanceError::InvalidTransition {
            phase: phase.id.clone(),
            from,
            to: requested,
        });
    }

    if requested == PhaseStatus::Running {
        for dep in &phase.depends_on {
            let status = results.get(dep).map(|r| r.status).unwrap_or_default();
            if status != PhaseStatus::Completed {
                tracing::warn!(phase = %phase.id, dependency = %dep, %status, "dependency not satisfied");
                return Err(GovernanceError::DependencyNotSatisfied {
                    phase: phase.id.clone(),
                    dependency: dep.clone(),
                    status,
                });
            }
        }
    }

    let next = match requested {
        PhaseStatus::Pending => PhaseResult::pending(&phase.id, now),
        PhaseStatus::Running => PhaseResult {
            status: PhaseStatus::Running,
            started_at: now,
            completed_at: None,
            duration_ms: None,
            ..current
        },
        PhaseStatus::Completed | PhaseStatus::Failed | PhaseStatus::Skipped => PhaseResult {
            status: requested,
            completed_at: Some(now),
            duration_ms: Some((now - current.started_at).num_milliseconds().max(0)),
            ..current
        },
    };

    tracing::debug!(phase = %phase.id, %from, to = %requested, "phase transition accepted");
    Ok(next)
}

/// Apply a transition to a caller-owned result map.
///
/// A move back to `pending` is a retry and goes through [`retry_phase`], so
/// downstream results are reset the same way on either path.
pub fn apply_transition(
    graph: &PhaseGraph,
    phase_id: &str,
    requested: PhaseStatus,
    results: &mut RunResults,
) -> Result<PhaseResult, GovernanceError> {
    let phase = graph
        .get(phase_id)
        .ok_or_else(|| GovernanceError::UnknownPhase {
            phase: phase_id.to_string(),
        })?;
    if requested == PhaseStatus::Pending {
        retry_phase(graph, phase_id, results)?;
        return results
            .get(phase_id)
            .cloned()
            .ok_or_else(|| GovernanceError::UnknownPhase {
                phase: phase_id.to_string(),
            });
    }
    let next = transition_phase(phase, results.get(phase_id), requested, results)?;
    results.insert(phase_id.to_string(), next.clone());
    Ok(next)
}

/// Retry a failed phase and invalidate everything downstream of it.
///
/// The failed phase moves to `pending`. Every transitive dependent whose latest
/// result is not `pending` is reset to a fresh `pending` result, since it was
/// derived from (or skipped because of) the failed output. The retry is refused
/// while any dependent is `running`. Returns the ids of the reset dependents.
pub fn retry_phase(
    graph: &PhaseGraph,
    phase_id: &str,
    results: &mut RunResults,
) -> Result<Vec<String>, GovernanceError> {
    let now = Utc::now();
    let phase = graph
        .get(phase_id)
        .ok_or_else(|| GovernanceError::UnknownPhase {
            phase: phase_id.to_string(),
        })?;

    let dependents = graph.dependents(phase_id);
    if let Some(busy) = dependents
        .iter()
        .find(|d| results.get(&d.id).is_some_and(|r| r.status == PhaseStatus::Running))
    {
        return Err(GovernanceError::InvalidTransition {
            phase: busy.id.clone(),
            from: PhaseStatus::Running,
            to: PhaseStatus::Pending,
        });
    }

    let retried = transition_phase_at(
        phase,
        results.get(phase_id),
        PhaseStatus::Pending,
        results,
        now,
    )?;
    results.insert(phase_id.to_string(), retried);

    let mut reset = Vec::new();
    for dep in dependents {
        if results
            .get(&dep.id)
            .is_some_and(|r| r.status != PhaseStatus::Pending)
        {
            results.insert(dep.id.clone(), PhaseResult::pending(&dep.id, now));
            reset.push(dep.id.clone());
        }
    }

    if !reset.is_empty() {
        tracing::warn!(phase = %phase_id, reset = ?reset, "retry invalidated downstream phases");
    }
    Ok(reset)
}

/// Derive the pipeline status from the phase table and the latest results.
///
/// Priority: failure, then in-progress, then completion. Results for ids that
/// are not in `phases` are ignored.
pub fn compute_pipeline_status(phases: &[Phase], results: &RunResults) -> PipelineStatus {
    let status_of = |p: &Phase| results.get(&p.id).map(|r| r.status);

    if phases
        .iter()
        .any(|p| p.mandatory && status_of(p) == Some(PhaseStatus::Failed))
    {
        return PipelineStatus::Failed;
    }

    if phases.iter().all(|p| status_of(p).is_none()) {
        return PipelineStatus::Pending;
    }

    if phases
        .iter()
        .any(|p| status_of(p) == Some(PhaseStatus::Running))
    {
        return PipelineStatus::InProgress;
    }

    if phases
        .iter()
        .filter(|p| p.mandatory)
        .all(|p| status_of(p) == Some(PhaseStatus::Completed))
    {
        PipelineStatus::Completed
    } else {
        PipelineStatus::InProgress
    }
}
