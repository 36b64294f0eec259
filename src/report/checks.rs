//! The individual governance checks.
//!
//! Each check is pure: it reads the catalog (when one could be read) and the
//! built-in tables, and returns the violations it found.

use crate::catalog::{CapabilityCatalog, ErrorClass, FailureAction, PermissionLevel, ToolDescriptor};
use crate::decision::DenialCategory;
use crate::errors::GovernanceError;
use crate::gate::{ApprovalLedger, CapabilityGate, PROTOCOL_IDS, ToolPermission};
use crate::graph::PhaseGraph;
use crate::path_guard;
use crate::phase::{Phase, PhaseName, PhaseResult, PhaseStatus, RunResults};
use crate::pipeline::{Pipeline, PipelineId, allowed_directories};
use crate::state::{is_valid_transition, transition_phase};

use super::{Severity, Violation};

/// Repository root used for the synthetic path probes.
const PROBE_ROOT: &str = "/governance-selftest";

/// Output of one check before it is folded into the scorecard.
pub(crate) struct CheckOutput {
    pub summary: String,
    pub violations: Vec<Violation>,
}

fn violation(check: &str, category: Option<DenialCategory>, severity: Severity, message: String) -> Violation {
    Violation {
        check: check.to_string(),
        category,
        message,
        severity,
    }
}

pub(crate) fn catalog_structure(issues: &[String]) -> CheckOutput {
    let violations = issues
        .iter()
        .map(|issue| {
            violation(
                "catalog-structure",
                Some(DenialCategory::CatalogMalformed),
                Severity::High,
                issue.clone(),
            )
        })
        .collect();
    CheckOutput {
        summary: format!("{} load-time issue(s)", issues.len()),
        violations,
    }
}

/// Every tool, pipeline and phase combination against the declared allow-lists.
pub(crate) fn phase_gate(catalog: &CapabilityCatalog) -> CheckOutput {
    const CHECK: &str = "phase-gate";
    let gate = CapabilityGate::new(catalog);
    let ledger = ApprovalLedger::new();
    let mut violations = Vec::new();
    let mut combinations = 0usize;

    for (id, tool) in catalog.tools() {
        if PROTOCOL_IDS.contains(&id.to_lowercase().as_str()) {
            violations.push(violation(
                CHECK,
                Some(DenialCategory::UnknownTool),
                Severity::High,
                format!("'{}' names the protocol specification and must not be an invokable tool", id),
            ));
        }

        for pipeline in PipelineId::ALL {
            for phase in PhaseName::ALL {
                combinations += 1;
                let permission = gate.is_tool_permitted(id, pipeline, phase, &ledger);

                if let Some((category, message)) = gate_disagreement(tool, &permission) {
                    violations.push(violation(CHECK, Some(category), Severity::High, message));
                }

                if permission.allowed
                    && tool.permission_level == PermissionLevel::Mutating
                    && !permission.approval_required
                {
                    violations.push(violation(
                        CHECK,
                        Some(DenialCategory::ApprovalRequired),
                        Severity::High,
                        format!(
                            "mutating tool '{}' was permitted in {}/{} without requiring approval",
                            id, pipeline, phase
                        ),
                    ));
                }
            }
        }
    }

    CheckOutput {
        summary: format!("{} combinations checked", combinations),
        violations,
    }
}

/// Where the gate's answer departs from the tool's declared allow-lists,
/// including a denial filed under the wrong category.
fn gate_disagreement(tool: &ToolDescriptor, permission: &ToolPermission) -> Option<(DenialCategory, String)> {
    let (pipeline, phase) = (permission.pipeline, permission.phase);
    let expected = if !tool.allows_pipeline(pipeline) {
        Some(DenialCategory::ToolNotAllowedInPipeline)
    } else if !tool.phases_for(pipeline).contains(&phase) {
        Some(DenialCategory::ToolNotAllowedInPhase)
    } else {
        None
    };

    let agrees = match expected {
        None => permission.allowed,
        Some(category) => permission.is_denied_with(category),
    };
    if agrees {
        return None;
    }

    let answered = if permission.allowed {
        "allowed".to_string()
    } else {
        format!(
            "denied ({})",
            permission.category.map(|c| c.as_str()).unwrap_or("uncategorized")
        )
    };
    let declared = match expected {
        None => "allowed".to_string(),
        Some(category) => format!("denied ({})", category),
    };
    Some((
        expected.unwrap_or(DenialCategory::ToolNotAllowedInPhase),
        format!(
            "'{}' in {}/{}: gate answered {} but the catalog declares {}",
            permission.tool, pipeline, phase, answered, declared
        ),
    ))
}

pub(crate) fn permission_baseline(catalog: &CapabilityCatalog, baseline: &super::Baseline) -> CheckOutput {
    const CHECK: &str = "permission-baseline";
    let mut violations = Vec::new();
    let mut compared = 0usize;

    for (id, tool) in catalog.tools() {
        if tool.permission_level == PermissionLevel::Mutating && !tool.approval_required {
            violations.push(violation(
                CHECK,
                Some(DenialCategory::ApprovalRequired),
                Severity::High,
                format!("mutating tool '{}' does not declare approvalRequired", id),
            ));
        }

        let Some(expected) = baseline.expected(id) else {
            violations.push(violation(
                CHECK,
                None,
                Severity::Low,
                format!("'{}' has no baseline entry (declared {})", id, tool.permission_level),
            ));
            continue;
        };
        compared += 1;

        if tool.permission_level < expected {
            violations.push(violation(
                CHECK,
                None,
                Severity::High,
                format!(
                    "'{}' declares {} but the baseline expects {}",
                    id, tool.permission_level, expected
                ),
            ));
        } else if tool.permission_level > expected {
            violations.push(violation(
                CHECK,
                None,
                Severity::Medium,
                format!(
                    "'{}' declares {} which exceeds the baseline {}",
                    id, tool.permission_level, expected
                ),
            ));
        }
    }

    CheckOutput {
        summary: format!("{} tool(s) compared against the baseline", compared),
        violations,
    }
}

pub(crate) fn failure_behavior(catalog: &CapabilityCatalog) -> CheckOutput {
    const CHECK: &str = "failure-behavior";
    let mut violations = Vec::new();

    for (id, tool) in catalog.tools() {
        if tool.failure_behavior.is_empty() {
            violations.push(violation(
                CHECK,
                None,
                Severity::High,
                format!("'{}' declares no failureBehavior", id),
            ));
            continue;
        }

        for class in ErrorClass::REQUIRED {
            if !tool.failure_behavior.contains_key(&class) {
                violations.push(violation(
                    CHECK,
                    None,
                    Severity::Medium,
                    format!("'{}' does not route {}", id, class),
                ));
            }
        }

        if tool.permission_level == PermissionLevel::Mutating
            && tool.failure_behavior.get(&ErrorClass::Timeout) == Some(&FailureAction::Retry)
        {
            violations.push(violation(
                CHECK,
                None,
                Severity::Low,
                format!("mutating tool '{}' retries on timeout and may repeat a side effect", id),
            ));
        }
    }

    CheckOutput {
        summary: format!("{} tool(s) inspected", catalog.tools().count()),
        violations,
    }
}

pub(crate) fn global_rules(catalog: &CapabilityCatalog) -> CheckOutput {
    const CHECK: &str = "global-rules";
    let mut violations = Vec::new();

    match catalog.global_rules() {
        None => violations.push(violation(
            CHECK,
            None,
            Severity::High,
            "globalRules block is missing".to_string(),
        )),
        Some(rules) => {
            if rules.cross_pipeline_isolation != Some(true) {
                violations.push(violation(
                    CHECK,
                    Some(DenialCategory::PathOutsideSandbox),
                    Severity::High,
                    "globalRules.crossPipelineIsolation is not enabled".to_string(),
                ));
            }
            if !rules.failure_logging.as_ref().is_some_and(|f| f.enabled) {
                violations.push(violation(
                    CHECK,
                    None,
                    Severity::Medium,
                    "globalRules.failureLogging is not enabled".to_string(),
                ));
            }
            if rules.approval_required_for_mutating == Some(false) {
                violations.push(violation(
                    CHECK,
                    Some(DenialCategory::ApprovalRequired),
                    Severity::High,
                    "globalRules.approvalRequiredForMutating is disabled".to_string(),
                ));
            }
        }
    }

    CheckOutput {
        summary: "isolation, failure logging, approvals".to_string(),
        violations,
    }
}

/// The allowed-directory table is self-rooted and no pipeline can reach another's tree.
pub(crate) fn directory_isolation() -> CheckOutput {
    const CHECK: &str = "directory-isolation";
    let mut violations = Vec::new();
    let mut probes = 0usize;

    for pipeline in PipelineId::ALL {
        for dir in allowed_directories(pipeline) {
            if !dir.starts_with(&format!("{}/", pipeline)) {
                violations.push(violation(
                    CHECK,
                    Some(DenialCategory::PathOutsideSandbox),
                    Severity::High,
                    format!("{} allows '{}' outside its own tree", pipeline, dir),
                ));
            }
            if !dir.ends_with('/') {
                violations.push(violation(
                    CHECK,
                    None,
                    Severity::Medium,
                    format!("{} directory '{}' lacks a trailing separator", pipeline, dir),
                ));
            }

            probes += 1;
            let own = format!("{}/{}probe.txt", PROBE_ROOT, dir);
            if !path_guard::is_path_allowed(&own, pipeline, PROBE_ROOT) {
                violations.push(violation(
                    CHECK,
                    None,
                    Severity::High,
                    format!("{} cannot write inside its own directory '{}'", pipeline, dir),
                ));
            }
        }

        for other in PipelineId::ALL.into_iter().filter(|o| *o != pipeline) {
            for dir in allowed_directories(other) {
                if allowed_directories(pipeline).iter().any(|mine| dir.starts_with(mine) || mine.starts_with(dir)) {
                    violations.push(violation(
                        CHECK,
                        Some(DenialCategory::PathOutsideSandbox),
                        Severity::High,
                        format!("{} and {} share the prefix '{}'", pipeline, other, dir),
                    ));
                }

                probes += 1;
                let foreign = format!("{}/{}probe.txt", PROBE_ROOT, dir);
                if path_guard::check_write(&foreign, pipeline, PROBE_ROOT).allowed {
                    violations.push(violation(
                        CHECK,
                        Some(DenialCategory::PathOutsideSandbox),
                        Severity::High,
                        format!("{} may write into {}'s directory '{}'", pipeline, other, dir),
                    ));
                }
            }
        }
    }

    CheckOutput {
        summary: format!("{} path probes", probes),
        violations,
    }
}

/// Every built-in graph builds and draws its ids from the phase vocabulary.
pub(crate) fn phase_graphs() -> CheckOutput {
    const CHECK: &str = "phase-graphs";
    let mut violations = Vec::new();

    for id in PipelineId::ALL {
        let pipeline = Pipeline::builtin(id);
        if let Err(e) = PhaseGraph::build(pipeline.phases.clone()) {
            violations.push(violation(
                CHECK,
                None,
                Severity::High,
                format!("{} phase graph is invalid: {}", id, e),
            ));
            continue;
        }
        for phase in &pipeline.phases {
            if phase.phase_name().is_none() {
                violations.push(violation(
                    CHECK,
                    None,
                    Severity::Medium,
                    format!("{} phase '{}' is outside the phase vocabulary", id, phase.id),
                ));
            }
        }
        for name in PhaseName::ALL {
            if !pipeline.phases.iter().any(|p| p.phase_name() == Some(name)) {
                violations.push(violation(
                    CHECK,
                    None,
                    Severity::Medium,
                    format!("{} has no '{}' phase", id, name),
                ));
            }
        }
    }

    CheckOutput {
        summary: format!("{} pipelines", PipelineId::ALL.len()),
        violations,
    }
}

/// Exercise every `(from, to)` pair and the dependency gate.
pub(crate) fn transition_table() -> CheckOutput {
    const CHECK: &str = "transition-table";
    let mut violations = Vec::new();
    let standalone = Phase::new("probe", "Probe");
    let empty = RunResults::new();

    for from in PhaseStatus::ALL {
        let mut current = PhaseResult::pending(&standalone.id, chrono::Utc::now());
        current.status = from;
        for to in PhaseStatus::ALL {
            let accepted = transition_phase(&standalone, Some(&current), to, &empty).is_ok();
            if accepted != is_valid_transition(from, to) {
                violations.push(violation(
                    CHECK,
                    Some(DenialCategory::InvalidTransition),
                    Severity::High,
                    format!("{} -> {} was {}", from, to, if accepted { "accepted" } else { "refused" }),
                ));
            }
        }
    }

    for terminal in PhaseStatus::ALL.into_iter().filter(PhaseStatus::is_terminal) {
        if PhaseStatus::ALL.into_iter().any(|to| is_valid_transition(terminal, to)) {
            violations.push(violation(
                CHECK,
                Some(DenialCategory::InvalidTransition),
                Severity::High,
                format!("terminal status {} has an outgoing transition", terminal),
            ));
        }
    }

    let dependent = Phase::new("downstream", "Downstream").with_dependencies(&["probe"]);
    match transition_phase(&dependent, None, PhaseStatus::Running, &empty) {
        Err(GovernanceError::DependencyNotSatisfied { .. }) => {}
        other => violations.push(violation(
            CHECK,
            Some(DenialCategory::DependencyNotSatisfied),
            Severity::High,
            format!("starting a phase with a pending dependency returned {:?}", other.map(|r| r.status)),
        )),
    }

    CheckOutput {
        summary: format!("{} transition pairs", PhaseStatus::ALL.len() * PhaseStatus::ALL.len()),
        violations,
    }
}
