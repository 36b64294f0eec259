//! Capability gate: the pre-execution check an executor runs before every
//! external tool call.
//!
//! The gate only reads. It borrows the immutable catalog and a caller-owned
//! [`ApprovalLedger`]; recording an approval is always the caller's act.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::catalog::{CapabilityCatalog, ErrorClass, FailureAction, PermissionLevel, ToolDescriptor};
use crate::decision::{Decision, DenialCategory};
use crate::phase::PhaseName;
use crate::pipeline::PipelineId;

/// Ids that name the protocol rather than a server implementing it.
pub(crate) const PROTOCOL_IDS: [&str; 3] = ["mcp", "model-context-protocol", "modelcontextprotocol"];

/// Where required environment variables are looked up.
pub trait EnvSource {
    fn get(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// One recorded approval for a tool within a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub tool: String,
    pub pipeline: PipelineId,
    pub approver: String,
    pub approved_at: DateTime<Utc>,
    /// False when granted by a blanket flag rather than a person
    #[serde(default = "default_explicit")]
    pub explicit: bool,
}

fn default_explicit() -> bool {
    true
}

/// Per-run record of approvals, owned and persisted by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLedger {
    #[serde(default)]
    approvals: Vec<Approval>,
}

impl ApprovalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an approval given by a named person.
    pub fn record(&mut self, tool: &str, pipeline: PipelineId, approver: &str) {
        self.push(tool, pipeline, approver, true);
    }

    /// Record a blanket approval (for example `--yes`). Never satisfies a mutating tool.
    pub fn record_blanket(&mut self, tool: &str, pipeline: PipelineId, source: &str) {
        self.push(tool, pipeline, source, false);
    }

    fn push(&mut self, tool: &str, pipeline: PipelineId, approver: &str, explicit: bool) {
        self.approvals.retain(|a| !(a.tool == tool && a.pipeline == pipeline));
        self.approvals.push(Approval {
            tool: tool.to_string(),
            pipeline,
            approver: approver.to_string(),
            approved_at: Utc::now(),
            explicit,
        });
    }

    pub fn get(&self, tool: &str, pipeline: PipelineId) -> Option<&Approval> {
        self.approvals
            .iter()
            .find(|a| a.tool == tool && a.pipeline == pipeline)
    }

    /// Whether a recorded approval satisfies a tool of the given level.
    pub fn satisfies(&self, tool: &str, pipeline: PipelineId, level: PermissionLevel) -> bool {
        self.get(tool, pipeline)
            .is_some_and(|a| a.explicit || level != PermissionLevel::Mutating)
    }

    pub fn len(&self) -> usize {
        self.approvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approvals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Approval> {
        self.approvals.iter()
    }
}

/// The gate's answer for one `(tool, pipeline, phase)` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPermission {
    pub tool: String,
    pub pipeline: PipelineId,
    pub phase: PhaseName,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<DenialCategory>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// The caller must obtain and record approval before the call proceeds
    pub approval_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_level: Option<PermissionLevel>,
}

impl ToolPermission {
    fn from_decision(tool: &str, pipeline: PipelineId, phase: PhaseName, decision: Decision) -> Self {
        Self {
            tool: tool.to_string(),
            pipeline,
            phase,
            allowed: decision.allowed,
            category: decision.category,
            reason: decision.reason,
            remediation: decision.remediation,
            approval_required: false,
            permission_level: None,
        }
    }

    pub fn decision(&self) -> Decision {
        Decision {
            allowed: self.allowed,
            category: self.category,
            reason: self.reason.clone(),
            remediation: self.remediation.clone(),
        }
    }

    pub fn is_denied_with(&self, category: DenialCategory) -> bool {
        !self.allowed && self.category == Some(category)
    }
}

/// Read-only view of the catalog that answers permission questions.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityGate<'a> {
    catalog: &'a CapabilityCatalog,
}

impl<'a> CapabilityGate<'a> {
    pub fn new(catalog: &'a CapabilityCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &'a CapabilityCatalog {
        self.catalog
    }

    /// Catalog membership, pipeline and phase allow-lists, and approval status.
    ///
    /// Checks run in order: unknown tool, pipeline, phase. A permitted tool that
    /// is not read-only (or is flagged `approvalRequired`) comes back with
    /// `approval_required` set until the ledger holds a satisfying approval.
    pub fn is_tool_permitted(
        &self,
        tool_id: &str,
        pipeline: PipelineId,
        phase: PhaseName,
        approvals: &ApprovalLedger,
    ) -> ToolPermission {
        let Some(tool) = self.catalog.tool(tool_id) else {
            let permission =
                ToolPermission::from_decision(tool_id, pipeline, phase, self.unknown_tool(tool_id));
            log_permission(&permission);
            return permission;
        };

        let decision = if !tool.allows_pipeline(pipeline) {
            Decision::deny(
                DenialCategory::ToolNotAllowedInPipeline,
                format!("Tool '{}' is not allowed in pipeline '{}'", tool_id, pipeline),
            )
            .with_remediation(format!(
                "'{}' is available to: {}",
                tool_id,
                join_display(&tool.allowed_pipelines)
            ))
        } else if !tool.allows_phase(pipeline, phase) {
            Decision::deny(
                DenialCategory::ToolNotAllowedInPhase,
                format!(
                    "Tool '{}' is not allowed in the '{}' phase of '{}'",
                    tool_id, phase, pipeline
                ),
            )
            .with_remediation(format!(
                "in '{}', '{}' may be used during: {}",
                pipeline,
                tool_id,
                join_display(tool.phases_for(pipeline))
            ))
        } else {
            Decision::allow(format!(
                "Tool '{}' is allowed in the '{}' phase of '{}'",
                tool_id, phase, pipeline
            ))
        };

        let mut permission = ToolPermission::from_decision(tool_id, pipeline, phase, decision);
        permission.permission_level = Some(tool.permission_level);
        if permission.allowed {
            permission.approval_required = needs_approval(tool)
                && !approvals.satisfies(tool_id, pipeline, tool.permission_level);
        }
        log_permission(&permission);
        permission
    }

    /// Full pre-execution check: permission, required environment, and approval.
    ///
    /// Unlike [`is_tool_permitted`](Self::is_tool_permitted), an outstanding
    /// approval is a denial here: the call must not proceed.
    pub fn authorize(
        &self,
        tool_id: &str,
        pipeline: PipelineId,
        phase: PhaseName,
        env: &dyn EnvSource,
        approvals: &ApprovalLedger,
    ) -> ToolPermission {
        let mut permission = self.is_tool_permitted(tool_id, pipeline, phase, approvals);
        if !permission.allowed {
            return permission;
        }
        let Some(tool) = self.catalog.tool(tool_id) else {
            return permission;
        };

        if let Some(missing) = tool
            .required_env_vars
            .iter()
            .find(|var| env.get(var).is_none_or(|value| value.trim().is_empty()))
        {
            permission.allowed = false;
            permission.category = Some(DenialCategory::MissingRequiredEnvVar);
            permission.reason = format!(
                "Tool '{}' requires environment variable {} which is not set",
                tool_id, missing
            );
            permission.remediation = Some(format!(
                "set {} before using `{}` in the `{}` phase",
                missing, tool_id, phase
            ));
            log_permission(&permission);
            return permission;
        }

        if permission.approval_required {
            permission.allowed = false;
            permission.category = Some(DenialCategory::ApprovalRequired);
            permission.reason = format!(
                "Tool '{}' is {} and has not been approved for '{}'",
                tool_id, tool.permission_level, pipeline
            );
            permission.remediation = Some(format!(
                "run `governor approve {} --pipeline {}` before the first call",
                tool_id, pipeline
            ));
            log_permission(&permission);
        }

        permission
    }

    /// How the executor should react to a failed call, per the catalog.
    pub fn failure_action(&self, tool_id: &str, class: ErrorClass) -> Option<FailureAction> {
        self.catalog.tool(tool_id)?.failure_action(class)
    }

    fn unknown_tool(&self, tool_id: &str) -> Decision {
        let known: Vec<&str> = self.catalog.tools().map(|(id, _)| id).collect();
        let reason = if PROTOCOL_IDS.contains(&tool_id.to_lowercase().as_str()) {
            format!(
                "'{}' names the protocol specification, not an invokable server",
                tool_id
            )
        } else {
            format!("Tool '{}' is not declared in the capability catalog", tool_id)
        };
        Decision::deny(DenialCategory::UnknownTool, reason)
            .with_remediation(format!("known tools: {}", known.join(", ")))
    }
}

fn needs_approval(tool: &ToolDescriptor) -> bool {
    tool.permission_level != PermissionLevel::ReadOnly || tool.approval_required
}

fn join_display<T: std::fmt::Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn log_permission(permission: &ToolPermission) {
    if permission.allowed {
        tracing::debug!(
            tool = %permission.tool,
            pipeline = %permission.pipeline,
            phase = %permission.phase,
            approval_required = permission.approval_required,
            "Tool permitted"
        );
    } else {
        tracing::warn!(
            tool = %permission.tool,
            pipeline = %permission.pipeline,
            phase = %permission.phase,
            category = ?permission.category,
            reason = %permission.reason,
            "Tool denied"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CapabilityCatalog {
        CapabilityCatalog::bundled().unwrap()
    }

    fn env(vars: &[(&str, &str)]) -> HashMap<String, String> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // =========================================
    // is_tool_permitted
    // =========================================

    #[test]
    fn test_stripe_in_build_needs_approval() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let p = gate.is_tool_permitted(
            "stripe",
            PipelineId::DappFactory,
            PhaseName::Build,
            &ApprovalLedger::new(),
        );
        assert!(p.allowed);
        assert!(p.approval_required);
        assert_eq!(p.permission_level, Some(PermissionLevel::Mutating));
    }

    #[test]
    fn test_stripe_in_verify_is_denied() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let p = gate.is_tool_permitted(
            "stripe",
            PipelineId::DappFactory,
            PhaseName::Verify,
            &ApprovalLedger::new(),
        );
        assert!(p.is_denied_with(DenialCategory::ToolNotAllowedInPhase));
        assert!(p.remediation.unwrap().contains("build"));
    }

    #[test]
    fn test_tool_outside_pipeline_is_denied() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let p = gate.is_tool_permitted(
            "stripe",
            PipelineId::WebsitePipeline,
            PhaseName::Build,
            &ApprovalLedger::new(),
        );
        assert!(p.is_denied_with(DenialCategory::ToolNotAllowedInPipeline));
    }

    #[test]
    fn test_unknown_tool_is_denied() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let p = gate.is_tool_permitted(
            "slack",
            PipelineId::AppFactory,
            PhaseName::Research,
            &ApprovalLedger::new(),
        );
        assert!(p.is_denied_with(DenialCategory::UnknownTool));
        assert!(p.remediation.unwrap().contains("github"));
    }

    #[test]
    fn test_protocol_id_is_not_a_tool() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let p = gate.is_tool_permitted(
            "MCP",
            PipelineId::AppFactory,
            PhaseName::Build,
            &ApprovalLedger::new(),
        );
        assert!(p.is_denied_with(DenialCategory::UnknownTool));
        assert!(p.reason.contains("protocol specification"));
    }

    #[test]
    fn test_read_only_tool_needs_no_approval() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let p = gate.is_tool_permitted(
            "context7",
            PipelineId::AgentFactory,
            PhaseName::Research,
            &ApprovalLedger::new(),
        );
        assert!(p.allowed);
        assert!(!p.approval_required);
    }

    #[test]
    fn test_recorded_approval_clears_requirement() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let mut ledger = ApprovalLedger::new();
        ledger.record("stripe", PipelineId::DappFactory, "alice");
        let p = gate.is_tool_permitted("stripe", PipelineId::DappFactory, PhaseName::Build, &ledger);
        assert!(p.allowed);
        assert!(!p.approval_required);
    }

    #[test]
    fn test_approval_is_scoped_to_pipeline() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let mut ledger = ApprovalLedger::new();
        ledger.record("github", PipelineId::AppFactory, "alice");
        let p = gate.is_tool_permitted("github", PipelineId::DappFactory, PhaseName::Build, &ledger);
        assert!(p.approval_required);
    }

    #[test]
    fn test_mutating_tool_is_never_auto_approved() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let mut ledger = ApprovalLedger::new();
        ledger.record_blanket("stripe", PipelineId::DappFactory, "--yes");
        ledger.record_blanket("github", PipelineId::DappFactory, "--yes");

        let stripe = gate.is_tool_permitted("stripe", PipelineId::DappFactory, PhaseName::Build, &ledger);
        assert!(stripe.approval_required);
        let github = gate.is_tool_permitted("github", PipelineId::DappFactory, PhaseName::Build, &ledger);
        assert!(!github.approval_required);
    }

    #[test]
    fn test_no_mutating_tool_ever_permitted_without_approval() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let ledger = ApprovalLedger::new();
        for (id, tool) in catalog.tools() {
            if tool.permission_level != PermissionLevel::Mutating {
                continue;
            }
            for pipeline in PipelineId::ALL {
                for phase in PhaseName::ALL {
                    let p = gate.is_tool_permitted(id, pipeline, phase, &ledger);
                    assert!(!p.allowed || p.approval_required, "{} {} {}", id, pipeline, phase);
                }
            }
        }
    }

    // =========================================
    // authorize
    // =========================================

    #[test]
    fn test_authorize_reports_missing_env_var() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let p = gate.authorize(
            "stripe",
            PipelineId::DappFactory,
            PhaseName::Build,
            &env(&[]),
            &ApprovalLedger::new(),
        );
        assert!(p.is_denied_with(DenialCategory::MissingRequiredEnvVar));
        assert_eq!(
            p.remediation.as_deref(),
            Some("set STRIPE_SECRET_KEY before using `stripe` in the `build` phase")
        );
    }

    #[test]
    fn test_authorize_treats_empty_value_as_missing() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let p = gate.authorize(
            "stripe",
            PipelineId::DappFactory,
            PhaseName::Build,
            &env(&[("STRIPE_SECRET_KEY", "  ")]),
            &ApprovalLedger::new(),
        );
        assert!(p.is_denied_with(DenialCategory::MissingRequiredEnvVar));
    }

    #[test]
    fn test_authorize_names_first_missing_var() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let mut ledger = ApprovalLedger::new();
        ledger.record("supabase", PipelineId::AppFactory, "alice");
        let p = gate.authorize(
            "supabase",
            PipelineId::AppFactory,
            PhaseName::Build,
            &env(&[("SUPABASE_URL", "https://x.supabase.co")]),
            &ledger,
        );
        assert!(p.reason.contains("SUPABASE_SERVICE_ROLE_KEY"));
    }

    #[test]
    fn test_authorize_requires_approval() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let p = gate.authorize(
            "stripe",
            PipelineId::DappFactory,
            PhaseName::Build,
            &env(&[("STRIPE_SECRET_KEY", "sk_test_123")]),
            &ApprovalLedger::new(),
        );
        assert!(p.is_denied_with(DenialCategory::ApprovalRequired));
        assert!(p.approval_required);
    }

    #[test]
    fn test_authorize_allows_when_satisfied() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let mut ledger = ApprovalLedger::new();
        ledger.record("stripe", PipelineId::DappFactory, "alice");
        let p = gate.authorize(
            "stripe",
            PipelineId::DappFactory,
            PhaseName::Build,
            &env(&[("STRIPE_SECRET_KEY", "sk_test_123")]),
            &ledger,
        );
        assert!(p.allowed);
        assert!(p.category.is_none());
        assert!(p.decision().allowed);
    }

    #[test]
    fn test_authorize_passes_through_denials() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let p = gate.authorize(
            "stripe",
            PipelineId::DappFactory,
            PhaseName::Deploy,
            &env(&[]),
            &ApprovalLedger::new(),
        );
        assert!(p.is_denied_with(DenialCategory::ToolNotAllowedInPhase));
    }

    // =========================================
    // Failure routing and ledger
    // =========================================

    #[test]
    fn test_failure_action_routing() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        assert_eq!(gate.failure_action("stripe", ErrorClass::Timeout), Some(FailureAction::Abort));
        assert_eq!(gate.failure_action("github", ErrorClass::Timeout), Some(FailureAction::Retry));
        assert_eq!(gate.failure_action("ghost", ErrorClass::Timeout), None);
    }

    #[test]
    fn test_ledger_replaces_previous_approval() {
        let mut ledger = ApprovalLedger::new();
        ledger.record_blanket("vercel", PipelineId::WebsitePipeline, "--yes");
        ledger.record("vercel", PipelineId::WebsitePipeline, "bob");
        assert_eq!(ledger.len(), 1);
        let approval = ledger.get("vercel", PipelineId::WebsitePipeline).unwrap();
        assert_eq!(approval.approver, "bob");
        assert!(approval.explicit);
        assert!(ledger.satisfies("vercel", PipelineId::WebsitePipeline, PermissionLevel::Mutating));
    }

    #[test]
    fn test_permission_serializes_camel_case() {
        let catalog = catalog();
        let gate = CapabilityGate::new(&catalog);
        let p = gate.is_tool_permitted(
            "stripe",
            PipelineId::DappFactory,
            PhaseName::Build,
            &ApprovalLedger::new(),
        );
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["approvalRequired"], true);
        assert_eq!(json["permissionLevel"], "mutating");
        assert_eq!(json["pipeline"], "dapp-factory");
    }
}
