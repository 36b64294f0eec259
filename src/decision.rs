//! Structured allow/deny values returned by every runtime policy check.
//!
//! Denials are expected outcomes the caller must branch on, not errors.

use serde::{Deserialize, Serialize};

/// Every way a governance check can refuse a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DenialCategory {
    InvalidTransition,
    DependencyNotSatisfied,
    PathOutsideSandbox,
    ForbiddenPathPattern,
    InvalidFilename,
    UnknownTool,
    ToolNotAllowedInPipeline,
    ToolNotAllowedInPhase,
    MissingRequiredEnvVar,
    ApprovalRequired,
    CatalogMalformed,
}

impl DenialCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialCategory::InvalidTransition => "InvalidTransition",
            DenialCategory::DependencyNotSatisfied => "DependencyNotSatisfied",
            DenialCategory::PathOutsideSandbox => "PathOutsideSandbox",
            DenialCategory::ForbiddenPathPattern => "ForbiddenPathPattern",
            DenialCategory::InvalidFilename => "InvalidFilename",
            DenialCategory::UnknownTool => "UnknownTool",
            DenialCategory::ToolNotAllowedInPipeline => "ToolNotAllowedInPipeline",
            DenialCategory::ToolNotAllowedInPhase => "ToolNotAllowedInPhase",
            DenialCategory::MissingRequiredEnvVar => "MissingRequiredEnvVar",
            DenialCategory::ApprovalRequired => "ApprovalRequired",
            DenialCategory::CatalogMalformed => "CatalogMalformed",
        }
    }
}

impl std::fmt::Display for DenialCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The `{allowed, category, reason}` answer handed back to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<DenialCategory>,
    pub reason: String,
    /// What the operator can do to turn the denial into an allow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl Decision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            category: None,
            reason: reason.into(),
            remediation: None,
        }
    }

    pub fn deny(category: DenialCategory, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            category: Some(category),
            reason: reason.into(),
            remediation: None,
        }
    }

    pub fn with_remediation(mut self, hint: impl Into<String>) -> Self {
        self.remediation = Some(hint.into());
        self
    }

    pub fn is_denied_with(&self, category: DenialCategory) -> bool {
        !self.allowed && self.category == Some(category)
    }
}
