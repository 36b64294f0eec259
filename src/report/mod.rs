//! Governance report: an offline self-test of the catalog and the built-in
//! policy tables, producing a scorecard.
//!
//! The harness runs even when the catalog fails load-time validation; the
//! structural issues become `catalog-structure` violations instead of aborting.
//!
//! ## Checks
//!
//! - `catalog-structure`: load-time validation issues
//! - `phase-gate`: every tool × pipeline × phase against the allow-lists
//! - `permission-baseline`: declared permission levels against a [`Baseline`]
//! - `failure-behavior`: failure routing declared for auth, timeout and rate limits
//! - `global-rules`: cross-pipeline isolation and failure logging enabled
//! - `directory-isolation`: the allowed-directory table is disjoint
//! - `phase-graphs`: built-in phase graphs are acyclic and use the vocabulary
//! - `transition-table`: only the table's transitions are accepted
//!
//! ## Example
//!
//! ```
//! use pipeline_governor::catalog::BUNDLED_CATALOG;
//! use pipeline_governor::report::{Baseline, GovernanceReport};
//!
//! let scorecard = GovernanceReport::new(Baseline::builtin()).run(BUNDLED_CATALOG);
//! assert!(scorecard.is_passing());
//! assert_eq!(scorecard.exit_code(), 0);
//! ```

pub mod baseline;
mod checks;

pub use baseline::Baseline;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::catalog::{self, CapabilityCatalog};
use crate::decision::DenialCategory;
use checks::CheckOutput;

/// Names of every check, in report order.
pub const CHECK_NAMES: [&str; 8] = [
    "catalog-structure",
    "phase-gate",
    "permission-baseline",
    "failure-behavior",
    "global-rules",
    "directory-isolation",
    "phase-graphs",
    "transition-table",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported but does not fail the check
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn is_failing(&self) -> bool {
        *self >= Severity::Medium
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub check: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<DenialCategory>,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub summary: String,
    pub violations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scorecard {
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_version: Option<String>,
    pub catalog_fingerprint: String,
    pub checks: Vec<CheckResult>,
    pub violations: Vec<Violation>,
    pub passed: usize,
    pub total: usize,
}

impl Scorecard {
    pub fn is_passing(&self) -> bool {
        self.passed == self.total
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_passing() { 0 } else { 1 }
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn violations_for<'a>(&'a self, check: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations.iter().filter(move |v| v.check == check)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Governance report ({})", self.generated_at.to_rfc3339());
        let _ = writeln!(
            out,
            "Catalog: version {}  sha256 {}",
            self.catalog_version.as_deref().unwrap_or("unknown"),
            self.catalog_fingerprint
        );
        let _ = writeln!(out);

        for check in &self.checks {
            let _ = writeln!(
                out,
                "[{}] {:<20} {}",
                if check.passed { "PASS" } else { "FAIL" },
                check.name,
                check.summary
            );
            for v in self.violations_for(&check.name) {
                let _ = writeln!(out, "       {:<6} {}", v.severity, v.message);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "{}/{} checks passed", self.passed, self.total);
        out
    }
}

/// Runs every check against one catalog source.
#[derive(Debug, Clone)]
pub struct GovernanceReport {
    baseline: Baseline,
}

impl GovernanceReport {
    pub fn new(baseline: Baseline) -> Self {
        Self { baseline }
    }

    pub fn run(&self, catalog_source: &str) -> Scorecard {
        let inspection = catalog::inspect(catalog_source);
        let catalog = inspection
            .document
            .map(|doc| CapabilityCatalog::unchecked(doc, inspection.fingerprint.clone()));

        let mut outputs: Vec<(&str, CheckOutput)> = Vec::with_capacity(CHECK_NAMES.len());
        outputs.push(("catalog-structure", checks::catalog_structure(&inspection.issues)));

        match &catalog {
            Some(c) => {
                outputs.push(("phase-gate", checks::phase_gate(c)));
                outputs.push(("permission-baseline", checks::permission_baseline(c, &self.baseline)));
                outputs.push(("failure-behavior", checks::failure_behavior(c)));
                outputs.push(("global-rules", checks::global_rules(c)));
            }
            None => {
                for name in ["phase-gate", "permission-baseline", "failure-behavior", "global-rules"] {
                    outputs.push((name, unreadable(name)));
                }
            }
        }

        outputs.push(("directory-isolation", checks::directory_isolation()));
        outputs.push(("phase-graphs", checks::phase_graphs()));
        outputs.push(("transition-table", checks::transition_table()));

        let mut checks = Vec::with_capacity(outputs.len());
        let mut violations = Vec::new();
        for (name, output) in outputs {
            let passed = !output.violations.iter().any(|v| v.severity.is_failing());
            checks.push(CheckResult {
                name: name.to_string(),
                passed,
                summary: output.summary,
                violations: output.violations.len(),
            });
            violations.extend(output.violations);
        }

        let passed = checks.iter().filter(|c| c.passed).count();
        let total = checks.len();
        tracing::info!(passed, total, violations = violations.len(), "Governance report complete");

        Scorecard {
            generated_at: Utc::now(),
            catalog_version: catalog
                .as_ref()
                .map(|c| c.version().to_string())
                .filter(|v| !v.is_empty()),
            catalog_fingerprint: inspection.fingerprint,
            checks,
            violations,
            passed,
            total,
        }
    }
}

fn unreadable(check: &str) -> CheckOutput {
    CheckOutput {
        summary: "skipped".to_string(),
        violations: vec![Violation {
            check: check.to_string(),
            category: Some(DenialCategory::CatalogMalformed),
            message: "catalog could not be read".to_string(),
            severity: Severity::High,
        }],
    }
}
