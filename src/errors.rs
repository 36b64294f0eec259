//! Typed error hierarchy for the governance core.
//!
//! Two top-level enums cover the two failure modes:
//! - `GovernanceError`: a phase transition the state machine refuses
//! - `CatalogError`: a capability catalog that cannot be trusted (fatal at load)

use thiserror::Error;

use crate::decision::DenialCategory;
use crate::phase::PhaseStatus;

/// Refusals from the phase state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("Phase '{phase}' cannot move from {from} to {to}")]
    InvalidTransition {
        phase: String,
        from: PhaseStatus,
        to: PhaseStatus,
    },

    #[error("Phase '{phase}' cannot start: dependency '{dependency}' is {status}, not completed")]
    DependencyNotSatisfied {
        phase: String,
        dependency: String,
        status: PhaseStatus,
    },

    #[error("Phase '{phase}' is not defined for this pipeline")]
    UnknownPhase { phase: String },
}

impl GovernanceError {
    pub fn category(&self) -> DenialCategory {
        match self {
            GovernanceError::InvalidTransition { .. } | GovernanceError::UnknownPhase { .. } => {
                DenialCategory::InvalidTransition
            }
            GovernanceError::DependencyNotSatisfied { .. } => {
                DenialCategory::DependencyNotSatisfied
            }
        }
    }
}

/// A catalog that failed load-time self-validation.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog at {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Catalog failed validation with {} issue(s):\n  - {}", issues.len(), issues.join("\n  - "))]
    Invalid { issues: Vec<String> },
}

impl CatalogError {
    pub fn category(&self) -> DenialCategory {
        DenialCategory::CatalogMalformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_carries_states() {
        let err = GovernanceError::InvalidTransition {
            phase: "build".into(),
            from: PhaseStatus::Completed,
            to: PhaseStatus::Running,
        };
        assert_eq!(err.category(), DenialCategory::InvalidTransition);
        assert_eq!(
            err.to_string(),
            "Phase 'build' cannot move from completed to running"
        );
    }

    #[test]
    fn dependency_error_names_dependency() {
        let err = GovernanceError::DependencyNotSatisfied {
            phase: "verify".into(),
            dependency: "build".into(),
            status: PhaseStatus::Running,
        };
        assert_eq!(err.category(), DenialCategory::DependencyNotSatisfied);
        assert!(err.to_string().contains("dependency 'build' is running"));
    }

    #[test]
    fn catalog_invalid_lists_every_issue() {
        let err = CatalogError::Invalid {
            issues: vec!["first".into(), "second".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 issue(s)"));
        assert!(msg.contains("- first"));
        assert!(msg.contains("- second"));
        assert_eq!(err.category(), DenialCategory::CatalogMalformed);
    }

    #[test]
    fn catalog_read_error_carries_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = CatalogError::Read {
            path: "/etc/catalog.json".into(),
            source: io_err,
        };
        match &err {
            CatalogError::Read { path, source } => {
                assert_eq!(path.to_str(), Some("/etc/catalog.json"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected Read"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&GovernanceError::UnknownPhase { phase: "x".into() });
        assert_std_error(&CatalogError::Invalid { issues: vec![] });
    }
}
