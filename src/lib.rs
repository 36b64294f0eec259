//! Governance core for a multi-pipeline build factory.
//!
//! Six pipelines (`app-factory`, `dapp-factory`, ...) move through the same
//! five phases. This crate decides, for each of them:
//!
//! - which phase may run next ([`graph`], [`state`])
//! - where a pipeline may write ([`path_guard`])
//! - which external tool it may call, and in which phase ([`catalog`], [`gate`])
//!
//! and can audit its own configuration ([`report`]). Every refusal carries a
//! [`decision::DenialCategory`] so callers can branch on the reason.

pub mod catalog;
pub mod config;
pub mod decision;
pub mod errors;
pub mod gate;
pub mod graph;
pub mod init;
pub mod logging;
pub mod path_guard;
pub mod phase;
pub mod pipeline;
pub mod report;
pub mod run;
pub mod state;

pub use decision::{Decision, DenialCategory};
pub use errors::{CatalogError, GovernanceError};
