//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                                   |
//! |-----------|----------------------------------------------------|
//! | `project` | `Init`                                             |
//! | `path`    | `CheckPath`                                        |
//! | `tool`    | `CheckTool`, `Approve`, `List`, `FailureAction`    |
//! | `phase`   | `Transition`, `Retry`, `Status`, `Reset`           |
//! | `report`  | `Report`                                           |
//! | `config`  | `Config`                                           |
//!
//! Every command returns an [`Outcome`]; `main` turns it into the exit code.

pub mod config;
pub mod path;
pub mod phase;
pub mod project;
pub mod report;
pub mod tool;

pub use config::cmd_config;
pub use path::cmd_check_path;
pub use phase::{cmd_reset, cmd_retry, cmd_status, cmd_transition};
pub use project::cmd_init;
pub use report::cmd_report;
pub use tool::{cmd_approve, cmd_check_tool, cmd_failure_action, cmd_list};

use anyhow::Result;
use console::style;

use pipeline_governor::config::GovernorConfig;
use pipeline_governor::decision::Decision;
use pipeline_governor::graph::PhaseGraph;
use pipeline_governor::phase::load_phases_or_default;
use pipeline_governor::pipeline::PipelineId;

/// How a command ended, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Allowed, passed, or simply done
    Ok,
    /// A policy check said no
    Denied,
    /// A self-test failed
    Failed,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Ok => 0,
            Outcome::Denied => 2,
            Outcome::Failed => 1,
        }
    }

    pub fn from_allowed(allowed: bool) -> Self {
        if allowed { Outcome::Ok } else { Outcome::Denied }
    }
}

/// The phase graph for a pipeline: the configured phases file, or the built-in table.
pub(crate) fn load_graph(config: &GovernorConfig, pipeline: PipelineId) -> Result<PhaseGraph> {
    let phases_file = config.phases_file(pipeline);
    let phases = load_phases_or_default(pipeline, phases_file.as_deref())?;
    PhaseGraph::build(phases)
}

/// Print a decision in text or JSON and map it to an outcome.
pub(crate) fn print_decision(decision: &Decision, json: bool) -> Result<Outcome> {
    if json {
        println!("{}", serde_json::to_string_pretty(decision)?);
    } else if decision.allowed {
        println!("{} {}", style("allowed").green().bold(), decision.reason);
    } else {
        let category = decision
            .category
            .map(|c| c.to_string())
            .unwrap_or_default();
        println!(
            "{} [{}] {}",
            style("denied").red().bold(),
            style(category).yellow(),
            decision.reason
        );
        if let Some(hint) = &decision.remediation {
            println!("  {} {}", style("hint:").dim(), hint);
        }
    }
    Ok(Outcome::from_allowed(decision.allowed))
}
