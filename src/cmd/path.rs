//! Sandbox check for a single write target.

use anyhow::Result;

use pipeline_governor::config::GovernorConfig;
use pipeline_governor::pipeline::PipelineId;

use super::super::Cli;
use super::{Outcome, print_decision};

pub fn cmd_check_path(
    config: &GovernorConfig,
    cli: &Cli,
    target: &str,
    pipeline: PipelineId,
) -> Result<Outcome> {
    let decision = config.path_guard().check_write(target, pipeline);
    print_decision(&decision, cli.json)
}
