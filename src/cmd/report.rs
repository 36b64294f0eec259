//! Governance self-test: `governor report`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use pipeline_governor::config::GovernorConfig;
use pipeline_governor::report::{Baseline, GovernanceReport};

use super::super::ReportFormat;
use super::Outcome;

pub fn cmd_report(
    config: &GovernorConfig,
    baseline: Option<&Path>,
    format: ReportFormat,
) -> Result<Outcome> {
    let catalog_path = config.catalog_path();
    let source = std::fs::read_to_string(catalog_path)
        .with_context(|| format!("Failed to read catalog: {}", catalog_path.display()))?;

    let baseline_path = baseline.map(Path::to_path_buf).or_else(|| config.baseline_path());
    let baseline = Baseline::load_or_builtin(baseline_path.as_deref())?;

    let scorecard = GovernanceReport::new(baseline).run(&source);

    match format {
        ReportFormat::Json => println!("{}", scorecard.to_json()?),
        ReportFormat::Text => {
            for line in scorecard.render_text().lines() {
                if let Some(rest) = line.strip_prefix("[PASS]") {
                    println!("[{}]{}", style("PASS").green().bold(), rest);
                } else if let Some(rest) = line.strip_prefix("[FAIL]") {
                    println!("[{}]{}", style("FAIL").red().bold(), rest);
                } else {
                    println!("{}", line);
                }
            }
        }
    }

    Ok(if scorecard.is_passing() {
        Outcome::Ok
    } else {
        Outcome::Failed
    })
}
