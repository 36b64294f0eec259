//! Capability commands: `check-tool`, `approve`, `list`, `failure-action`.

use anyhow::Result;
use console::style;
use dialoguer::{Select, theme::ColorfulTheme};

use pipeline_governor::catalog::{CapabilityCatalog, ErrorClass, PermissionLevel};
use pipeline_governor::config::GovernorConfig;
use pipeline_governor::decision::DenialCategory;
use pipeline_governor::gate::{CapabilityGate, ProcessEnv, ToolPermission};
use pipeline_governor::phase::PhaseName;
use pipeline_governor::pipeline::PipelineId;

use super::super::Cli;
use super::{Outcome, print_decision};

#[derive(Debug, Clone, Copy, PartialEq)]
enum PromptDecision {
    Approved,
    Rejected,
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "operator".to_string())
}

fn prompt_approval(permission: &ToolPermission) -> Result<PromptDecision> {
    let level = permission
        .permission_level
        .map(|l| l.to_string())
        .unwrap_or_default();
    println!(
        "  {} is {} and needs approval before its first call in {}",
        style(&permission.tool).bold(),
        style(level).yellow(),
        permission.pipeline
    );

    let options = &["Approve for this run", "Deny"];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Approve this tool?")
        .items(options)
        .default(1)
        .interact()?;

    Ok(match selection {
        0 => PromptDecision::Approved,
        _ => PromptDecision::Rejected,
    })
}

pub fn cmd_check_tool(
    config: &GovernorConfig,
    cli: &Cli,
    tool: &str,
    pipeline: PipelineId,
    phase: PhaseName,
    dry_run: bool,
) -> Result<Outcome> {
    let catalog = config.load_catalog()?;
    let gate = CapabilityGate::new(&catalog);
    let store = config.run_store();
    let mut run = store.load_or_new(pipeline)?;

    if dry_run {
        let permission = gate.is_tool_permitted(tool, pipeline, phase, &run.approvals);
        return print_permission(&permission, cli.json);
    }

    let mut permission = gate.authorize(tool, pipeline, phase, &ProcessEnv, &run.approvals);

    if permission.is_denied_with(DenialCategory::ApprovalRequired) {
        let mutating = permission.permission_level == Some(PermissionLevel::Mutating);
        let recorded = if cli.yes && !mutating {
            run.approvals.record_blanket(tool, pipeline, "--yes");
            true
        } else if console::Term::stdout().is_term() && !cli.json {
            match prompt_approval(&permission)? {
                PromptDecision::Approved => {
                    run.approvals.record(tool, pipeline, &current_user());
                    true
                }
                PromptDecision::Rejected => false,
            }
        } else {
            false
        };

        if recorded {
            store.save(&run)?;
            permission = gate.authorize(tool, pipeline, phase, &ProcessEnv, &run.approvals);
        }
    }

    print_permission(&permission, cli.json)
}

fn print_permission(permission: &ToolPermission, json: bool) -> Result<Outcome> {
    if json {
        println!("{}", serde_json::to_string_pretty(permission)?);
        return Ok(Outcome::from_allowed(permission.allowed));
    }
    let outcome = print_decision(&permission.decision(), false)?;
    if permission.allowed && permission.approval_required {
        println!(
            "  {} approval required before the first call",
            style("note:").yellow()
        );
    }
    Ok(outcome)
}

pub fn cmd_approve(
    config: &GovernorConfig,
    tool: &str,
    pipeline: PipelineId,
    approver: Option<&str>,
) -> Result<Outcome> {
    let catalog = config.load_catalog()?;
    let Some(descriptor) = catalog.tool(tool) else {
        anyhow::bail!("Tool '{}' is not declared in the capability catalog", tool);
    };
    if !descriptor.allows_pipeline(pipeline) {
        anyhow::bail!("Tool '{}' is not allowed in pipeline '{}'", tool, pipeline);
    }

    let store = config.run_store();
    let mut run = store.load_or_new(pipeline)?;
    let approver = approver.map(str::to_string).unwrap_or_else(current_user);
    run.approvals.record(tool, pipeline, &approver);
    store.save(&run)?;

    tracing::info!(%tool, %pipeline, %approver, run_id = %run.run_id, "Recorded approval");
    println!(
        "Approved {} ({}) for {} run {} by {}",
        style(tool).bold(),
        descriptor.permission_level,
        pipeline,
        style(&run.run_id).dim(),
        approver
    );
    Ok(Outcome::Ok)
}

pub fn cmd_list(config: &GovernorConfig, cli: &Cli, pipeline: Option<PipelineId>) -> Result<Outcome> {
    let catalog = config.load_catalog()?;

    if cli.json {
        let value = match pipeline {
            Some(p) => serde_json::to_value(catalog.integration(p))?,
            None => serde_json::to_value(&catalog.document().mcp_servers)?,
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(Outcome::Ok);
    }

    println!();
    println!(
        "Catalog {} ({})",
        catalog.version(),
        style(&catalog.fingerprint()[..12]).dim()
    );
    println!();

    match pipeline {
        None => list_tools(&catalog),
        Some(p) => list_pipeline(&catalog, p),
    }
    println!();
    Ok(Outcome::Ok)
}

fn list_tools(catalog: &CapabilityCatalog) {
    println!("{:<12} {:<11} {:<9} Pipelines", "Tool", "Level", "Approval");
    println!("{:<12} {:<11} {:<9} ---------", "----", "-----", "--------");
    for (id, tool) in catalog.tools() {
        let pipelines: Vec<&str> = tool.allowed_pipelines.iter().map(|p| p.as_str()).collect();
        println!(
            "{:<12} {:<11} {:<9} {}",
            id,
            tool.permission_level.as_str(),
            if tool.approval_required { "yes" } else { "no" },
            pipelines.join(", ")
        );
    }
}

fn list_pipeline(catalog: &CapabilityCatalog, pipeline: PipelineId) {
    println!("{} ({})", style(pipeline).bold(), pipeline.description());
    let Some(integration) = catalog.integration(pipeline) else {
        println!("  no tools are integrated with this pipeline");
        return;
    };
    for phase in PhaseName::ALL {
        let tools = integration
            .phase_mapping
            .get(&phase)
            .map(|t| t.join(", "))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<9} {}", phase.as_str(), tools);
    }
}

pub fn cmd_failure_action(
    config: &GovernorConfig,
    cli: &Cli,
    tool: &str,
    class: ErrorClass,
) -> Result<Outcome> {
    let catalog = config.load_catalog()?;
    let gate = CapabilityGate::new(&catalog);
    if catalog.tool(tool).is_none() {
        anyhow::bail!("Tool '{}' is not declared in the capability catalog", tool);
    }

    let action = gate.failure_action(tool, class);
    if cli.json {
        println!(
            "{}",
            serde_json::json!({ "tool": tool, "class": class, "action": action })
        );
    } else {
        match action {
            Some(a) => println!("{} {} -> {}", tool, class, style(a).bold()),
            None => println!("{} {} -> {}", tool, class, style("undeclared").yellow()),
        }
    }
    Ok(Outcome::Ok)
}
