//! Phase commands: `transition`, `retry`, `status`, `reset`.

use anyhow::Result;
use console::style;
use dialoguer::Confirm;

use pipeline_governor::config::GovernorConfig;
use pipeline_governor::phase::PhaseStatus;
use pipeline_governor::pipeline::PipelineId;
use pipeline_governor::state::{
    PipelineStatus, apply_transition, compute_pipeline_status, retry_phase,
};

use super::super::Cli;
use super::{Outcome, load_graph};

fn print_refusal(err: &pipeline_governor::errors::GovernanceError, json: bool) -> Result<Outcome> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "allowed": false,
                "category": err.category(),
                "reason": err.to_string(),
            })
        );
    } else {
        println!(
            "{} [{}] {}",
            style("refused").red().bold(),
            style(err.category()).yellow(),
            err
        );
    }
    Ok(Outcome::Denied)
}

pub fn cmd_transition(
    config: &GovernorConfig,
    cli: &Cli,
    pipeline: PipelineId,
    phase: &str,
    status: PhaseStatus,
) -> Result<Outcome> {
    if status == PhaseStatus::Pending {
        return cmd_retry(config, cli, pipeline, phase);
    }

    let graph = load_graph(config, pipeline)?;
    let store = config.run_store();
    let mut run = store.load_or_new(pipeline)?;

    let result = match apply_transition(&graph, phase, status, &mut run.results) {
        Ok(result) => result,
        Err(e) => return print_refusal(&e, cli.json),
    };
    store.save(&run)?;
    store.append_history(pipeline, phase, status)?;

    let pipeline_status = compute_pipeline_status(graph.phases(), &run.results);
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "allowed": true,
                "result": result,
                "pipeline_status": pipeline_status,
            }))?
        );
    } else {
        println!(
            "{} {} -> {} (pipeline {})",
            style("ok").green().bold(),
            phase,
            style(status).bold(),
            pipeline_status
        );
    }
    Ok(Outcome::Ok)
}

pub fn cmd_retry(
    config: &GovernorConfig,
    cli: &Cli,
    pipeline: PipelineId,
    phase: &str,
) -> Result<Outcome> {
    let graph = load_graph(config, pipeline)?;
    let store = config.run_store();
    let mut run = store.load_or_new(pipeline)?;

    let reset = match retry_phase(&graph, phase, &mut run.results) {
        Ok(reset) => reset,
        Err(e) => return print_refusal(&e, cli.json),
    };
    store.save(&run)?;
    store.append_history(pipeline, phase, PhaseStatus::Pending)?;
    for id in &reset {
        store.append_history(pipeline, id, PhaseStatus::Pending)?;
    }

    if cli.json {
        println!(
            "{}",
            serde_json::json!({ "allowed": true, "phase": phase, "reset": reset })
        );
    } else {
        println!("{} {} is pending again", style("ok").green().bold(), phase);
        if !reset.is_empty() {
            println!("  reset downstream: {}", reset.join(", "));
        }
    }
    Ok(Outcome::Ok)
}

pub fn cmd_status(config: &GovernorConfig, cli: &Cli, pipeline: Option<PipelineId>) -> Result<Outcome> {
    let pipelines: Vec<PipelineId> = match pipeline {
        Some(p) => vec![p],
        None => PipelineId::ALL.to_vec(),
    };
    let store = config.run_store();

    let mut summaries = Vec::new();
    for p in pipelines {
        let graph = load_graph(config, p)?;
        let run = store.load(p)?;
        let results = run.as_ref().map(|r| r.results.clone()).unwrap_or_default();
        let status = compute_pipeline_status(graph.phases(), &results);

        if cli.json {
            let phases: Vec<_> = graph
                .topological_order()
                .into_iter()
                .map(|ph| {
                    serde_json::json!({
                        "id": ph.id,
                        "mandatory": ph.mandatory,
                        "status": results.get(&ph.id).map(|r| r.status).unwrap_or_default(),
                    })
                })
                .collect();
            summaries.push(serde_json::json!({
                "pipeline": p,
                "status": status,
                "run_id": run.as_ref().map(|r| r.run_id.clone()),
                "phases": phases,
            }));
            continue;
        }

        println!();
        println!("{} {}", style(p).bold(), status_label(status));
        if let Some(run) = &run {
            println!(
                "  run {} started {}",
                style(&run.run_id).dim(),
                run.started_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        for ph in graph.topological_order() {
            let phase_status = results.get(&ph.id).map(|r| r.status).unwrap_or_default();
            println!(
                "  {:<10} {:<10}{}",
                ph.id,
                phase_status.as_str(),
                if ph.mandatory { "" } else { " (optional)" }
            );
        }
    }

    if cli.json {
        let value = if summaries.len() == 1 {
            summaries.remove(0)
        } else {
            serde_json::Value::Array(summaries)
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!();
    }
    Ok(Outcome::Ok)
}

fn status_label(status: PipelineStatus) -> String {
    match status {
        PipelineStatus::Pending => style(status).dim().to_string(),
        PipelineStatus::InProgress => style(status).cyan().to_string(),
        PipelineStatus::Completed => style(status).green().to_string(),
        PipelineStatus::Failed => style(status).red().to_string(),
    }
}

pub fn cmd_reset(config: &GovernorConfig, pipeline: PipelineId, force: bool) -> Result<Outcome> {
    if !force {
        let confirm = Confirm::new()
            .with_prompt(format!("Discard the current {} run and its history?", pipeline))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(Outcome::Ok);
        }
    }

    config.run_store().reset(pipeline)?;
    println!("Reset {}", pipeline);
    Ok(Outcome::Ok)
}
