use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use pipeline_governor::catalog::ErrorClass;
use pipeline_governor::config::{CliOverrides, GovernorConfig};
use pipeline_governor::gate::ProcessEnv;
use pipeline_governor::phase::{PhaseName, PhaseStatus};
use pipeline_governor::pipeline::PipelineId;

mod cmd;

#[derive(Parser)]
#[command(name = "governor")]
#[command(
    version,
    about = "Governance for multi-pipeline build factories: phase ordering, write sandboxing, capability gating"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer approval prompts with a blanket approval (never enough for mutating tools)
    #[arg(long, global = true)]
    pub yes: bool,

    /// Print decisions and reports as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Factory repository root (defaults to GOVERNOR_REPO_ROOT, then the working directory)
    #[arg(long, global = true)]
    pub repo_root: Option<PathBuf>,

    /// Capability catalog path (overrides GOVERNOR_CATALOG and governance.toml)
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .governance/ with a default config and the bundled catalog
    Init {
        /// Overwrite existing config and catalog
        #[arg(long)]
        force: bool,
    },
    /// Check whether a pipeline may write a path
    CheckPath {
        target: String,
        #[arg(short, long)]
        pipeline: PipelineId,
    },
    /// Check whether a tool may be called in a pipeline phase
    CheckTool {
        tool: String,
        #[arg(short, long)]
        pipeline: PipelineId,
        #[arg(long)]
        phase: PhaseName,
        /// Only consult the allow-lists; skip environment and approval checks
        #[arg(long)]
        dry_run: bool,
    },
    /// Record an explicit approval for a tool in the current run
    Approve {
        tool: String,
        #[arg(short, long)]
        pipeline: PipelineId,
        /// Who approved (defaults to $USER)
        #[arg(long)]
        approver: Option<String>,
    },
    /// Move a phase to a new status
    Transition {
        phase: String,
        status: PhaseStatus,
        #[arg(short, long)]
        pipeline: PipelineId,
    },
    /// Retry a failed phase, resetting everything downstream
    Retry {
        phase: String,
        #[arg(short, long)]
        pipeline: PipelineId,
    },
    /// Show phase results and derived pipeline status
    Status {
        #[arg(short, long)]
        pipeline: Option<PipelineId>,
    },
    /// Discard the current run of a pipeline
    Reset {
        #[arg(short, long)]
        pipeline: PipelineId,
        #[arg(long)]
        force: bool,
    },
    /// List catalog tools, optionally as mapped for one pipeline
    List {
        #[arg(short, long)]
        pipeline: Option<PipelineId>,
    },
    /// Show how the executor should react to a failed tool call
    FailureAction { tool: String, class: ErrorClass },
    /// Run the governance self-test and print a scorecard
    Report {
        /// Permission baseline TOML (overrides [report] baseline)
        #[arg(long)]
        baseline: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "text")]
        format: ReportFormat,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default governance.toml
    Init,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = GovernorConfig::resolve(
        CliOverrides {
            repo_root: cli.repo_root.clone(),
            catalog: cli.catalog.clone(),
            verbose: cli.verbose,
        },
        &ProcessEnv,
    )?;
    pipeline_governor::logging::init(config.log_filter(), config.log_format())?;

    let outcome = match &cli.command {
        Commands::Init { force } => cmd::cmd_init(&config, *force)?,
        Commands::CheckPath { target, pipeline } => {
            cmd::cmd_check_path(&config, &cli, target, *pipeline)?
        }
        Commands::CheckTool {
            tool,
            pipeline,
            phase,
            dry_run,
        } => cmd::cmd_check_tool(&config, &cli, tool, *pipeline, *phase, *dry_run)?,
        Commands::Approve {
            tool,
            pipeline,
            approver,
        } => cmd::cmd_approve(&config, tool, *pipeline, approver.as_deref())?,
        Commands::Transition {
            phase,
            status,
            pipeline,
        } => cmd::cmd_transition(&config, &cli, *pipeline, phase, *status)?,
        Commands::Retry { phase, pipeline } => cmd::cmd_retry(&config, &cli, *pipeline, phase)?,
        Commands::Status { pipeline } => cmd::cmd_status(&config, &cli, *pipeline)?,
        Commands::Reset { pipeline, force } => cmd::cmd_reset(&config, *pipeline, *force)?,
        Commands::List { pipeline } => cmd::cmd_list(&config, &cli, *pipeline)?,
        Commands::FailureAction { tool, class } => {
            cmd::cmd_failure_action(&config, &cli, tool, *class)?
        }
        Commands::Report { baseline, format } => {
            cmd::cmd_report(&config, baseline.as_deref(), *format)?
        }
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    };

    let code = outcome.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
