//! CLI command definitions for swe-validate.
//!
//! `run` drives agent conversations against an instance file, `validate`
//! runs the fixed clone/install/test pipeline without a model, and `summary`
//! tabulates the results log.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use crate::config::{batch_models, get_api_key, get_base_url, load_instance, resolve_candidates};
use crate::conversation::ValidationTarget;
use crate::error::ValidateError;
use crate::llm::{ModelSelector, OpenAiProvider, DEFAULT_TEMPERATURE};
use crate::recorder::{read_records, render_summary, SummaryFilter};
use crate::runner::direct::FAILURE_TAIL_LINES;
use crate::runner::{
    batch_plans, save_failure_logs, validate_direct, AgentMode, DirectOutcome, RunnerConfig,
    ValidationRunner,
};
use crate::sandbox::{tail_lines, DockerSandbox, SandboxConfig, SandboxOutput, DEFAULT_IMAGE};

/// Default host directory mounted into every container.
const DEFAULT_WORKDIR: &str = "sandbox";

/// Results log file name inside the work directory.
const RESULTS_FILE: &str = "results.jsonl";

/// Validate Python repositories in Docker with LLM agents.
#[derive(Parser)]
#[command(name = "swe-validate")]
#[command(about = "Validate Python repositories inside Docker with LLM agents")]
#[command(version)]
#[command(
    long_about = "swe-validate clones a repository into a disposable Docker sandbox, installs it and runs its tests, \
either through a tool-using agent conversation or a fixed pipeline.\n\nExample usage:\n  \
swe-validate run one instance.json --models org/model-a,org/model-b\n  \
swe-validate validate https://github.com/pytest-dev/pytest collection\n  \
swe-validate summary --team one-agent"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Docker image every sandbox command runs in.
    #[arg(long, env = "SWE_IMAGE", default_value = DEFAULT_IMAGE, global = true)]
    pub image: String,

    /// Host directory bind-mounted at /workspace.
    #[arg(long, env = "SWE_WORKDIR", default_value = DEFAULT_WORKDIR, global = true)]
    pub workdir: PathBuf,

    /// Results log (default: <workdir>/results.jsonl).
    #[arg(long, env = "SWE_RESULTS", global = true)]
    pub results: Option<PathBuf>,

    /// Per-command sandbox timeout in seconds (default: none).
    #[arg(long, env = "SWE_TIMEOUT_SECS", global = true)]
    pub timeout_secs: Option<u64>,
}

impl Cli {
    fn results_path(&self) -> PathBuf {
        self.results
            .clone()
            .unwrap_or_else(|| self.workdir.join(RESULTS_FILE))
    }

    fn sandbox_config(&self) -> SandboxConfig {
        let config = SandboxConfig::new(self.image.clone()).with_host_dir(self.workdir.clone());
        match self.timeout_secs {
            Some(secs) if secs > 0 => config.with_timeout(Duration::from_secs(secs)),
            _ => config,
        }
    }
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run agent conversations against an instance, once per model.
    Run(RunArgs),

    /// Clone, install and test a repository without a model.
    Validate(ValidateArgs),

    /// Print a tab-separated table of recorded outcomes.
    Summary(SummaryArgs),
}

/// Arguments for `swe-validate run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Agent roster: `one` or `team`.
    pub mode: AgentMode,

    /// Instance file (JSON, or YAML by extension).
    pub instance: PathBuf,

    /// Comma-separated models; one sub-run each.
    #[arg(long, env = "CHUTES_MODELS")]
    pub models: Option<String>,

    /// Single model; used when no model list is given.
    #[arg(long, env = "CHUTES_MODEL")]
    pub model: Option<String>,

    /// Override the mode's turn cap.
    #[arg(long)]
    pub max_turns: Option<usize>,

    /// Parse tool calls from reply text instead of native function calls.
    #[arg(long)]
    pub no_native_tools: bool,
}

/// Arguments for `swe-validate validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Repository URL to clone.
    pub repo_url: String,

    /// Optional pytest `-k` expression.
    #[arg(default_value = "")]
    pub k_expr: String,
}

/// Arguments for `swe-validate summary`.
#[derive(Parser, Debug)]
pub struct SummaryArgs {
    /// Only rows for this instance id.
    #[arg(long, env = "FILTER_INSTANCE")]
    pub instance: Option<String>,

    /// Only rows for this model.
    #[arg(long, env = "FILTER_MODEL")]
    pub model: Option<String>,

    /// Only rows for this team label (`one-agent` for single-agent runs).
    #[arg(long, env = "FILTER_TEAM")]
    pub team: Option<String>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Commands::Run(args) => run_agents_command(&cli, args).await,
        Commands::Validate(args) => run_validate_command(&cli, args).await,
        Commands::Summary(args) => run_summary_command(&cli, args),
    }
}

async fn open_sandbox(cli: &Cli) -> anyhow::Result<Arc<DockerSandbox>> {
    let sandbox = DockerSandbox::new(cli.sandbox_config())
        .map_err(|e| anyhow::anyhow!("Failed to prepare sandbox directory {}: {}", cli.workdir.display(), e))?;
    sandbox.preflight().await.map_err(ValidateError::from)?;
    Ok(Arc::new(sandbox))
}

async fn run_agents_command(cli: &Cli, args: &RunArgs) -> anyhow::Result<ExitCode> {
    let instance = load_instance(&args.instance)?;
    let target = ValidationTarget::from(&instance);
    let api_key = get_api_key()?;
    let base_url = get_base_url();
    let sandbox = open_sandbox(cli).await?;

    let provider = OpenAiProvider::new(base_url.clone(), Some(api_key)).with_temperature(DEFAULT_TEMPERATURE);
    let selector = ModelSelector::new(Arc::new(provider));

    let models = batch_models(args.models.as_deref(), args.model.as_deref());
    let plans = batch_plans(
        &models,
        resolve_candidates(args.model.as_deref(), args.models.as_deref()),
    );

    let mut config = RunnerConfig::new(args.mode).with_results_path(cli.results_path());
    if let Some(max_turns) = args.max_turns {
        config = config.with_max_turns(max_turns);
    }
    if args.no_native_tools {
        config = config.without_native_tools();
    }
    let runner = ValidationRunner::new(config);

    info!(
        instance = %instance.id,
        base_url = %base_url,
        mode = %args.mode,
        sub_runs = plans.len(),
        "Starting validation batch"
    );
    let report = runner.run_batch(&target, &selector, &plans, sandbox).await;

    for outcome in &report.outcomes {
        println!(
            "{}\t{}\t{}\t{}",
            outcome.model,
            outcome.status,
            outcome.elapsed_sec,
            outcome.final_pytest_tail.as_deref().unwrap_or("-")
        );
    }
    for (label, error) in &report.failures {
        eprintln!("{}\tFAILED\t{}", label, error);
    }

    Ok(ExitCode::from(report.exit_code()))
}

async fn run_validate_command(cli: &Cli, args: &ValidateArgs) -> anyhow::Result<ExitCode> {
    let sandbox = open_sandbox(cli).await?;
    let host_dir = sandbox.host_dir().to_path_buf();

    match validate_direct(sandbox, &args.repo_url, &args.k_expr).await {
        DirectOutcome::CloneFailed(line) => {
            println!("CLONE FAILED");
            println!("{}", line);
            Ok(ExitCode::FAILURE)
        }
        DirectOutcome::Finished { tail, output } => {
            println!("{}", tail);
            if output.success() {
                return Ok(ExitCode::SUCCESS);
            }
            report_failure(&host_dir, &output);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report_failure(host_dir: &Path, output: &SandboxOutput) {
    let saved = save_failure_logs(host_dir, output);
    if let Err(e) = &saved {
        warn!(dir = %host_dir.display(), error = %e, "Failed to save run logs");
    }

    println!("\n--- pytest stdout (tail) ---\n{}", tail_lines(&output.stdout, FAILURE_TAIL_LINES));
    if !output.stderr.trim().is_empty() {
        println!("\n--- pytest stderr (tail) ---\n{}", tail_lines(&output.stderr, FAILURE_TAIL_LINES));
    }
    if let Ok((stdout_log, stderr_log)) = saved {
        println!("\nFull logs saved to: {}, {}", stdout_log.display(), stderr_log.display());
    }
}

fn run_summary_command(cli: &Cli, args: &SummaryArgs) -> anyhow::Result<ExitCode> {
    let records = read_records(cli.results_path())?;
    let filter = SummaryFilter::new(args.instance.clone(), args.model.clone(), args.team.clone());
    println!("{}", render_summary(&records, &filter));
    Ok(ExitCode::SUCCESS)
}
