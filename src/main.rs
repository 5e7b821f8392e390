//! Binary entry point for the Nebula CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use chrono::Utc;
use clap::Parser;
use thiserror::Error;

use nebula::logging::{self, LoggingError};
use nebula::{
    AnsibleDriver, AwsCli, CloudError, ClusterOrchestrator, ConfigError, NebulaConfig,
    OrchestratorError, SessionReaper, StatusAggregator, StreamingCommandRunner, TerminalState,
    TerraformDriver, UpOptions, confirm,
};

mod cli;

use cli::{Cli, Command, DestroyCommand, ReapCommand, UpCommand};

const DESTROY_PROMPT: &str =
    "Are you sure you want to destroy the entire cluster? This cannot be undone.";
const REAP_PROMPT: &str = "Terminate all nodes?";
const CANCELLED: &str = "Destroy cancelled.";

type LiveOrchestrator = ClusterOrchestrator<
    TerraformDriver<StreamingCommandRunner>,
    AnsibleDriver<StreamingCommandRunner>,
>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error("environment error: {0}")]
    Environment(String),
    #[error("cluster {state}: {message}")]
    Cluster {
        state: TerminalState,
        message: String,
    },
    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),
    #[error("background task failed: {0}")]
    Task(String),
}

impl<PE, CE> From<OrchestratorError<PE, CE>> for CliError
where
    PE: std::error::Error + 'static,
    CE: std::error::Error + 'static,
{
    fn from(err: OrchestratorError<PE, CE>) -> Self {
        Self::Cluster {
            state: err.terminal_state(),
            message: err.to_string(),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = NebulaConfig::load_without_cli_args()?;
    config.validate()?;
    logging::init(&config.log_level, config.log_format()?, cli.verbose)?;

    match cli.command {
        Command::Up(args) => up(&config, &args).await,
        Command::Destroy(args) => destroy(&config, &args).await,
        Command::Status => status(&config).await,
        Command::Reap(args) => reap(&config, &args).await,
    }
}

async fn up(config: &NebulaConfig, args: &UpCommand) -> Result<(), CliError> {
    let orchestrator = build_orchestrator(config)?;
    let options = UpOptions {
        dry_run: args.dry_run,
    };
    let state = run_blocking(move || orchestrator.up(&options).map_err(CliError::from)).await?;
    report_state(state);
    Ok(())
}

async fn destroy(config: &NebulaConfig, args: &DestroyCommand) -> Result<(), CliError> {
    if !args.force && !confirm(DESTROY_PROMPT, io::stdin().lock(), io::stdout()) {
        writeln!(io::stdout(), "{CANCELLED}").ok();
        return Ok(());
    }

    let orchestrator = build_orchestrator(config)?;
    let state = run_blocking(move || orchestrator.destroy().map_err(CliError::from)).await?;
    report_state(state);
    Ok(())
}

async fn status(config: &NebulaConfig) -> Result<(), CliError> {
    let report = StatusAggregator::new(aws_cli(config))
        .report(&config.project_tag)
        .await?;
    writeln!(io::stdout(), "{}", report.render()).ok();
    Ok(())
}

async fn reap(config: &NebulaConfig, args: &ReapCommand) -> Result<(), CliError> {
    let reaper = SessionReaper::new(aws_cli(config));
    let report = reaper.session(&config.project_tag, Utc::now()).await?;
    writeln!(io::stdout(), "{}", report.render()).ok();
    if report.is_empty() {
        return Ok(());
    }

    if !args.force && !confirm(REAP_PROMPT, io::stdin().lock(), io::stdout()) {
        writeln!(io::stdout(), "{CANCELLED}").ok();
        return Ok(());
    }
    reaper.terminate(&report).await?;
    writeln!(io::stdout(), "Termination signals sent.").ok();
    Ok(())
}

fn aws_cli(config: &NebulaConfig) -> AwsCli {
    AwsCli::new(config.region.as_str())
        .with_binary(config.aws_bin.as_str())
        .with_profile(config.aws_profile.clone())
}

fn build_orchestrator(config: &NebulaConfig) -> Result<LiveOrchestrator, CliError> {
    let temp_root = utf8(std::env::temp_dir())?;
    let cwd = utf8(
        std::env::current_dir()
            .map_err(|err| CliError::Environment(format!("current directory: {err}")))?,
    )?;
    let artifacts_dir = config.artifacts_dir_in(&cwd);

    let terraform = TerraformDriver::new(
        StreamingCommandRunner::stdio(),
        config.terraform_bin.as_str(),
        temp_root.clone(),
        artifacts_dir.clone(),
    )
    .with_project_tag(config.project_tag.as_str());
    let ansible = AnsibleDriver::new(StreamingCommandRunner::stdio(), temp_root, artifacts_dir)
        .with_binaries(
            config.ansible_bin.as_str(),
            config.ansible_playbook_bin.as_str(),
        )
        .with_probe(config.readiness_attempts, config.readiness_delay());

    Ok(ClusterOrchestrator::new(terraform, ansible).with_playbook(config.playbook.as_str()))
}

fn utf8(path: std::path::PathBuf) -> Result<Utf8PathBuf, CliError> {
    Utf8PathBuf::from_path_buf(path).map_err(|raw| {
        CliError::Environment(format!("path is not valid UTF-8: {}", raw.display()))
    })
}

/// Runs the synchronous engine workflow off the async runtime.
async fn run_blocking<F>(work: F) -> Result<TerminalState, CliError>
where
    F: FnOnce() -> Result<TerminalState, CliError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| CliError::Task(err.to_string()))?
}

fn report_state(state: TerminalState) {
    writeln!(io::stdout(), "Cluster state: {state}").ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
