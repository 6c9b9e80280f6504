//! Argument parsing and command dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use scanlab_config::ScanlabConfig;

use crate::commands::{analyze::handle_analyze, config::handle_config};
use crate::error::{CliError, CliResult};

#[derive(Parser)]
#[command(
    name = "scanlab",
    about = "Operator CLI for the scan analysis pipeline",
    version
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the analysis pipeline against a local file and print the response.
    Analyze(AnalyzeArgs),
    /// Print the effective configuration resolved from the environment.
    Config,
}

#[derive(Args)]
pub(crate) struct AnalyzeArgs {
    /// Scan file to analyse.
    pub(crate) file: PathBuf,
    /// Declared content type; inferred from the extension when omitted.
    #[arg(long)]
    pub(crate) content_type: Option<String>,
}

/// Parse arguments, run the selected command, and return the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let result = match load_config() {
        Ok(config) => dispatch(cli, &config).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

fn load_config() -> CliResult<ScanlabConfig> {
    ScanlabConfig::from_env().map_err(|err| match err {
        scanlab_config::ConfigError::InvalidField {
            field,
            reason,
            value,
        } => CliError::validation(format!(
            "invalid configuration: {field} ({reason}){}",
            value.map(|value| format!(": {value}")).unwrap_or_default()
        )),
    })
}

pub(crate) async fn dispatch(cli: Cli, config: &ScanlabConfig) -> CliResult<()> {
    match cli.command {
        Command::Analyze(args) => handle_analyze(config, args).await,
        Command::Config => handle_config(config),
    }
}
