use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use subtyper::config::{Config, ConfigOverrides};
use subtyper::logging;
use subtyper::subtyper_config::LogFormat;

mod cmd;

/// Exit status for usage and configuration errors.
const EXIT_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(name = "subtyper")]
#[command(version, about = "Viral genome subtyping pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to subtyper.toml. Defaults to ./subtyper.toml, then the user config dir
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Working directory for the external tools (overrides [output] workspace_dir)
    #[arg(long, global = true)]
    pub workspace_dir: Option<PathBuf>,

    /// Directory holding the reference dataset (overrides [reference] dir)
    #[arg(long, global = true)]
    pub reference_dir: Option<PathBuf>,

    /// Interpreter used to launch the tool scripts (overrides [tools] python)
    #[arg(long, global = true)]
    pub python: Option<String>,

    /// Log output format: text, json. Overrides [logging] format
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Subtype one query sequence
    Run {
        /// FASTA file with the query sequence, or '-' for stdin
        input: PathBuf,

        /// Print the result as JSON on stdout
        #[arg(long)]
        json: bool,

        /// UI output mode: full, minimal, json
        #[arg(long, default_value = "full")]
        ui: String,

        /// Skip packaging the output directory into an archive
        #[arg(long)]
        no_archive: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// List recorded runs, most recent first
    History {
        /// Maximum number of runs to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the resolved configuration
    Show,
    /// Validate configuration and check that reference files and scripts exist
    Validate,
    /// Initialize a default subtyper.toml file
    Init,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let overrides = ConfigOverrides::from_env().merged_with(ConfigOverrides {
        python: cli.python.clone(),
        reference_dir: cli.reference_dir.clone(),
        workspace_dir: cli.workspace_dir.clone(),
    });

    if let Commands::Config { command } = &cli.command {
        let _guard = logging::init(cli.verbose, cli.log_format.unwrap_or_default(), None)?;
        return match cmd::cmd_config(&cwd, cli.config.as_deref(), overrides, command.clone()) {
            Ok(true) => Ok(ExitCode::SUCCESS),
            Ok(false) => Ok(ExitCode::from(EXIT_CONFIG)),
            Err(err) => {
                eprintln!("Error: {:#}", err);
                Ok(ExitCode::from(EXIT_CONFIG))
            }
        };
    }

    let config = match Config::load(cli.config.as_deref(), &cwd, overrides, cli.verbose) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };

    let format = cli.log_format.unwrap_or(config.logging.format);
    let log_dir = config.logging.file.then_some(config.log_dir.as_path());
    let _guard = logging::init(cli.verbose, format, log_dir)?;
    if let Some(path) = &config.config_file {
        tracing::debug!(path = %path.display(), "loaded configuration");
    }

    match &cli.command {
        Commands::Run {
            input,
            json,
            ui,
            no_archive,
        } => {
            let args = cmd::run::RunArgs {
                input: Path::new(input),
                json: *json,
                ui,
                no_archive: *no_archive,
            };
            if cmd::cmd_run(&config, args).await? {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::History { limit } => {
            cmd::cmd_history(&config, *limit)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { .. } => Ok(ExitCode::SUCCESS),
    }
}
