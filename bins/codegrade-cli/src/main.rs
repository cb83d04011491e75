mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use codegrade_common::jobs::DEFAULT_TIME_LIMIT_MS;
use codegrade_common::types::Language;
use codegrade_engine::{Engine, EngineConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codegrade-cli")]
#[command(about = "codegrade CLI - Run, test and validate submissions locally", long_about = None)]
struct Cli {
    /// Engine configuration file (defaults to $CODEGRADE_CONFIG or config/engine.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of a summary
    #[arg(long, global = true, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a source file once
    Run {
        /// Language (c, cpp, java, python)
        #[arg(short, long, value_parser = parse_language)]
        language: Language,

        /// Source file
        #[arg(short, long)]
        file: PathBuf,

        /// Text fed to stdin
        #[arg(short, long, conflicts_with = "input_file")]
        input: Option<String>,

        /// File fed to stdin
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Wall-clock limit in milliseconds
        #[arg(short, long, default_value_t = DEFAULT_TIME_LIMIT_MS)]
        time_limit: u64,
    },

    /// Grade a source file against a JSON array of test cases
    Test {
        #[arg(short, long, value_parser = parse_language)]
        language: Language,

        #[arg(short, long)]
        file: PathBuf,

        /// Test cases file: [{"input": ..., "expected_output": ..., "points": ...}]
        #[arg(short, long)]
        cases: PathBuf,

        /// Per-case wall-clock limit in milliseconds
        #[arg(short, long, default_value_t = DEFAULT_TIME_LIMIT_MS)]
        time_limit: u64,

        /// Only report pass/fail and points
        #[arg(long, default_value = "false")]
        graded: bool,
    },

    /// Run the syntax pre-validator only
    Validate {
        #[arg(short, long, value_parser = parse_language)]
        language: Language,

        #[arg(short, long)]
        file: PathBuf,
    },

    /// Check which toolchains are installed
    Doctor,

    /// Remove leftover workspaces from the scratch root
    Sweep {
        /// Minimum age in seconds (defaults to reaper.max_age_secs)
        #[arg(long)]
        max_age_secs: Option<u64>,
    },
}

fn parse_language(s: &str) -> Result<Language, String> {
    Language::from_str(s).ok_or_else(|| format!("unsupported language '{}' (c, cpp, java, python)", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // quiet by default, stdout is for results
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::from_env(cli.config.as_deref())?;
    let engine = Engine::new(config);

    let ok = match cli.command {
        Commands::Run {
            language,
            file,
            input,
            input_file,
            time_limit,
        } => {
            let stdin = commands::read_stdin_arg(input, input_file.as_deref())?;
            commands::run(&engine, language, &file, stdin, time_limit, cli.json).await?
        }
        Commands::Test {
            language,
            file,
            cases,
            time_limit,
            graded,
        } => commands::test(&engine, language, &file, &cases, time_limit, graded, cli.json).await?,
        Commands::Validate { language, file } => {
            commands::validate(&engine, language, &file, cli.json)?
        }
        Commands::Doctor => commands::doctor(&engine, cli.json).await?,
        Commands::Sweep { max_age_secs } => {
            commands::sweep(&engine, max_age_secs, cli.json).await?
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
