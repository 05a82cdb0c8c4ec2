//! Quill CLI, the main entry point.
//!
//! Modes:
//! - headless: a positional message, `-p`, or piped stdin runs one prompt
//!   and prints the result in the chosen `--output-format`
//! - interactive: otherwise, a line-based REPL with streamed replies
//!
//! Subcommands:
//! - `git commit-and-push`: stage everything, let the agent write the
//!   commit message, commit and push
//! - `telemetry enable|disable`: toggle tracing for this project

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quill_config::AppConfig;
use tokio::io::AsyncReadExt;
use tracing::debug;

mod commands;

use commands::SessionArgs;
use commands::headless::{HeadlessOptions, OutputFormat};

#[derive(Parser, Debug)]
#[command(
    name = "quill",
    about = "A conversational AI coding agent with file editing, shell and search tools",
    version,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Message to send; runs once and exits
    message: Vec<String>,

    #[command(flatten)]
    session: SessionArgs,

    /// Process a single prompt and exit (reads piped stdin too)
    #[arg(short = 'p', long, num_args = 0..=1, default_missing_value = "")]
    prompt: Option<String>,

    /// Text appended to the system prompt
    #[arg(short = 's', long)]
    append_system_prompt: Option<String>,

    /// Limit the number of model calls per message
    #[arg(long)]
    max_turns: Option<usize>,

    /// Output format for headless mode
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output_format: OutputFormat,

    /// Write headless output to this file instead of stdout
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Git helpers
    Git {
        #[command(subcommand)]
        command: GitCommand,
    },

    /// Turn telemetry on or off for this project
    Telemetry {
        #[command(subcommand)]
        command: TelemetryCommand,
    },
}

#[derive(Subcommand, Debug)]
enum GitCommand {
    /// Generate a commit message with the agent, commit and push
    CommitAndPush {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Subcommand, Debug)]
enum TelemetryCommand {
    Enable,
    Disable,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    // stdout carries the answer in headless mode, so logs go to stderr
    let filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Some(Commands::Git {
            command: GitCommand::CommitAndPush { session },
        }) => commands::git::commit_and_push(&session).await,
        Some(Commands::Telemetry { command }) => {
            let enabled = matches!(command, TelemetryCommand::Enable);
            commands::telemetry::run(enabled)
        }
        None => run_default(cli).await,
    }
}

fn apply_max_turns(config: &mut AppConfig, turns: Option<usize>) -> anyhow::Result<()> {
    if let Some(turns) = turns {
        config.max_turns = turns;
    }
    config.validate().context("Invalid --max-turns")?;
    Ok(())
}

async fn run_default(cli: Cli) -> anyhow::Result<ExitCode> {
    cli.session.enter_directory()?;
    let Some(config) = cli.session.load_config()? else {
        return Ok(ExitCode::FAILURE);
    };

    let stdin = read_piped_stdin().await?;
    let prompt = match resolve_prompt(cli.prompt, &cli.message, stdin) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut config = config;
    apply_max_turns(&mut config, cli.max_turns)?;
    let agent = commands::build_agent(&config, cli.append_system_prompt)?;

    match prompt {
        Some(prompt) if !prompt.trim().is_empty() => {
            let opts = HeadlessOptions {
                format: cli.output_format,
                output_file: cli.output_file,
                verbose: cli.verbose,
            };
            commands::headless::run(agent, prompt, &opts).await
        }
        _ => {
            commands::interactive::run(agent).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Pick the headless prompt. `Ok(None)` means interactive mode.
fn resolve_prompt(
    flag: Option<String>,
    message: &[String],
    stdin: Option<String>,
) -> Result<Option<String>, &'static str> {
    let positional = (!message.is_empty()).then(|| message.join(" "));
    let with_stdin = |text: String| match &stdin {
        Some(input) => format!("{input}\n\n{text}"),
        None => text,
    };

    match flag {
        Some(p) if p.is_empty() && stdin.is_none() && positional.is_none() => {
            Err("No prompt provided for print mode.")
        }
        Some(p) if p.is_empty() => Ok(Some(match positional {
            Some(text) => with_stdin(text),
            None => stdin.unwrap_or_default(),
        })),
        Some(p) => Ok(Some(with_stdin(p))),
        None => match positional {
            Some(text) => Ok(Some(with_stdin(text))),
            None => Ok(stdin),
        },
    }
}

async fn read_piped_stdin() -> anyhow::Result<Option<String>> {
    if std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read stdin")?;
    let input = input.trim().to_string();
    debug!(bytes = input.len(), "Read piped stdin");
    Ok((!input.is_empty()).then_some(input))
}
