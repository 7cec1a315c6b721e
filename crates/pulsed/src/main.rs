//! Pulsed - local telemetry pipeline for developer-agent activity
//!
//! # Usage
//!
//! ```bash
//! # Run the server (default)
//! pulsed
//! pulsed serve --config pulse.toml
//!
//! # Stream live events from a running server
//! pulsed tail
//! pulsed tail --url ws://127.0.0.1:4177/ws
//! ```

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Pulsed - local telemetry pipeline for developer-agent activity
#[derive(Parser, Debug)]
#[command(name = "pulsed")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    // Args that apply to serve when no subcommand is given
    /// Path to configuration file
    #[arg(short, long, default_value = "pulse.toml")]
    config: std::path::PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline server
    Serve(cmd::serve::ServeArgs),

    /// Stream live events from a running server
    Tail(cmd::tail::TailArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Serve(args)) => cmd::serve::run(args).await,
        Some(Command::Tail(args)) => {
            // Tail output is the data itself; keep logging quiet.
            init_logging("warn", false)?;
            cmd::tail::run(args).await
        }
        // No subcommand = run the server (default behavior)
        None => {
            let args = cmd::serve::ServeArgs {
                config: cli.config,
                log_level: cli.log_level,
            };
            cmd::serve::run(args).await
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .with(filter)
            .init();
    }

    Ok(())
}
