//! The serve command - wire the pipeline together and run it
//!
//! Ownership at runtime:
//!
//! ```text
//! journal (append log) ◄── server POST /api/event
//!     │ filesystem
//!     ▼
//! watcher task ──BroadcastSink──▶ broadcaster ──▶ /ws sessions
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use pulse_config::{Config, LogFormat};
use pulse_fanout::Broadcaster;
use pulse_journal::Journal;
use pulse_server::{AppState, BroadcastSink};
use pulse_watcher::TailWatcher;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "pulse.toml")]
    pub config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    let config = load_config(&args.config)?;

    let level = args
        .log_level
        .as_deref()
        .unwrap_or_else(|| config.log.level.as_str());
    crate::init_logging(level, config.log.format == LogFormat::Json)?;

    info!(
        config = %args.config.display(),
        journal = %config.journal.path.display(),
        "starting pulse server"
    );

    let journal = Arc::new(Journal::new(&config.journal.path));
    let broadcaster = Broadcaster::new();
    broadcaster.spawn_maintenance();

    let watcher = Arc::new(TailWatcher::new(
        &config.journal.path,
        Arc::new(BroadcastSink(Arc::clone(&broadcaster))),
    ));

    let cancel = CancellationToken::new();

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            ctrl_c_cancel.cancel();
        }
    });

    let watcher_task = tokio::spawn(pulse_watcher::run(Arc::clone(&watcher), cancel.clone()));

    let state = AppState::new(journal, broadcaster, watcher);
    let result = pulse_server::run(state, &config.server.bind_address(), cancel.clone()).await;

    // Server exit (error or shutdown) takes the watcher down with it.
    cancel.cancel();
    match watcher_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "watcher exited with error"),
        Err(e) => warn!(error = %e, "watcher task panicked"),
    }

    result.context("server failed")
}

/// Load the config file, falling back to defaults when it does not exist
///
/// A missing config file is normal for a local tool; an unreadable or
/// invalid one is an error.
fn load_config(path: &PathBuf) -> Result<Config> {
    if path.exists() {
        Config::from_file(path).with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(Config::default())
    }
}
