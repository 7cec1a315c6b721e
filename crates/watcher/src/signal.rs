//! Change-signal loop and process-wide watcher uniqueness
//!
//! Filesystem notifications drive `poke`; a periodic catch-up sweep
//! covers dropped notifications (platform backends do drop them). The
//! log may not exist yet at startup, in which case the loop polls until
//! it appears and then positions the cursor at end-of-file so only new
//! events are streamed.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use notify::{Event as FsEvent, RecommendedWatcher, RecursiveMode, Watcher};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Result, WatcherError};
use crate::tail::TailWatcher;

/// Poll interval while waiting for the log to appear
const LOG_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Catch-up sweep interval for dropped filesystem notifications
const SWEEP_INTERVAL: Duration = Duration::from_secs(2);

static WATCHER_ACTIVE: AtomicBool = AtomicBool::new(false);

struct ActiveGuard;

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        WATCHER_ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// Run the watcher signal loop until cancelled
///
/// Refuses to run when another watcher is already active in this
/// process: two tailers would race over the same exclusive state and
/// double-mint IDs.
pub async fn run(watcher: Arc<TailWatcher>, cancel: CancellationToken) -> Result<()> {
    if WATCHER_ACTIVE.swap(true, Ordering::SeqCst) {
        warn!("refusing to start a second tailing watcher in this process");
        return Err(WatcherError::AlreadyRunning);
    }
    let _guard = ActiveGuard;

    // The ingest side creates the log on first append; until then there
    // is nothing to tail.
    while !watcher.path().exists() {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(LOG_POLL_INTERVAL) => {}
        }
    }
    watcher.initialize_at_end();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    let log_name = watcher.path().file_name().map(|n| n.to_os_string());

    // Watch the parent directory, not the file: rotation replaces the
    // inode and a file watch would silently go stale.
    let watch_dir = watcher
        .path()
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut fs_watcher = RecommendedWatcher::new(
        move |res: std::result::Result<FsEvent, notify::Error>| match res {
            Ok(event) => {
                let relevant = event.paths.is_empty()
                    || event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == log_name.as_deref());
                if relevant {
                    let _ = tx.send(());
                }
            }
            Err(err) => {
                warn!(error = %err, "filesystem notification error");
            }
        },
        notify::Config::default(),
    )?;
    fs_watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

    info!(path = %watcher.path().display(), "tailing watcher started");

    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            signal = rx.recv() => {
                if signal.is_none() {
                    break;
                }
                watcher.poke().await;
            }
            _ = sweep.tick() => {
                if watcher.needs_read() {
                    watcher.poke().await;
                }
            }
        }
    }

    drop(fs_watcher);
    info!("tailing watcher stopped");
    Ok(())
}
