//! Debounced filesystem watcher (spec.md §4.8): on create/rename events in
//! the ingest directory, (re)start a `debounceMs` timer; only the last
//! event inside the window fires a batch trigger.

use std::path::Path;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

/// Spawns the OS watcher and a debounce task; returns the watcher (which
/// must be kept alive for as long as events should be observed) and a
/// receiver that yields once per settled debounce window.
pub fn watch_with_debounce(dir: &Path, debounce_ms: u64) -> notify::Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>)> {
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();
    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel::<()>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                let _ = raw_tx.send(event);
            }
        }
        Err(e) => warn!(error = %e, "filesystem watch error"),
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;

    tokio::spawn(async move {
        loop {
            // Block for the first event of a new window.
            if raw_rx.recv().await.is_none() {
                return;
            }
            // Restart the timer on every subsequent event until the
            // window goes quiet, then fire exactly once.
            loop {
                match tokio::time::timeout(Duration::from_millis(debounce_ms), raw_rx.recv()).await {
                    Ok(Some(_)) => continue,
                    Ok(None) => return,
                    Err(_elapsed) => break,
                }
            }
            if trigger_tx.send(()).is_err() {
                return;
            }
        }
    });

    Ok((watcher, trigger_rx))
}
