//! The daemon's `Run(ctx)` loop (spec.md §4.8/§4.9/§5): one immediate
//! startup batch, then the watcher's debounce trigger and the remote-poll
//! ticker race cooperatively until cancellation.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use xsdrel_import::{ImportOptions, SqlExecutor};
use xsdrel_model::Model;

use crate::config::Options;
use crate::ingest::IngestLoop;
use crate::observability::ObservabilitySink;
use crate::remote::RemoteMirror;
use crate::watcher::watch_with_debounce;

pub struct Daemon {
    model: Model,
    options: Options,
    import_options: ImportOptions,
    ingest: IngestLoop,
    remote: Option<RemoteMirror>,
    sink: ObservabilitySink,
}

impl Daemon {
    pub fn new(model: Model, options: Options) -> Self {
        let import_options = ImportOptions {
            idempotency: !options.no_idempotency,
            ..ImportOptions::default()
        };
        let ingest = IngestLoop::new(&options.import_dir, options.ready_wait_ms);
        let remote = options
            .remote_source_dir
            .as_ref()
            .map(|remote_dir| RemoteMirror::new(remote_dir, &options.import_dir, &options.remote_history_file));
        let sink = ObservabilitySink::configure(&options.out, options.audit);

        Self {
            model,
            import_options,
            ingest,
            remote,
            sink,
            options,
        }
    }

    /// Run until `cancel` fires, following spec.md §5's cooperative
    /// scheduling model: one startup batch (preceded by a remote backlog
    /// copy if a remote is configured), then the debounce-triggered
    /// watcher and the remote-poll ticker running side by side.
    pub async fn run<E, F, Fut>(&self, cancel: CancellationToken, mut make_executor: F)
    where
        E: SqlExecutor,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = E>,
    {
        if let Some(remote) = &self.remote {
            remote.poll_once(&self.sink).await;
        }
        self.ingest.run_batch(&self.model, &self.import_options, &self.sink, &mut make_executor).await;

        let (_watcher, mut debounce_rx) = match watch_with_debounce(&self.options.import_dir, self.options.debounce_ms) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "failed to start filesystem watcher, falling back to remote-poll-only cadence");
                self.run_poll_only(cancel, make_executor).await;
                return;
            }
        };

        let mut poll_ticker = tokio::time::interval(Duration::from_secs(self.options.remote_poll_seconds));
        poll_ticker.tick().await; // the immediate tick fires instantly; consume it, startup already polled.

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("daemon cancellation requested, exiting after in-flight work completes");
                    return;
                }
                Some(()) = debounce_rx.recv() => {
                    self.ingest.run_batch(&self.model, &self.import_options, &self.sink, &mut make_executor).await;
                }
                _ = poll_ticker.tick() => {
                    if let Some(remote) = &self.remote {
                        if remote.poll_once(&self.sink).await {
                            self.ingest.run_batch(&self.model, &self.import_options, &self.sink, &mut make_executor).await;
                        }
                    }
                }
            }
        }
    }

    async fn run_poll_only<E, F, Fut>(&self, cancel: CancellationToken, mut make_executor: F)
    where
        E: SqlExecutor,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = E>,
    {
        let mut poll_ticker = tokio::time::interval(Duration::from_secs(self.options.remote_poll_seconds));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = poll_ticker.tick() => {
                    if let Some(remote) = &self.remote {
                        if remote.poll_once(&self.sink).await {
                            self.ingest.run_batch(&self.model, &self.import_options, &self.sink, &mut make_executor).await;
                        }
                    }
                }
            }
        }
    }
}

pub fn default_out_dir(import_dir: &std::path::Path) -> PathBuf {
    import_dir.with_file_name("out")
}
