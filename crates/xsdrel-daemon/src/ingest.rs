//! Ingest loop (spec.md §4.8): enumerate `*.xml` in the ingest directory in
//! lexicographic order, gate each for readiness, import it, and move it to
//! `imported/` or `error/` on completion. A single-owner flag keeps
//! concurrent triggers from overlapping.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{info, warn};
use xsdrel_import::{ImportOptions, Importer, SqlExecutor};
use xsdrel_model::Model;

use crate::gate::wait_until_ready;
use crate::observability::ObservabilitySink;

pub struct IngestLoop {
    import_dir: PathBuf,
    imported_dir: PathBuf,
    error_dir: PathBuf,
    ready_wait_ms: u64,
    importing: AtomicBool,
}

impl IngestLoop {
    pub fn new(import_dir: impl Into<PathBuf>, ready_wait_ms: u64) -> Self {
        let import_dir = import_dir.into();
        let imported_dir = import_dir.with_file_name("imported");
        let error_dir = import_dir.with_file_name("error");
        Self {
            import_dir,
            imported_dir,
            error_dir,
            ready_wait_ms,
            importing: AtomicBool::new(false),
        }
    }

    /// Run one batch. Returns immediately (without doing anything) if
    /// another batch is already in flight — the event that would have
    /// triggered this one is covered by the in-flight batch's own rescan,
    /// per spec.md §5.
    pub async fn run_batch<E, F, Fut>(&self, model: &Model, options: &ImportOptions, sink: &ObservabilitySink, mut make_executor: F)
    where
        E: SqlExecutor,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = E>,
    {
        if self.importing.swap(true, Ordering::SeqCst) {
            return;
        }

        let files = self.list_xml_files_sorted();
        for path in files {
            let executor = make_executor().await;
            self.import_one(&path, model, options, sink, executor).await;
        }

        self.importing.store(false, Ordering::SeqCst);
    }

    fn list_xml_files_sorted(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.import_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("xml"))
            .collect();
        files.sort();
        files
    }

    async fn import_one<E: SqlExecutor>(&self, path: &Path, model: &Model, options: &ImportOptions, sink: &ObservabilitySink, mut executor: E) {
        wait_until_ready(path, self.ready_wait_ms).await;

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("<unknown>").to_string();
        let start = Instant::now();
        let importer = Importer::new(model, options.clone());

        match importer.import_file(path, &mut executor).await {
            Ok(result) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                info!(file = %file_name, total_rows = result.total_rows, "import succeeded");
                sink.record_success(&file_name, result.total_rows, duration_ms, &result.per_table);
                self.move_to(path, &self.imported_dir);
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "import failed");
                sink.record_failure(&file_name, &e.to_string());
                self.move_to(path, &self.error_dir);
            }
        }
    }

    fn move_to(&self, path: &Path, dest_dir: &Path) {
        let _ = std::fs::create_dir_all(dest_dir);
        if let Some(name) = path.file_name() {
            // Best-effort, overwriting (spec.md §4.6 "State machine per
            // file"): a failed move leaves the source in place to be
            // retried on the next batch rather than losing the file.
            let _ = std::fs::rename(path, dest_dir.join(name));
        }
    }
}
