//! Remote mirror (spec.md §4.9): copies `*.xml` from a remote directory
//! into the local ingest directory, deduping against a persisted history
//! file plus whatever is already sitting in `in/`, `imported/`, `error/`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::observability::ObservabilitySink;

pub struct RemoteMirror {
    remote_dir: PathBuf,
    local_in_dir: PathBuf,
    history_file: PathBuf,
    seen: tokio::sync::Mutex<HashSet<String>>,
    copying: AtomicBool,
}

impl RemoteMirror {
    /// Seed the seen-set from the history file and from any file already
    /// present in `in/`, `imported/`, `error/`, so a lost history file
    /// doesn't cause a re-copy storm.
    pub fn new(remote_dir: impl Into<PathBuf>, local_in_dir: impl Into<PathBuf>, history_file: impl Into<PathBuf>) -> Self {
        let local_in_dir = local_in_dir.into();
        let history_file = history_file.into();
        let mut seen = HashSet::new();

        if let Ok(text) = std::fs::read_to_string(&history_file) {
            for line in text.lines() {
                let line = line.trim();
                if !line.is_empty() {
                    seen.insert(line.to_ascii_lowercase());
                }
            }
        }

        for sibling in ["", "imported", "error"] {
            let dir = if sibling.is_empty() { local_in_dir.clone() } else { local_in_dir.with_file_name(sibling) };
            if let Ok(entries) = std::fs::read_dir(&dir) {
                for entry in entries.flatten() {
                    if let Some(name) = entry.file_name().to_str() {
                        seen.insert(name.to_ascii_lowercase());
                    }
                }
            }
        }

        Self {
            remote_dir: remote_dir.into(),
            local_in_dir,
            history_file,
            seen: tokio::sync::Mutex::new(seen),
            copying: AtomicBool::new(false),
        }
    }

    /// One poll pass: returns `true` if at least one file was copied (the
    /// caller should then trigger an ingest batch, spec.md §4.9 step 5).
    pub async fn poll_once(&self, sink: &ObservabilitySink) -> bool {
        if self.copying.swap(true, Ordering::SeqCst) {
            return false;
        }
        let result = self.poll_inner(sink).await;
        self.copying.store(false, Ordering::SeqCst);
        result
    }

    async fn poll_inner(&self, sink: &ObservabilitySink) -> bool {
        let mut entries = match tokio::fs::read_dir(&self.remote_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, dir = %self.remote_dir.display(), "remote directory unavailable, skipping this poll");
                return false;
            }
        };

        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("xml") {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        let mut copied_any = false;
        for name in names {
            let already_seen = {
                let seen = self.seen.lock().await;
                seen.contains(&name.to_ascii_lowercase())
            };
            if already_seen {
                continue;
            }

            match self.copy_one(&name).await {
                Ok(dest_name) => {
                    self.record_seen(&name).await;
                    sink.record_remote_copy(&dest_name);
                    info!(file = %dest_name, "copied from remote");
                    copied_any = true;
                }
                Err(e) => {
                    warn!(error = %e, file = %name, "failed to copy remote file, will retry next poll");
                }
            }
        }
        copied_any
    }

    async fn copy_one(&self, name: &str) -> std::io::Result<String> {
        let src = self.remote_dir.join(name);
        let mut dest = self.local_in_dir.join(name);

        if dest.exists() {
            let stem = Path::new(name).file_stem().and_then(|s| s.to_str()).unwrap_or(name);
            let ext = Path::new(name).extension().and_then(|e| e.to_str()).unwrap_or("xml");
            let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
            dest = self.local_in_dir.join(format!("{stem}_{stamp}.{ext}"));
        }

        tokio::fs::create_dir_all(&self.local_in_dir).await?;
        tokio::fs::copy(&src, &dest).await?;
        Ok(dest.file_name().and_then(|n| n.to_str()).unwrap_or(name).to_string())
    }

    async fn record_seen(&self, name: &str) {
        let mut seen = self.seen.lock().await;
        seen.insert(name.to_ascii_lowercase());
        drop(seen);

        if let Ok(mut f) = tokio::fs::OpenOptions::new().create(true).append(true).open(&self.history_file).await {
            use tokio::io::AsyncWriteExt;
            let _ = f.write_all(format!("{name}\n").as_bytes()).await;
        }
    }
}
