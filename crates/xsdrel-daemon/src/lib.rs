pub mod config;
pub mod daemon;
pub mod error;
pub mod gate;
pub mod ingest;
pub mod observability;
pub mod remote;
pub mod watcher;

pub use config::{env_layer, file_layer, Options, OptionsLayer};
pub use daemon::Daemon;
pub use error::{DaemonError, Result};
pub use ingest::IngestLoop;
pub use observability::{AuditRow, ObservabilityEvent, ObservabilitySink, Stats};
pub use remote::RemoteMirror;
pub use watcher::watch_with_debounce;
