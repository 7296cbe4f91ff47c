use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("import failed for {path}: {source}")]
    Import {
        path: String,
        #[source]
        source: xsdrel_import::ImportError,
    },

    #[error("i/o error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("filesystem watcher error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
