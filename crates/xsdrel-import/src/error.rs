use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read {path} after {attempts} attempts: {source}")]
    Read {
        path: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML in {path}: {source}")]
    Xml {
        path: String,
        #[source]
        source: roxmltree::Error,
    },

    #[error("database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
