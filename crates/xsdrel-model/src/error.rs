use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read XSD file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse XSD: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("malformed XSD: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
