//! Crate-wide error taxonomy.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("required resource missing: {0}")]
    ResourceMissing(PathBuf),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("unknown word: {0}")]
    UnknownWord(String),

    #[error("tokenization of '{0}' yielded zero tokens")]
    TokenizationEmpty(String),

    #[error("'{1}' is not a transformation of '{0}'")]
    NotATransformation(String, String),

    #[error("probability tree invalid: {0}")]
    TreeInvalid(String),

    #[error("storage fault: {0}")]
    StorageFault(String),

    #[error("operation cancelled")]
    TransientCancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
