//! edgemem error types

use thiserror::Error;

/// edgemem error type
#[derive(Error, Debug)]
pub enum Error {
    /// Input validation error (e.g. unknown stream type)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Memory category name outside the five fixed categories
    #[error("Unknown memory category: {0}")]
    UnknownCategory(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cloud sync requested while `cloud_sync` is disabled
    #[error("Cloud sync is disabled")]
    CloudSyncDisabled,

    /// Storage error on a record the caller is writing or reading
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cryptographic error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Compression codec error
    #[error("Codec error: {0}")]
    Codec(String),

    /// Scoring or compression strategy failure
    #[error("Strategy error: {0}")]
    Strategy(String),

    /// Memory repository error
    #[error("Memory error: {0}")]
    Memory(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error belongs to the validation family
    /// (unknown stream type or unknown memory category).
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::UnknownCategory(_))
    }
}

/// Result type alias for edgemem operations
pub type Result<T> = std::result::Result<T, Error>;
