//! Error types for patricia_db

use thiserror::Error;

/// Result type alias for patricia_db operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in patricia_db operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    #[error("Invalid database file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Storage is closed")]
    Closed,
}

impl Error {
    /// A trie lookup that did not resolve `key`
    pub fn key_not_found(key: &[u8]) -> Self {
        Error::NotFound(format!("key {}", hex::encode(key)))
    }

    /// Whether this is the recoverable "absent" case
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
