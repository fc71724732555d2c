//! Error types for the vault

use thiserror::Error;

/// Result type for vault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Vault errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Record version not found
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Input already consumed by another transaction
    #[error("Record {reference} already consumed by transaction {consumed_by}")]
    AlreadyConsumed {
        /// The record version
        reference: String,
        /// The transaction that consumed it
        consumed_by: uuid::Uuid,
    },

    /// Reservation conflict
    #[error("Record {0} is reserved by another workflow attempt")]
    Reserved(String),

    /// Signature verification failed
    #[error("Signature error: {0}")]
    SignatureError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
