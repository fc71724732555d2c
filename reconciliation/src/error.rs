//! Reconciliation errors

use thiserror::Error;

/// Errors surfaced by the reconciliation engine and settlement matcher
#[derive(Debug, Error)]
pub enum Error {
    /// The event contradicts our view of the world; requires investigation
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    /// A payment confirmation does not line up with any pending redemption
    #[error("settlement mismatch: {0}")]
    SettlementMismatch(String),

    /// Commit protocol failure
    #[error("commit failed: {0}")]
    Commit(#[from] commit_protocol::Error),

    /// Vault failure
    #[error("vault error: {0}")]
    Vault(#[from] vault_core::Error),
}

/// Result alias for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;
