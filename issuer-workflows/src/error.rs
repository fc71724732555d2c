//! Workflow errors

use thiserror::Error;
use vault_core::{AccountNumber, Currency, LinearId};

/// Errors surfaced by the cash workflows
#[derive(Debug, Error)]
pub enum Error {
    /// Spendable balance cannot cover the requested amount
    #[error("insufficient funds: requested {requested} {currency}, spendable {available}")]
    InsufficientFunds {
        /// Requested quantity in minor units
        requested: u64,
        /// Spendable (unreserved, unconsumed) quantity in minor units
        available: u64,
        /// Currency in question
        currency: Currency,
    },

    /// An account record already exists for the account number
    #[error("account {account_number} already registered under record {existing}")]
    DuplicateAccount {
        /// The contested account number
        account_number: AccountNumber,
        /// Linear id of the existing record
        existing: LinearId,
    },

    /// The request is malformed before any state is touched
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Commit protocol failure
    #[error("commit failed: {0}")]
    Commit(#[from] commit_protocol::Error),

    /// Vault failure
    #[error("vault error: {0}")]
    Vault(#[from] vault_core::Error),
}

/// Result alias for workflow operations
pub type Result<T> = std::result::Result<T, Error>;
