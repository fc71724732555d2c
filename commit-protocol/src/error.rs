//! Error types for the commit protocol

use thiserror::Error;
use vault_core::{PartyId, RecordRef};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Commit protocol errors
#[derive(Error, Debug)]
pub enum Error {
    /// Vault error
    #[error("Vault error: {0}")]
    Vault(#[from] vault_core::Error),

    /// Proposal assertions failed before any network step (no side effects)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A required signer never produced a signature
    #[error("Missing required signature from {0}")]
    MissingSignature(PartyId),

    /// A collected signature did not verify against the member directory
    #[error("Invalid signature from {0}")]
    InvalidSignature(PartyId),

    /// Counter-party explicitly declined to sign (fatal, not retried)
    #[error("Counter-party {party} rejected the proposal: {reason}")]
    CounterpartyRejected {
        /// The rejecting party
        party: PartyId,
        /// Their stated reason
        reason: String,
    },

    /// Counter-party did not answer within the configured timeout
    #[error("Counter-party {0} did not respond in time")]
    CounterpartyUnresponsive(PartyId),

    /// The sequencer saw one of our inputs consumed by another accepted
    /// proposal; callers rebuild against fresh state and may retry
    #[error("Sequencer conflict on inputs: {conflicting:?}")]
    Conflict {
        /// The disputed input references
        conflicting: Vec<RecordRef>,
    },

    /// Session transport failure
    #[error("Session error: {0}")]
    Session(String),

    /// Checkpoint persistence or recovery failure
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}
