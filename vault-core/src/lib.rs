//! Shared record vault
//!
//! Append-only store of linearly-versioned, immutable records shared between
//! business-network parties.
//!
//! # Architecture
//!
//! - **Linear versioning**: every record has a stable linear id; an "update"
//!   consumes the current version and records a successor under the same id
//! - **Append-only**: versions are never deleted; consumption flips status
//!   and pins the consuming transaction id
//! - **Current state**: queries filter to UNCONSUMED versions only
//! - **Reservations**: short-lived exclusive holds over candidate records
//!   for the duration of one spend attempt

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod storage;
pub mod types;
pub mod vault;

// Re-exports
pub use config::Config;
pub use crypto::{KeyPair, Signature};
pub use error::{Error, Result};
pub use types::{
    AccountNumber, AccountRecord, Amount, AmountTransfer, CashRecord, Currency,
    LedgerTransferRecord, LinearId, NostroEventRecord, PartyId, RecordEntry, RecordPayload,
    RecordRef, RecordState, RecordStatus,
};
pub use vault::{Reservation, Vault};
