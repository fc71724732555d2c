//! Party-facing cash workflows
//!
//! The operations a node operator actually invokes: transfer cash to another
//! party, redeem cash back to its issuer, register a bank account. Each
//! workflow selects or checks vault state, assembles a proposal, and commits
//! it through the session coordinator. [`Node`] wires a vault, a coordinator,
//! and the responder loop that answers other parties' sessions.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod error;
pub mod node;
pub mod redeem;
pub mod register;
pub mod selection;
pub mod transfer;

// Re-exports
pub use error::{Error, Result};
pub use node::{AcceptAll, Node, SignaturePolicy};
pub use register::AccountDetails;
pub use selection::Selection;
