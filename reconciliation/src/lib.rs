//! Nostro reconciliation
//!
//! Classifies external bank-ledger events against locally-known verified
//! accounts and drives the matching ledger mutation: collateral transfers
//! are acknowledged, issuances recorded, redemptions opened as PENDING
//! transfer records and later settled by the payment matcher.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod engine;
pub mod error;
pub mod matcher;
pub mod rules;

// Re-exports
pub use engine::{ClassificationReport, ReconciliationEngine};
pub use error::{Error, Result};
pub use matcher::{PaymentConfirmation, SettlementMatcher};
pub use rules::{classify, MatchContext, RuleOutcome};
