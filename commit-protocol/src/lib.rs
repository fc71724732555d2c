//! Multi-party transaction commit protocol
//!
//! Drives a proposal through counter-party signature collection, submission
//! to the ordering authority (the sequencer) for uniqueness validation, and
//! broadcast of the finalized result to every participant.
//!
//! # Protocol
//!
//! 1. Build: the caller assembles a [`Proposal`] (consumed inputs, produced
//!    outputs, commands with required signers)
//! 2. Local sign + verify: assertion failure aborts before any network I/O
//! 3. Counter-signature collection: one session per non-trivial participant;
//!    any rejection aborts the whole transaction
//! 4. Ordering: the sequencer accepts the proposal only if none of its
//!    inputs have been consumed by another accepted proposal
//! 5. Finalize: the stamped proposal is broadcast to every session and
//!    recorded locally
//!
//! Every externally-visible step is preceded by a durable checkpoint so a
//! crash mid-protocol resumes without duplicate sends or double consumption.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod checkpoint;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod proposal;
pub mod sequencer;
pub mod session;
pub mod verify;

// Re-exports
pub use checkpoint::{
    CheckpointStore, DurableCheckpointStore, FlowCheckpoint, FlowPhase, InMemoryCheckpointStore,
};
pub use coordinator::{CommitConfig, SessionCoordinator};
pub use directory::MemberDirectory;
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use proposal::{
    Command, CommandKind, PartySignature, Proposal, ProposalBuilder, ProposalInput,
    ProposalOutput, SignedProposal, Stamp, StampedProposal,
};
pub use sequencer::{InMemorySequencer, Sequencer, SubmitOutcome};
pub use session::{LocalNetwork, SessionNetwork, SessionRequest, SignatureResponse};
pub use verify::verify_proposal;
