//! Proposal model: a candidate atomic mutation of the shared record set
//!
//! A proposal names the record versions it consumes, the records it
//! produces, and the commands (assertions plus required signers) that
//! justify the mutation. Canonical bincode bytes hashed with SHA-256 form
//! the signing payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;
use vault_core::crypto::{hash_bytes, KeyPair, Signature};
use vault_core::{LinearId, PartyId, RecordRef, RecordState};

/// Command kinds: which assertions justify the mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Move cash ownership between parties (value conserved)
    MoveCash,
    /// Remove cash from circulation (terminal consumption)
    ExitCash,
    /// Register a new bank account record
    AddAccount,
    /// Classify a nostro event (consume-and-recreate with new type/status)
    MatchNostroEvent,
    /// Create an internal issuance/redemption transfer record
    RecordTransfer,
    /// Close out a pending redemption transfer record
    SettleRedemption,
}

/// A command with the identities required to sign over it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Assertion kind
    pub kind: CommandKind,

    /// Required signer identities
    pub signers: Vec<PartyId>,
}

/// A consumed input: the reference plus its resolved state
///
/// Carrying the resolved state lets counter-parties evaluate the assertions
/// without a dependency-resolution round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalInput {
    /// The consumed record version
    pub reference: RecordRef,

    /// Its state
    pub state: RecordState,
}

/// A produced output: the linear id it will live under plus its state
///
/// Reusing an input's linear id makes the output that record's successor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalOutput {
    /// Linear id of the produced record
    pub linear_id: LinearId,

    /// Its state
    pub state: RecordState,
}

/// A candidate atomic mutation of the shared record set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Unique proposal id (UUIDv7); doubles as the finalized transaction id
    pub proposal_id: Uuid,

    /// The initiating party
    pub initiator: PartyId,

    /// Consumed inputs
    pub inputs: Vec<ProposalInput>,

    /// Produced outputs
    pub outputs: Vec<ProposalOutput>,

    /// Commands justifying the mutation
    pub commands: Vec<Command>,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    /// Create canonical bytes for signing
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Deterministic serialization for signature verification
        bincode::serialize(self).expect("serialization cannot fail")
    }

    /// SHA-256 hash of the canonical bytes (the signing payload)
    pub fn hash(&self) -> [u8; 32] {
        hash_bytes(&self.canonical_bytes())
    }

    /// Consumed input references
    pub fn input_refs(&self) -> Vec<RecordRef> {
        self.inputs.iter().map(|i| i.reference).collect()
    }

    /// Outputs as (linear id, state) pairs for vault application
    pub fn output_states(&self) -> Vec<(LinearId, RecordState)> {
        self.outputs
            .iter()
            .map(|o| (o.linear_id, o.state.clone()))
            .collect()
    }

    /// Union of all required signer identities across commands
    pub fn required_signers(&self) -> BTreeSet<PartyId> {
        self.commands
            .iter()
            .flat_map(|c| c.signers.iter().cloned())
            .collect()
    }
}

/// Builder for proposals
#[derive(Debug)]
pub struct ProposalBuilder {
    initiator: PartyId,
    inputs: Vec<ProposalInput>,
    outputs: Vec<ProposalOutput>,
    commands: Vec<Command>,
}

impl ProposalBuilder {
    /// Start a builder for the given initiating party
    pub fn new(initiator: PartyId) -> Self {
        Self {
            initiator,
            inputs: Vec::new(),
            outputs: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Add a consumed input
    pub fn add_input(mut self, reference: RecordRef, state: RecordState) -> Self {
        self.inputs.push(ProposalInput { reference, state });
        self
    }

    /// Add a produced output under the given linear id
    pub fn add_output(mut self, linear_id: LinearId, state: RecordState) -> Self {
        self.outputs.push(ProposalOutput { linear_id, state });
        self
    }

    /// Add a fresh output (new linear id)
    pub fn add_fresh_output(self, state: RecordState) -> Self {
        self.add_output(LinearId::fresh(), state)
    }

    /// Add a command with its required signers
    pub fn add_command(mut self, kind: CommandKind, signers: Vec<PartyId>) -> Self {
        self.commands.push(Command { kind, signers });
        self
    }

    /// Finish the proposal
    pub fn build(self) -> Proposal {
        Proposal {
            proposal_id: Uuid::now_v7(),
            initiator: self.initiator,
            inputs: self.inputs,
            outputs: self.outputs,
            commands: self.commands,
            created_at: Utc::now(),
        }
    }
}

/// A signature attributed to a party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySignature {
    /// The signing party
    pub party: PartyId,

    /// Signature over the proposal hash
    pub signature: Signature,
}

/// A proposal with its accumulated signatures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedProposal {
    /// The proposal
    pub proposal: Proposal,

    /// Collected signatures
    pub signatures: Vec<PartySignature>,
}

impl SignedProposal {
    /// Wrap an unsigned proposal
    pub fn new(proposal: Proposal) -> Self {
        Self {
            proposal,
            signatures: Vec::new(),
        }
    }

    /// Sign over the proposal hash and attach the signature
    pub fn sign_with(&mut self, party: PartyId, keypair: &KeyPair) -> PartySignature {
        let signature = PartySignature {
            party,
            signature: keypair.sign(&self.proposal.hash()),
        };
        self.signatures.push(signature.clone());
        signature
    }

    /// Attach an externally-collected signature
    pub fn add_signature(&mut self, signature: PartySignature) {
        if !self.is_signed_by(&signature.party) {
            self.signatures.push(signature);
        }
    }

    /// Whether the given party has signed
    pub fn is_signed_by(&self, party: &PartyId) -> bool {
        self.signatures.iter().any(|s| s.party == *party)
    }

    /// Required signers who have not yet signed
    pub fn missing_signers(&self) -> Vec<PartyId> {
        self.proposal
            .required_signers()
            .into_iter()
            .filter(|p| !self.is_signed_by(p))
            .collect()
    }

    /// Verify one party's signature against their public key
    pub fn verify_signature(&self, party: &PartyId, public_key: &[u8; 32]) -> bool {
        self.signatures
            .iter()
            .find(|s| s.party == *party)
            .map_or(false, |s| {
                s.signature.verify(&self.proposal.hash(), public_key)
            })
    }
}

/// The sequencer's acceptance stamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    /// Position in the accepted ordering
    pub sequence: u64,

    /// Acceptance time
    pub sequenced_at: DateTime<Utc>,
}

/// A fully-signed, sequencer-stamped proposal ready for recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedProposal {
    /// The signed proposal
    pub signed: SignedProposal,

    /// The sequencer's stamp
    pub stamp: Stamp,
}

impl StampedProposal {
    /// Finalized transaction id
    pub fn tx_id(&self) -> Uuid {
        self.signed.proposal.proposal_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::{Amount, CashRecord, Currency, RecordPayload};

    fn cash_state(owner: &str, quantity: u64) -> RecordState {
        RecordState::new(
            RecordPayload::Cash(CashRecord {
                owner: PartyId::new(owner),
                amount: Amount::new(quantity, Currency::GBP),
                issuer: PartyId::new("Issuer"),
            }),
            vec![PartyId::new(owner)],
        )
    }

    fn sample_proposal() -> Proposal {
        ProposalBuilder::new(PartyId::new("Alice"))
            .add_input(
                RecordRef::new(LinearId::fresh(), 0),
                cash_state("Alice", 5_000),
            )
            .add_fresh_output(cash_state("Bob", 5_000))
            .add_command(
                CommandKind::MoveCash,
                vec![PartyId::new("Alice"), PartyId::new("Bob")],
            )
            .build()
    }

    #[test]
    fn test_canonical_bytes_are_deterministic() {
        let proposal = sample_proposal();
        assert_eq!(proposal.hash(), proposal.hash());

        // Any change to content changes the hash
        let mut other = proposal.clone();
        other.outputs.clear();
        assert_ne!(proposal.hash(), other.hash());
    }

    #[test]
    fn test_required_signers_union() {
        let proposal = sample_proposal();
        let signers = proposal.required_signers();
        assert_eq!(signers.len(), 2);
        assert!(signers.contains(&PartyId::new("Alice")));
        assert!(signers.contains(&PartyId::new("Bob")));
    }

    #[test]
    fn test_sign_and_missing_signers() {
        let mut signed = SignedProposal::new(sample_proposal());
        assert_eq!(signed.missing_signers().len(), 2);

        let keypair = KeyPair::generate();
        signed.sign_with(PartyId::new("Alice"), &keypair);

        assert!(signed.is_signed_by(&PartyId::new("Alice")));
        assert_eq!(signed.missing_signers(), vec![PartyId::new("Bob")]);
        assert!(signed.verify_signature(&PartyId::new("Alice"), &keypair.public_key()));
        assert!(!signed.verify_signature(&PartyId::new("Bob"), &keypair.public_key()));
    }

    #[test]
    fn test_duplicate_signatures_are_ignored() {
        let mut signed = SignedProposal::new(sample_proposal());
        let keypair = KeyPair::generate();

        let sig = signed.sign_with(PartyId::new("Alice"), &keypair);
        signed.add_signature(sig);
        assert_eq!(signed.signatures.len(), 1);
    }

    #[test]
    fn test_signature_does_not_verify_tampered_proposal() {
        let mut signed = SignedProposal::new(sample_proposal());
        let keypair = KeyPair::generate();
        signed.sign_with(PartyId::new("Alice"), &keypair);

        signed.proposal.outputs[0].state = cash_state("Mallory", 5_000);
        assert!(!signed.verify_signature(&PartyId::new("Alice"), &keypair.public_key()));
    }
}
