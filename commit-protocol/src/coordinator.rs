//! Commit coordination
//!
//! Drives a proposal through the full protocol: local verification, signature
//! collection, sequencing, finality distribution, and vault application. A
//! checkpoint is persisted before every side-effecting step so a restarted
//! coordinator resumes in place under the same transaction id.

use crate::checkpoint::{CheckpointStore, FlowCheckpoint, FlowPhase};
use crate::directory::MemberDirectory;
use crate::metrics::Metrics;
use crate::proposal::{Proposal, SignedProposal, StampedProposal};
use crate::sequencer::{Sequencer, SubmitOutcome};
use crate::session::{SessionNetwork, SignatureResponse};
use crate::verify::verify_proposal;
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vault_core::{KeyPair, PartyId, Vault};

/// Coordinator tuning
#[derive(Debug, Clone)]
pub struct CommitConfig {
    /// Per-request session timeout in milliseconds
    pub response_timeout_ms: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 5_000,
        }
    }
}

impl CommitConfig {
    fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Runs the commit protocol on behalf of one party
pub struct SessionCoordinator {
    identity: PartyId,
    keypair: Arc<KeyPair>,
    vault: Arc<Vault>,
    directory: Arc<MemberDirectory>,
    sequencer: Arc<dyn Sequencer>,
    network: Arc<dyn SessionNetwork>,
    checkpoints: Arc<dyn CheckpointStore>,
    metrics: Metrics,
    config: CommitConfig,
}

impl SessionCoordinator {
    /// Assemble a coordinator
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: PartyId,
        keypair: Arc<KeyPair>,
        vault: Arc<Vault>,
        directory: Arc<MemberDirectory>,
        sequencer: Arc<dyn Sequencer>,
        network: Arc<dyn SessionNetwork>,
        checkpoints: Arc<dyn CheckpointStore>,
        metrics: Metrics,
        config: CommitConfig,
    ) -> Self {
        Self {
            identity,
            keypair,
            vault,
            directory,
            sequencer,
            network,
            checkpoints,
            metrics,
            config,
        }
    }

    /// The coordinating party's identity
    pub fn identity(&self) -> &PartyId {
        &self.identity
    }

    /// The vault this coordinator records into
    pub fn vault(&self) -> &Arc<Vault> {
        &self.vault
    }

    /// Metrics handle
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Commit a proposal with the given counter-parties
    ///
    /// On success every listed counter-party has recorded the transaction and
    /// the local vault holds its outputs. A [`Error::Conflict`] means an input
    /// was spent by a competing transaction and nothing was recorded anywhere.
    pub async fn commit(
        &self,
        proposal: Proposal,
        counterparties: &[PartyId],
    ) -> Result<StampedProposal> {
        // Nothing leaves this node before the assertions pass locally
        verify_proposal(&proposal)?;

        let required = proposal.required_signers();
        for signer in &required {
            if *signer != self.identity && !counterparties.contains(signer) {
                return Err(Error::Validation(format!(
                    "required signer {signer} is not a session counter-party"
                )));
            }
        }

        let mut peers: Vec<PartyId> = Vec::new();
        for party in counterparties {
            if *party != self.identity && !peers.contains(party) {
                peers.push(party.clone());
            }
        }

        let flow_id = proposal.proposal_id;
        let proposal_hash = proposal.hash();
        let timeout = self.config.response_timeout();

        // Resume if a previous run left a checkpoint behind
        let mut checkpoint = match self.checkpoints.load(flow_id)? {
            Some(existing) => {
                if existing.proposal_hash != proposal_hash {
                    return Err(Error::Checkpoint(format!(
                        "checkpoint for flow {flow_id} belongs to a different proposal"
                    )));
                }
                info!(
                    %flow_id,
                    hash = %hex::encode(proposal_hash),
                    "resuming flow from checkpoint"
                );
                existing
            }
            None => FlowCheckpoint::new(flow_id, proposal_hash),
        };

        let mut signed = SignedProposal::new(proposal);
        for signature in &checkpoint.signatures {
            signed.add_signature(signature.clone());
        }
        if !signed.is_signed_by(&self.identity) {
            let local = signed.sign_with(self.identity.clone(), &self.keypair);
            checkpoint.signatures.push(local);
        }

        if let FlowPhase::CollectingSignatures { responded } = checkpoint.phase.clone() {
            let mut responded = responded;
            for peer in &peers {
                if responded.contains(peer) {
                    continue;
                }

                // Persist intent before the send: a crash mid-request must
                // resume under the same flow id, not start a new one
                checkpoint.phase = FlowPhase::CollectingSignatures {
                    responded: responded.clone(),
                };
                checkpoint.updated_at = Utc::now();
                self.checkpoints.save(&checkpoint)?;

                debug!(%flow_id, party = %peer, "requesting countersignature");
                match self.network.propose(peer, signed.clone(), timeout).await? {
                    SignatureResponse::Accept(signature) => {
                        // A bad signature is not recoverable by resuming;
                        // drop the checkpoint with the flow
                        if signature.party != *peer {
                            self.checkpoints.remove(flow_id)?;
                            return Err(Error::InvalidSignature(peer.clone()));
                        }
                        let key = self.directory.key_of(peer)?;
                        if !signature.signature.verify(&signed.proposal.hash(), &key) {
                            self.checkpoints.remove(flow_id)?;
                            return Err(Error::InvalidSignature(peer.clone()));
                        }
                        signed.add_signature(signature.clone());
                        checkpoint.signatures.push(signature);
                        responded.push(peer.clone());
                    }
                    SignatureResponse::Reject(reason) => {
                        warn!(%flow_id, party = %peer, %reason, "counter-party rejected proposal");
                        self.metrics.record_counterparty_rejection();
                        self.checkpoints.remove(flow_id)?;
                        return Err(Error::CounterpartyRejected {
                            party: peer.clone(),
                            reason,
                        });
                    }
                }
            }

            if let Some(missing) = signed.missing_signers().into_iter().next() {
                self.checkpoints.remove(flow_id)?;
                return Err(Error::MissingSignature(missing));
            }

            checkpoint.phase = FlowPhase::FullySigned;
            checkpoint.updated_at = Utc::now();
            self.checkpoints.save(&checkpoint)?;
        }

        let stamp = match checkpoint.phase.clone() {
            FlowPhase::Stamped { stamp, .. } => stamp,
            _ => {
                match self
                    .sequencer
                    .submit(flow_id, &signed.proposal.input_refs())
                    .await
                {
                    SubmitOutcome::Accepted(stamp) => {
                        checkpoint.phase = FlowPhase::Stamped {
                            stamp: stamp.clone(),
                            notified: Vec::new(),
                        };
                        checkpoint.updated_at = Utc::now();
                        self.checkpoints.save(&checkpoint)?;
                        stamp
                    }
                    SubmitOutcome::Rejected { conflicting } => {
                        warn!(%flow_id, ?conflicting, "sequencer rejected transaction");
                        self.metrics.record_conflict();
                        self.checkpoints.remove(flow_id)?;
                        return Err(Error::Conflict { conflicting });
                    }
                }
            }
        };

        let stamped = StampedProposal {
            signed: signed.clone(),
            stamp,
        };

        if let FlowPhase::Stamped { stamp, notified } = checkpoint.phase.clone() {
            let mut notified = notified;
            for peer in &peers {
                if notified.contains(peer) {
                    continue;
                }
                self.network
                    .finalize(peer, stamped.clone(), timeout)
                    .await?;
                notified.push(peer.clone());
                checkpoint.phase = FlowPhase::Stamped {
                    stamp: stamp.clone(),
                    notified: notified.clone(),
                };
                checkpoint.updated_at = Utc::now();
                self.checkpoints.save(&checkpoint)?;
            }
        }

        // Idempotent: a resumed flow that already applied is a no-op
        self.vault.apply_transaction(
            flow_id,
            &stamped.signed.proposal.input_refs(),
            &stamped.signed.proposal.output_states(),
        )?;
        self.checkpoints.remove(flow_id)?;

        self.metrics.record_commit();
        info!(
            %flow_id,
            sequence = stamped.stamp.sequence,
            inputs = stamped.signed.proposal.inputs.len(),
            outputs = stamped.signed.proposal.outputs.len(),
            "transaction committed"
        );
        Ok(stamped)
    }
}
