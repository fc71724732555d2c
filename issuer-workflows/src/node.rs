//! Node wiring
//!
//! A node bundles one party's identity and keypair, its vault, a session
//! coordinator, and the responder task answering other parties' sessions.
//! Counter-signing runs the shared command assertions first and then the
//! node's own [`SignaturePolicy`].

use crate::{error::Result, redeem, register, transfer};
use commit_protocol::{
    verify_proposal, CheckpointStore, CommitConfig, DurableCheckpointStore, MemberDirectory,
    Metrics, Proposal, Sequencer, SessionCoordinator, SessionNetwork, SessionRequest,
    SignatureResponse,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;
use vault_core::{Amount, Config, Currency, KeyPair, PartyId, Vault};

/// Local acceptance policy applied before countersigning
///
/// Runs after the shared command assertions; a rejection reason travels back
/// to the initiator verbatim.
pub trait SignaturePolicy: Send + Sync + 'static {
    /// Approve or refuse countersigning the proposal
    fn evaluate(&self, proposal: &Proposal) -> std::result::Result<(), String>;
}

/// Policy that countersigns anything passing the shared assertions
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl SignaturePolicy for AcceptAll {
    fn evaluate(&self, _proposal: &Proposal) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// One party's running presence on the rail
pub struct Node {
    identity: PartyId,
    vault: Arc<Vault>,
    coordinator: Arc<SessionCoordinator>,
    responder: tokio::task::JoinHandle<()>,
}

impl Node {
    /// Open the vault, register on the network and directory, and start the
    /// responder loop
    pub fn start(
        name: impl Into<String>,
        config: &Config,
        commit_config: CommitConfig,
        network: Arc<dyn SessionNetwork>,
        inbox: mpsc::Receiver<SessionRequest>,
        directory: Arc<MemberDirectory>,
        sequencer: Arc<dyn Sequencer>,
        policy: Arc<dyn SignaturePolicy>,
    ) -> Result<Self> {
        let identity = PartyId::new(name);
        let keypair = Arc::new(KeyPair::generate());
        directory.register(identity.clone(), keypair.public_key());

        let vault = Arc::new(Vault::open(config)?);
        let checkpoints: Arc<dyn CheckpointStore> =
            Arc::new(DurableCheckpointStore::new(Arc::clone(&vault)));

        let coordinator = Arc::new(SessionCoordinator::new(
            identity.clone(),
            Arc::clone(&keypair),
            Arc::clone(&vault),
            Arc::clone(&directory),
            sequencer,
            network,
            checkpoints,
            Metrics::default(),
            commit_config,
        ));

        let responder = spawn_responder(
            identity.clone(),
            Arc::clone(&keypair),
            Arc::clone(&vault),
            Arc::clone(&directory),
            policy,
            inbox,
        );

        info!(party = %identity, "node started");
        Ok(Self {
            identity,
            vault,
            coordinator,
            responder,
        })
    }

    /// The node's party identity
    pub fn identity(&self) -> &PartyId {
        &self.identity
    }

    /// The node's vault
    pub fn vault(&self) -> &Arc<Vault> {
        &self.vault
    }

    /// The node's session coordinator
    pub fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    /// Transfer cash to another party
    pub async fn transfer_cash(
        &self,
        recipient: PartyId,
        amount: Amount,
    ) -> Result<(Uuid, String)> {
        let stamped = transfer::transfer_cash(&self.coordinator, recipient.clone(), amount).await?;
        Ok((
            stamped.tx_id(),
            format!("transferred {amount} to {recipient}"),
        ))
    }

    /// Redeem cash back to its issuer
    pub async fn redeem_cash(&self, issuer: PartyId, amount: Amount) -> Result<(Uuid, String)> {
        let stamped = redeem::redeem_cash(&self.coordinator, issuer.clone(), amount).await?;
        Ok((stamped.tx_id(), format!("redeemed {amount} with {issuer}")))
    }

    /// Register an external bank account
    pub async fn register_account(
        &self,
        details: register::AccountDetails,
        verifier: PartyId,
    ) -> Result<(Uuid, String)> {
        let number = details.account_number.clone();
        let stamped = register::register_account(&self.coordinator, details, verifier).await?;
        Ok((stamped.tx_id(), format!("registered account {number}")))
    }

    /// Spendable balance in a currency
    pub fn balance(&self, currency: Currency) -> Result<u64> {
        Ok(self.vault.balance(&self.identity, currency)?)
    }

    /// Spendable balance in a currency, restricted to one issuer
    pub fn balance_with_issuer(&self, currency: Currency, issuer: &PartyId) -> Result<u64> {
        Ok(self
            .vault
            .balance_with_issuer(&self.identity, currency, issuer)?)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.responder.abort();
    }
}

/// Answer sessions from other parties: countersign proposals and record
/// finalized transactions
fn spawn_responder(
    identity: PartyId,
    keypair: Arc<KeyPair>,
    vault: Arc<Vault>,
    directory: Arc<MemberDirectory>,
    policy: Arc<dyn SignaturePolicy>,
    mut inbox: mpsc::Receiver<SessionRequest>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = inbox.recv().await {
            match request {
                SessionRequest::Propose { mut proposal, reply } => {
                    let verdict = verify_proposal(&proposal.proposal)
                        .map_err(|e| e.to_string())
                        .and_then(|()| policy.evaluate(&proposal.proposal));
                    let response = match verdict {
                        Ok(()) => SignatureResponse::Accept(
                            proposal.sign_with(identity.clone(), &keypair),
                        ),
                        Err(reason) => {
                            warn!(party = %identity, %reason, "refusing to countersign");
                            SignatureResponse::Reject(reason)
                        }
                    };
                    let _ = reply.send(response);
                }
                SessionRequest::Finalize { stamped, reply } => {
                    let result = record_finalized(&vault, &directory, &stamped);
                    if let Err(reason) = &result {
                        warn!(party = %identity, %reason, "refusing to record transaction");
                    }
                    let _ = reply.send(result);
                }
            }
        }
    })
}

/// A stamped proposal pushed by a peer is re-verified and every required
/// signature checked against the directory before anything touches the vault
fn record_finalized(
    vault: &Vault,
    directory: &MemberDirectory,
    stamped: &commit_protocol::StampedProposal,
) -> std::result::Result<(), String> {
    verify_proposal(&stamped.signed.proposal).map_err(|e| e.to_string())?;
    for signer in stamped.signed.proposal.required_signers() {
        let key = directory.key_of(&signer).map_err(|e| e.to_string())?;
        if !stamped.signed.verify_signature(&signer, &key) {
            return Err(format!("missing or invalid signature from {signer}"));
        }
    }

    // Materialize inputs this vault has never seen, then apply
    for input in &stamped.signed.proposal.inputs {
        vault
            .ensure_recorded(input.reference, input.state.clone())
            .map_err(|e| e.to_string())?;
    }
    vault
        .apply_transaction(
            stamped.tx_id(),
            &stamped.signed.proposal.input_refs(),
            &stamped.signed.proposal.output_states(),
        )
        .map_err(|e| e.to_string())?;
    Ok(())
}
