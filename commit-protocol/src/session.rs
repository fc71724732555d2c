//! Party-to-party session transport
//!
//! Two request kinds flow between parties: a countersignature request over a
//! proposal, and a finality notification carrying the stamped transaction.
//! [`LocalNetwork`] wires parties together over in-process channels; a remote
//! transport implements [`SessionNetwork`] over its own wire.

use crate::proposal::{PartySignature, SignedProposal, StampedProposal};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;
use vault_core::PartyId;

/// Channel depth per registered party
const SESSION_QUEUE_DEPTH: usize = 64;

/// A counter-party's answer to a countersignature request
#[derive(Debug)]
pub enum SignatureResponse {
    /// Assertions passed; here is the signature
    Accept(PartySignature),

    /// Assertions failed; the reason travels back to the initiator
    Reject(String),
}

/// A request delivered to a party's responder loop
#[derive(Debug)]
pub enum SessionRequest {
    /// Evaluate and countersign a proposal
    Propose {
        /// The proposal with the signatures collected so far
        proposal: SignedProposal,
        /// Where to send the verdict
        reply: oneshot::Sender<SignatureResponse>,
    },

    /// Record a finalized transaction
    Finalize {
        /// The stamped transaction
        stamped: StampedProposal,
        /// Acknowledgement channel; an error aborts the initiator's flow
        reply: oneshot::Sender<std::result::Result<(), String>>,
    },
}

/// Transport used by the coordinator to reach counter-parties
#[async_trait]
pub trait SessionNetwork: Send + Sync {
    /// Request a countersignature, waiting at most `timeout`
    async fn propose(
        &self,
        to: &PartyId,
        proposal: SignedProposal,
        timeout: Duration,
    ) -> Result<SignatureResponse>;

    /// Deliver a finality notification, waiting at most `timeout`
    async fn finalize(
        &self,
        to: &PartyId,
        stamped: StampedProposal,
        timeout: Duration,
    ) -> Result<()>;
}

/// In-process transport connecting parties through bounded channels
#[derive(Debug, Default)]
pub struct LocalNetwork {
    peers: DashMap<PartyId, mpsc::Sender<SessionRequest>>,
}

impl LocalNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a party and hand back its inbound request stream
    pub fn register(&self, party: PartyId) -> mpsc::Receiver<SessionRequest> {
        let (tx, rx) = mpsc::channel(SESSION_QUEUE_DEPTH);
        self.peers.insert(party, tx);
        rx
    }

    fn sender_for(&self, party: &PartyId) -> Result<mpsc::Sender<SessionRequest>> {
        self.peers
            .get(party)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::Session(format!("no session route to {party}")))
    }
}

#[async_trait]
impl SessionNetwork for LocalNetwork {
    async fn propose(
        &self,
        to: &PartyId,
        proposal: SignedProposal,
        timeout: Duration,
    ) -> Result<SignatureResponse> {
        let sender = self.sender_for(to)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(SessionRequest::Propose {
                proposal,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Session(format!("session to {to} closed")))?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::Session(format!("session to {to} dropped"))),
            Err(_) => {
                warn!(party = %to, "countersignature request timed out");
                Err(Error::CounterpartyUnresponsive(to.clone()))
            }
        }
    }

    async fn finalize(
        &self,
        to: &PartyId,
        stamped: StampedProposal,
        timeout: Duration,
    ) -> Result<()> {
        let sender = self.sender_for(to)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(SessionRequest::Finalize {
                stamped,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Session(format!("session to {to} closed")))?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(Error::Session(format!(
                "{to} failed to record transaction: {reason}"
            ))),
            Ok(Err(_)) => Err(Error::Session(format!("session to {to} dropped"))),
            Err(_) => {
                warn!(party = %to, "finality notification timed out");
                Err(Error::CounterpartyUnresponsive(to.clone()))
            }
        }
    }
}
