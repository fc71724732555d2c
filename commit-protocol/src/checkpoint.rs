//! Flow checkpoints
//!
//! A coordinator persists its progress before every side-effecting step
//! (network send, sequencer submission). After a crash the flow resumes from
//! the stored phase instead of restarting, and counter-parties never see the
//! same request attributed to a new transaction id.

use crate::proposal::{PartySignature, Stamp};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use vault_core::{PartyId, Vault};

/// Where a flow stopped last
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FlowPhase {
    /// Gathering counter-party signatures
    CollectingSignatures {
        /// Peers whose signature is already held
        responded: Vec<PartyId>,
    },

    /// All required signatures collected, not yet sequenced
    FullySigned,

    /// Sequenced; distributing the finalized transaction
    Stamped {
        /// The sequencer's stamp
        stamp: Stamp,
        /// Peers already notified
        notified: Vec<PartyId>,
    },
}

/// Durable snapshot of one in-flight flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowCheckpoint {
    /// Flow id (the proposal id)
    pub flow_id: Uuid,

    /// Hash of the proposal being committed; guards against resuming a
    /// checkpoint with a different proposal body
    pub proposal_hash: [u8; 32],

    /// Progress phase
    pub phase: FlowPhase,

    /// Signatures collected so far (local one included)
    pub signatures: Vec<PartySignature>,

    /// Last save time
    pub updated_at: DateTime<Utc>,
}

impl FlowCheckpoint {
    /// Fresh checkpoint at the start of signature collection
    pub fn new(flow_id: Uuid, proposal_hash: [u8; 32]) -> Self {
        Self {
            flow_id,
            proposal_hash,
            phase: FlowPhase::CollectingSignatures {
                responded: Vec::new(),
            },
            signatures: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Persistence for flow checkpoints
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint, replacing any previous one for the flow
    fn save(&self, checkpoint: &FlowCheckpoint) -> Result<()>;

    /// Load a checkpoint if the flow has one
    fn load(&self, flow_id: Uuid) -> Result<Option<FlowCheckpoint>>;

    /// Remove a flow's checkpoint after completion or abort
    fn remove(&self, flow_id: Uuid) -> Result<()>;
}

/// In-memory store for tests and single-shot tooling
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    entries: DashMap<Uuid, Vec<u8>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(&self, checkpoint: &FlowCheckpoint) -> Result<()> {
        let bytes = bincode::serialize(checkpoint)?;
        self.entries.insert(checkpoint.flow_id, bytes);
        Ok(())
    }

    fn load(&self, flow_id: Uuid) -> Result<Option<FlowCheckpoint>> {
        match self.entries.get(&flow_id) {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn remove(&self, flow_id: Uuid) -> Result<()> {
        self.entries.remove(&flow_id);
        Ok(())
    }
}

/// Checkpoint store backed by the vault's RocksDB checkpoint column
pub struct DurableCheckpointStore {
    vault: Arc<Vault>,
}

impl DurableCheckpointStore {
    /// Wrap a vault
    pub fn new(vault: Arc<Vault>) -> Self {
        Self { vault }
    }
}

impl CheckpointStore for DurableCheckpointStore {
    fn save(&self, checkpoint: &FlowCheckpoint) -> Result<()> {
        let bytes = bincode::serialize(checkpoint)?;
        self.vault
            .save_checkpoint(checkpoint.flow_id, &bytes)
            .map_err(Error::Vault)
    }

    fn load(&self, flow_id: Uuid) -> Result<Option<FlowCheckpoint>> {
        match self.vault.load_checkpoint(flow_id).map_err(Error::Vault)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn remove(&self, flow_id: Uuid) -> Result<()> {
        self.vault.remove_checkpoint(flow_id).map_err(Error::Vault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vault_core::Config;

    #[test]
    fn test_in_memory_round_trip() {
        let store = InMemoryCheckpointStore::new();
        let flow_id = Uuid::now_v7();
        let checkpoint = FlowCheckpoint::new(flow_id, [7u8; 32]);

        store.save(&checkpoint).unwrap();
        let loaded = store.load(flow_id).unwrap().unwrap();
        assert_eq!(loaded.proposal_hash, [7u8; 32]);
        assert!(matches!(
            loaded.phase,
            FlowPhase::CollectingSignatures { .. }
        ));

        store.remove(flow_id).unwrap();
        assert!(store.load(flow_id).unwrap().is_none());
    }

    #[test]
    fn test_durable_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let flow_id = Uuid::now_v7();

        {
            let vault = Arc::new(Vault::open(&Config::at(dir.path())).unwrap());
            let store = DurableCheckpointStore::new(vault);
            let mut checkpoint = FlowCheckpoint::new(flow_id, [1u8; 32]);
            checkpoint.phase = FlowPhase::FullySigned;
            store.save(&checkpoint).unwrap();
        }

        let vault = Arc::new(Vault::open(&Config::at(dir.path())).unwrap());
        let store = DurableCheckpointStore::new(vault);
        let loaded = store.load(flow_id).unwrap().unwrap();
        assert!(matches!(loaded.phase, FlowPhase::FullySigned));
    }
}
