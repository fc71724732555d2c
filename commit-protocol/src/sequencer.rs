//! Uniqueness service
//!
//! The sequencer is the sole concurrency-control point of the network: it
//! accepts a transaction exactly when none of its inputs has been consumed by
//! a different transaction, and assigns a total-order stamp on acceptance.
//! Re-submission of an already-accepted transaction returns the original
//! stamp, which makes finality notification safe to retry.

use crate::proposal::Stamp;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;
use vault_core::RecordRef;

/// Outcome of a sequencer submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Inputs were free (or already consumed by this very transaction)
    Accepted(Stamp),

    /// At least one input was consumed by a different transaction
    Rejected {
        /// The inputs already claimed elsewhere
        conflicting: Vec<RecordRef>,
    },
}

/// Input-uniqueness oracle consulted once per transaction
#[async_trait]
pub trait Sequencer: Send + Sync {
    /// Claim `inputs` for `tx_id`, atomically
    async fn submit(&self, tx_id: Uuid, inputs: &[RecordRef]) -> SubmitOutcome;
}

#[derive(Default)]
struct SequencerState {
    consumed: HashMap<RecordRef, Uuid>,
    stamps: HashMap<Uuid, Stamp>,
    next_sequence: u64,
}

/// Single-process sequencer backed by a mutex-guarded claim map
#[derive(Default)]
pub struct InMemorySequencer {
    state: Mutex<SequencerState>,
}

impl InMemorySequencer {
    /// Create an empty sequencer
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Sequencer for InMemorySequencer {
    async fn submit(&self, tx_id: Uuid, inputs: &[RecordRef]) -> SubmitOutcome {
        let mut state = self.state.lock();

        // Retry of an already-accepted transaction
        if let Some(stamp) = state.stamps.get(&tx_id) {
            debug!(%tx_id, sequence = stamp.sequence, "re-submission, returning original stamp");
            return SubmitOutcome::Accepted(stamp.clone());
        }

        let conflicting: Vec<RecordRef> = inputs
            .iter()
            .filter(|input| {
                state
                    .consumed
                    .get(input)
                    .is_some_and(|claimant| *claimant != tx_id)
            })
            .copied()
            .collect();

        if !conflicting.is_empty() {
            warn!(%tx_id, ?conflicting, "rejecting double-spend attempt");
            return SubmitOutcome::Rejected { conflicting };
        }

        for input in inputs {
            state.consumed.insert(*input, tx_id);
        }
        let stamp = Stamp {
            sequence: state.next_sequence,
            sequenced_at: Utc::now(),
        };
        state.next_sequence += 1;
        state.stamps.insert(tx_id, stamp.clone());
        debug!(%tx_id, sequence = stamp.sequence, "transaction accepted");
        SubmitOutcome::Accepted(stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::LinearId;

    fn refs(n: usize) -> Vec<RecordRef> {
        (0..n).map(|_| RecordRef::new(LinearId::fresh(), 0)).collect()
    }

    #[tokio::test]
    async fn test_first_claim_wins() {
        let sequencer = InMemorySequencer::new();
        let inputs = refs(2);

        let first = sequencer.submit(Uuid::now_v7(), &inputs).await;
        assert!(matches!(first, SubmitOutcome::Accepted(_)));

        let second = sequencer.submit(Uuid::now_v7(), &inputs[..1]).await;
        match second {
            SubmitOutcome::Rejected { conflicting } => {
                assert_eq!(conflicting, vec![inputs[0]]);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resubmission_returns_original_stamp() {
        let sequencer = InMemorySequencer::new();
        let inputs = refs(1);
        let tx_id = Uuid::now_v7();

        let first = match sequencer.submit(tx_id, &inputs).await {
            SubmitOutcome::Accepted(stamp) => stamp,
            other => panic!("expected acceptance, got {other:?}"),
        };
        let second = match sequencer.submit(tx_id, &inputs).await {
            SubmitOutcome::Accepted(stamp) => stamp,
            other => panic!("expected acceptance, got {other:?}"),
        };
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_sequence_numbers_are_monotonic() {
        let sequencer = InMemorySequencer::new();
        let mut last = None;
        for _ in 0..5 {
            let inputs = refs(1);
            if let SubmitOutcome::Accepted(stamp) = sequencer.submit(Uuid::now_v7(), &inputs).await
            {
                if let Some(previous) = last {
                    assert!(stamp.sequence > previous);
                }
                last = Some(stamp.sequence);
            } else {
                panic!("disjoint inputs must be accepted");
            }
        }
    }

    #[tokio::test]
    async fn test_disjoint_inputs_do_not_conflict() {
        let sequencer = InMemorySequencer::new();
        let a = refs(1);
        let b = refs(1);
        assert!(matches!(
            sequencer.submit(Uuid::now_v7(), &a).await,
            SubmitOutcome::Accepted(_)
        ));
        assert!(matches!(
            sequencer.submit(Uuid::now_v7(), &b).await,
            SubmitOutcome::Accepted(_)
        ));
    }
}
