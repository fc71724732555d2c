//! Vault API over the record store
//!
//! High-level interface for recording finalized transactions and querying
//! current (UNCONSUMED) state, plus the short-lived reservations used by
//! coin-selection workflows.

use crate::{
    storage::Storage,
    types::{
        AccountNumber, AccountRecord, CashRecord, Currency, LedgerTransferRecord, LinearId,
        PartyId, RecordEntry, RecordRef, RecordState, RecordStatus, SettlementStatus,
        TransferKind,
    },
    Config, Error, Result,
};
use chrono::Utc;
use dashmap::DashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Record vault
pub struct Vault {
    storage: Arc<Storage>,

    /// Records currently held by an in-flight selection attempt
    reserved: Arc<DashSet<RecordRef>>,
}

impl Vault {
    /// Open vault with configuration
    pub fn open(config: &Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(config)?);
        Ok(Self {
            storage,
            reserved: Arc::new(DashSet::new()),
        })
    }

    /// Insert a fresh record outside any shared transaction
    ///
    /// This is the boundary for externally-fed records (nostro events from
    /// the bank feed) and for issuance seeding. Shared mutations go through
    /// [`Vault::apply_transaction`].
    pub fn insert(&self, state: RecordState) -> Result<RecordRef> {
        let reference = RecordRef::new(LinearId::fresh(), 0);
        let entry = RecordEntry {
            reference,
            state,
            status: RecordStatus::Unconsumed,
            predecessor: None,
            consumed_by: None,
            recorded_at: Utc::now(),
        };
        self.storage.put_entry(&entry)?;
        Ok(reference)
    }

    /// Record a transaction dependency received from a peer, if absent
    ///
    /// A counter-party finalizing a transaction may not hold the consumed
    /// inputs; the proposal carries their resolved states so they can be
    /// materialized under the initiator's references before application.
    pub fn ensure_recorded(&self, reference: RecordRef, state: RecordState) -> Result<()> {
        match self.storage.get_entry(&reference) {
            Ok(_) => Ok(()),
            Err(Error::RecordNotFound(_)) => {
                let entry = RecordEntry {
                    reference,
                    state,
                    status: RecordStatus::Unconsumed,
                    predecessor: None,
                    consumed_by: None,
                    recorded_at: Utc::now(),
                };
                self.storage.put_entry(&entry)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a finalized transaction: consume inputs, record outputs
    ///
    /// Idempotent per transaction id: replaying an already-applied
    /// transaction is a no-op returning the same output references, so
    /// checkpoint recovery never double-consumes.
    pub fn apply_transaction(
        &self,
        tx_id: Uuid,
        inputs: &[RecordRef],
        outputs: &[(LinearId, RecordState)],
    ) -> Result<Vec<RecordRef>> {
        // Output versions are deterministic: a successor continues its
        // input's lineage, everything else starts a fresh lineage at 0.
        let output_refs: Vec<RecordRef> = outputs
            .iter()
            .map(|(linear_id, _)| {
                let successor_of = inputs.iter().find(|r| r.linear_id == *linear_id);
                match successor_of {
                    Some(input) => RecordRef::new(*linear_id, input.version + 1),
                    None => RecordRef::new(*linear_id, 0),
                }
            })
            .collect();

        if self.storage.is_applied(tx_id)? {
            tracing::debug!(tx_id = %tx_id, "Transaction already applied, skipping");
            return Ok(output_refs);
        }

        let mut entries = Vec::with_capacity(inputs.len() + outputs.len());

        for input in inputs {
            let mut entry = self.storage.get_entry(input)?;
            match entry.consumed_by {
                Some(by) if by == tx_id => {}
                Some(by) => {
                    return Err(Error::AlreadyConsumed {
                        reference: input.to_string(),
                        consumed_by: by,
                    });
                }
                None => {
                    entry.status = RecordStatus::Consumed;
                    entry.consumed_by = Some(tx_id);
                }
            }
            entries.push(entry);
        }

        let now = Utc::now();
        for ((linear_id, state), reference) in outputs.iter().zip(&output_refs) {
            let predecessor = inputs
                .iter()
                .find(|r| r.linear_id == *linear_id)
                .copied();
            entries.push(RecordEntry {
                reference: *reference,
                state: state.clone(),
                status: RecordStatus::Unconsumed,
                predecessor,
                consumed_by: None,
                recorded_at: now,
            });
        }

        self.storage.write_transaction(tx_id, &entries)?;

        tracing::info!(
            tx_id = %tx_id,
            consumed = inputs.len(),
            produced = outputs.len(),
            "Finalized transaction recorded"
        );

        Ok(output_refs)
    }

    /// Get one record version
    pub fn get(&self, reference: &RecordRef) -> Result<RecordEntry> {
        self.storage.get_entry(reference)
    }

    // Current-state queries

    /// All UNCONSUMED record versions
    ///
    /// Consumption always happens at the head of a lineage, so the read
    /// walks the heads index rather than every stored version.
    pub fn unconsumed(&self) -> Result<Vec<RecordEntry>> {
        Ok(self
            .storage
            .scan_heads()?
            .into_iter()
            .filter(RecordEntry::is_unconsumed)
            .collect())
    }

    /// All UNCONSUMED account records
    pub fn accounts(&self) -> Result<Vec<(RecordRef, AccountRecord)>> {
        Ok(self
            .unconsumed()?
            .into_iter()
            .filter_map(|e| {
                let account = e.state.payload.as_account()?.clone();
                Some((e.reference, account))
            })
            .collect())
    }

    /// Look up an UNCONSUMED account record by external account number
    pub fn account_by_number(
        &self,
        number: &AccountNumber,
        only_verified: bool,
    ) -> Result<Option<(RecordRef, AccountRecord)>> {
        Ok(self
            .accounts()?
            .into_iter()
            .find(|(_, a)| a.account_number == *number && (!only_verified || a.verified)))
    }

    /// UNCONSUMED cash records owned by a party
    pub fn unconsumed_cash(&self, owner: &PartyId) -> Result<Vec<(RecordRef, CashRecord)>> {
        Ok(self
            .unconsumed()?
            .into_iter()
            .filter_map(|e| {
                let cash = e.state.payload.as_cash()?;
                (cash.owner == *owner).then(|| (e.reference, cash.clone()))
            })
            .collect())
    }

    /// Spendable balance per currency
    pub fn balance(&self, owner: &PartyId, currency: Currency) -> Result<u64> {
        Ok(self
            .unconsumed_cash(owner)?
            .iter()
            .filter(|(_, c)| c.amount.currency == currency)
            .map(|(_, c)| c.amount.quantity)
            .sum())
    }

    /// Spendable balance per currency and issuer
    pub fn balance_with_issuer(
        &self,
        owner: &PartyId,
        currency: Currency,
        issuer: &PartyId,
    ) -> Result<u64> {
        Ok(self
            .unconsumed_cash(owner)?
            .iter()
            .filter(|(_, c)| c.amount.currency == currency && c.issuer == *issuer)
            .map(|(_, c)| c.amount.quantity)
            .sum())
    }

    /// Find the PENDING redemption transfer record matching the given notes
    pub fn pending_redemption_by_notes(
        &self,
        notes: &str,
    ) -> Result<Option<(RecordRef, LedgerTransferRecord)>> {
        Ok(self
            .unconsumed()?
            .into_iter()
            .filter_map(|e| {
                let transfer = e.state.payload.as_ledger_transfer()?;
                (transfer.kind == TransferKind::Redemption
                    && transfer.status == SettlementStatus::Pending
                    && transfer.notes == notes)
                    .then(|| (e.reference, transfer.clone()))
            })
            .next())
    }

    // Reservations

    /// Whether a record is held by an in-flight selection attempt
    pub fn is_reserved(&self, reference: &RecordRef) -> bool {
        self.reserved.contains(reference)
    }

    /// Take an exclusive short-lived hold over the given records
    ///
    /// Fails if any record is already held by another attempt. The hold is
    /// released when the returned guard drops, on success and failure alike.
    pub fn reserve(&self, refs: Vec<RecordRef>) -> Result<Reservation> {
        let mut taken = Vec::with_capacity(refs.len());
        for reference in &refs {
            if !self.reserved.insert(*reference) {
                // Roll back what we already took
                for r in &taken {
                    self.reserved.remove(r);
                }
                return Err(Error::Reserved(reference.to_string()));
            }
            taken.push(*reference);
        }
        Ok(Reservation {
            set: Arc::clone(&self.reserved),
            refs,
        })
    }

    // Checkpoint passthrough (used by the commit protocol's durable store)

    /// Persist a workflow checkpoint
    pub fn save_checkpoint(&self, flow_id: Uuid, bytes: &[u8]) -> Result<()> {
        self.storage.put_checkpoint(flow_id, bytes)
    }

    /// Load a workflow checkpoint
    pub fn load_checkpoint(&self, flow_id: Uuid) -> Result<Option<Vec<u8>>> {
        self.storage.get_checkpoint(flow_id)
    }

    /// Remove a completed workflow checkpoint
    pub fn remove_checkpoint(&self, flow_id: Uuid) -> Result<()> {
        self.storage.delete_checkpoint(flow_id)
    }
}

/// Exclusive hold over candidate records for one workflow attempt
///
/// Dropping the guard releases the hold.
#[derive(Debug)]
pub struct Reservation {
    set: Arc<DashSet<RecordRef>>,
    refs: Vec<RecordRef>,
}

impl Reservation {
    /// The held record references
    pub fn refs(&self) -> &[RecordRef] {
        &self.refs
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        for reference in &self.refs {
            self.set.remove(reference);
        }
    }
}
