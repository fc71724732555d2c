//! Coin selection
//!
//! Picks UNCONSUMED cash records of the initiator to cover a requested
//! amount, holding an exclusive reservation over the picks for the duration
//! of the commit attempt. Selection stays within one issuer so the outputs
//! preserve the per-issuer value invariant.

use crate::{Error, Result};
use std::collections::HashMap;
use tracing::debug;
use vault_core::{Amount, CashRecord, PartyId, RecordRef, RecordState, Reservation, Vault};

/// A reserved set of cash records covering some requested amount
#[derive(Debug)]
pub struct Selection {
    /// Reservation guard; dropping it releases the records
    pub reservation: Reservation,

    /// Selected records with their resolved states
    pub records: Vec<(RecordRef, RecordState)>,

    /// Sum of selected quantities in minor units
    pub total: u64,

    /// Common issuer of the selected records
    pub issuer: PartyId,
}

impl Selection {
    /// Quantity above the requested amount, returned to the owner as change
    pub fn change(&self, requested: &Amount) -> u64 {
        self.total - requested.quantity
    }
}

/// Select cash records of `owner` covering `amount`, any single issuer
pub fn select_cash(vault: &Vault, owner: &PartyId, amount: Amount) -> Result<Selection> {
    select(vault, owner, amount, None)
}

/// Select cash records of `owner` covering `amount`, issued by `issuer`
pub fn select_cash_issued_by(
    vault: &Vault,
    owner: &PartyId,
    amount: Amount,
    issuer: &PartyId,
) -> Result<Selection> {
    select(vault, owner, amount, Some(issuer))
}

fn select(
    vault: &Vault,
    owner: &PartyId,
    amount: Amount,
    issuer: Option<&PartyId>,
) -> Result<Selection> {
    if amount.is_zero() {
        return Err(Error::InvalidRequest("amount must be positive".into()));
    }

    // Candidates: right currency, matching issuer, not held elsewhere
    let candidates: Vec<(RecordRef, CashRecord)> = vault
        .unconsumed_cash(owner)?
        .into_iter()
        .filter(|(reference, cash)| {
            cash.amount.currency == amount.currency
                && issuer.map_or(true, |i| cash.issuer == *i)
                && !vault.is_reserved(reference)
        })
        .collect();
    let available: u64 = candidates.iter().map(|(_, c)| c.amount.quantity).sum();

    let mut by_issuer: HashMap<PartyId, Vec<(RecordRef, CashRecord)>> = HashMap::new();
    for (reference, cash) in candidates {
        by_issuer.entry(cash.issuer.clone()).or_default().push((reference, cash));
    }

    // Richest covering issuer wins; ties broken by party id for determinism
    let mut covering: Vec<(PartyId, Vec<(RecordRef, CashRecord)>, u64)> = by_issuer
        .into_iter()
        .map(|(issuer, records)| {
            let total: u64 = records.iter().map(|(_, c)| c.amount.quantity).sum();
            (issuer, records, total)
        })
        .filter(|(_, _, total)| *total >= amount.quantity)
        .collect();
    covering.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

    let Some((issuer, mut records, _)) = covering.into_iter().next() else {
        return Err(Error::InsufficientFunds {
            requested: amount.quantity,
            available,
            currency: amount.currency,
        });
    };

    // Largest-first keeps the record count down
    records.sort_by(|a, b| b.1.amount.quantity.cmp(&a.1.amount.quantity));
    let mut picked: Vec<(RecordRef, CashRecord)> = Vec::new();
    let mut total: u64 = 0;
    for (reference, cash) in records {
        if total >= amount.quantity {
            break;
        }
        total += cash.amount.quantity;
        picked.push((reference, cash));
    }

    let reservation = vault.reserve(picked.iter().map(|(r, _)| *r).collect())?;
    debug!(
        owner = %owner,
        issuer = %issuer,
        records = picked.len(),
        total,
        requested = amount.quantity,
        "cash selected"
    );

    let records = picked
        .into_iter()
        .map(|(reference, cash)| {
            let state = RecordState::new(
                vault_core::RecordPayload::Cash(cash.clone()),
                vec![cash.owner],
            );
            (reference, state)
        })
        .collect();

    Ok(Selection {
        reservation,
        records,
        total,
        issuer,
    })
}
