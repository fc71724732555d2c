//! Redemption settlement matcher
//!
//! Matches off-rail payment confirmations against PENDING redemption
//! transfer records. Matching is strict: the counterparty account must
//! resolve, the notes must name exactly one pending record, and the amount
//! must agree to the minor unit. Success transitions PENDING to COMPLETE.

use crate::{Error, Result};
use commit_protocol::{CommandKind, ProposalBuilder, SessionCoordinator};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use vault_core::types::{AmountTransfer, SettlementStatus};
use vault_core::{AccountNumber, RecordPayload, RecordRef, RecordState};

/// Confirmation that the issuer's bank executed a redemption payment
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    /// Account number the payment went to
    pub counterparty_account: AccountNumber,

    /// The executed value movement
    pub transfer: AmountTransfer,

    /// Payment reference, matched against the pending record's notes
    pub notes: String,
}

/// Outcome of a successful settlement
#[derive(Debug, Clone)]
pub struct SettlementReport {
    /// The consumed PENDING record version
    pub record: RecordRef,

    /// The committing transaction id
    pub tx_id: Uuid,
}

/// Settles pending redemptions against payment confirmations
pub struct SettlementMatcher {
    coordinator: Arc<SessionCoordinator>,
}

impl SettlementMatcher {
    /// Build a matcher over a party's coordinator
    pub fn new(coordinator: Arc<SessionCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Match one confirmation and complete the pending redemption
    pub async fn settle(&self, confirmation: PaymentConfirmation) -> Result<SettlementReport> {
        let vault = self.coordinator.vault();
        let identity = self.coordinator.identity().clone();

        let Some((_, account)) =
            vault.account_by_number(&confirmation.counterparty_account, true)?
        else {
            return Err(Error::SettlementMismatch(format!(
                "no verified account {} for confirmation {}",
                confirmation.counterparty_account, confirmation.notes
            )));
        };

        let Some((pending_ref, pending)) =
            vault.pending_redemption_by_notes(&confirmation.notes)?
        else {
            return Err(Error::SettlementMismatch(format!(
                "no pending redemption with notes {}",
                confirmation.notes
            )));
        };

        if account.owner != pending.destination {
            return Err(Error::SettlementMismatch(format!(
                "confirmation pays {} but redemption {} is owed to {}",
                account.owner, confirmation.notes, pending.destination
            )));
        }
        if confirmation.transfer.currency != pending.transfer.currency
            || confirmation.transfer.magnitude() != pending.transfer.magnitude()
        {
            return Err(Error::SettlementMismatch(format!(
                "payment of {} {} does not equal pending {} {}",
                confirmation.transfer.magnitude(),
                confirmation.transfer.currency,
                pending.transfer.magnitude(),
                pending.transfer.currency
            )));
        }

        let mut complete = pending.clone();
        complete.status = SettlementStatus::Complete;

        let entry = vault.get(&pending_ref)?;
        let proposal = ProposalBuilder::new(identity.clone())
            .add_input(pending_ref, entry.state)
            .add_output(
                pending_ref.linear_id,
                RecordState::new(
                    RecordPayload::LedgerTransfer(complete),
                    vec![identity.clone()],
                ),
            )
            .add_command(CommandKind::SettleRedemption, vec![identity])
            .build();

        let stamped = self.coordinator.commit(proposal, &[]).await?;
        info!(
            record = %pending_ref,
            notes = %confirmation.notes,
            "redemption settled"
        );
        Ok(SettlementReport {
            record: pending_ref,
            tx_id: stamped.tx_id(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::tests_support::lone_coordinator;
    use super::*;
    use chrono::Utc;
    use vault_core::types::{AccountType, LedgerTransferRecord, TransferKind};
    use vault_core::{AccountRecord, Currency, PartyId};

    fn verified_account(owner: &str, number: &str) -> RecordState {
        RecordState::new(
            RecordPayload::Account(AccountRecord {
                owner: PartyId::new(owner),
                account_number: AccountNumber::new(number),
                display_name: format!("{owner} account"),
                currency: Currency::GBP,
                account_type: AccountType::Current,
                verified: true,
                last_updated: Utc::now(),
            }),
            vec![PartyId::new(owner)],
        )
    }

    fn pending_redemption(quantity: u64, destination: &str, notes: &str) -> RecordState {
        RecordState::new(
            RecordPayload::LedgerTransfer(LedgerTransferRecord {
                transfer: AmountTransfer {
                    quantity_delta: -(quantity as i64),
                    currency: Currency::GBP,
                    source: None,
                    destination: None,
                },
                source: PartyId::new("Issuer"),
                destination: PartyId::new(destination),
                notes: notes.to_string(),
                created_at: Utc::now(),
                kind: TransferKind::Redemption,
                status: SettlementStatus::Pending,
            }),
            vec![PartyId::new("Issuer")],
        )
    }

    fn confirmation(quantity: u64, account: &str, notes: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            counterparty_account: AccountNumber::new(account),
            transfer: AmountTransfer {
                quantity_delta: -(quantity as i64),
                currency: Currency::GBP,
                source: None,
                destination: Some(AccountNumber::new(account)),
            },
            notes: notes.to_string(),
        }
    }

    #[tokio::test]
    async fn test_exact_confirmation_completes_the_redemption() {
        let (coordinator, _dir) = lone_coordinator("Issuer");
        let vault = coordinator.vault().clone();
        vault.insert(verified_account("BankA", "33333333")).unwrap();
        vault.insert(pending_redemption(6_000, "BankA", "redeem-1")).unwrap();

        let matcher = SettlementMatcher::new(Arc::clone(&coordinator));
        matcher
            .settle(confirmation(6_000, "33333333", "redeem-1"))
            .await
            .unwrap();

        // PENDING -> COMPLETE exactly once
        assert!(vault.pending_redemption_by_notes("redeem-1").unwrap().is_none());
        let err = matcher
            .settle(confirmation(6_000, "33333333", "redeem-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SettlementMismatch(_)));
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_rejected() {
        let (coordinator, _dir) = lone_coordinator("Issuer");
        let vault = coordinator.vault().clone();
        vault.insert(verified_account("BankA", "33333333")).unwrap();
        vault.insert(pending_redemption(6_000, "BankA", "redeem-1")).unwrap();

        let matcher = SettlementMatcher::new(Arc::clone(&coordinator));

        // Off by one minor unit in either direction
        for quantity in [5_999, 6_001] {
            let err = matcher
                .settle(confirmation(quantity, "33333333", "redeem-1"))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::SettlementMismatch(_)));
        }

        // The pending record is untouched
        assert!(vault.pending_redemption_by_notes("redeem-1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_counterparty_account_is_rejected() {
        let (coordinator, _dir) = lone_coordinator("Issuer");
        let vault = coordinator.vault().clone();
        vault.insert(pending_redemption(6_000, "BankA", "redeem-1")).unwrap();

        let matcher = SettlementMatcher::new(Arc::clone(&coordinator));
        let err = matcher
            .settle(confirmation(6_000, "33333333", "redeem-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SettlementMismatch(_)));
    }

    #[tokio::test]
    async fn test_wrong_destination_is_rejected() {
        let (coordinator, _dir) = lone_coordinator("Issuer");
        let vault = coordinator.vault().clone();
        vault.insert(verified_account("BankB", "44444444")).unwrap();
        vault.insert(pending_redemption(6_000, "BankA", "redeem-1")).unwrap();

        let matcher = SettlementMatcher::new(Arc::clone(&coordinator));
        let err = matcher
            .settle(confirmation(6_000, "44444444", "redeem-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SettlementMismatch(_)));
    }
}
