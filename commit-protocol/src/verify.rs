//! Command assertions evaluated against pre- and post-state
//!
//! Run locally by the initiator before any network interaction and by every
//! counter-party before countersigning. Failure here aborts the transaction
//! with no side effects.

use crate::{
    proposal::{Command, CommandKind, Proposal},
    Error, Result,
};
use std::collections::HashMap;
use vault_core::types::{NostroEventStatus, SettlementStatus, TransferKind};
use vault_core::{CashRecord, Currency, PartyId, RecordPayload};

fn validation(msg: impl Into<String>) -> Error {
    Error::Validation(msg.into())
}

/// Evaluate every command's assertions against the proposal
pub fn verify_proposal(proposal: &Proposal) -> Result<()> {
    if proposal.commands.is_empty() {
        return Err(validation("proposal carries no commands"));
    }
    if proposal.inputs.is_empty() && proposal.outputs.is_empty() {
        return Err(validation("proposal neither consumes nor produces records"));
    }

    // Every record must be governed by a command whose assertions examine
    // that payload kind; ungoverned records would slip past all checks below
    for payload in proposal
        .inputs
        .iter()
        .map(|i| &i.state.payload)
        .chain(proposal.outputs.iter().map(|o| &o.state.payload))
    {
        let governed = match payload {
            RecordPayload::Cash(_) => {
                has_command(proposal, CommandKind::MoveCash)
                    || has_command(proposal, CommandKind::ExitCash)
            }
            RecordPayload::Account(_) => has_command(proposal, CommandKind::AddAccount),
            RecordPayload::NostroEvent(_) => has_command(proposal, CommandKind::MatchNostroEvent),
            RecordPayload::LedgerTransfer(_) => {
                has_command(proposal, CommandKind::RecordTransfer)
                    || has_command(proposal, CommandKind::SettleRedemption)
            }
        };
        if !governed {
            return Err(validation(format!(
                "{} record is not governed by any command",
                payload.kind()
            )));
        }
    }

    for command in &proposal.commands {
        if command.signers.is_empty() {
            return Err(validation("command without required signers"));
        }
        match command.kind {
            CommandKind::MoveCash => verify_move_cash(proposal, command)?,
            CommandKind::ExitCash => verify_exit_cash(proposal, command)?,
            CommandKind::AddAccount => verify_add_account(proposal, command)?,
            CommandKind::MatchNostroEvent => verify_match_nostro(proposal)?,
            CommandKind::RecordTransfer => verify_record_transfer(proposal)?,
            CommandKind::SettleRedemption => verify_settle_redemption(proposal)?,
        }
    }

    Ok(())
}

fn has_command(proposal: &Proposal, kind: CommandKind) -> bool {
    proposal.commands.iter().any(|c| c.kind == kind)
}

fn input_cash(proposal: &Proposal) -> Vec<&CashRecord> {
    proposal
        .inputs
        .iter()
        .filter_map(|i| i.state.payload.as_cash())
        .collect()
}

fn output_cash(proposal: &Proposal) -> Vec<&CashRecord> {
    proposal
        .outputs
        .iter()
        .filter_map(|o| o.state.payload.as_cash())
        .collect()
}

fn sum_by_issuer(records: &[&CashRecord]) -> HashMap<(Currency, PartyId), u128> {
    let mut sums: HashMap<(Currency, PartyId), u128> = HashMap::new();
    for cash in records {
        *sums
            .entry((cash.amount.currency, cash.issuer.clone()))
            .or_default() += cash.amount.quantity as u128;
    }
    sums
}

fn verify_move_cash(proposal: &Proposal, command: &Command) -> Result<()> {
    let inputs = input_cash(proposal);
    let outputs = output_cash(proposal);

    if inputs.is_empty() {
        return Err(validation("move consumes no cash"));
    }
    if outputs.is_empty() {
        return Err(validation("move produces no cash"));
    }
    if outputs.iter().any(|c| c.amount.is_zero()) {
        return Err(validation("move produces a zero-quantity cash record"));
    }

    // Value conservation per currency/issuer
    if sum_by_issuer(&inputs) != sum_by_issuer(&outputs) {
        return Err(validation(
            "move does not conserve value per currency/issuer",
        ));
    }

    // Every current owner must sign away their records
    for cash in &inputs {
        if !command.signers.contains(&cash.owner) {
            return Err(validation(format!(
                "cash owner {} is not a required signer",
                cash.owner
            )));
        }
    }

    Ok(())
}

fn verify_exit_cash(proposal: &Proposal, command: &Command) -> Result<()> {
    let inputs = input_cash(proposal);
    let outputs = output_cash(proposal);

    if inputs.is_empty() {
        return Err(validation("exit consumes no cash"));
    }

    // Change may flow back to the redeeming owner, nothing else
    for cash in &outputs {
        if !inputs.iter().any(|i| i.owner == cash.owner) {
            return Err(validation(format!(
                "exit change record owned by non-participant {}",
                cash.owner
            )));
        }
    }

    let input_sums = sum_by_issuer(&inputs);
    let output_sums = sum_by_issuer(&outputs);

    // Change must stay within the consumed currency/issuer pairs; an output
    // under any other key is minted, not returned
    for (currency, issuer) in output_sums.keys() {
        if !input_sums.contains_key(&(*currency, issuer.clone())) {
            return Err(validation(format!(
                "exit mints {} cash issued by {}",
                currency.code(),
                issuer
            )));
        }
    }
    for (key, input_sum) in &input_sums {
        let output_sum = output_sums.get(key).copied().unwrap_or(0);
        if output_sum >= *input_sum {
            return Err(validation("exit removes no value from circulation"));
        }
    }

    for cash in &inputs {
        if !command.signers.contains(&cash.owner) {
            return Err(validation(format!(
                "cash owner {} is not a required signer",
                cash.owner
            )));
        }
        if !command.signers.contains(&cash.issuer) {
            return Err(validation(format!(
                "issuer {} is not a required signer",
                cash.issuer
            )));
        }
    }

    Ok(())
}

fn verify_add_account(proposal: &Proposal, command: &Command) -> Result<()> {
    if !proposal.inputs.is_empty() {
        return Err(validation("account registration consumes records"));
    }
    if proposal.outputs.len() != 1 {
        return Err(validation("account registration must produce exactly one record"));
    }

    let account = proposal.outputs[0]
        .state
        .payload
        .as_account()
        .ok_or_else(|| validation("account registration output is not an account"))?;

    // Verification is a separate process; registration never vouches
    if account.verified {
        return Err(validation("new account records must be unverified"));
    }
    if !command.signers.contains(&account.owner) {
        return Err(validation("account owner is not a required signer"));
    }

    Ok(())
}

fn verify_match_nostro(proposal: &Proposal) -> Result<()> {
    let (input_ref, input_event) = proposal
        .inputs
        .iter()
        .filter_map(|i| i.state.payload.as_nostro_event().map(|e| (i.reference, e)))
        .next()
        .ok_or_else(|| validation("classification consumes no nostro event"))?;

    if input_event.status != NostroEventStatus::Unmatched {
        return Err(validation("nostro event was already classified"));
    }

    let (output_id, output_event) = proposal
        .outputs
        .iter()
        .filter_map(|o| o.state.payload.as_nostro_event().map(|e| (o.linear_id, e)))
        .next()
        .ok_or_else(|| validation("classification produces no nostro event successor"))?;

    if output_id != input_ref.linear_id {
        return Err(validation("nostro successor must keep the event's linear id"));
    }
    if output_event.transfer != input_event.transfer
        || output_event.description != input_event.description
    {
        return Err(validation("classification may only change type and status"));
    }
    if output_event.status == NostroEventStatus::Unmatched {
        return Err(validation("classification must move the event out of UNMATCHED"));
    }

    Ok(())
}

fn verify_record_transfer(proposal: &Proposal) -> Result<()> {
    let transfers: Vec<_> = proposal
        .outputs
        .iter()
        .filter_map(|o| o.state.payload.as_ledger_transfer())
        .collect();

    if transfers.len() != 1 {
        return Err(validation("expected exactly one ledger transfer output"));
    }

    let transfer = transfers[0];
    match (transfer.kind, transfer.status) {
        (TransferKind::Redemption, SettlementStatus::Pending) => Ok(()),
        (TransferKind::Issuance, SettlementStatus::Complete) => Ok(()),
        _ => Err(validation(
            "ledger transfer created with inconsistent kind/status",
        )),
    }
}

fn verify_settle_redemption(proposal: &Proposal) -> Result<()> {
    let (input_ref, pending) = proposal
        .inputs
        .iter()
        .filter_map(|i| i.state.payload.as_ledger_transfer().map(|t| (i.reference, t)))
        .next()
        .ok_or_else(|| validation("settlement consumes no ledger transfer"))?;

    if pending.kind != TransferKind::Redemption || pending.status != SettlementStatus::Pending {
        return Err(validation("settlement input is not a pending redemption"));
    }

    let (output_id, complete) = proposal
        .outputs
        .iter()
        .filter_map(|o| o.state.payload.as_ledger_transfer().map(|t| (o.linear_id, t)))
        .next()
        .ok_or_else(|| validation("settlement produces no ledger transfer successor"))?;

    if output_id != input_ref.linear_id {
        return Err(validation("settlement successor must keep the record's linear id"));
    }
    if complete.status != SettlementStatus::Complete {
        return Err(validation("settlement successor must be COMPLETE"));
    }
    if complete.transfer != pending.transfer || complete.notes != pending.notes {
        return Err(validation("settlement may only change the status"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::ProposalBuilder;
    use chrono::Utc;
    use vault_core::types::{
        AmountTransfer, LedgerTransferRecord, NostroEventRecord, NostroEventType,
    };
    use vault_core::{
        Amount, LinearId, RecordPayload, RecordRef, RecordState,
    };

    fn cash_state(owner: &str, quantity: u64, issuer: &str) -> RecordState {
        RecordState::new(
            RecordPayload::Cash(CashRecord {
                owner: PartyId::new(owner),
                amount: Amount::new(quantity, Currency::GBP),
                issuer: PartyId::new(issuer),
            }),
            vec![PartyId::new(owner)],
        )
    }

    fn signers(names: &[&str]) -> Vec<PartyId> {
        names.iter().map(|n| PartyId::new(*n)).collect()
    }

    #[test]
    fn test_move_cash_conserves_value() {
        let proposal = ProposalBuilder::new(PartyId::new("Alice"))
            .add_input(
                RecordRef::new(LinearId::fresh(), 0),
                cash_state("Alice", 11_000, "Issuer"),
            )
            .add_fresh_output(cash_state("Bob", 8_000, "Issuer"))
            .add_fresh_output(cash_state("Alice", 3_000, "Issuer"))
            .add_command(CommandKind::MoveCash, signers(&["Alice", "Bob"]))
            .build();

        assert!(verify_proposal(&proposal).is_ok());
    }

    #[test]
    fn test_move_cash_rejects_value_creation() {
        let proposal = ProposalBuilder::new(PartyId::new("Alice"))
            .add_input(
                RecordRef::new(LinearId::fresh(), 0),
                cash_state("Alice", 5_000, "Issuer"),
            )
            .add_fresh_output(cash_state("Bob", 6_000, "Issuer"))
            .add_command(CommandKind::MoveCash, signers(&["Alice", "Bob"]))
            .build();

        assert!(matches!(
            verify_proposal(&proposal),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_move_cash_requires_owner_signature() {
        let proposal = ProposalBuilder::new(PartyId::new("Mallory"))
            .add_input(
                RecordRef::new(LinearId::fresh(), 0),
                cash_state("Alice", 5_000, "Issuer"),
            )
            .add_fresh_output(cash_state("Mallory", 5_000, "Issuer"))
            .add_command(CommandKind::MoveCash, signers(&["Mallory"]))
            .build();

        assert!(verify_proposal(&proposal).is_err());
    }

    #[test]
    fn test_exit_cash_must_burn_value() {
        let exact = ProposalBuilder::new(PartyId::new("Alice"))
            .add_input(
                RecordRef::new(LinearId::fresh(), 0),
                cash_state("Alice", 5_000, "Issuer"),
            )
            .add_command(CommandKind::ExitCash, signers(&["Alice", "Issuer"]))
            .build();
        assert!(verify_proposal(&exact).is_ok());

        let with_change = ProposalBuilder::new(PartyId::new("Alice"))
            .add_input(
                RecordRef::new(LinearId::fresh(), 0),
                cash_state("Alice", 6_000, "Issuer"),
            )
            .add_fresh_output(cash_state("Alice", 1_000, "Issuer"))
            .add_command(CommandKind::ExitCash, signers(&["Alice", "Issuer"]))
            .build();
        assert!(verify_proposal(&with_change).is_ok());

        let no_burn = ProposalBuilder::new(PartyId::new("Alice"))
            .add_input(
                RecordRef::new(LinearId::fresh(), 0),
                cash_state("Alice", 5_000, "Issuer"),
            )
            .add_fresh_output(cash_state("Alice", 5_000, "Issuer"))
            .add_command(CommandKind::ExitCash, signers(&["Alice", "Issuer"]))
            .build();
        assert!(verify_proposal(&no_burn).is_err());
    }

    #[test]
    fn test_exit_cash_rejects_change_under_a_foreign_issuer() {
        // Consumes IssuerA cash but returns "change" issued by IssuerB:
        // that output is minted supply, however the amounts compare
        let proposal = ProposalBuilder::new(PartyId::new("Alice"))
            .add_input(
                RecordRef::new(LinearId::fresh(), 0),
                cash_state("Alice", 5_000, "IssuerA"),
            )
            .add_fresh_output(cash_state("Alice", 1_000, "IssuerA"))
            .add_fresh_output(cash_state("Alice", 1_000_000, "IssuerB"))
            .add_command(CommandKind::ExitCash, signers(&["Alice", "IssuerA"]))
            .build();

        assert!(matches!(
            verify_proposal(&proposal),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_records_require_a_governing_command() {
        let transfer = LedgerTransferRecord {
            transfer: AmountTransfer {
                quantity_delta: 5_000,
                currency: Currency::GBP,
                source: None,
                destination: None,
            },
            source: PartyId::new("Bank"),
            destination: PartyId::new("Issuer"),
            notes: "stmt-7".to_string(),
            created_at: Utc::now(),
            kind: TransferKind::Issuance,
            status: SettlementStatus::Complete,
        };

        // A RecordTransfer proposal smuggling a cash output: no cash command
        // is present, so nothing would examine that record
        let proposal = ProposalBuilder::new(PartyId::new("Issuer"))
            .add_fresh_output(RecordState::new(
                RecordPayload::LedgerTransfer(transfer),
                signers(&["Issuer"]),
            ))
            .add_fresh_output(cash_state("Issuer", 1_000_000, "Issuer"))
            .add_command(CommandKind::RecordTransfer, signers(&["Issuer"]))
            .build();

        assert!(matches!(
            verify_proposal(&proposal),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_add_account_rejects_pre_verified_records() {
        let state = RecordState::new(
            RecordPayload::Account(vault_core::AccountRecord {
                owner: PartyId::new("Alice"),
                account_number: vault_core::AccountNumber::new("12345678"),
                display_name: "Alice current".to_string(),
                currency: Currency::GBP,
                account_type: vault_core::types::AccountType::Current,
                verified: true,
                last_updated: Utc::now(),
            }),
            signers(&["Alice", "Issuer"]),
        );

        let proposal = ProposalBuilder::new(PartyId::new("Alice"))
            .add_fresh_output(state)
            .add_command(CommandKind::AddAccount, signers(&["Alice", "Issuer"]))
            .build();

        assert!(verify_proposal(&proposal).is_err());
    }

    #[test]
    fn test_match_nostro_successor_shape() {
        let event = NostroEventRecord::unmatched(
            AmountTransfer {
                quantity_delta: 5_000,
                currency: Currency::GBP,
                source: None,
                destination: None,
            },
            "stmt-1",
        );
        let linear_id = LinearId::fresh();

        let mut matched = event.clone();
        matched.event_type = NostroEventType::Issuance;
        matched.status = NostroEventStatus::Matched;

        let ok = ProposalBuilder::new(PartyId::new("Issuer"))
            .add_input(
                RecordRef::new(linear_id, 0),
                RecordState::new(RecordPayload::NostroEvent(event.clone()), signers(&["Issuer"])),
            )
            .add_output(
                linear_id,
                RecordState::new(RecordPayload::NostroEvent(matched.clone()), signers(&["Issuer"])),
            )
            .add_command(CommandKind::MatchNostroEvent, signers(&["Issuer"]))
            .build();
        assert!(verify_proposal(&ok).is_ok());

        // Tampering with the transfer is rejected
        let mut tampered = matched;
        tampered.transfer.quantity_delta = 9_999;
        let bad = ProposalBuilder::new(PartyId::new("Issuer"))
            .add_input(
                RecordRef::new(linear_id, 0),
                RecordState::new(RecordPayload::NostroEvent(event), signers(&["Issuer"])),
            )
            .add_output(
                linear_id,
                RecordState::new(RecordPayload::NostroEvent(tampered), signers(&["Issuer"])),
            )
            .add_command(CommandKind::MatchNostroEvent, signers(&["Issuer"]))
            .build();
        assert!(verify_proposal(&bad).is_err());
    }

    #[test]
    fn test_settle_redemption_transition() {
        let transfer = AmountTransfer {
            quantity_delta: -5_000,
            currency: Currency::GBP,
            source: None,
            destination: None,
        };
        let pending = LedgerTransferRecord {
            transfer: transfer.clone(),
            source: PartyId::new("Issuer"),
            destination: PartyId::new("Alice"),
            notes: "redemption-1".to_string(),
            created_at: Utc::now(),
            kind: TransferKind::Redemption,
            status: SettlementStatus::Pending,
        };
        let mut complete = pending.clone();
        complete.status = SettlementStatus::Complete;

        let linear_id = LinearId::fresh();
        let proposal = ProposalBuilder::new(PartyId::new("Issuer"))
            .add_input(
                RecordRef::new(linear_id, 0),
                RecordState::new(
                    RecordPayload::LedgerTransfer(pending),
                    signers(&["Issuer"]),
                ),
            )
            .add_output(
                linear_id,
                RecordState::new(
                    RecordPayload::LedgerTransfer(complete),
                    signers(&["Issuer"]),
                ),
            )
            .add_command(CommandKind::SettleRedemption, signers(&["Issuer"]))
            .build();

        assert!(verify_proposal(&proposal).is_ok());
    }

    #[test]
    fn test_empty_proposal_is_rejected() {
        let proposal = ProposalBuilder::new(PartyId::new("Alice")).build();
        assert!(matches!(
            verify_proposal(&proposal),
            Err(Error::Validation(_))
        ));
    }
}
