//! Cash transfer workflow

use crate::selection::select_cash;
use crate::Result;
use commit_protocol::{CommandKind, ProposalBuilder, SessionCoordinator, StampedProposal};
use tracing::info;
use vault_core::{Amount, CashRecord, PartyId, RecordPayload, RecordState};

/// Move `amount` of the initiator's cash to `recipient`
///
/// The recipient gets one record of the exact amount; any selection overshoot
/// comes back to the initiator as a change record. A transfer to self opens
/// no session.
pub async fn transfer_cash(
    coordinator: &SessionCoordinator,
    recipient: PartyId,
    amount: Amount,
) -> Result<StampedProposal> {
    let sender = coordinator.identity().clone();
    let selection = select_cash(coordinator.vault(), &sender, amount)?;

    let mut builder = ProposalBuilder::new(sender.clone());
    for (reference, state) in &selection.records {
        builder = builder.add_input(*reference, state.clone());
    }

    builder = builder.add_fresh_output(RecordState::new(
        RecordPayload::Cash(CashRecord {
            owner: recipient.clone(),
            amount,
            issuer: selection.issuer.clone(),
        }),
        vec![recipient.clone()],
    ));

    let change = selection.change(&amount);
    if change > 0 {
        builder = builder.add_fresh_output(RecordState::new(
            RecordPayload::Cash(CashRecord {
                owner: sender.clone(),
                amount: Amount::new(change, amount.currency),
                issuer: selection.issuer.clone(),
            }),
            vec![sender.clone()],
        ));
    }

    let mut signers = vec![sender.clone()];
    if recipient != sender {
        signers.push(recipient.clone());
    }
    let proposal = builder.add_command(CommandKind::MoveCash, signers).build();

    let counterparties = if recipient == sender {
        Vec::new()
    } else {
        vec![recipient.clone()]
    };

    // The reservation stays alive across the commit attempt
    let stamped = coordinator.commit(proposal, &counterparties).await?;
    drop(selection);

    info!(
        sender = %sender,
        recipient = %recipient,
        %amount,
        change,
        "cash transferred"
    );
    Ok(stamped)
}
