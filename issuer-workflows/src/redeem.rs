//! Cash redemption workflow

use crate::selection::select_cash_issued_by;
use crate::Result;
use commit_protocol::{CommandKind, ProposalBuilder, SessionCoordinator, StampedProposal};
use tracing::info;
use vault_core::{Amount, CashRecord, PartyId, RecordPayload, RecordState};

/// Hand `amount` of cash back to `issuer`, removing it from circulation
///
/// The selected records are consumed with no replacement for the redeemed
/// value; the issuer pays the holder off-rail and the nostro reconciliation
/// engine later records the settlement. Selection overshoot comes back to
/// the holder as change.
pub async fn redeem_cash(
    coordinator: &SessionCoordinator,
    issuer: PartyId,
    amount: Amount,
) -> Result<StampedProposal> {
    let holder = coordinator.identity().clone();
    let selection = select_cash_issued_by(coordinator.vault(), &holder, amount, &issuer)?;

    let mut builder = ProposalBuilder::new(holder.clone());
    for (reference, state) in &selection.records {
        builder = builder.add_input(*reference, state.clone());
    }

    let change = selection.change(&amount);
    if change > 0 {
        builder = builder.add_fresh_output(RecordState::new(
            RecordPayload::Cash(CashRecord {
                owner: holder.clone(),
                amount: Amount::new(change, amount.currency),
                issuer: issuer.clone(),
            }),
            vec![holder.clone()],
        ));
    }

    let proposal = builder
        .add_command(CommandKind::ExitCash, vec![holder.clone(), issuer.clone()])
        .build();

    let stamped = coordinator.commit(proposal, &[issuer.clone()]).await?;
    drop(selection);

    info!(holder = %holder, issuer = %issuer, %amount, change, "cash redeemed");
    Ok(stamped)
}
