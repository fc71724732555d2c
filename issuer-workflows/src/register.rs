//! Bank account registration workflow

use crate::{Error, Result};
use chrono::Utc;
use commit_protocol::{CommandKind, ProposalBuilder, SessionCoordinator, StampedProposal};
use tracing::info;
use vault_core::types::AccountType;
use vault_core::{AccountNumber, AccountRecord, Currency, PartyId, RecordPayload, RecordState};

/// Details supplied when registering an external bank account
#[derive(Debug, Clone)]
pub struct AccountDetails {
    /// External account number (the unique key)
    pub account_number: AccountNumber,

    /// Human-readable name
    pub display_name: String,

    /// Account currency
    pub currency: Currency,

    /// CURRENT or COLLATERAL
    pub account_type: AccountType,
}

/// Register an external bank account as an unverified record
///
/// The verifier countersigns the registration; verification itself is a
/// separate out-of-band process and a later record update. At most one
/// account record may exist per account number.
pub async fn register_account(
    coordinator: &SessionCoordinator,
    details: AccountDetails,
    verifier: PartyId,
) -> Result<StampedProposal> {
    let owner = coordinator.identity().clone();

    if let Some((existing, _)) = coordinator
        .vault()
        .account_by_number(&details.account_number, false)?
    {
        return Err(Error::DuplicateAccount {
            account_number: details.account_number,
            existing: existing.linear_id,
        });
    }

    let account = AccountRecord {
        owner: owner.clone(),
        account_number: details.account_number.clone(),
        display_name: details.display_name,
        currency: details.currency,
        account_type: details.account_type,
        verified: false,
        last_updated: Utc::now(),
    };

    let proposal = ProposalBuilder::new(owner.clone())
        .add_fresh_output(RecordState::new(
            RecordPayload::Account(account),
            vec![owner.clone(), verifier.clone()],
        ))
        .add_command(
            CommandKind::AddAccount,
            vec![owner.clone(), verifier.clone()],
        )
        .build();

    let stamped = coordinator.commit(proposal, &[verifier.clone()]).await?;
    info!(
        owner = %owner,
        verifier = %verifier,
        account_number = %details.account_number,
        "account registered"
    );
    Ok(stamped)
}
