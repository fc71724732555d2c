//! Reconciliation engine
//!
//! Consumes UNMATCHED nostro events one at a time: resolves the event's
//! account references against locally-known verified account records,
//! classifies via the rule table, and commits the successor event (plus a
//! ledger transfer record where the rules call for one) with no
//! counter-parties.

use crate::rules::{classify, MatchContext, RuleOutcome};
use crate::{Error, Result};
use chrono::Utc;
use commit_protocol::{CommandKind, ProposalBuilder, SessionCoordinator};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use vault_core::types::{
    LedgerTransferRecord, NostroEventStatus, NostroEventType, SettlementStatus, TransferKind,
};
use vault_core::{AccountNumber, AccountRecord, RecordPayload, RecordRef, RecordState};

/// What happened to one processed event
#[derive(Debug, Clone)]
pub struct ClassificationReport {
    /// The consumed event version
    pub event: RecordRef,

    /// Name of the rule that matched
    pub rule: &'static str,

    /// Assigned event type
    pub event_type: NostroEventType,

    /// Assigned status
    pub status: NostroEventStatus,

    /// Whether a ledger transfer record was produced
    pub transfer_recorded: bool,

    /// The committing transaction id
    pub tx_id: Uuid,
}

/// Classifies nostro events against the local vault
pub struct ReconciliationEngine {
    coordinator: Arc<SessionCoordinator>,
}

impl ReconciliationEngine {
    /// Build an engine over a party's coordinator
    pub fn new(coordinator: Arc<SessionCoordinator>) -> Self {
        Self { coordinator }
    }

    /// References of every UNMATCHED event awaiting classification
    pub fn unmatched_events(&self) -> Result<Vec<RecordRef>> {
        Ok(self
            .coordinator
            .vault()
            .unconsumed()?
            .into_iter()
            .filter(|e| {
                e.state
                    .payload
                    .as_nostro_event()
                    .map_or(false, |event| event.status == NostroEventStatus::Unmatched)
            })
            .map(|e| e.reference)
            .collect())
    }

    /// Classify one UNMATCHED event and commit the resulting mutation
    pub async fn process_event(&self, reference: RecordRef) -> Result<ClassificationReport> {
        let vault = self.coordinator.vault();
        let identity = self.coordinator.identity().clone();

        let entry = vault.get(&reference)?;
        if !entry.is_unconsumed() {
            return Err(Error::DataIntegrity(format!(
                "event {reference} was already processed"
            )));
        }
        let event = entry
            .state
            .payload
            .as_nostro_event()
            .cloned()
            .ok_or_else(|| {
                Error::DataIntegrity(format!("record {reference} is not a nostro event"))
            })?;
        if event.status != NostroEventStatus::Unmatched {
            return Err(Error::DataIntegrity(format!(
                "event {reference} is not UNMATCHED"
            )));
        }

        // Resolve both sides to verified accounts, discarding duplicates
        let mut resolved: Vec<AccountRecord> = Vec::new();
        for number in [&event.transfer.source, &event.transfer.destination] {
            if let Some(account) = self.resolve(number)? {
                if !resolved
                    .iter()
                    .any(|a| a.account_number == account.account_number)
                {
                    resolved.push(account);
                }
            }
        }
        if resolved.is_empty() {
            return Err(Error::DataIntegrity(format!(
                "no verified account matches event {reference} ({})",
                event.description
            )));
        }

        let (local, external): (Vec<_>, Vec<_>) =
            resolved.into_iter().partition(|a| a.owner == identity);
        let ctx = MatchContext {
            local: local.len(),
            external: external.len(),
            delta: event.transfer.quantity_delta,
        };
        let Some((rule, outcome)) = classify(&ctx) else {
            return Err(Error::DataIntegrity(format!(
                "event {reference} matches no classification rule \
                 (local={}, external={}, delta={})",
                ctx.local, ctx.external, ctx.delta
            )));
        };
        debug!(event = %reference, rule, ?outcome, "event classified");

        let event_type = outcome.event_type(ctx.delta);
        let status = match outcome {
            RuleOutcome::IssuerOnly => NostroEventStatus::MatchedIssuerOnly,
            _ => NostroEventStatus::Matched,
        };

        let mut successor = event.clone();
        successor.event_type = event_type;
        successor.status = status;

        let mut builder = ProposalBuilder::new(identity.clone())
            .add_input(reference, entry.state.clone())
            .add_output(
                reference.linear_id,
                RecordState::new(
                    RecordPayload::NostroEvent(successor),
                    vec![identity.clone()],
                ),
            )
            .add_command(CommandKind::MatchNostroEvent, vec![identity.clone()]);

        let transfer_record = match outcome {
            RuleOutcome::Issuance => Some(LedgerTransferRecord {
                transfer: event.transfer.clone(),
                source: external[0].owner.clone(),
                destination: identity.clone(),
                notes: event.description.clone(),
                created_at: Utc::now(),
                kind: TransferKind::Issuance,
                status: SettlementStatus::Complete,
            }),
            RuleOutcome::Redemption => {
                // Reprocessing must not open a second PENDING record
                if vault.pending_redemption_by_notes(&event.description)?.is_some() {
                    info!(
                        event = %reference,
                        notes = %event.description,
                        "pending redemption already recorded, skipping"
                    );
                    None
                } else {
                    Some(LedgerTransferRecord {
                        transfer: event.transfer.clone(),
                        source: identity.clone(),
                        destination: external[0].owner.clone(),
                        notes: event.description.clone(),
                        created_at: Utc::now(),
                        kind: TransferKind::Redemption,
                        status: SettlementStatus::Pending,
                    })
                }
            }
            RuleOutcome::CollateralTransfer | RuleOutcome::IssuerOnly => None,
        };
        let transfer_recorded = transfer_record.is_some();
        if let Some(record) = transfer_record {
            builder = builder
                .add_fresh_output(RecordState::new(
                    RecordPayload::LedgerTransfer(record),
                    vec![identity.clone()],
                ))
                .add_command(CommandKind::RecordTransfer, vec![identity.clone()]);
        }

        let stamped = self.coordinator.commit(builder.build(), &[]).await?;
        info!(
            event = %reference,
            rule,
            ?event_type,
            ?status,
            transfer_recorded,
            "nostro event reconciled"
        );
        Ok(ClassificationReport {
            event: reference,
            rule,
            event_type,
            status,
            transfer_recorded,
            tx_id: stamped.tx_id(),
        })
    }

    fn resolve(&self, number: &Option<AccountNumber>) -> Result<Option<AccountRecord>> {
        match number {
            Some(n) => Ok(self
                .coordinator
                .vault()
                .account_by_number(n, true)?
                .map(|(_, account)| account)),
            None => Ok(None),
        }
    }
}
