//! Core types for the record vault
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (integer minor units for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Party identity within the business network
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyId(String);

impl PartyId {
    /// Create new party ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External bank account number (IBAN, account number, etc.)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Create new account number
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
    /// UAE Dirham
    AED,
    /// Indian Rupee
    INR,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::AED => "AED",
            Currency::INR => "INR",
        }
    }

    /// Parse from ISO 4217 code
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "AED" => Some(Currency::AED),
            "INR" => Some(Currency::INR),
            _ => None,
        }
    }

    /// Minor units per major unit exponent (all supported currencies use 2)
    pub fn minor_unit_exponent(&self) -> u32 {
        2
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Monetary amount as a nonnegative integer quantity of minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// Quantity in minor units (e.g. cents)
    pub quantity: u64,

    /// Currency
    pub currency: Currency,
}

impl Amount {
    /// Create new amount
    pub fn new(quantity: u64, currency: Currency) -> Self {
        Self { quantity, currency }
    }

    /// Checked addition; fails on currency mismatch or overflow
    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        if self.currency != other.currency {
            return None;
        }
        let quantity = self.quantity.checked_add(other.quantity)?;
        Some(Amount::new(quantity, self.currency))
    }

    /// Checked subtraction; fails on currency mismatch or underflow
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if self.currency != other.currency {
            return None;
        }
        let quantity = self.quantity.checked_sub(other.quantity)?;
        Some(Amount::new(quantity, self.currency))
    }

    /// Whether the quantity is zero
    pub fn is_zero(&self) -> bool {
        self.quantity == 0
    }

    /// Exact decimal in major units (for display and reporting)
    pub fn to_decimal(&self) -> Decimal {
        Decimal::from_i128_with_scale(
            self.quantity as i128,
            self.currency.minor_unit_exponent(),
        )
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.currency)
    }
}

/// Directional signed value movement between two account references
///
/// Positive delta = funds arriving at the destination. Either side may be
/// `None` when the external feed could not attribute an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountTransfer {
    /// Signed quantity delta in minor units
    pub quantity_delta: i64,

    /// Currency
    pub currency: Currency,

    /// Source account reference
    pub source: Option<AccountNumber>,

    /// Destination account reference
    pub destination: Option<AccountNumber>,
}

impl AmountTransfer {
    /// Unsigned magnitude of the delta
    pub fn magnitude(&self) -> u64 {
        self.quantity_delta.unsigned_abs()
    }
}

/// Stable identifier shared by every version of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinearId(Uuid);

impl LinearId {
    /// Mint a fresh linear id (UUIDv7 for time-ordering)
    pub fn fresh() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for LinearId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to one specific version of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// Linear id of the record
    pub linear_id: LinearId,

    /// Version number (0-based)
    pub version: u64,
}

impl RecordRef {
    /// Create new reference
    pub fn new(linear_id: LinearId, version: u64) -> Self {
        Self { linear_id, version }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.linear_id, self.version)
    }
}

/// Consumption status of a record version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Current, spendable version
    Unconsumed,
    /// Consumed by an accepted transaction
    Consumed,
}

/// Bank account type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    /// Ordinary current account
    Current,
    /// Collateral (nostro) account
    Collateral,
}

/// Shared record of an external bank account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Owning party
    pub owner: PartyId,

    /// External account number (unique key within the system)
    pub account_number: AccountNumber,

    /// Display name
    pub display_name: String,

    /// Account currency
    pub currency: Currency,

    /// Account type
    pub account_type: AccountType,

    /// Whether the account has been verified against reference data
    ///
    /// Only verified accounts are matchable by the reconciliation engine.
    pub verified: bool,

    /// Last updated timestamp
    pub last_updated: DateTime<Utc>,
}

/// Shared record of cash ownership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashRecord {
    /// Owning party
    pub owner: PartyId,

    /// Amount
    pub amount: Amount,

    /// Issuing party
    pub issuer: PartyId,
}

/// Classification of a nostro event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NostroEventType {
    /// Not yet classified
    Unknown,
    /// Deposit from a counterparty: new cash enters circulation
    Issuance,
    /// Payment out to a counterparty: cash leaves circulation
    Redemption,
    /// Transfer between the local party's own nostro accounts
    CollateralTransfer,
}

/// Match status of a nostro event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NostroEventStatus {
    /// Fresh from the external feed
    Unmatched,
    /// Both sides resolved
    Matched,
    /// Only the local account resolved; held for later resolution
    MatchedIssuerOnly,
}

/// External bank ledger event awaiting reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NostroEventRecord {
    /// The value movement reported by the bank
    pub transfer: AmountTransfer,

    /// Free-text description from the bank statement line
    pub description: String,

    /// Classification
    pub event_type: NostroEventType,

    /// Match status
    pub status: NostroEventStatus,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl NostroEventRecord {
    /// Fresh UNMATCHED event as produced by the external feed
    pub fn unmatched(transfer: AmountTransfer, description: impl Into<String>) -> Self {
        Self {
            transfer,
            description: description.into(),
            event_type: NostroEventType::Unknown,
            status: NostroEventStatus::Unmatched,
            created_at: Utc::now(),
        }
    }
}

/// Kind of an internal issuance/redemption record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    /// Cash entering circulation
    Issuance,
    /// Cash leaving circulation
    Redemption,
}

/// Settlement status of a ledger transfer record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementStatus {
    /// Awaiting confirmation of the matching external payment
    Pending,
    /// Closed out by the settlement matcher
    Complete,
}

/// The local party's internal record of an issuance or redemption event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransferRecord {
    /// The value movement
    pub transfer: AmountTransfer,

    /// Source party
    pub source: PartyId,

    /// Destination party
    pub destination: PartyId,

    /// Free-text notes (also the settlement matching key)
    pub notes: String,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Kind of transfer
    pub kind: TransferKind,

    /// Settlement status (redemptions progress PENDING -> COMPLETE)
    pub status: SettlementStatus,
}

/// Record payload variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordPayload {
    /// Bank account metadata
    Account(AccountRecord),
    /// Cash ownership
    Cash(CashRecord),
    /// External bank event
    NostroEvent(NostroEventRecord),
    /// Internal issuance/redemption record
    LedgerTransfer(LedgerTransferRecord),
}

impl RecordPayload {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            RecordPayload::Account(_) => "account",
            RecordPayload::Cash(_) => "cash",
            RecordPayload::NostroEvent(_) => "nostro-event",
            RecordPayload::LedgerTransfer(_) => "ledger-transfer",
        }
    }

    /// Downcast to an account record
    pub fn as_account(&self) -> Option<&AccountRecord> {
        match self {
            RecordPayload::Account(a) => Some(a),
            _ => None,
        }
    }

    /// Downcast to a cash record
    pub fn as_cash(&self) -> Option<&CashRecord> {
        match self {
            RecordPayload::Cash(c) => Some(c),
            _ => None,
        }
    }

    /// Downcast to a nostro event record
    pub fn as_nostro_event(&self) -> Option<&NostroEventRecord> {
        match self {
            RecordPayload::NostroEvent(n) => Some(n),
            _ => None,
        }
    }

    /// Downcast to a ledger transfer record
    pub fn as_ledger_transfer(&self) -> Option<&LedgerTransferRecord> {
        match self {
            RecordPayload::LedgerTransfer(t) => Some(t),
            _ => None,
        }
    }
}

/// Payload plus the parties entitled to see and act on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordState {
    /// The payload
    pub payload: RecordPayload,

    /// Participant identities
    pub participants: Vec<PartyId>,
}

impl RecordState {
    /// Create new record state
    pub fn new(payload: RecordPayload, participants: Vec<PartyId>) -> Self {
        Self {
            payload,
            participants,
        }
    }
}

/// One stored version of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    /// Reference (linear id + version)
    pub reference: RecordRef,

    /// State at this version
    pub state: RecordState,

    /// Consumption status
    pub status: RecordStatus,

    /// Predecessor version, if any
    pub predecessor: Option<RecordRef>,

    /// Transaction that consumed this version, if any
    pub consumed_by: Option<Uuid>,

    /// When this version was recorded locally
    pub recorded_at: DateTime<Utc>,
}

impl RecordEntry {
    /// Whether this version is current and spendable
    pub fn is_unconsumed(&self) -> bool {
        self.status == RecordStatus::Unconsumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_from_code() {
        assert_eq!(Currency::from_code("USD"), Some(Currency::USD));
        assert_eq!(Currency::from_code("GBP"), Some(Currency::GBP));
        assert_eq!(Currency::from_code("INVALID"), None);
    }

    #[test]
    fn test_amount_checked_arithmetic() {
        let a = Amount::new(6_000, Currency::GBP);
        let b = Amount::new(5_000, Currency::GBP);

        assert_eq!(a.checked_add(&b), Some(Amount::new(11_000, Currency::GBP)));
        assert_eq!(a.checked_sub(&b), Some(Amount::new(1_000, Currency::GBP)));
        assert_eq!(b.checked_sub(&a), None);

        // Currency mismatch
        let c = Amount::new(1, Currency::USD);
        assert_eq!(a.checked_add(&c), None);
    }

    #[test]
    fn test_amount_display_in_major_units() {
        let amount = Amount::new(8_000, Currency::GBP);
        assert_eq!(amount.to_string(), "80.00 GBP");
    }

    #[test]
    fn test_transfer_magnitude() {
        let transfer = AmountTransfer {
            quantity_delta: -10_000,
            currency: Currency::GBP,
            source: Some(AccountNumber::new("12345678")),
            destination: None,
        };
        assert_eq!(transfer.magnitude(), 10_000);
    }

    #[test]
    fn test_linear_id_is_stable_across_versions() {
        let id = LinearId::fresh();
        let v0 = RecordRef::new(id, 0);
        let v1 = RecordRef::new(id, 1);

        assert_eq!(v0.linear_id, v1.linear_id);
        assert_ne!(v0, v1);
    }

    #[test]
    fn test_payload_downcasts() {
        let cash = RecordPayload::Cash(CashRecord {
            owner: PartyId::new("PartyA"),
            amount: Amount::new(100, Currency::USD),
            issuer: PartyId::new("Issuer"),
        });

        assert!(cash.as_cash().is_some());
        assert!(cash.as_account().is_none());
        assert_eq!(cash.kind(), "cash");
    }

    #[test]
    fn test_unmatched_nostro_event_defaults() {
        let event = NostroEventRecord::unmatched(
            AmountTransfer {
                quantity_delta: 5_000,
                currency: Currency::GBP,
                source: None,
                destination: Some(AccountNumber::new("87654321")),
            },
            "ref-001",
        );

        assert_eq!(event.event_type, NostroEventType::Unknown);
        assert_eq!(event.status, NostroEventStatus::Unmatched);
    }
}
