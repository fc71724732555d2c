//! Classification rule table
//!
//! An ordered slice of named rules over the ownership of a nostro event's
//! resolved accounts and the sign of its delta. First match wins; an event
//! matching no rule is a data-integrity problem for the caller to surface.
//! Classification is a pure function of `(local, external, delta)`.

use vault_core::types::NostroEventType;

/// Ownership resolution of one nostro event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchContext {
    /// Resolved verified accounts owned by the local party
    pub local: usize,

    /// Resolved verified accounts owned by other parties
    pub external: usize,

    /// Signed minor-unit delta of the event
    pub delta: i64,
}

/// What a matched rule asks the engine to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Movement between two of our own accounts; acknowledge, no transfer
    CollateralTransfer,

    /// Only our side resolved; hold with a provisional type by delta sign
    IssuerOnly,

    /// Funds arrived from a known counterparty; record a completed issuance
    Issuance,

    /// Funds left towards a known counterparty; open a pending redemption
    Redemption,
}

impl RuleOutcome {
    /// The event type this outcome assigns, given the delta sign
    pub fn event_type(&self, delta: i64) -> NostroEventType {
        match self {
            RuleOutcome::CollateralTransfer => NostroEventType::CollateralTransfer,
            RuleOutcome::Issuance => NostroEventType::Issuance,
            RuleOutcome::Redemption => NostroEventType::Redemption,
            RuleOutcome::IssuerOnly => match delta.signum() {
                1 => NostroEventType::Issuance,
                -1 => NostroEventType::Redemption,
                _ => NostroEventType::Unknown,
            },
        }
    }
}

/// One named classification rule
pub struct Rule {
    /// Stable name, used in reports and logs
    pub name: &'static str,
    applies: fn(&MatchContext) -> bool,
    /// The action taken on match
    pub outcome: RuleOutcome,
}

impl Rule {
    /// Whether this rule matches the context
    pub fn matches(&self, ctx: &MatchContext) -> bool {
        (self.applies)(ctx)
    }
}

/// The ordered rule table; first match wins
pub const RULES: &[Rule] = &[
    Rule {
        name: "internal-collateral-movement",
        applies: |c| c.local == 2,
        outcome: RuleOutcome::CollateralTransfer,
    },
    Rule {
        name: "issuer-side-only",
        applies: |c| c.local == 1 && c.external == 0,
        outcome: RuleOutcome::IssuerOnly,
    },
    Rule {
        name: "inbound-issuance",
        applies: |c| c.local == 1 && c.external == 1 && c.delta > 0,
        outcome: RuleOutcome::Issuance,
    },
    Rule {
        name: "outbound-redemption",
        applies: |c| c.local == 1 && c.external == 1 && c.delta < 0,
        outcome: RuleOutcome::Redemption,
    },
];

/// Classify a context against the rule table
pub fn classify(ctx: &MatchContext) -> Option<(&'static str, RuleOutcome)> {
    RULES
        .iter()
        .find(|rule| rule.matches(ctx))
        .map(|rule| (rule.name, rule.outcome))
}
