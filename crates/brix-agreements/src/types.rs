use brix_types::{
    AccountAddress, AgreementId, Amount, LifecycleState, PropertyId, BPS_DENOMINATOR,
};
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: i64 = 86_400;
/// Fixed monthly repayment cadence.
pub const PAYMENT_INTERVAL_SECS: i64 = 30 * SECONDS_PER_DAY;
/// Rebate on the remaining balance when an agreement is settled early.
pub const EARLY_REBATE_BPS: u64 = 1_000;

pub const MAX_TERM_MONTHS: u32 = 360;
pub const MAX_RATE_BPS: u64 = 5_000;
pub const MAX_PENALTY_BPS: u64 = 1_000;
pub const MIN_GRACE_DAYS: u32 = 1;
pub const MAX_GRACE_DAYS: u32 = 365;

/// One tokenized yield stream: upfront capital advanced against a
/// fixed-term, fixed-rate repayment schedule.
///
/// `total_repaid` is monotonically non-decreasing; `active == false` is
/// terminal. Records are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agreement {
    pub id: AgreementId,
    pub property_id: PropertyId,
    pub creator: AccountAddress,
    /// Identity allowed to repay besides the creator.
    pub authorized_payer: Option<AccountAddress>,

    pub upfront_capital: Amount,
    pub term_months: u32,
    pub annual_rate_bps: u64,

    pub grace_period_days: u32,
    pub default_penalty_bps: u64,
    pub default_threshold: u32,
    pub allow_partial: bool,
    pub allow_early: bool,
    /// Consult the identity registry before admitting share recipients.
    pub require_approved_holders: bool,

    pub active: bool,
    pub in_default: bool,
    pub total_repaid: Amount,
    pub accumulated_arrears: Amount,
    pub overpayment_credit: Amount,
    pub prepayment_amount: Amount,
    pub reserve_balance: Amount,
    pub missed_payment_count: u32,

    pub created_at: i64,
    pub last_repayment_at: i64,
    pub last_missed_payment_at: Option<i64>,
    pub grace_period_expires_at: Option<i64>,
}

impl Agreement {
    /// Simple interest over the full term:
    /// `capital + capital * rate_bps/10_000 * term/12`.
    pub fn total_expected(&self) -> Amount {
        let capital = self.upfront_capital.to_units() as u128;
        let interest = capital * self.annual_rate_bps as u128 * self.term_months as u128
            / (BPS_DENOMINATOR as u128 * 12);
        Amount::from_units((capital + interest).min(u64::MAX as u128) as u64)
    }

    /// Evenly amortized monthly obligation. Ceiling division, so exactly
    /// `term_months` on-schedule payments always retire the obligation.
    pub fn monthly_payment(&self) -> Amount {
        self.total_expected().div_ceil(self.term_months as u64)
    }

    pub fn remaining_balance(&self) -> Amount {
        self.total_expected().saturating_sub(self.total_repaid)
    }

    pub fn next_payment_due(&self) -> i64 {
        self.last_repayment_at + PAYMENT_INTERVAL_SECS
    }

    pub fn default_state(&self) -> DefaultState {
        if self.in_default {
            DefaultState::Defaulted
        } else if self.grace_period_expires_at.is_some() {
            DefaultState::GracePeriod
        } else {
            DefaultState::Current
        }
    }
}

/// Missed-payment state machine: `Current → GracePeriod → Defaulted`.
/// A repayment during the grace period cures back to `Current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultState {
    Current,
    GracePeriod,
    Defaulted,
}

impl LifecycleState for DefaultState {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Defaulted)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use DefaultState::*;
        matches!(
            (self, next),
            (Current, GracePeriod) | (GracePeriod, Defaulted) | (GracePeriod, Current)
        )
    }
}

/// Pure status projection exposed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementStatus {
    pub active: bool,
    pub in_default: bool,
    pub missed_payment_count: u32,
    pub accumulated_arrears: Amount,
    pub overpayment_credit: Amount,
    pub remaining_balance: Amount,
    pub grace_period_expires_at: Option<i64>,
    pub next_payment_due: i64,
}

/// Creation parameters. `new` fills the policy fields with the usual
/// defaults; callers toggle what they need.
#[derive(Debug, Clone)]
pub struct AgreementParams {
    pub property_id: PropertyId,
    pub capital: Amount,
    pub term_months: u32,
    pub annual_rate_bps: u64,
    pub authorized_payer: Option<AccountAddress>,
    pub grace_period_days: u32,
    pub default_penalty_bps: u64,
    pub default_threshold: u32,
    pub allow_partial: bool,
    pub allow_early: bool,
    pub require_approved_holders: bool,
}

impl AgreementParams {
    pub fn new(
        property_id: PropertyId,
        capital: Amount,
        term_months: u32,
        annual_rate_bps: u64,
    ) -> Self {
        Self {
            property_id,
            capital,
            term_months,
            annual_rate_bps,
            authorized_payer: None,
            grace_period_days: 30,
            default_penalty_bps: 200,
            default_threshold: 3,
            allow_partial: false,
            allow_early: false,
            require_approved_holders: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepaymentKind {
    Full,
    Partial,
    Early,
}

/// Audit-trail entry persisted alongside the agreement records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementEvent {
    pub agreement_id: AgreementId,
    pub timestamp: i64,
    pub kind: AgreementEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgreementEventKind {
    Created {
        property_id: PropertyId,
        capital: Amount,
        term_months: u32,
        annual_rate_bps: u64,
    },
    RepaymentReceived {
        kind: RepaymentKind,
        amount: Amount,
    },
    Completed,
    MissedPaymentRecorded {
        count: u32,
        penalty: Amount,
    },
    GracePeriodStarted {
        expires_at: i64,
    },
    DefaultDeclared,
    ParameterMutated {
        description: String,
    },
}

/// Bounded field mutation applied by a successful governance proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GovernanceMutation {
    SetAnnualRateBps(u64),
    SetReserveBalance(Amount),
    SetGracePeriodDays(u32),
    SetDefaultThreshold(u32),
    SetDefaultPenaltyBps(u64),
}
