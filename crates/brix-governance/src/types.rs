use brix_types::{AccountAddress, AgreementId, Amount, LifecycleState, ProposalId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// What a successful proposal mutates on its agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalKind {
    /// Adjust `annual_rate_bps`; the applied value is clamped to
    /// [100, 5000] bps.
    RateAdjustment,
    /// Grow `reserve_balance`, capped at 20% of the upfront capital.
    ReserveAllocation,
    /// Shrink `reserve_balance`; rejected beyond the available reserve.
    ReserveWithdrawal,
    /// Range-validated update of one lifecycle parameter.
    ParameterUpdate(AgreementParam),
}

/// Governable lifecycle parameters with their validation ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgreementParam {
    GracePeriodDays,
    DefaultThreshold,
    PenaltyBps,
}

impl AgreementParam {
    pub fn bounds(&self) -> (u64, u64) {
        match self {
            Self::GracePeriodDays => (1, 365),
            Self::DefaultThreshold => (1, 24),
            Self::PenaltyBps => (0, 1_000),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::GracePeriodDays => "grace_period_days",
            Self::DefaultThreshold => "default_threshold",
            Self::PenaltyBps => "default_penalty_bps",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteSupport {
    For,
    Against,
    Abstain,
}

/// Running tallies, weighted by share balance at cast time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VoteTally {
    pub for_votes: Amount,
    pub against_votes: Amount,
    pub abstain_votes: Amount,
}

impl VoteTally {
    /// Total participating weight; abstentions count toward quorum.
    pub fn participation(&self) -> Amount {
        self.for_votes
            .saturating_add(self.against_votes)
            .saturating_add(self.abstain_votes)
    }

    pub fn majority_for(&self) -> bool {
        self.for_votes > self.against_votes
    }
}

/// Proposal lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Created, inside the voting delay
    Pending,
    /// Voting window open
    Active,
    /// Window closed with a for-majority
    Succeeded,
    /// Window closed without a for-majority
    Defeated,
    /// Mutation applied
    Executed,
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl LifecycleState for ProposalStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Defeated)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Pending, Active) | (Active, Succeeded) | (Active, Defeated) | (Succeeded, Executed)
        )
    }
}

/// Governance proposal over one agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub agreement_id: AgreementId,
    pub kind: ProposalKind,
    pub target_value: u64,
    pub proposer: AccountAddress,
    pub created_at: i64,
    pub voting_starts_at: i64,
    pub voting_ends_at: i64,
    pub tally: VoteTally,
    pub executed: bool,
    pub defeated: bool,
    pub voters: HashSet<AccountAddress>,
}

impl Proposal {
    /// Status derived lazily from timestamps, tallies and flags; window
    /// deadlines are only ever evaluated on the next relevant call.
    pub fn status(&self, now: i64) -> ProposalStatus {
        if self.executed {
            ProposalStatus::Executed
        } else if self.defeated {
            ProposalStatus::Defeated
        } else if now < self.voting_starts_at {
            ProposalStatus::Pending
        } else if now <= self.voting_ends_at {
            ProposalStatus::Active
        } else if self.tally.majority_for() {
            ProposalStatus::Succeeded
        } else {
            ProposalStatus::Defeated
        }
    }
}
