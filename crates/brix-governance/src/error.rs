use brix_agreements::AgreementError;
use brix_shares::ShareError;
use brix_types::{AccountAddress, Amount, ProposalId};
use thiserror::Error;

/// Governance operation result type
pub type Result<T> = std::result::Result<T, GovernanceError>;

/// Governance errors
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    #[error("Voter {voter} already voted on proposal {proposal}")]
    AlreadyVoted {
        proposal: ProposalId,
        voter: AccountAddress,
    },

    #[error("Voting is not open: proposal is {status}")]
    VotingNotOpen { status: String },

    #[error("Voting period has not ended")]
    VotingNotEnded,

    #[error("{0} holds no shares and has no voting power")]
    NoVotingPower(AccountAddress),

    #[error("{0} holds no shares and cannot propose")]
    NotShareholder(AccountAddress),

    #[error("Quorum not met: required {required}, actual {actual}")]
    QuorumNotMet { required: Amount, actual: Amount },

    #[error("Proposal has not succeeded: status is {status}")]
    ProposalNotSucceeded { status: String },

    #[error("Parameter value out of range: {param} = {value} (range: {range})")]
    ParameterOutOfRange {
        param: String,
        value: u64,
        range: String,
    },

    #[error("Insufficient reserve: available {available}, requested {requested}")]
    InsufficientReserve {
        available: Amount,
        requested: Amount,
    },

    #[error("Agreement error: {0}")]
    Agreement(#[from] AgreementError),

    #[error("Share error: {0}")]
    Share(#[from] ShareError),
}
