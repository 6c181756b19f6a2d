pub mod controller;
pub mod error;
pub mod types;
pub mod voting;

pub use controller::{GovernanceConfig, GovernanceController};
pub use error::{GovernanceError, Result};
pub use types::{
    AgreementParam, Proposal, ProposalKind, ProposalStatus, VoteSupport, VoteTally,
};
pub use voting::VotingRules;
