pub mod amount;
pub mod ids;
pub mod lifecycle;

pub use amount::{Amount, BPS_DENOMINATOR};
pub use ids::{AccountAddress, AgreementId, ProposalId, PropertyId};
pub use lifecycle::LifecycleState;
