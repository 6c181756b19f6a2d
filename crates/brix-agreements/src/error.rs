use brix_shares::ShareError;
use brix_types::{AccountAddress, AgreementId, Amount, PropertyId};
use thiserror::Error;

/// Agreement operation result type
pub type Result<T> = std::result::Result<T, AgreementError>;

/// Agreement lifecycle errors
#[derive(Debug, Error)]
pub enum AgreementError {
    #[error("Agreement not found: {0}")]
    AgreementNotFound(AgreementId),

    #[error("Agreement {0} is no longer active")]
    AgreementInactive(AgreementId),

    #[error("Agreement {0} is in default")]
    AgreementInDefault(AgreementId),

    #[error("Invalid capital: {0}")]
    InvalidCapital(Amount),

    #[error("Invalid term: {0} months (range: 1-360)")]
    InvalidTerm(u32),

    #[error("Invalid rate: {0} bps (range: 1-5000)")]
    InvalidRate(u64),

    #[error("Invalid grace period: {0} days (range: 1-365)")]
    InvalidGracePeriod(u32),

    #[error("Invalid penalty: {0} bps (max: 1000)")]
    InvalidPenalty(u64),

    #[error("Invalid default threshold: {0}")]
    InvalidThreshold(u32),

    #[error("Property {0} is not verified")]
    PropertyNotVerified(PropertyId),

    #[error("{caller} does not own property {property}")]
    NotPropertyOwner {
        property: PropertyId,
        caller: AccountAddress,
    },

    #[error("Property {property} is already linked to agreement {agreement}")]
    PropertyAlreadyLinked {
        property: PropertyId,
        agreement: AgreementId,
    },

    #[error("{caller} is not authorized to repay agreement {agreement}")]
    NotAuthorizedPayer {
        agreement: AgreementId,
        caller: AccountAddress,
    },

    #[error("{caller} is not the creator of agreement {agreement}")]
    NotCreator {
        agreement: AgreementId,
        caller: AccountAddress,
    },

    #[error("Partial repayments are not enabled for agreement {0}")]
    PartialNotAllowed(AgreementId),

    #[error("Early repayment is not enabled for agreement {0}")]
    EarlyNotAllowed(AgreementId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient payment: required {required}, provided {provided}")]
    InsufficientPayment { required: Amount, provided: Amount },

    #[error("No repayment is overdue: next payment due at {next_due}")]
    NotOverdue { next_due: i64 },

    #[error("Holder {0} is not approved by the identity registry")]
    HolderNotApproved(AccountAddress),

    #[error("Collaborator not configured: {0}")]
    CollaboratorUnavailable(&'static str),

    #[error("Share error: {0}")]
    Share(#[from] ShareError),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
