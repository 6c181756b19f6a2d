use brix_types::{AccountAddress, AgreementId, Amount};
use thiserror::Error;

/// Share operation result type
pub type Result<T> = std::result::Result<T, ShareError>;

/// Share ledger, restriction and distribution errors
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("Share ledger not found for agreement {0}")]
    LedgerNotFound(AgreementId),

    #[error("Share ledger already exists for agreement {0}")]
    LedgerAlreadyExists(AgreementId),

    #[error("Shareholder limit reached: {max} holders")]
    TooManyShareholders { max: usize },

    #[error("No shareholders to distribute to")]
    NoShareholders,

    #[error("Insufficient shares for {holder}: has {balance}, needs {amount}")]
    InsufficientShares {
        holder: AccountAddress,
        balance: Amount,
        amount: Amount,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Transfers are paused")]
    TransfersPaused,

    #[error("Lockup active until {lockup_ends_at}")]
    LockupActive { lockup_ends_at: i64 },

    #[error("Concentration cap exceeded: recipient would hold {would_hold_bps} bps, cap {max_share_bps} bps")]
    ConcentrationExceeded {
        would_hold_bps: u64,
        max_share_bps: u64,
    },

    #[error("Minimum holding period not met: {remaining_secs}s remaining")]
    HoldingPeriodNotMet { remaining_secs: i64 },

    #[error("Payout delivery failed for {holder}: {reason}")]
    DeliveryFailed {
        holder: AccountAddress,
        reason: String,
    },

    #[error("Nothing to claim for {0}")]
    NothingToClaim(AccountAddress),

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),
}
