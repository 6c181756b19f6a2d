use crate::{Result, ShareError};
use brix_types::{AccountAddress, AgreementId, Amount, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Transfer restriction rules for one agreement's shares.
///
/// Disabled by default; mint and burn always bypass the checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRules {
    pub enabled: bool,
    pub paused: bool,
    /// Epoch seconds; no transfers before this instant.
    pub lockup_ends_at: i64,
    /// Concentration cap on the recipient's post-transfer holding,
    /// in bps of total supply. Zero disables the check.
    pub max_share_bps: u64,
    /// Minimum seconds between a holder's transfers. Zero disables.
    pub min_holding_secs: i64,
}

impl Default for TransferRules {
    fn default() -> Self {
        Self {
            enabled: false,
            paused: false,
            lockup_ends_at: 0,
            max_share_bps: 0,
            min_holding_secs: 0,
        }
    }
}

/// Stateless-per-call validation of proposed share transfers, plus the
/// per-holder last-transfer bookkeeping the holding-period rule needs.
pub struct RestrictionPolicy {
    rules: Arc<RwLock<HashMap<AgreementId, TransferRules>>>,
    last_transfer_at: Arc<RwLock<HashMap<(AgreementId, AccountAddress), i64>>>,
}

impl Default for RestrictionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RestrictionPolicy {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(RwLock::new(HashMap::new())),
            last_transfer_at: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn set_rules(&self, agreement_id: AgreementId, rules: TransferRules) {
        debug!(agreement_id, ?rules, "Transfer rules updated");
        self.rules.write().await.insert(agreement_id, rules);
    }

    pub async fn rules(&self, agreement_id: AgreementId) -> TransferRules {
        self.rules
            .read()
            .await
            .get(&agreement_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Validate a proposed transfer before any balance change.
    ///
    /// `recipient_balance` and `total_shares` are the pre-transfer values.
    pub async fn validate(
        &self,
        agreement_id: AgreementId,
        from: AccountAddress,
        to: AccountAddress,
        amount: Amount,
        recipient_balance: Amount,
        total_shares: Amount,
        now: i64,
    ) -> Result<()> {
        // Mint/burn always bypass restrictions
        if from.is_zero() || to.is_zero() {
            return Ok(());
        }

        let rules = self.rules(agreement_id).await;
        if !rules.enabled {
            return Ok(());
        }

        if rules.paused {
            return Err(ShareError::TransfersPaused);
        }

        if now < rules.lockup_ends_at {
            return Err(ShareError::LockupActive {
                lockup_ends_at: rules.lockup_ends_at,
            });
        }

        if rules.max_share_bps > 0 && !total_shares.is_zero() {
            let would_hold = recipient_balance.saturating_add(amount);
            let would_hold_bps = (would_hold.to_units() as u128 * BPS_DENOMINATOR as u128
                / total_shares.to_units() as u128) as u64;
            if would_hold_bps > rules.max_share_bps {
                return Err(ShareError::ConcentrationExceeded {
                    would_hold_bps,
                    max_share_bps: rules.max_share_bps,
                });
            }
        }

        if rules.min_holding_secs > 0 {
            let last = self
                .last_transfer_at
                .read()
                .await
                .get(&(agreement_id, from))
                .copied();
            if let Some(last) = last {
                let held_for = now - last;
                if held_for < rules.min_holding_secs {
                    return Err(ShareError::HoldingPeriodNotMet {
                        remaining_secs: rules.min_holding_secs - held_for,
                    });
                }
            }
        }

        Ok(())
    }

    /// Stamp the recipient's acquisition time. Called only after the
    /// transfer has been applied.
    pub async fn record_transfer(&self, agreement_id: AgreementId, to: AccountAddress, now: i64) {
        self.last_transfer_at
            .write()
            .await
            .insert((agreement_id, to), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tag: u8) -> AccountAddress {
        AccountAddress::from_bytes([tag; 32])
    }

    fn units(n: u64) -> Amount {
        Amount::from_units(n)
    }

    fn enabled_rules() -> TransferRules {
        TransferRules {
            enabled: true,
            ..TransferRules::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_rules_allow_everything() {
        let policy = RestrictionPolicy::new();
        policy
            .set_rules(
                1,
                TransferRules {
                    enabled: false,
                    paused: true,
                    lockup_ends_at: i64::MAX,
                    max_share_bps: 1,
                    min_holding_secs: i64::MAX,
                },
            )
            .await;

        assert!(policy
            .validate(1, addr(1), addr(2), units(100), units(0), units(100), 0)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_mint_and_burn_bypass() {
        let policy = RestrictionPolicy::new();
        policy
            .set_rules(
                1,
                TransferRules {
                    paused: true,
                    ..enabled_rules()
                },
            )
            .await;

        assert!(policy
            .validate(
                1,
                AccountAddress::zero(),
                addr(2),
                units(100),
                units(0),
                units(0),
                0
            )
            .await
            .is_ok());
        assert!(policy
            .validate(
                1,
                addr(1),
                AccountAddress::zero(),
                units(100),
                units(0),
                units(100),
                0
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_paused_rejects() {
        let policy = RestrictionPolicy::new();
        policy
            .set_rules(
                1,
                TransferRules {
                    paused: true,
                    ..enabled_rules()
                },
            )
            .await;

        assert!(matches!(
            policy
                .validate(1, addr(1), addr(2), units(1), units(0), units(100), 0)
                .await,
            Err(ShareError::TransfersPaused)
        ));
    }

    #[tokio::test]
    async fn test_lockup_window() {
        let policy = RestrictionPolicy::new();
        policy
            .set_rules(
                1,
                TransferRules {
                    lockup_ends_at: 1000,
                    ..enabled_rules()
                },
            )
            .await;

        assert!(matches!(
            policy
                .validate(1, addr(1), addr(2), units(1), units(0), units(100), 999)
                .await,
            Err(ShareError::LockupActive { lockup_ends_at: 1000 })
        ));
        assert!(policy
            .validate(1, addr(1), addr(2), units(1), units(0), units(100), 1000)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_concentration_cap() {
        let policy = RestrictionPolicy::new();
        policy
            .set_rules(
                1,
                TransferRules {
                    max_share_bps: 2500, // 25%
                    ..enabled_rules()
                },
            )
            .await;

        // Recipient would hold 26% of 1000
        assert!(matches!(
            policy
                .validate(1, addr(1), addr(2), units(60), units(200), units(1000), 0)
                .await,
            Err(ShareError::ConcentrationExceeded {
                would_hold_bps: 2600,
                max_share_bps: 2500
            })
        ));
        // Exactly at the cap passes
        assert!(policy
            .validate(1, addr(1), addr(2), units(50), units(200), units(1000), 0)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_holding_period() {
        let policy = RestrictionPolicy::new();
        policy
            .set_rules(
                1,
                TransferRules {
                    min_holding_secs: 3600,
                    ..enabled_rules()
                },
            )
            .await;

        // Holder with no recorded acquisition may transfer immediately
        assert!(policy
            .validate(1, addr(1), addr(2), units(1), units(0), units(100), 100)
            .await
            .is_ok());

        policy.record_transfer(1, addr(2), 100).await;

        assert!(matches!(
            policy
                .validate(1, addr(2), addr(3), units(1), units(0), units(100), 2000)
                .await,
            Err(ShareError::HoldingPeriodNotMet {
                remaining_secs: 1700
            })
        ));
        assert!(policy
            .validate(1, addr(2), addr(3), units(1), units(0), units(100), 3700)
            .await
            .is_ok());
    }
}
