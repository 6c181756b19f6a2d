use crate::property::{IdentityRegistry, PropertyRegistry};
use crate::storage::AgreementStore;
use crate::types::{
    Agreement, AgreementEvent, AgreementEventKind, AgreementParams, AgreementStatus,
    GovernanceMutation, MAX_GRACE_DAYS, MAX_PENALTY_BPS, MAX_RATE_BPS, MAX_TERM_MONTHS,
    MIN_GRACE_DAYS,
};
use crate::{AgreementError, Result};
use brix_shares::{RestrictionPolicy, ShareRegistry};
use brix_types::{AccountAddress, AgreementId, Amount};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Canonical store of agreement records: creation validation, pure views
/// and the governance mutation seam. Owns the per-agreement share ledger
/// creation and the property linkage.
pub struct AgreementLedger {
    store: Arc<dyn AgreementStore>,
    shares: Arc<ShareRegistry>,
    restrictions: Arc<RestrictionPolicy>,
    properties: Arc<dyn PropertyRegistry>,
    identity: Option<Arc<dyn IdentityRegistry>>,
}

impl AgreementLedger {
    pub fn new(
        store: Arc<dyn AgreementStore>,
        shares: Arc<ShareRegistry>,
        restrictions: Arc<RestrictionPolicy>,
        properties: Arc<dyn PropertyRegistry>,
        identity: Option<Arc<dyn IdentityRegistry>>,
    ) -> Self {
        Self {
            store,
            shares,
            restrictions,
            properties,
            identity,
        }
    }

    /// Validate and persist a new agreement, mint the creator's shares
    /// 1:1 with capital and link the property certificate back to it.
    pub async fn create_agreement(
        &self,
        creator: AccountAddress,
        params: AgreementParams,
    ) -> Result<AgreementId> {
        if params.capital.is_zero() || params.capital > Amount::MAX_ISSUANCE {
            return Err(AgreementError::InvalidCapital(params.capital));
        }
        if params.term_months == 0 || params.term_months > MAX_TERM_MONTHS {
            return Err(AgreementError::InvalidTerm(params.term_months));
        }
        if params.annual_rate_bps == 0 || params.annual_rate_bps > MAX_RATE_BPS {
            return Err(AgreementError::InvalidRate(params.annual_rate_bps));
        }
        if params.grace_period_days < MIN_GRACE_DAYS || params.grace_period_days > MAX_GRACE_DAYS {
            return Err(AgreementError::InvalidGracePeriod(params.grace_period_days));
        }
        if params.default_penalty_bps > MAX_PENALTY_BPS {
            return Err(AgreementError::InvalidPenalty(params.default_penalty_bps));
        }
        if params.default_threshold == 0 {
            return Err(AgreementError::InvalidThreshold(params.default_threshold));
        }

        if !self.properties.is_verified(params.property_id).await? {
            return Err(AgreementError::PropertyNotVerified(params.property_id));
        }
        match self.properties.owner_of(params.property_id).await? {
            Some(owner) if owner == creator => {}
            _ => {
                return Err(AgreementError::NotPropertyOwner {
                    property: params.property_id,
                    caller: creator,
                })
            }
        }
        if let Some(existing) = self.properties.active_link(params.property_id).await? {
            return Err(AgreementError::PropertyAlreadyLinked {
                property: params.property_id,
                agreement: existing,
            });
        }

        let id = self.store.allocate_id().await?;
        let now = Utc::now().timestamp();
        let agreement = Agreement {
            id,
            property_id: params.property_id,
            creator,
            authorized_payer: params.authorized_payer,
            upfront_capital: params.capital,
            term_months: params.term_months,
            annual_rate_bps: params.annual_rate_bps,
            grace_period_days: params.grace_period_days,
            default_penalty_bps: params.default_penalty_bps,
            default_threshold: params.default_threshold,
            allow_partial: params.allow_partial,
            allow_early: params.allow_early,
            require_approved_holders: params.require_approved_holders,
            active: true,
            in_default: false,
            total_repaid: Amount::ZERO,
            accumulated_arrears: Amount::ZERO,
            overpayment_credit: Amount::ZERO,
            prepayment_amount: Amount::ZERO,
            reserve_balance: Amount::ZERO,
            missed_payment_count: 0,
            created_at: now,
            last_repayment_at: now,
            last_missed_payment_at: None,
            grace_period_expires_at: None,
        };

        self.store.put(agreement).await?;
        self.shares.create_ledger(id).await?;
        self.shares.mint(id, creator, params.capital).await?;
        self.properties
            .link_agreement(params.property_id, id)
            .await?;
        self.store
            .record_event(AgreementEvent {
                agreement_id: id,
                timestamp: now,
                kind: AgreementEventKind::Created {
                    property_id: params.property_id,
                    capital: params.capital,
                    term_months: params.term_months,
                    annual_rate_bps: params.annual_rate_bps,
                },
            })
            .await?;

        info!(
            agreement_id = id,
            property_id = params.property_id,
            capital = %params.capital,
            term_months = params.term_months,
            annual_rate_bps = params.annual_rate_bps,
            "🏠 Agreement created"
        );
        Ok(id)
    }

    pub async fn get_agreement(&self, id: AgreementId) -> Result<Agreement> {
        self.store
            .get(id)
            .await?
            .ok_or(AgreementError::AgreementNotFound(id))
    }

    pub async fn get_status(&self, id: AgreementId) -> Result<AgreementStatus> {
        let agreement = self.get_agreement(id).await?;
        Ok(AgreementStatus {
            active: agreement.active,
            in_default: agreement.in_default,
            missed_payment_count: agreement.missed_payment_count,
            accumulated_arrears: agreement.accumulated_arrears,
            overpayment_credit: agreement.overpayment_credit,
            remaining_balance: agreement.remaining_balance(),
            grace_period_expires_at: agreement.grace_period_expires_at,
            next_payment_due: agreement.next_payment_due(),
        })
    }

    /// `max(0, remaining + arrears - credit)`
    pub async fn get_outstanding_balance(&self, id: AgreementId) -> Result<Amount> {
        let agreement = self.get_agreement(id).await?;
        Ok(agreement
            .remaining_balance()
            .saturating_add(agreement.accumulated_arrears)
            .saturating_sub(agreement.overpayment_credit))
    }

    pub async fn events_for(&self, id: AgreementId) -> Result<Vec<AgreementEvent>> {
        Ok(self.store.events_for(id).await?)
    }

    /// Configure transfer restrictions for an agreement's shares.
    pub async fn set_transfer_rules(
        &self,
        id: AgreementId,
        caller: AccountAddress,
        rules: brix_shares::TransferRules,
    ) -> Result<()> {
        let agreement = self.get_agreement(id).await?;
        if agreement.creator != caller {
            return Err(AgreementError::NotCreator {
                agreement: id,
                caller,
            });
        }
        self.restrictions.set_rules(id, rules).await;
        Ok(())
    }

    /// Restriction- and identity-gated share transfer.
    pub async fn transfer_shares(
        &self,
        id: AgreementId,
        from: AccountAddress,
        to: AccountAddress,
        amount: Amount,
    ) -> Result<()> {
        let agreement = self.get_agreement(id).await?;

        if agreement.require_approved_holders && !to.is_zero() {
            let registry = self
                .identity
                .as_ref()
                .ok_or(AgreementError::CollaboratorUnavailable("identity registry"))?;
            if !registry.is_approved(to).await? {
                return Err(AgreementError::HolderNotApproved(to));
            }
        }

        let now = Utc::now().timestamp();
        let recipient_balance = self.shares.balance_of(id, to).await?;
        let total_shares = self.shares.total_shares(id).await?;
        self.restrictions
            .validate(id, from, to, amount, recipient_balance, total_shares, now)
            .await?;
        self.shares.transfer(id, from, to, amount).await?;
        self.restrictions.record_transfer(id, to, now).await;
        Ok(())
    }

    /// Apply a bounded mutation decided by governance. Values are
    /// re-validated against the creation ranges before the field moves.
    pub async fn apply_governance_mutation(
        &self,
        id: AgreementId,
        mutation: GovernanceMutation,
    ) -> Result<()> {
        let mut agreement = self.get_agreement(id).await?;

        let description = match mutation {
            GovernanceMutation::SetAnnualRateBps(bps) => {
                if bps == 0 || bps > MAX_RATE_BPS {
                    return Err(AgreementError::InvalidRate(bps));
                }
                agreement.annual_rate_bps = bps;
                format!("annual_rate_bps -> {}", bps)
            }
            GovernanceMutation::SetReserveBalance(amount) => {
                agreement.reserve_balance = amount;
                format!("reserve_balance -> {}", amount)
            }
            GovernanceMutation::SetGracePeriodDays(days) => {
                if !(MIN_GRACE_DAYS..=MAX_GRACE_DAYS).contains(&days) {
                    return Err(AgreementError::InvalidGracePeriod(days));
                }
                agreement.grace_period_days = days;
                format!("grace_period_days -> {}", days)
            }
            GovernanceMutation::SetDefaultThreshold(threshold) => {
                if threshold == 0 {
                    return Err(AgreementError::InvalidThreshold(threshold));
                }
                agreement.default_threshold = threshold;
                format!("default_threshold -> {}", threshold)
            }
            GovernanceMutation::SetDefaultPenaltyBps(bps) => {
                if bps > MAX_PENALTY_BPS {
                    return Err(AgreementError::InvalidPenalty(bps));
                }
                agreement.default_penalty_bps = bps;
                format!("default_penalty_bps -> {}", bps)
            }
        };

        self.store.put(agreement).await?;
        self.store
            .record_event(AgreementEvent {
                agreement_id: id,
                timestamp: Utc::now().timestamp(),
                kind: AgreementEventKind::ParameterMutated {
                    description: description.clone(),
                },
            })
            .await?;

        info!(agreement_id = id, mutation = %description, "⚖️ Governance mutation applied");
        Ok(())
    }
}
