use crate::property::PropertyRegistry;
use crate::storage::AgreementStore;
use crate::types::{
    Agreement, AgreementEvent, AgreementEventKind, RepaymentKind, EARLY_REBATE_BPS,
};
use crate::{AgreementError, Result};
use brix_shares::{DistributionEngine, PayoutSink, ShareRegistry};
use brix_types::{AccountAddress, AgreementId, Amount};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Computes amounts owed, allocates arrears/overpayment and forwards the
/// effective payment to the distribution engine.
pub struct RepaymentProcessor {
    store: Arc<dyn AgreementStore>,
    shares: Arc<ShareRegistry>,
    distribution: Arc<DistributionEngine>,
    properties: Arc<dyn PropertyRegistry>,
    sink: Arc<dyn PayoutSink>,
}

impl RepaymentProcessor {
    pub fn new(
        store: Arc<dyn AgreementStore>,
        shares: Arc<ShareRegistry>,
        distribution: Arc<DistributionEngine>,
        properties: Arc<dyn PropertyRegistry>,
        sink: Arc<dyn PayoutSink>,
    ) -> Self {
        Self {
            store,
            shares,
            distribution,
            properties,
            sink,
        }
    }

    async fn load_for_repayment(
        &self,
        id: AgreementId,
        caller: AccountAddress,
    ) -> Result<Agreement> {
        let agreement = self
            .store
            .get(id)
            .await?
            .ok_or(AgreementError::AgreementNotFound(id))?;
        if !agreement.active {
            return Err(AgreementError::AgreementInactive(id));
        }
        if agreement.in_default {
            return Err(AgreementError::AgreementInDefault(id));
        }
        if caller != agreement.creator && agreement.authorized_payer != Some(caller) {
            return Err(AgreementError::NotAuthorizedPayer {
                agreement: id,
                caller,
            });
        }
        Ok(agreement)
    }

    /// Regular monthly repayment. Existing overpayment credit offsets the
    /// incoming amount first; anything above the monthly obligation is
    /// banked as new credit.
    pub async fn make_repayment(
        &self,
        id: AgreementId,
        caller: AccountAddress,
        amount: Amount,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(AgreementError::InvalidAmount(
                "repayment amount cannot be zero".to_string(),
            ));
        }
        let mut agreement = self.load_for_repayment(id, caller).await?;

        let monthly = agreement.monthly_payment();
        let available = agreement
            .overpayment_credit
            .checked_add(amount)
            .ok_or_else(|| AgreementError::InvalidAmount("amount overflow".to_string()))?;
        let effective = available.min(monthly);
        let now = Utc::now().timestamp();

        agreement.overpayment_credit = available.saturating_sub(effective);
        agreement.total_repaid = agreement.total_repaid.saturating_add(effective);
        agreement.last_repayment_at = now;
        agreement.missed_payment_count = 0;
        agreement.grace_period_expires_at = None;

        self.distribution.distribute(id, effective).await?;
        self.store
            .record_event(AgreementEvent {
                agreement_id: id,
                timestamp: now,
                kind: AgreementEventKind::RepaymentReceived {
                    kind: RepaymentKind::Full,
                    amount: effective,
                },
            })
            .await?;

        info!(
            agreement_id = id,
            payer = %caller,
            amount = %amount,
            effective = %effective,
            credit = %agreement.overpayment_credit,
            total_repaid = %agreement.total_repaid,
            "💰 Repayment processed"
        );

        if agreement.total_repaid >= agreement.total_expected() {
            self.complete(&mut agreement, now).await?;
        }
        self.store.put(agreement).await?;
        Ok(())
    }

    /// Partial repayment: arrears are satisfied first, the remainder goes
    /// toward the current month and any shortfall is carried forward as
    /// new arrears. The applied amount is spread pro-rata so an
    /// under-obligation payment still reaches every holder.
    pub async fn make_partial_repayment(
        &self,
        id: AgreementId,
        caller: AccountAddress,
        amount: Amount,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(AgreementError::InvalidAmount(
                "repayment amount cannot be zero".to_string(),
            ));
        }
        let mut agreement = self.load_for_repayment(id, caller).await?;
        if !agreement.allow_partial {
            return Err(AgreementError::PartialNotAllowed(id));
        }

        let monthly = agreement.monthly_payment();
        let to_arrears = amount.min(agreement.accumulated_arrears);
        let remainder = amount.saturating_sub(to_arrears);
        // Above-obligation remainder banks as credit rather than being
        // distributed twice.
        let excess = remainder.saturating_sub(monthly);
        let applied = remainder.saturating_sub(excess);
        let shortfall = monthly.saturating_sub(remainder);
        let distributed_now = to_arrears.saturating_add(applied);
        let now = Utc::now().timestamp();

        agreement.accumulated_arrears = agreement
            .accumulated_arrears
            .saturating_sub(to_arrears)
            .saturating_add(shortfall);
        agreement.overpayment_credit = agreement.overpayment_credit.saturating_add(excess);
        agreement.total_repaid = agreement.total_repaid.saturating_add(distributed_now);
        agreement.last_repayment_at = now;
        agreement.missed_payment_count = 0;
        agreement.grace_period_expires_at = None;

        self.distribution
            .distribute_partial(id, distributed_now, monthly)
            .await?;
        self.store
            .record_event(AgreementEvent {
                agreement_id: id,
                timestamp: now,
                kind: AgreementEventKind::RepaymentReceived {
                    kind: RepaymentKind::Partial,
                    amount: distributed_now,
                },
            })
            .await?;

        info!(
            agreement_id = id,
            payer = %caller,
            amount = %amount,
            arrears_settled = %to_arrears,
            shortfall = %shortfall,
            arrears = %agreement.accumulated_arrears,
            "💰 Partial repayment processed"
        );

        if agreement.total_repaid >= agreement.total_expected() {
            self.complete(&mut agreement, now).await?;
        }
        self.store.put(agreement).await?;
        Ok(())
    }

    /// Settle the whole remaining balance now, with a fixed rebate on it.
    /// Overshoot is refunded to the caller, or banked as credit when the
    /// refund push fails.
    pub async fn make_early_repayment(
        &self,
        id: AgreementId,
        caller: AccountAddress,
        amount: Amount,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(AgreementError::InvalidAmount(
                "repayment amount cannot be zero".to_string(),
            ));
        }
        let mut agreement = self.load_for_repayment(id, caller).await?;
        if !agreement.allow_early {
            return Err(AgreementError::EarlyNotAllowed(id));
        }

        let remaining = agreement.remaining_balance();
        let rebate = remaining.mul_bps(EARLY_REBATE_BPS);
        let required = remaining.saturating_sub(rebate);
        if amount < required {
            return Err(AgreementError::InsufficientPayment {
                required,
                provided: amount,
            });
        }

        let excess = amount.saturating_sub(required);
        if !excess.is_zero() {
            if let Err(e) = self.sink.push(caller, excess).await {
                agreement.overpayment_credit =
                    agreement.overpayment_credit.saturating_add(excess);
                warn!(
                    agreement_id = id,
                    payer = %caller,
                    amount = %excess,
                    error = %e,
                    "⚠️ Early-repayment refund failed, retained as credit"
                );
            }
        }

        let now = Utc::now().timestamp();
        agreement.prepayment_amount = required;
        agreement.total_repaid = agreement.total_repaid.saturating_add(required);
        agreement.last_repayment_at = now;
        agreement.missed_payment_count = 0;
        agreement.grace_period_expires_at = None;

        self.distribution.distribute(id, required).await?;
        self.store
            .record_event(AgreementEvent {
                agreement_id: id,
                timestamp: now,
                kind: AgreementEventKind::RepaymentReceived {
                    kind: RepaymentKind::Early,
                    amount: required,
                },
            })
            .await?;

        info!(
            agreement_id = id,
            payer = %caller,
            required = %required,
            rebate = %rebate,
            refunded = %excess,
            "💰 Early repayment processed"
        );

        self.complete(&mut agreement, now).await?;
        self.store.put(agreement).await?;
        Ok(())
    }

    async fn complete(&self, agreement: &mut Agreement, now: i64) -> Result<()> {
        agreement.active = false;
        self.shares.burn_all(agreement.id).await?;
        self.properties.release_link(agreement.property_id).await?;
        self.store
            .record_event(AgreementEvent {
                agreement_id: agreement.id,
                timestamp: now,
                kind: AgreementEventKind::Completed,
            })
            .await?;
        info!(
            agreement_id = agreement.id,
            total_repaid = %agreement.total_repaid,
            "🏁 Agreement completed"
        );
        Ok(())
    }
}
