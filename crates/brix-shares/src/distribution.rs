use crate::registry::ShareRegistry;
use crate::{Result, ShareError};
use async_trait::async_trait;
use brix_types::{AccountAddress, AgreementId, Amount};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Fallible payout delivery capability.
///
/// A failed push is terminal for that attempt: the engine converts it to
/// an unclaimed-remainder entry instead of retrying or aborting the
/// distribution.
#[async_trait]
pub trait PayoutSink: Send + Sync {
    async fn push(&self, to: AccountAddress, amount: Amount) -> anyhow::Result<()>;
}

/// In-memory sink recording cumulative payouts; specific recipients can
/// be made to reject delivery.
pub struct MemorySink {
    payouts: RwLock<HashMap<AccountAddress, Amount>>,
    failing: RwLock<HashSet<AccountAddress>>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            payouts: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
        }
    }

    pub async fn fail_for(&self, recipient: AccountAddress) {
        self.failing.write().await.insert(recipient);
    }

    pub async fn clear_failure(&self, recipient: AccountAddress) {
        self.failing.write().await.remove(&recipient);
    }

    pub async fn paid_to(&self, recipient: AccountAddress) -> Amount {
        self.payouts
            .read()
            .await
            .get(&recipient)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub async fn total_paid(&self) -> Amount {
        self.payouts.read().await.values().copied().sum()
    }
}

#[async_trait]
impl PayoutSink for MemorySink {
    async fn push(&self, to: AccountAddress, amount: Amount) -> anyhow::Result<()> {
        if self.failing.read().await.contains(&to) {
            anyhow::bail!("recipient {} cannot accept funds", to);
        }
        let mut payouts = self.payouts.write().await;
        let paid = payouts.entry(to).or_insert(Amount::ZERO);
        *paid = paid.saturating_add(amount);
        Ok(())
    }
}

/// Outcome of one distribution call. `paid + banked == amount` whenever
/// at least one share exists (conservation).
#[derive(Debug, Clone)]
pub struct DistributionReport {
    pub amount: Amount,
    /// Delivered through the sink.
    pub paid: Amount,
    /// Converted to unclaimed remainders after failed pushes.
    pub banked: Amount,
    /// Rounding remainder routed to the largest holder.
    pub dust: Amount,
    pub dust_recipient: Option<AccountAddress>,
}

/// Pro-rata payout computation over a share ledger.
pub struct DistributionEngine {
    shares: Arc<ShareRegistry>,
    sink: Arc<dyn PayoutSink>,
}

impl DistributionEngine {
    pub fn new(shares: Arc<ShareRegistry>, sink: Arc<dyn PayoutSink>) -> Self {
        Self { shares, sink }
    }

    /// Distribute `amount` across current holders in proportion to their
    /// shares. Floor division per holder; the rounding dust goes to the
    /// largest holder. Undeliverable payouts are banked as unclaimed
    /// remainders, never aborting the distribution.
    pub async fn distribute(
        &self,
        agreement_id: AgreementId,
        amount: Amount,
    ) -> Result<DistributionReport> {
        let report = self.distribute_inner(agreement_id, amount).await?;
        info!(
            agreement_id,
            amount = %report.amount,
            paid = %report.paid,
            banked = %report.banked,
            dust = %report.dust,
            "📦 Distribution completed"
        );
        Ok(report)
    }

    /// Distribution of a partial payment: the same per-holder proportional
    /// math, scaled by the fraction of the monthly obligation actually
    /// covered, so a 50%-of-obligation payment delivers roughly half of
    /// each holder's normal cut.
    pub async fn distribute_partial(
        &self,
        agreement_id: AgreementId,
        amount: Amount,
        monthly_payment: Amount,
    ) -> Result<DistributionReport> {
        if monthly_payment.is_zero() {
            return Err(ShareError::InvalidAmount(
                "monthly payment cannot be zero".to_string(),
            ));
        }
        // coverage * (monthly * share / total) reduces to amount * share /
        // total exactly, so the scaled distribution reuses the same
        // conservation-safe arithmetic.
        let coverage_bps = amount
            .mul_div(
                Amount::from_units(brix_types::BPS_DENOMINATOR),
                monthly_payment,
            )
            .unwrap_or(Amount::ZERO);
        let report = self.distribute_inner(agreement_id, amount).await?;
        info!(
            agreement_id,
            amount = %report.amount,
            coverage_bps = %coverage_bps,
            paid = %report.paid,
            banked = %report.banked,
            "📦 Partial distribution completed"
        );
        Ok(report)
    }

    async fn distribute_inner(
        &self,
        agreement_id: AgreementId,
        amount: Amount,
    ) -> Result<DistributionReport> {
        let total = self.shares.total_shares(agreement_id).await?;
        if total.is_zero() {
            return Err(ShareError::NoShareholders);
        }

        let mut report = DistributionReport {
            amount,
            paid: Amount::ZERO,
            banked: Amount::ZERO,
            dust: Amount::ZERO,
            dust_recipient: None,
        };
        if amount.is_zero() {
            return Ok(report);
        }

        let snapshot = self.shares.snapshot(agreement_id).await?;
        let mut distributed = Amount::ZERO;
        for (holder, balance) in &snapshot {
            let payout = amount
                .mul_div(*balance, total)
                .ok_or(ShareError::Overflow("pro-rata payout"))?;
            if payout.is_zero() {
                continue;
            }
            distributed = distributed.saturating_add(payout);
            self.deliver(agreement_id, *holder, payout, &mut report)
                .await?;
        }

        let dust = amount.saturating_sub(distributed);
        if !dust.is_zero() {
            let largest = self
                .shares
                .largest_holder(agreement_id)
                .await?
                .ok_or(ShareError::NoShareholders)?;
            report.dust = dust;
            report.dust_recipient = Some(largest);
            self.deliver(agreement_id, largest, dust, &mut report)
                .await?;
        }

        Ok(report)
    }

    async fn deliver(
        &self,
        agreement_id: AgreementId,
        holder: AccountAddress,
        payout: Amount,
        report: &mut DistributionReport,
    ) -> Result<()> {
        match self.sink.push(holder, payout).await {
            Ok(()) => {
                report.paid = report.paid.saturating_add(payout);
            }
            Err(e) => {
                self.shares
                    .add_unclaimed(agreement_id, holder, payout)
                    .await?;
                report.banked = report.banked.saturating_add(payout);
                debug!(
                    agreement_id,
                    holder = %holder,
                    amount = %payout,
                    error = %e,
                    "📥 Payout banked as unclaimed remainder"
                );
            }
        }
        Ok(())
    }

    /// Pull-claim a previously banked remainder. If delivery fails again
    /// the balance stays banked and the call errors.
    pub async fn claim_unclaimed_remainder(
        &self,
        agreement_id: AgreementId,
        holder: AccountAddress,
    ) -> Result<Amount> {
        let banked = self.shares.take_unclaimed(agreement_id, holder).await?;
        if banked.is_zero() {
            return Err(ShareError::NothingToClaim(holder));
        }

        if let Err(e) = self.sink.push(holder, banked).await {
            self.shares
                .add_unclaimed(agreement_id, holder, banked)
                .await?;
            warn!(
                agreement_id,
                holder = %holder,
                amount = %banked,
                error = %e,
                "⚠️ Remainder claim delivery failed"
            );
            return Err(ShareError::DeliveryFailed {
                holder,
                reason: e.to_string(),
            });
        }

        info!(
            agreement_id,
            holder = %holder,
            amount = %banked,
            "💸 Unclaimed remainder delivered"
        );
        Ok(banked)
    }
}
