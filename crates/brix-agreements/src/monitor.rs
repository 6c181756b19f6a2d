use crate::storage::AgreementStore;
use crate::types::{
    Agreement, AgreementEvent, AgreementEventKind, DefaultState, SECONDS_PER_DAY,
};
use crate::{AgreementError, Result};
use brix_shares::ShareRegistry;
use brix_types::AgreementId;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Missed-payment and grace-period state machine.
///
/// Deadlines are evaluated lazily: nothing here runs on a schedule, the
/// state advances on whichever call observes an expired deadline first.
pub struct DefaultMonitor {
    store: Arc<dyn AgreementStore>,
    shares: Arc<ShareRegistry>,
}

impl DefaultMonitor {
    pub fn new(store: Arc<dyn AgreementStore>, shares: Arc<ShareRegistry>) -> Self {
        Self { store, shares }
    }

    /// Record an overdue payment. Accrues a count-scaled penalty into
    /// arrears, arms the grace period once the miss count crosses the
    /// threshold, and declares default when an armed grace period has
    /// already expired.
    pub async fn handle_missed_payment(&self, id: AgreementId) -> Result<DefaultState> {
        let mut agreement = self
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

        let now = Utc::now().timestamp();
        let next_due = agreement.next_payment_due();
        if now < next_due {
            return Err(AgreementError::NotOverdue { next_due });
        }

        agreement.missed_payment_count += 1;
        agreement.last_missed_payment_at = Some(now);

        let penalty = agreement
            .monthly_payment()
            .mul_bps(agreement.default_penalty_bps * agreement.missed_payment_count as u64);
        agreement.accumulated_arrears = agreement.accumulated_arrears.saturating_add(penalty);

        self.store
            .record_event(AgreementEvent {
                agreement_id: id,
                timestamp: now,
                kind: AgreementEventKind::MissedPaymentRecorded {
                    count: agreement.missed_payment_count,
                    penalty,
                },
            })
            .await?;
        warn!(
            agreement_id = id,
            missed_count = agreement.missed_payment_count,
            penalty = %penalty,
            arrears = %agreement.accumulated_arrears,
            "⚠️ Missed payment recorded"
        );

        match agreement.grace_period_expires_at {
            None if agreement.missed_payment_count >= agreement.default_threshold => {
                let expires_at = now + agreement.grace_period_days as i64 * SECONDS_PER_DAY;
                agreement.grace_period_expires_at = Some(expires_at);
                self.store
                    .record_event(AgreementEvent {
                        agreement_id: id,
                        timestamp: now,
                        kind: AgreementEventKind::GracePeriodStarted { expires_at },
                    })
                    .await?;
                info!(agreement_id = id, expires_at, "⏳ Grace period started");
            }
            Some(expires_at) if now >= expires_at => {
                self.declare_default(&mut agreement, now).await?;
            }
            _ => {}
        }

        self.store.put(agreement.clone()).await?;
        Ok(agreement.default_state())
    }

    /// Idempotent re-check, callable by anyone: flips `in_default` if the
    /// grace period has silently expired since the last look.
    pub async fn check_and_update_default_status(&self, id: AgreementId) -> Result<DefaultState> {
        let mut agreement = self
            .store
            .get(id)
            .await?
            .ok_or(AgreementError::AgreementNotFound(id))?;
        if agreement.in_default {
            return Ok(DefaultState::Defaulted);
        }
        if !agreement.active {
            return Ok(agreement.default_state());
        }

        let now = Utc::now().timestamp();
        if let Some(expires_at) = agreement.grace_period_expires_at {
            if now >= expires_at {
                self.declare_default(&mut agreement, now).await?;
                self.store.put(agreement).await?;
                return Ok(DefaultState::Defaulted);
            }
        }
        Ok(agreement.default_state())
    }

    async fn declare_default(&self, agreement: &mut Agreement, now: i64) -> Result<()> {
        agreement.in_default = true;
        self.shares.burn_all(agreement.id).await?;
        self.store
            .record_event(AgreementEvent {
                agreement_id: agreement.id,
                timestamp: now,
                kind: AgreementEventKind::DefaultDeclared,
            })
            .await?;
        warn!(
            agreement_id = agreement.id,
            arrears = %agreement.accumulated_arrears,
            "🚨 Agreement defaulted"
        );
        Ok(())
    }
}
