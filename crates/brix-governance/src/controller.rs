use crate::types::{AgreementParam, Proposal, ProposalKind, ProposalStatus, VoteSupport, VoteTally};
use crate::voting::VotingRules;
use crate::{GovernanceError, Result};
use brix_agreements::{AgreementLedger, GovernanceMutation};
use brix_shares::ShareRegistry;
use brix_types::{AccountAddress, AgreementId, ProposalId};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Bps clamp window applied to rate-adjustment proposals.
const MIN_GOVERNED_RATE_BPS: u64 = 100;
const MAX_GOVERNED_RATE_BPS: u64 = 5_000;
/// Reserve ceiling as bps of upfront capital.
const RESERVE_CAP_BPS: u64 = 2_000;

/// Configuration for the proposal lifecycle
#[derive(Debug, Clone)]
pub struct GovernanceConfig {
    /// Delay between creation and the voting window opening, in seconds
    pub voting_delay_secs: i64,
    /// Voting window duration in seconds
    pub voting_period_secs: i64,
    /// Quorum as bps of current total shares
    pub quorum_bps: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            voting_delay_secs: 86_400,           // 1 day
            voting_period_secs: 7 * 86_400,      // 7 days
            quorum_bps: 1_000,                   // 10% participation
        }
    }
}

/// Proposal/vote lifecycle that mutates agreement fields within bounds.
///
/// Voting power is the voter's share balance read at cast time; there is
/// no snapshotting. Selling shares after casting does not revoke the
/// vote, and acquiring shares mid-window grants immediate power.
pub struct GovernanceController {
    config: GovernanceConfig,
    rules: VotingRules,
    ledger: Arc<AgreementLedger>,
    shares: Arc<ShareRegistry>,
    proposals: Arc<RwLock<HashMap<ProposalId, Proposal>>>,
    next_id: AtomicU64,
}

impl GovernanceController {
    pub fn new(
        config: GovernanceConfig,
        ledger: Arc<AgreementLedger>,
        shares: Arc<ShareRegistry>,
    ) -> Self {
        let rules = VotingRules {
            quorum_bps: config.quorum_bps,
        };
        Self {
            config,
            rules,
            ledger,
            shares,
            proposals: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Submit a new proposal. The proposer must hold shares in the
    /// target agreement.
    pub async fn propose(
        &self,
        agreement_id: AgreementId,
        kind: ProposalKind,
        target_value: u64,
        proposer: AccountAddress,
    ) -> Result<ProposalId> {
        self.ledger.get_agreement(agreement_id).await?;
        let balance = self.shares.balance_of(agreement_id, proposer).await?;
        if balance.is_zero() {
            return Err(GovernanceError::NotShareholder(proposer));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now().timestamp();
        let voting_starts_at = now + self.config.voting_delay_secs;
        let voting_ends_at = voting_starts_at + self.config.voting_period_secs;

        let proposal = Proposal {
            id,
            agreement_id,
            kind,
            target_value,
            proposer,
            created_at: now,
            voting_starts_at,
            voting_ends_at,
            tally: VoteTally::default(),
            executed: false,
            defeated: false,
            voters: HashSet::new(),
        };
        self.proposals.write().await.insert(id, proposal);

        info!(
            proposal_id = id,
            agreement_id,
            kind = ?kind,
            target_value,
            proposer = %proposer,
            voting_starts_at,
            voting_ends_at,
            "📜 Proposal submitted"
        );
        Ok(id)
    }

    /// Cast a vote, weighted by the voter's current share balance.
    pub async fn cast_vote(
        &self,
        proposal_id: ProposalId,
        voter: AccountAddress,
        support: VoteSupport,
    ) -> Result<()> {
        let mut proposals = self.proposals.write().await;
        let proposal = proposals
            .get_mut(&proposal_id)
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))?;

        let now = Utc::now().timestamp();
        let status = proposal.status(now);
        if status != ProposalStatus::Active {
            return Err(GovernanceError::VotingNotOpen {
                status: status.to_string(),
            });
        }
        if proposal.voters.contains(&voter) {
            return Err(GovernanceError::AlreadyVoted {
                proposal: proposal_id,
                voter,
            });
        }

        let weight = self
            .shares
            .balance_of(proposal.agreement_id, voter)
            .await?;
        if weight.is_zero() {
            return Err(GovernanceError::NoVotingPower(voter));
        }

        match support {
            VoteSupport::For => {
                proposal.tally.for_votes = proposal.tally.for_votes.saturating_add(weight)
            }
            VoteSupport::Against => {
                proposal.tally.against_votes =
                    proposal.tally.against_votes.saturating_add(weight)
            }
            VoteSupport::Abstain => {
                proposal.tally.abstain_votes =
                    proposal.tally.abstain_votes.saturating_add(weight)
            }
        }
        proposal.voters.insert(voter);

        info!(
            proposal_id,
            voter = %voter,
            support = ?support,
            weight = %weight,
            "🗳️ Vote cast"
        );
        Ok(())
    }

    pub async fn state(&self, proposal_id: ProposalId) -> Result<ProposalStatus> {
        let proposals = self.proposals.read().await;
        let proposal = proposals
            .get(&proposal_id)
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))?;
        Ok(proposal.status(Utc::now().timestamp()))
    }

    pub async fn get_proposal(&self, proposal_id: ProposalId) -> Result<Proposal> {
        let proposals = self.proposals.read().await;
        proposals
            .get(&proposal_id)
            .cloned()
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))
    }

    /// Persist the outcome once the window has closed.
    pub async fn finalize(&self, proposal_id: ProposalId) -> Result<ProposalStatus> {
        let mut proposals = self.proposals.write().await;
        let proposal = proposals
            .get_mut(&proposal_id)
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))?;

        let status = proposal.status(Utc::now().timestamp());
        match status {
            ProposalStatus::Pending | ProposalStatus::Active => {
                Err(GovernanceError::VotingNotEnded)
            }
            ProposalStatus::Defeated => {
                proposal.defeated = true;
                Ok(status)
            }
            _ => Ok(status),
        }
    }

    /// Apply a succeeded proposal's bounded mutation and mark it
    /// executed. Rejects unless the proposal succeeded and quorum was
    /// met.
    pub async fn execute(&self, proposal_id: ProposalId) -> Result<()> {
        let mut proposals = self.proposals.write().await;
        let proposal = proposals
            .get_mut(&proposal_id)
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))?;

        let now = Utc::now().timestamp();
        let status = proposal.status(now);
        if status != ProposalStatus::Succeeded {
            if status == ProposalStatus::Defeated {
                proposal.defeated = true;
            }
            return Err(GovernanceError::ProposalNotSucceeded {
                status: status.to_string(),
            });
        }

        let total_supply = self.shares.total_shares(proposal.agreement_id).await?;
        if let Err(e) = self.rules.check_quorum(&proposal.tally, total_supply) {
            warn!(
                proposal_id,
                participation = %proposal.tally.participation(),
                "Quorum not met"
            );
            return Err(e);
        }

        let mutation = self.build_mutation(proposal).await?;
        self.ledger
            .apply_governance_mutation(proposal.agreement_id, mutation)
            .await?;
        proposal.executed = true;

        info!(
            proposal_id,
            agreement_id = proposal.agreement_id,
            for_votes = %proposal.tally.for_votes,
            against_votes = %proposal.tally.against_votes,
            abstain_votes = %proposal.tally.abstain_votes,
            "✅ Proposal executed"
        );
        Ok(())
    }

    async fn build_mutation(&self, proposal: &Proposal) -> Result<GovernanceMutation> {
        match proposal.kind {
            ProposalKind::RateAdjustment => {
                let clamped = proposal
                    .target_value
                    .clamp(MIN_GOVERNED_RATE_BPS, MAX_GOVERNED_RATE_BPS);
                Ok(GovernanceMutation::SetAnnualRateBps(clamped))
            }
            ProposalKind::ReserveAllocation => {
                let agreement = self.ledger.get_agreement(proposal.agreement_id).await?;
                let cap = agreement.upfront_capital.mul_bps(RESERVE_CAP_BPS);
                let new_reserve = agreement
                    .reserve_balance
                    .saturating_add(brix_types::Amount::from_units(proposal.target_value))
                    .min(cap);
                Ok(GovernanceMutation::SetReserveBalance(new_reserve))
            }
            ProposalKind::ReserveWithdrawal => {
                let agreement = self.ledger.get_agreement(proposal.agreement_id).await?;
                let requested = brix_types::Amount::from_units(proposal.target_value);
                let new_reserve = agreement.reserve_balance.checked_sub(requested).ok_or(
                    GovernanceError::InsufficientReserve {
                        available: agreement.reserve_balance,
                        requested,
                    },
                )?;
                Ok(GovernanceMutation::SetReserveBalance(new_reserve))
            }
            ProposalKind::ParameterUpdate(param) => {
                let (min, max) = param.bounds();
                if proposal.target_value < min || proposal.target_value > max {
                    return Err(GovernanceError::ParameterOutOfRange {
                        param: param.key().to_string(),
                        value: proposal.target_value,
                        range: format!("[{}, {}]", min, max),
                    });
                }
                Ok(match param {
                    AgreementParam::GracePeriodDays => {
                        GovernanceMutation::SetGracePeriodDays(proposal.target_value as u32)
                    }
                    AgreementParam::DefaultThreshold => {
                        GovernanceMutation::SetDefaultThreshold(proposal.target_value as u32)
                    }
                    AgreementParam::PenaltyBps => {
                        GovernanceMutation::SetDefaultPenaltyBps(proposal.target_value)
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brix_agreements::{
        AgreementEngine, AgreementParams, MemoryAgreementStore, MemoryPropertyRegistry,
    };
    use brix_shares::MemorySink;
    use brix_types::Amount;

    fn addr(tag: u8) -> AccountAddress {
        AccountAddress::from_bytes([tag; 32])
    }

    fn units(n: u64) -> Amount {
        Amount::from_units(n)
    }

    fn open_config() -> GovernanceConfig {
        GovernanceConfig {
            voting_delay_secs: 0,
            ..GovernanceConfig::default()
        }
    }

    /// Agreement with 10_000 supply split 9_000/600/300/100 across
    /// addr(1..=4).
    async fn setup(config: GovernanceConfig) -> (GovernanceController, AgreementId) {
        let store = Arc::new(MemoryAgreementStore::new());
        let properties = Arc::new(MemoryPropertyRegistry::new());
        let sink = Arc::new(MemorySink::new());
        let engine = AgreementEngine::new(store, properties.clone(), None, sink);

        properties.register(1, addr(1)).await;
        let id = engine
            .ledger
            .create_agreement(addr(1), AgreementParams::new(1, units(10_000), 12, 1_000))
            .await
            .unwrap();
        for (tag, amount) in [(2u8, 600u64), (3, 300), (4, 100)] {
            engine
                .ledger
                .transfer_shares(id, addr(1), addr(tag), units(amount))
                .await
                .unwrap();
        }

        let controller =
            GovernanceController::new(config, engine.ledger.clone(), engine.shares.clone());
        (controller, id)
    }

    async fn close_voting(controller: &GovernanceController, proposal_id: ProposalId) {
        let mut proposals = controller.proposals.write().await;
        let proposal = proposals.get_mut(&proposal_id).unwrap();
        proposal.voting_ends_at = Utc::now().timestamp() - 1;
    }

    #[tokio::test]
    async fn test_quorum_majority_and_execution() {
        let (controller, agreement_id) = setup(open_config()).await;
        let proposal_id = controller
            .propose(agreement_id, ProposalKind::RateAdjustment, 2_000, addr(1))
            .await
            .unwrap();

        // 600 for / 300 against / 100 abstain out of 10_000 supply
        controller
            .cast_vote(proposal_id, addr(2), VoteSupport::For)
            .await
            .unwrap();
        controller
            .cast_vote(proposal_id, addr(3), VoteSupport::Against)
            .await
            .unwrap();
        controller
            .cast_vote(proposal_id, addr(4), VoteSupport::Abstain)
            .await
            .unwrap();

        // Window still open: execution premature
        assert!(matches!(
            controller.execute(proposal_id).await,
            Err(GovernanceError::ProposalNotSucceeded { .. })
        ));

        close_voting(&controller, proposal_id).await;
        assert_eq!(
            controller.state(proposal_id).await.unwrap(),
            ProposalStatus::Succeeded
        );

        // 1_000 of 10_000 participated, quorum (10%) met exactly
        controller.execute(proposal_id).await.unwrap();
        assert_eq!(
            controller.state(proposal_id).await.unwrap(),
            ProposalStatus::Executed
        );

        let agreement = controller.ledger.get_agreement(agreement_id).await.unwrap();
        assert_eq!(agreement.annual_rate_bps, 2_000);

        // Executed is terminal
        assert!(matches!(
            controller.execute(proposal_id).await,
            Err(GovernanceError::ProposalNotSucceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_quorum_not_met_blocks_execution() {
        let (controller, agreement_id) = setup(open_config()).await;
        let proposal_id = controller
            .propose(agreement_id, ProposalKind::RateAdjustment, 2_000, addr(1))
            .await
            .unwrap();

        // Only 600 of 10_000 participates (6% < 10%)
        controller
            .cast_vote(proposal_id, addr(2), VoteSupport::For)
            .await
            .unwrap();
        close_voting(&controller, proposal_id).await;

        assert!(matches!(
            controller.execute(proposal_id).await,
            Err(GovernanceError::QuorumNotMet { .. })
        ));
        // Status stays Succeeded; the rate is untouched
        let agreement = controller.ledger.get_agreement(agreement_id).await.unwrap();
        assert_eq!(agreement.annual_rate_bps, 1_000);
    }

    #[tokio::test]
    async fn test_vote_rejections() {
        let (controller, agreement_id) = setup(open_config()).await;
        let proposal_id = controller
            .propose(agreement_id, ProposalKind::RateAdjustment, 2_000, addr(1))
            .await
            .unwrap();

        controller
            .cast_vote(proposal_id, addr(2), VoteSupport::For)
            .await
            .unwrap();
        assert!(matches!(
            controller
                .cast_vote(proposal_id, addr(2), VoteSupport::Against)
                .await,
            Err(GovernanceError::AlreadyVoted { .. })
        ));

        // addr(9) holds nothing
        assert!(matches!(
            controller
                .cast_vote(proposal_id, addr(9), VoteSupport::For)
                .await,
            Err(GovernanceError::NoVotingPower(_))
        ));

        assert!(matches!(
            controller.cast_vote(999, addr(2), VoteSupport::For).await,
            Err(GovernanceError::ProposalNotFound(999))
        ));

        // Closed window
        close_voting(&controller, proposal_id).await;
        assert!(matches!(
            controller
                .cast_vote(proposal_id, addr(3), VoteSupport::For)
                .await,
            Err(GovernanceError::VotingNotOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_voting_delay_keeps_proposal_pending() {
        let (controller, agreement_id) = setup(GovernanceConfig::default()).await;
        let proposal_id = controller
            .propose(agreement_id, ProposalKind::RateAdjustment, 2_000, addr(1))
            .await
            .unwrap();

        assert_eq!(
            controller.state(proposal_id).await.unwrap(),
            ProposalStatus::Pending
        );
        assert!(matches!(
            controller
                .cast_vote(proposal_id, addr(2), VoteSupport::For)
                .await,
            Err(GovernanceError::VotingNotOpen { .. })
        ));
        assert!(matches!(
            controller.finalize(proposal_id).await,
            Err(GovernanceError::VotingNotEnded)
        ));
    }

    #[tokio::test]
    async fn test_defeated_majority_is_persisted() {
        let (controller, agreement_id) = setup(open_config()).await;
        let proposal_id = controller
            .propose(agreement_id, ProposalKind::RateAdjustment, 2_000, addr(1))
            .await
            .unwrap();

        controller
            .cast_vote(proposal_id, addr(2), VoteSupport::Against)
            .await
            .unwrap();
        controller
            .cast_vote(proposal_id, addr(3), VoteSupport::For)
            .await
            .unwrap();
        close_voting(&controller, proposal_id).await;

        assert_eq!(
            controller.finalize(proposal_id).await.unwrap(),
            ProposalStatus::Defeated
        );
        assert!(controller.get_proposal(proposal_id).await.unwrap().defeated);
        assert!(matches!(
            controller.execute(proposal_id).await,
            Err(GovernanceError::ProposalNotSucceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_rate_adjustment_is_clamped() {
        let (controller, agreement_id) = setup(open_config()).await;

        for (target, expected) in [(9_000u64, 5_000u64), (10, 100)] {
            let proposal_id = controller
                .propose(agreement_id, ProposalKind::RateAdjustment, target, addr(1))
                .await
                .unwrap();
            controller
                .cast_vote(proposal_id, addr(1), VoteSupport::For)
                .await
                .unwrap();
            close_voting(&controller, proposal_id).await;
            controller.execute(proposal_id).await.unwrap();

            let agreement = controller.ledger.get_agreement(agreement_id).await.unwrap();
            assert_eq!(agreement.annual_rate_bps, expected);
        }
    }

    #[tokio::test]
    async fn test_reserve_allocation_cap_and_withdrawal() {
        let (controller, agreement_id) = setup(open_config()).await;

        let run = |kind, target| {
            let controller = &controller;
            async move {
                let proposal_id = controller
                    .propose(agreement_id, kind, target, addr(1))
                    .await
                    .unwrap();
                controller
                    .cast_vote(proposal_id, addr(1), VoteSupport::For)
                    .await
                    .unwrap();
                close_voting(controller, proposal_id).await;
                controller.execute(proposal_id).await
            }
        };

        // Cap is 20% of 10_000 = 2_000
        run(ProposalKind::ReserveAllocation, 1_500).await.unwrap();
        let agreement = controller.ledger.get_agreement(agreement_id).await.unwrap();
        assert_eq!(agreement.reserve_balance, units(1_500));

        // Second allocation clamps at the cap
        run(ProposalKind::ReserveAllocation, 1_000).await.unwrap();
        let agreement = controller.ledger.get_agreement(agreement_id).await.unwrap();
        assert_eq!(agreement.reserve_balance, units(2_000));

        // Withdrawing beyond the reserve is rejected
        assert!(matches!(
            run(ProposalKind::ReserveWithdrawal, 2_500).await,
            Err(GovernanceError::InsufficientReserve { .. })
        ));

        run(ProposalKind::ReserveWithdrawal, 500).await.unwrap();
        let agreement = controller.ledger.get_agreement(agreement_id).await.unwrap();
        assert_eq!(agreement.reserve_balance, units(1_500));
    }

    #[tokio::test]
    async fn test_parameter_update_range_validation() {
        let (controller, agreement_id) = setup(open_config()).await;

        let run = |param, target| {
            let controller = &controller;
            async move {
                let proposal_id = controller
                    .propose(
                        agreement_id,
                        ProposalKind::ParameterUpdate(param),
                        target,
                        addr(1),
                    )
                    .await
                    .unwrap();
                controller
                    .cast_vote(proposal_id, addr(1), VoteSupport::For)
                    .await
                    .unwrap();
                close_voting(controller, proposal_id).await;
                controller.execute(proposal_id).await
            }
        };

        run(AgreementParam::GracePeriodDays, 60).await.unwrap();
        let agreement = controller.ledger.get_agreement(agreement_id).await.unwrap();
        assert_eq!(agreement.grace_period_days, 60);

        assert!(matches!(
            run(AgreementParam::GracePeriodDays, 366).await,
            Err(GovernanceError::ParameterOutOfRange { .. })
        ));

        run(AgreementParam::DefaultThreshold, 5).await.unwrap();
        run(AgreementParam::PenaltyBps, 500).await.unwrap();
        let agreement = controller.ledger.get_agreement(agreement_id).await.unwrap();
        assert_eq!(agreement.default_threshold, 5);
        assert_eq!(agreement.default_penalty_bps, 500);
    }

    #[tokio::test]
    async fn test_vote_weight_reads_balance_at_cast_time() {
        let (controller, agreement_id) = setup(open_config()).await;
        let proposal_id = controller
            .propose(agreement_id, ProposalKind::RateAdjustment, 2_000, addr(1))
            .await
            .unwrap();

        controller
            .cast_vote(proposal_id, addr(2), VoteSupport::For)
            .await
            .unwrap();

        // Selling every share after casting does not revoke the vote
        controller
            .ledger
            .transfer_shares(agreement_id, addr(2), addr(3), units(600))
            .await
            .unwrap();
        let proposal = controller.get_proposal(proposal_id).await.unwrap();
        assert_eq!(proposal.tally.for_votes, units(600));

        // The buyer acquired voting power mid-window
        controller
            .cast_vote(proposal_id, addr(3), VoteSupport::Against)
            .await
            .unwrap();
        let proposal = controller.get_proposal(proposal_id).await.unwrap();
        // addr(3) now holds its original 300 plus the bought 600
        assert_eq!(proposal.tally.against_votes, units(900));
    }

    #[tokio::test]
    async fn test_propose_requires_shares_and_agreement() {
        let (controller, agreement_id) = setup(open_config()).await;

        assert!(matches!(
            controller
                .propose(agreement_id, ProposalKind::RateAdjustment, 2_000, addr(9))
                .await,
            Err(GovernanceError::NotShareholder(_))
        ));
        assert!(matches!(
            controller
                .propose(999, ProposalKind::RateAdjustment, 2_000, addr(1))
                .await,
            Err(GovernanceError::Agreement(_))
        ));
    }
}
