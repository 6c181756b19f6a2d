use crate::types::VoteTally;
use crate::{GovernanceError, Result};
use brix_types::Amount;

/// Quorum and majority rules, separated from the proposal bookkeeping so
/// they can be tested in isolation.
#[derive(Debug, Clone, Copy)]
pub struct VotingRules {
    /// Minimum participating weight as bps of total supply.
    pub quorum_bps: u64,
}

impl VotingRules {
    /// Participation (for + against + abstain) must reach the quorum
    /// fraction of the current total supply.
    pub fn check_quorum(&self, tally: &VoteTally, total_supply: Amount) -> Result<()> {
        let required = total_supply.mul_bps(self.quorum_bps);
        let actual = tally.participation();
        if actual < required {
            return Err(GovernanceError::QuorumNotMet { required, actual });
        }
        Ok(())
    }
}
