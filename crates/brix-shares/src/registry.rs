use crate::{Result, ShareError};
use brix_types::{AccountAddress, AgreementId, Amount};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Hard cap on distinct holders per agreement. Admission of a holder that
/// would cross the cap fails atomically.
pub const MAX_SHAREHOLDERS: usize = 1000;

/// Fungible-share ledger for a single agreement.
///
/// Invariants: `sum(balances) == total_shares`; a holder appears in the
/// dense `holders` array iff its balance is nonzero. The dense array plus
/// `holder_index` give O(1) membership and O(1) swap-removal while keeping
/// iteration cheap for distributions.
#[derive(Debug, Default)]
struct ShareLedger {
    total_shares: Amount,
    balances: HashMap<AccountAddress, Amount>,
    holders: Vec<AccountAddress>,
    holder_index: HashMap<AccountAddress, usize>,
    pooled_contribution: HashMap<AccountAddress, Amount>,
    unclaimed_remainder: HashMap<AccountAddress, Amount>,
}

impl ShareLedger {
    fn balance_of(&self, holder: &AccountAddress) -> Amount {
        self.balances.get(holder).copied().unwrap_or(Amount::ZERO)
    }

    fn admit(&mut self, holder: AccountAddress) -> Result<()> {
        if self.holder_index.contains_key(&holder) {
            return Ok(());
        }
        if self.holders.len() >= MAX_SHAREHOLDERS {
            return Err(ShareError::TooManyShareholders {
                max: MAX_SHAREHOLDERS,
            });
        }
        self.holder_index.insert(holder, self.holders.len());
        self.holders.push(holder);
        Ok(())
    }

    fn evict_if_empty(&mut self, holder: &AccountAddress) {
        if !self.balance_of(holder).is_zero() {
            return;
        }
        self.balances.remove(holder);
        if let Some(idx) = self.holder_index.remove(holder) {
            self.holders.swap_remove(idx);
            if idx < self.holders.len() {
                self.holder_index.insert(self.holders[idx], idx);
            }
        }
    }

    fn credit(&mut self, holder: AccountAddress, amount: Amount) -> Result<()> {
        let balance = self.balance_of(&holder);
        let new_balance = balance
            .checked_add(amount)
            .ok_or(ShareError::Overflow("share balance"))?;
        let new_total = self
            .total_shares
            .checked_add(amount)
            .ok_or(ShareError::Overflow("total shares"))?;
        self.admit(holder)?;
        self.balances.insert(holder, new_balance);
        self.total_shares = new_total;
        Ok(())
    }

    fn debit(&mut self, holder: AccountAddress, amount: Amount) -> Result<()> {
        let balance = self.balance_of(&holder);
        let new_balance =
            balance
                .checked_sub(amount)
                .ok_or(ShareError::InsufficientShares {
                    holder,
                    balance,
                    amount,
                })?;
        self.balances.insert(holder, new_balance);
        self.total_shares = self.total_shares.saturating_sub(amount);
        self.evict_if_empty(&holder);
        Ok(())
    }

    /// Largest current holder; ties broken by first encountered in the
    /// dense array.
    fn largest_holder(&self) -> Option<AccountAddress> {
        let mut best: Option<(AccountAddress, Amount)> = None;
        for holder in &self.holders {
            let balance = self.balance_of(holder);
            match best {
                Some((_, top)) if balance <= top => {}
                _ => best = Some((*holder, balance)),
            }
        }
        best.map(|(holder, _)| holder)
    }
}

/// Manager over the per-agreement share ledgers.
pub struct ShareRegistry {
    ledgers: Arc<RwLock<HashMap<AgreementId, ShareLedger>>>,
}

impl Default for ShareRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShareRegistry {
    pub fn new() -> Self {
        Self {
            ledgers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create_ledger(&self, agreement_id: AgreementId) -> Result<()> {
        let mut ledgers = self.ledgers.write().await;
        if ledgers.contains_key(&agreement_id) {
            return Err(ShareError::LedgerAlreadyExists(agreement_id));
        }
        ledgers.insert(agreement_id, ShareLedger::default());
        debug!(agreement_id, "Share ledger created");
        Ok(())
    }

    pub async fn mint(
        &self,
        agreement_id: AgreementId,
        holder: AccountAddress,
        amount: Amount,
    ) -> Result<()> {
        if holder.is_zero() {
            return Err(ShareError::InvalidAmount(
                "cannot mint to the null holder".to_string(),
            ));
        }
        if amount.is_zero() {
            return Ok(());
        }
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers
            .get_mut(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;

        ledger.credit(holder, amount)?;
        let pooled = ledger
            .pooled_contribution
            .entry(holder)
            .or_insert(Amount::ZERO);
        *pooled = pooled.saturating_add(amount);

        info!(
            agreement_id,
            holder = %holder,
            amount = %amount,
            total_shares = %ledger.total_shares,
            "🪙 Shares minted"
        );
        Ok(())
    }

    pub async fn burn(
        &self,
        agreement_id: AgreementId,
        holder: AccountAddress,
        amount: Amount,
    ) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers
            .get_mut(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;
        ledger.debit(holder, amount)?;

        info!(
            agreement_id,
            holder = %holder,
            amount = %amount,
            total_shares = %ledger.total_shares,
            "🔥 Shares burned"
        );
        Ok(())
    }

    /// Retire every outstanding share (agreement completion or default).
    /// Unclaimed remainders stay claimable; pooled contributions are kept
    /// for audit.
    pub async fn burn_all(&self, agreement_id: AgreementId) -> Result<()> {
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers
            .get_mut(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;

        let retired = ledger.total_shares;
        ledger.balances.clear();
        ledger.holders.clear();
        ledger.holder_index.clear();
        ledger.total_shares = Amount::ZERO;

        info!(agreement_id, retired = %retired, "🔥 All shares retired");
        Ok(())
    }

    /// Move shares between holders. Restriction checks happen at the
    /// calling layer; this runs the same new-holder admission check as
    /// `mint` and evicts emptied holders.
    pub async fn transfer(
        &self,
        agreement_id: AgreementId,
        from: AccountAddress,
        to: AccountAddress,
        amount: Amount,
    ) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        if from == to {
            return Err(ShareError::InvalidAmount(
                "cannot transfer to the same holder".to_string(),
            ));
        }
        if from.is_zero() || to.is_zero() {
            return Err(ShareError::InvalidAmount(
                "mint/burn must be used for the null holder".to_string(),
            ));
        }
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers
            .get_mut(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;

        let from_balance = ledger.balance_of(&from);
        if from_balance < amount {
            return Err(ShareError::InsufficientShares {
                holder: from,
                balance: from_balance,
                amount,
            });
        }
        let to_balance = ledger.balance_of(&to);
        let new_to = to_balance
            .checked_add(amount)
            .ok_or(ShareError::Overflow("share balance"))?;
        // Admission runs before any balance moves so a rejected recipient
        // leaves both sides untouched.
        ledger.admit(to)?;
        ledger.balances.insert(from, from_balance.saturating_sub(amount));
        ledger.balances.insert(to, new_to);
        ledger.evict_if_empty(&from);

        info!(
            agreement_id,
            from = %from,
            to = %to,
            amount = %amount,
            "🔁 Shares transferred"
        );
        Ok(())
    }

    pub async fn balance_of(
        &self,
        agreement_id: AgreementId,
        holder: AccountAddress,
    ) -> Result<Amount> {
        let ledgers = self.ledgers.read().await;
        let ledger = ledgers
            .get(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;
        Ok(ledger.balance_of(&holder))
    }

    pub async fn total_shares(&self, agreement_id: AgreementId) -> Result<Amount> {
        let ledgers = self.ledgers.read().await;
        let ledger = ledgers
            .get(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;
        Ok(ledger.total_shares)
    }

    pub async fn holder_count(&self, agreement_id: AgreementId) -> Result<usize> {
        let ledgers = self.ledgers.read().await;
        let ledger = ledgers
            .get(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;
        Ok(ledger.holders.len())
    }

    /// Snapshot of (holder, balance) pairs in dense-array order.
    pub async fn snapshot(
        &self,
        agreement_id: AgreementId,
    ) -> Result<Vec<(AccountAddress, Amount)>> {
        let ledgers = self.ledgers.read().await;
        let ledger = ledgers
            .get(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;
        Ok(ledger
            .holders
            .iter()
            .map(|h| (*h, ledger.balance_of(h)))
            .collect())
    }

    pub async fn largest_holder(
        &self,
        agreement_id: AgreementId,
    ) -> Result<Option<AccountAddress>> {
        let ledgers = self.ledgers.read().await;
        let ledger = ledgers
            .get(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;
        Ok(ledger.largest_holder())
    }

    pub async fn pooled_contribution(
        &self,
        agreement_id: AgreementId,
        holder: AccountAddress,
    ) -> Result<Amount> {
        let ledgers = self.ledgers.read().await;
        let ledger = ledgers
            .get(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;
        Ok(ledger
            .pooled_contribution
            .get(&holder)
            .copied()
            .unwrap_or(Amount::ZERO))
    }

    pub async fn unclaimed_remainder(
        &self,
        agreement_id: AgreementId,
        holder: AccountAddress,
    ) -> Result<Amount> {
        let ledgers = self.ledgers.read().await;
        let ledger = ledgers
            .get(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;
        Ok(ledger
            .unclaimed_remainder
            .get(&holder)
            .copied()
            .unwrap_or(Amount::ZERO))
    }

    /// Bank an undeliverable payout for later pull-claim.
    pub async fn add_unclaimed(
        &self,
        agreement_id: AgreementId,
        holder: AccountAddress,
        amount: Amount,
    ) -> Result<()> {
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers
            .get_mut(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;
        let banked = ledger
            .unclaimed_remainder
            .entry(holder)
            .or_insert(Amount::ZERO);
        *banked = banked.saturating_add(amount);
        Ok(())
    }

    /// Take the full unclaimed balance for a holder, zeroing it. The
    /// caller restores it via `add_unclaimed` if delivery fails again.
    pub async fn take_unclaimed(
        &self,
        agreement_id: AgreementId,
        holder: AccountAddress,
    ) -> Result<Amount> {
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers
            .get_mut(&agreement_id)
            .ok_or(ShareError::LedgerNotFound(agreement_id))?;
        Ok(ledger
            .unclaimed_remainder
            .remove(&holder)
            .unwrap_or(Amount::ZERO))
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

    #[tokio::test]
    async fn test_mint_burn_keeps_sum_invariant() {
        let registry = ShareRegistry::new();
        registry.create_ledger(1).await.unwrap();

        registry.mint(1, addr(1), units(700)).await.unwrap();
        registry.mint(1, addr(2), units(300)).await.unwrap();

        assert_eq!(registry.total_shares(1).await.unwrap(), units(1000));
        let sum: Amount = registry
            .snapshot(1)
            .await
            .unwrap()
            .into_iter()
            .map(|(_, b)| b)
            .sum();
        assert_eq!(sum, units(1000));

        registry.burn(1, addr(2), units(300)).await.unwrap();
        assert_eq!(registry.holder_count(1).await.unwrap(), 1);
        assert_eq!(registry.balance_of(1, addr(2)).await.unwrap(), units(0));
        assert_eq!(registry.total_shares(1).await.unwrap(), units(700));
    }

    #[tokio::test]
    async fn test_holder_evicted_via_swap_remove() {
        let registry = ShareRegistry::new();
        registry.create_ledger(1).await.unwrap();
        for tag in 1..=4u8 {
            registry.mint(1, addr(tag), units(100)).await.unwrap();
        }

        // Removing a middle holder must keep the dense array consistent
        registry.burn(1, addr(2), units(100)).await.unwrap();
        let snapshot = registry.snapshot(1).await.unwrap();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.iter().all(|(h, b)| *h != addr(2) && !b.is_zero()));

        // The swapped-in holder is still reachable
        registry.burn(1, addr(4), units(100)).await.unwrap();
        assert_eq!(registry.holder_count(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_shareholder_cap_is_atomic() {
        let registry = ShareRegistry::new();
        registry.create_ledger(1).await.unwrap();

        for i in 0..MAX_SHAREHOLDERS {
            let mut bytes = [0u8; 32];
            bytes[..8].copy_from_slice(&(i as u64 + 1).to_be_bytes());
            registry
                .mint(1, AccountAddress::from_bytes(bytes), units(1))
                .await
                .unwrap();
        }

        let total_before = registry.total_shares(1).await.unwrap();
        let overflow = addr(0xFE);
        let result = registry.mint(1, overflow, units(1)).await;
        assert!(matches!(
            result,
            Err(ShareError::TooManyShareholders { .. })
        ));

        // No partial state change
        assert_eq!(registry.total_shares(1).await.unwrap(), total_before);
        assert_eq!(
            registry.holder_count(1).await.unwrap(),
            MAX_SHAREHOLDERS
        );
        assert_eq!(registry.balance_of(1, overflow).await.unwrap(), units(0));

        // Existing holders can still receive
        registry.mint(1, addr(1), units(5)).await.ok();
    }

    #[tokio::test]
    async fn test_transfer_moves_balances_and_evicts() {
        let registry = ShareRegistry::new();
        registry.create_ledger(1).await.unwrap();
        registry.mint(1, addr(1), units(500)).await.unwrap();

        registry
            .transfer(1, addr(1), addr(2), units(500))
            .await
            .unwrap();

        assert_eq!(registry.balance_of(1, addr(1)).await.unwrap(), units(0));
        assert_eq!(registry.balance_of(1, addr(2)).await.unwrap(), units(500));
        assert_eq!(registry.holder_count(1).await.unwrap(), 1);
        assert_eq!(registry.total_shares(1).await.unwrap(), units(500));
    }

    #[tokio::test]
    async fn test_transfer_insufficient_shares() {
        let registry = ShareRegistry::new();
        registry.create_ledger(1).await.unwrap();
        registry.mint(1, addr(1), units(10)).await.unwrap();

        let result = registry.transfer(1, addr(1), addr(2), units(11)).await;
        assert!(matches!(
            result,
            Err(ShareError::InsufficientShares { .. })
        ));
        assert_eq!(registry.balance_of(1, addr(1)).await.unwrap(), units(10));
    }

    #[tokio::test]
    async fn test_largest_holder_tie_break_is_first_encountered() {
        let registry = ShareRegistry::new();
        registry.create_ledger(1).await.unwrap();
        registry.mint(1, addr(1), units(500)).await.unwrap();
        registry.mint(1, addr(2), units(500)).await.unwrap();

        assert_eq!(
            registry.largest_holder(1).await.unwrap(),
            Some(addr(1))
        );
    }

    #[tokio::test]
    async fn test_unknown_ledger_is_an_error() {
        let registry = ShareRegistry::new();
        assert!(matches!(
            registry.mint(99, addr(1), units(1)).await,
            Err(ShareError::LedgerNotFound(99))
        ));
    }
}
