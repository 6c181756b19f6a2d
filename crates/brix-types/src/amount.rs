use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Basis-point denominator used by every rate field in the engine.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Indivisible currency/share unit.
///
/// Shares are minted 1:1 with contributed capital, so the same type covers
/// both capital amounts and share balances.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);
    /// Sanity ceiling on capital accepted for a single agreement.
    pub const MAX_ISSUANCE: Self = Self(1_000_000_000_000_000); // 10^15 units

    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    pub const fn to_units(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// `self * numerator / denominator` with a u128 intermediate.
    ///
    /// Floor division; the caller owns any rounding remainder. Returns
    /// `None` when `denominator` is zero or the result overflows u64.
    pub fn mul_div(self, numerator: Self, denominator: Self) -> Option<Self> {
        if denominator.is_zero() {
            return None;
        }
        let wide = (self.0 as u128) * (numerator.0 as u128) / (denominator.0 as u128);
        u64::try_from(wide).ok().map(Self)
    }

    /// Basis-point fraction of this amount, floored.
    pub fn mul_bps(self, bps: u64) -> Self {
        let wide = (self.0 as u128) * (bps as u128) / (BPS_DENOMINATOR as u128);
        Self(wide.min(u64::MAX as u128) as u64)
    }

    /// Ceiling division by a plain count (e.g. term months).
    pub fn div_ceil(self, divisor: u64) -> Self {
        Self(self.0.div_ceil(divisor))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, a| acc.saturating_add(a))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_arithmetic() {
        let a = Amount::from_units(100);
        let b = Amount::from_units(30);

        assert_eq!(a.checked_add(b), Some(Amount::from_units(130)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(a.saturating_sub(b), Amount::from_units(70));
        assert_eq!(b.saturating_sub(a), Amount::ZERO);
    }

    #[test]
    fn test_mul_div_is_exact_floor() {
        let amount = Amount::from_units(101);
        let share = Amount::from_units(500);
        let total = Amount::from_units(1000);

        assert_eq!(
            amount.mul_div(share, total),
            Some(Amount::from_units(50))
        );
        assert_eq!(amount.mul_div(share, Amount::ZERO), None);
    }

    #[test]
    fn test_mul_div_survives_large_operands() {
        // u64 * u64 would overflow without the u128 intermediate
        let amount = Amount::from_units(u64::MAX / 2);
        let result = amount.mul_div(Amount::from_units(2), Amount::from_units(2));
        assert_eq!(result, Some(amount));
    }

    #[test]
    fn test_mul_bps() {
        // 10% of 1_000_000
        assert_eq!(
            Amount::from_units(1_000_000).mul_bps(1000),
            Amount::from_units(100_000)
        );
        assert_eq!(Amount::from_units(99).mul_bps(100), Amount::ZERO);
    }

    #[test]
    fn test_div_ceil() {
        assert_eq!(
            Amount::from_units(1_100_000).div_ceil(12),
            Amount::from_units(91_667)
        );
        assert_eq!(Amount::from_units(12).div_ceil(12), Amount::from_units(1));
    }
}
