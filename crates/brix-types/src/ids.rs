use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonically assigned agreement identifier.
pub type AgreementId = u64;

/// Monotonically assigned governance proposal identifier.
pub type ProposalId = u64;

/// Identifier of a property certificate held by the external registry.
pub type PropertyId = u64;

/// 32-byte account identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountAddress([u8; 32]);

impl AccountAddress {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The null holder. Transfers from/to it are mints/burns and bypass
    /// transfer restrictions.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_address() {
        assert!(AccountAddress::zero().is_zero());
        assert!(!AccountAddress::from_bytes([1; 32]).is_zero());
    }

    #[test]
    fn test_display_is_short_hex() {
        let addr = AccountAddress::from_bytes([0xAB; 32]);
        assert_eq!(addr.to_string(), "0xabababababababab");
    }
}
