use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Basis points in one whole.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Token amount in the smallest indivisible unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub const fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub const fn base_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// `floor(self * bps / 10_000)`. Fails only when `bps` exceeds one whole.
    pub fn mul_bps_floor(&self, bps: u64) -> Result<Self> {
        if bps > BPS_DENOMINATOR {
            return Err(TypesError::Overflow);
        }
        let scaled = (self.0 as u128 * bps as u128) / BPS_DENOMINATOR as u128;
        u64::try_from(scaled)
            .map(Self)
            .map_err(|_| TypesError::Overflow)
    }
}

impl From<u64> for TokenAmount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} units", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bps_floor() {
        let amount = TokenAmount::from_base_units(10_000);
        assert_eq!(amount.mul_bps_floor(500).unwrap().base_units(), 500);
        assert_eq!(amount.mul_bps_floor(1_000).unwrap().base_units(), 1_000);

        let odd = TokenAmount::from_base_units(999);
        assert_eq!(odd.mul_bps_floor(500).unwrap().base_units(), 49);
        assert!(odd.mul_bps_floor(10_001).is_err());
    }

    #[test]
    fn test_checked_ops() {
        let max = TokenAmount::from_base_units(u64::MAX);
        assert!(max.checked_add(TokenAmount::from_base_units(1)).is_none());
        assert!(TokenAmount::ZERO
            .checked_sub(TokenAmount::from_base_units(1))
            .is_none());
        assert_eq!(
            TokenAmount::ZERO.saturating_sub(TokenAmount::from_base_units(5)),
            TokenAmount::ZERO
        );
    }

    proptest! {
        #[test]
        fn bps_share_never_exceeds_whole(units in any::<u64>(), bps in 0u64..=BPS_DENOMINATOR) {
            let amount = TokenAmount::from_base_units(units);
            let share = amount.mul_bps_floor(bps).unwrap();
            prop_assert!(share <= amount);
        }
    }
}
