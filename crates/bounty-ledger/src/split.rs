use crate::error::{LedgerError, Result};
use bounty_types::{TokenAmount, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};

/// Worker / treasury division of a bounty amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSplit {
    pub treasury_bps: u64,
}

impl Default for PayoutSplit {
    fn default() -> Self {
        Self { treasury_bps: 500 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAmounts {
    pub worker: TokenAmount,
    pub treasury: TokenAmount,
}

impl PayoutSplit {
    pub fn new(treasury_bps: u64) -> Result<Self> {
        if treasury_bps > BPS_DENOMINATOR {
            return Err(LedgerError::InvalidRequest(format!(
                "treasury share {} bps exceeds {}",
                treasury_bps, BPS_DENOMINATOR
            )));
        }
        Ok(Self { treasury_bps })
    }

    /// Treasury takes `floor(amount * bps / 10000)`; the worker takes the rest,
    /// so the legs always sum to `amount`.
    pub fn compute(&self, amount: TokenAmount) -> Result<SplitAmounts> {
        let treasury = amount.mul_bps_floor(self.treasury_bps)?;
        let worker = amount
            .checked_sub(treasury)
            .ok_or_else(|| LedgerError::InvalidRequest("split underflow".to_string()))?;
        Ok(SplitAmounts { worker, treasury })
    }
}
