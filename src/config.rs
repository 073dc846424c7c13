use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::errors::{LendingError, Result};
use crate::types::{Address, NftId};
use crate::units::{Bps, PRECISION};

/// closed bounds enforced by the parameter setters
pub const MAX_PROTOCOL_FEE_BPS: u32 = 1_000;
pub const MIN_REPAY_GRACE_PERIOD_SECS: u64 = 86_400;
pub const MAX_REPAY_GRACE_PERIOD_SECS: u64 = 2_592_000;
pub const MAX_REPAY_GRACE_FEE_BPS: u32 = 2_000;
pub const MAX_LIQUIDATION_FEE_BPS: u32 = 1_500;
pub const MAX_ORIGINATION_FEE_BPS: u32 = 1_000;
pub const MAX_ORIGINATION_BRACKETS: usize = 10;
pub const MAX_FEE_REDUCTION_FACTOR: u64 = 100_000;
pub const MIN_EXCLUSIVE_WINDOW_SECS: u64 = 3_600;
pub const MAX_EXCLUSIVE_WINDOW_SECS: u64 = 1_209_600;
pub const MAX_APR_BPS: u32 = 10_000;

/// protocol-wide configurable bounds: fees, durations, rates, allow-lists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub protocol_fee_bps: Bps,
    pub repay_grace_period_secs: u64,
    pub repay_grace_fee_bps: Bps,
    pub liquidation_fee_bps: Bps,
    pub base_origination_fee_bps: Bps,
    /// origination brackets in whole tokens, strictly increasing
    pub origination_brackets: Vec<u128>,
    /// fee divisor per crossed bracket, in precision units
    pub fee_reduction_factor: u64,
    pub exclusive_window_secs: u64,
    /// per-duration APR table, keyed by loan duration in seconds
    pub apr_table: BTreeMap<u64, Bps>,
    pub allowed_tokens: HashSet<Address>,
    pub disallowed_collateral: HashSet<NftId>,
    pub treasury: Address,
}

impl ProtocolConfig {
    pub fn new(treasury: Address) -> Self {
        Self {
            protocol_fee_bps: Bps::new(150),
            repay_grace_period_secs: 604_800,
            repay_grace_fee_bps: Bps::new(300),
            liquidation_fee_bps: Bps::new(500),
            base_origination_fee_bps: Bps::new(100),
            origination_brackets: vec![10_000, 50_000, 200_000],
            fee_reduction_factor: 14_000,
            exclusive_window_secs: 86_400,
            apr_table: BTreeMap::new(),
            allowed_tokens: HashSet::new(),
            disallowed_collateral: HashSet::new(),
            treasury,
        }
    }

    /// rate configured for a duration, if any
    pub fn apr_for_duration(&self, duration_secs: u64) -> Option<Bps> {
        self.apr_table.get(&duration_secs).copied()
    }

    pub fn is_token_allowed(&self, token: &Address) -> bool {
        self.allowed_tokens.contains(token)
    }

    pub fn is_collateral_disallowed(&self, nft: &NftId) -> bool {
        self.disallowed_collateral.contains(nft)
    }

    pub fn set_protocol_fee(&mut self, fee_bps: Bps) -> Result<()> {
        if fee_bps.as_u32() > MAX_PROTOCOL_FEE_BPS {
            return Err(invalid(format!(
                "protocol fee {} exceeds max {}bps",
                fee_bps, MAX_PROTOCOL_FEE_BPS
            )));
        }
        self.protocol_fee_bps = fee_bps;
        Ok(())
    }

    pub fn set_repay_grace_period(&mut self, secs: u64) -> Result<()> {
        if !(MIN_REPAY_GRACE_PERIOD_SECS..MAX_REPAY_GRACE_PERIOD_SECS).contains(&secs) {
            return Err(invalid(format!(
                "grace period {}s outside [{}, {})",
                secs, MIN_REPAY_GRACE_PERIOD_SECS, MAX_REPAY_GRACE_PERIOD_SECS
            )));
        }
        self.repay_grace_period_secs = secs;
        Ok(())
    }

    pub fn set_repay_grace_fee(&mut self, fee_bps: Bps) -> Result<()> {
        if fee_bps.as_u32() > MAX_REPAY_GRACE_FEE_BPS {
            return Err(invalid(format!(
                "grace fee {} exceeds max {}bps",
                fee_bps, MAX_REPAY_GRACE_FEE_BPS
            )));
        }
        self.repay_grace_fee_bps = fee_bps;
        Ok(())
    }

    pub fn set_liquidation_fee(&mut self, fee_bps: Bps) -> Result<()> {
        if fee_bps.as_u32() > MAX_LIQUIDATION_FEE_BPS {
            return Err(invalid(format!(
                "liquidation fee {} exceeds max {}bps",
                fee_bps, MAX_LIQUIDATION_FEE_BPS
            )));
        }
        self.liquidation_fee_bps = fee_bps;
        Ok(())
    }

    pub fn set_base_origination_fee(&mut self, fee_bps: Bps) -> Result<()> {
        if fee_bps.as_u32() > MAX_ORIGINATION_FEE_BPS {
            return Err(invalid(format!(
                "origination fee {} exceeds max {}bps",
                fee_bps, MAX_ORIGINATION_FEE_BPS
            )));
        }
        self.base_origination_fee_bps = fee_bps;
        Ok(())
    }

    pub fn set_origination_brackets(&mut self, brackets: Vec<u128>) -> Result<()> {
        if brackets.is_empty() {
            return Err(invalid("origination brackets must not be empty".to_string()));
        }
        if brackets.len() > MAX_ORIGINATION_BRACKETS {
            return Err(invalid(format!(
                "origination bracket count {} exceeds max {}",
                brackets.len(),
                MAX_ORIGINATION_BRACKETS
            )));
        }
        if brackets[0] == 0 {
            return Err(invalid(
                "first origination bracket must be greater than zero".to_string(),
            ));
        }
        if brackets.windows(2).any(|w| w[1] <= w[0]) {
            return Err(invalid(
                "origination brackets must be strictly increasing".to_string(),
            ));
        }
        self.origination_brackets = brackets;
        Ok(())
    }

    pub fn set_fee_reduction_factor(&mut self, factor: u64) -> Result<()> {
        if (factor as u128) < PRECISION || factor > MAX_FEE_REDUCTION_FACTOR {
            return Err(invalid(format!(
                "fee reduction factor {} outside [{}, {}]",
                factor, PRECISION, MAX_FEE_REDUCTION_FACTOR
            )));
        }
        self.fee_reduction_factor = factor;
        Ok(())
    }

    pub fn set_exclusive_window(&mut self, secs: u64) -> Result<()> {
        if !(MIN_EXCLUSIVE_WINDOW_SECS..=MAX_EXCLUSIVE_WINDOW_SECS).contains(&secs) {
            return Err(invalid(format!(
                "exclusive window {}s outside [{}, {}]",
                secs, MIN_EXCLUSIVE_WINDOW_SECS, MAX_EXCLUSIVE_WINDOW_SECS
            )));
        }
        self.exclusive_window_secs = secs;
        Ok(())
    }

    pub fn set_apr_for_duration(&mut self, duration_secs: u64, apr_bps: Bps) -> Result<()> {
        if duration_secs == 0 {
            return Err(invalid("duration must be greater than zero".to_string()));
        }
        if apr_bps.is_zero() || apr_bps.as_u32() > MAX_APR_BPS {
            return Err(invalid(format!(
                "apr {} outside (0, {}]",
                apr_bps, MAX_APR_BPS
            )));
        }
        self.apr_table.insert(duration_secs, apr_bps);
        Ok(())
    }

    pub fn remove_apr_for_duration(&mut self, duration_secs: u64) {
        self.apr_table.remove(&duration_secs);
    }

    pub fn allow_token(&mut self, token: Address) {
        self.allowed_tokens.insert(token);
    }

    pub fn disallow_token(&mut self, token: &Address) {
        self.allowed_tokens.remove(token);
    }

    pub fn disallow_collateral(&mut self, nft: NftId) {
        self.disallowed_collateral.insert(nft);
    }

    pub fn reallow_collateral(&mut self, nft: &NftId) {
        self.disallowed_collateral.remove(nft);
    }
}

fn invalid(message: String) -> LendingError {
    LendingError::InvalidParameter { message }
}
