pub mod debt;
pub mod origination;

use serde::{Deserialize, Serialize};

use crate::config::ProtocolConfig;
use crate::units::{Amount, Bps};

pub use debt::debt_with_penalty;
pub use origination::origination_fee;

/// split of a settlement between the lender and the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentBreakdown {
    /// principal plus the interest owed to the lender at the loan's own apr
    pub lender_payable: Amount,
    /// the platform's interest take: debt at (apr + protocol fee) minus debt at apr
    pub protocol_interest: Amount,
    pub origination_fee: Amount,
}

impl RepaymentBreakdown {
    pub fn platform_share(&self) -> Amount {
        self.protocol_interest + self.origination_fee
    }

    pub fn total_payable(&self) -> Amount {
        self.lender_payable + self.platform_share()
    }
}

/// compute the lender/platform split for settling a loan after
/// `repayment_secs` of a `loan_duration_secs` term.
///
/// the origination fee uses the live bracket table and reduction factor from
/// the parameter store, not values snapshotted at loan creation.
pub fn repayment_breakdown(
    principal: Amount,
    apr_bps: Bps,
    config: &ProtocolConfig,
    decimals: u32,
    loan_duration_secs: u64,
    repayment_secs: u64,
) -> RepaymentBreakdown {
    let lender_interest =
        debt_with_penalty(principal, apr_bps, loan_duration_secs, repayment_secs);
    let gross_interest = debt_with_penalty(
        principal,
        apr_bps + config.protocol_fee_bps,
        loan_duration_secs,
        repayment_secs,
    );

    RepaymentBreakdown {
        lender_payable: principal + lender_interest,
        protocol_interest: gross_interest - lender_interest,
        origination_fee: origination_fee(
            principal,
            decimals,
            config.base_origination_fee_bps,
            config.fee_reduction_factor,
            &config.origination_brackets,
        ),
    }
}

/// fee charged on principal when a third party liquidates a defaulted loan
pub fn liquidation_fee(principal: Amount, config: &ProtocolConfig) -> Amount {
    principal.bps(config.liquidation_fee_bps)
}

/// fee charged on the lender-payable when repayment lands after maturity but
/// within the grace window
pub fn grace_fee(lender_payable: Amount, config: &ProtocolConfig) -> Amount {
    lender_payable.bps(config.repay_grace_fee_bps)
}
