use crate::units::{Amount, Bps, PRECISION};

/// one-time fee on principal, tiered down as the principal crosses the
/// configured bracket thresholds.
///
/// the fee starts at `base_fee_bps` of the amount and is divided by
/// `reduction_factor` (precision units) once per ascending threshold the
/// amount meets or exceeds, stopping at the first threshold it does not
/// reach. thresholds are expressed in whole tokens and compared against the
/// amount scaled by the token's decimal precision.
pub fn origination_fee(
    amount: Amount,
    decimals: u32,
    base_fee_bps: Bps,
    reduction_factor: u64,
    brackets: &[u128],
) -> Amount {
    let mut fee = amount.bps(base_fee_bps);
    let scale = 10u128.pow(decimals);

    for threshold in brackets {
        if amount.raw() >= threshold * scale {
            fee = fee.mul_div(PRECISION, reduction_factor as u128);
        } else {
            break;
        }
    }

    fee
}
