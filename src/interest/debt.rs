use crate::units::{Amount, Bps, PRECISION, SECONDS_PER_YEAR};

/// interest owed on `amount` at `apr_bps` for a loan of `loan_duration_secs`,
/// settled after `repayment_secs`.
///
/// the repayment duration is clamped to the loan duration. interest accrues
/// pro rata over the clamped duration under the 360-day year convention; the
/// unused-time fraction of the accrual is then charged again as a penalty, so
/// settling early costs exactly as much as settling at maturity. all division
/// truncates toward zero.
pub fn debt_with_penalty(
    amount: Amount,
    apr_bps: Bps,
    loan_duration_secs: u64,
    repayment_secs: u64,
) -> Amount {
    if loan_duration_secs == 0 {
        return Amount::ZERO;
    }

    let clamped = repayment_secs.min(loan_duration_secs);
    let accrued = amount.mul_div(
        apr_bps.as_u128() * clamped as u128,
        SECONDS_PER_YEAR as u128 * PRECISION,
    );
    let penalty = accrued.mul_div(
        (loan_duration_secs - clamped) as u128,
        loan_duration_secs as u128,
    );

    accrued + penalty
}
