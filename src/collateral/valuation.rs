use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{LendingError, Result};
use crate::units::Amount;

/// maximum age of an oracle quote before it is rejected as stale
pub const PRICE_VALIDITY_WINDOW_SECS: i64 = 3_600;

/// an oracle quote for a single nft: price in whole denomination tokens
/// and the loan-to-value ceiling as a percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    pub timestamp: DateTime<Utc>,
    pub price: u128,
    pub ltv: u32,
}

/// reject stale or nonsensical quotes
pub fn require_fresh(valuation: &Valuation, now: DateTime<Utc>) -> Result<()> {
    let age_secs = (now - valuation.timestamp).num_seconds();
    if age_secs > PRICE_VALIDITY_WINDOW_SECS {
        return Err(LendingError::StaleValuation {
            quoted: valuation.timestamp,
            now,
        });
    }
    if valuation.ltv > 100 {
        return Err(LendingError::InvalidLtv { ltv: valuation.ltv });
    }
    Ok(())
}

/// borrow ceiling: price × 10^decimals × ltv / 100, in smallest units
pub fn max_borrowable(valuation: &Valuation, decimals: u32) -> Amount {
    Amount::from_raw(valuation.price * 10u128.pow(decimals) * valuation.ltv as u128 / 100)
}

/// full gate: freshness, ltv sanity, and the requested amount against the ceiling
pub fn check_borrowable(
    valuation: &Valuation,
    amount: Amount,
    decimals: u32,
    now: DateTime<Utc>,
) -> Result<()> {
    require_fresh(valuation, now)?;
    let max = max_borrowable(valuation, decimals);
    if amount > max {
        return Err(LendingError::OverMaxBorrow {
            requested: amount,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn quote_at(ts: DateTime<Utc>, price: u128, ltv: u32) -> Valuation {
        Valuation {
            timestamp: ts,
            price,
            ltv,
        }
    }

    #[test]
    fn test_stale_quote_rejected() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let fresh = quote_at(now - Duration::seconds(PRICE_VALIDITY_WINDOW_SECS), 100, 50);
        let stale = quote_at(now - Duration::seconds(PRICE_VALIDITY_WINDOW_SECS + 1), 100, 50);

        assert!(require_fresh(&fresh, now).is_ok());
        assert!(matches!(
            require_fresh(&stale, now),
            Err(LendingError::StaleValuation { .. })
        ));
    }

    #[test]
    fn test_ltv_over_hundred_rejected() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let quote = quote_at(now, 100, 101);
        assert!(matches!(
            require_fresh(&quote, now),
            Err(LendingError::InvalidLtv { ltv: 101 })
        ));
    }

    #[test]
    fn test_max_borrowable_scaling() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        // 200 whole tokens at 50% ltv with 6 decimals
        let quote = quote_at(now, 200, 50);
        assert_eq!(max_borrowable(&quote, 6), Amount::from_whole(100, 6));
    }

    #[test]
    fn test_borrow_ceiling_enforced() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let quote = quote_at(now, 200, 50);

        assert!(check_borrowable(&quote, Amount::from_whole(100, 6), 6, now).is_ok());
        assert!(matches!(
            check_borrowable(&quote, Amount::from_raw(100_000_001), 6, now),
            Err(LendingError::OverMaxBorrow { .. })
        ));
    }
}
