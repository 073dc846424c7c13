use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{LendingError, Result};
use crate::types::{Address, LoanId, LoanStatus, NftId};
use crate::units::{Amount, Bps};

/// a single peer-to-peer loan record.
///
/// the apr and collateral valuation are snapshotted at request time and never
/// change afterwards; grace period and exclusive window are read from the
/// live parameter store when deadlines are evaluated. records are retained
/// indefinitely as audit state and never destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    // identification
    pub id: LoanId,
    pub borrower: Address,
    pub lender: Option<Address>,

    // terms
    pub token: Address,
    pub amount: Amount,
    pub collateral: NftId,
    pub duration_secs: u64,
    pub apr_bps: Bps,
    /// oracle price of the collateral at request time, in whole tokens
    pub collateral_value: u128,
    pub deadline: DateTime<Utc>,

    // timing
    pub requested_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,

    // terminal flags
    pub cancelled: bool,
    /// covers repay, claim and liquidation alike
    pub paid: bool,
}

impl Loan {
    pub fn is_accepted(&self) -> bool {
        self.lender.is_some()
    }

    pub fn status(&self) -> LoanStatus {
        if self.cancelled {
            LoanStatus::Cancelled
        } else if self.paid {
            LoanStatus::Closed
        } else if self.is_accepted() {
            LoanStatus::Active
        } else {
            LoanStatus::Requested
        }
    }

    /// start + duration; None until accepted
    pub fn maturity(&self) -> Option<DateTime<Utc>> {
        self.start_time
            .map(|start| start + Duration::seconds(self.duration_secs as i64))
    }

    /// maturity + the live grace period
    pub fn grace_deadline(&self, grace_period_secs: u64) -> Option<DateTime<Utc>> {
        self.maturity()
            .map(|m| m + Duration::seconds(grace_period_secs as i64))
    }

    /// grace deadline + the live lender-exclusive window
    pub fn exclusive_deadline(
        &self,
        grace_period_secs: u64,
        exclusive_window_secs: u64,
    ) -> Option<DateTime<Utc>> {
        self.grace_deadline(grace_period_secs)
            .map(|g| g + Duration::seconds(exclusive_window_secs as i64))
    }

    /// whole seconds since acceptance, saturating at zero
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        self.start_time
            .map(|start| (now - start).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    pub fn ensure_unpaid(&self) -> Result<()> {
        if self.paid {
            return Err(LendingError::LoanAlreadyPaid { id: self.id });
        }
        Ok(())
    }

    pub fn ensure_accepted(&self) -> Result<&Address> {
        self.lender
            .as_ref()
            .ok_or(LendingError::LoanNotAccepted { id: self.id })
    }

    pub fn ensure_unaccepted(&self) -> Result<()> {
        if self.is_accepted() {
            return Err(LendingError::LoanAlreadyAccepted { id: self.id });
        }
        Ok(())
    }

    pub fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancelled {
            return Err(LendingError::LoanCancelled { id: self.id });
        }
        Ok(())
    }
}
