/// json reporting views for off-chain reconciliation
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::loan::Loan;
use crate::registry::{LoanRegistry, RegistryTotals};
use crate::types::{Address, LoanId, LoanStatus};
use crate::units::{Amount, Bps};

/// serializable view of a single loan record
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanView {
    pub id: LoanId,
    pub status: LoanStatus,
    pub borrower: Address,
    pub lender: Option<Address>,
    pub terms: TermsView,
    pub timing: TimingView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TermsView {
    pub token: Address,
    pub amount: Amount,
    pub collateral: String,
    pub collateral_value: u128,
    pub duration_secs: u64,
    pub apr_bps: Bps,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimingView {
    pub requested_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub maturity: Option<DateTime<Utc>>,
}

impl LoanView {
    pub fn from_loan(loan: &Loan) -> Self {
        LoanView {
            id: loan.id,
            status: loan.status(),
            borrower: loan.borrower.clone(),
            lender: loan.lender.clone(),
            terms: TermsView {
                token: loan.token.clone(),
                amount: loan.amount,
                collateral: loan.collateral.to_string(),
                collateral_value: loan.collateral_value,
                duration_secs: loan.duration_secs,
                apr_bps: loan.apr_bps,
            },
            timing: TimingView {
                requested_at: loan.requested_at,
                deadline: loan.deadline,
                start_time: loan.start_time,
                maturity: loan.maturity(),
            },
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// serializable summary of the whole book
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistryView {
    pub address: Address,
    pub treasury: Address,
    pub loan_count: usize,
    pub totals: RegistryTotals,
    pub loans: Vec<LoanView>,
}

impl RegistryView {
    pub fn from_registry(registry: &LoanRegistry) -> Self {
        RegistryView {
            address: registry.address().clone(),
            treasury: registry.config().treasury.clone(),
            loan_count: registry.loan_count(),
            totals: registry.totals().clone(),
            loans: registry.loans().map(LoanView::from_loan).collect(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::types::NftId;

    fn sample_loan() -> Loan {
        Loan {
            id: 9,
            borrower: Address::from("alice"),
            lender: Some(Address::from("bob")),
            token: Address::from("usd"),
            amount: Amount::from_whole(500, 6),
            collateral: NftId::new(Address::from("apes"), 42),
            duration_secs: 86_400,
            apr_bps: Bps::new(900),
            collateral_value: 2_000,
            deadline: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            requested_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            start_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap()),
            cancelled: false,
            paid: false,
        }
    }

    #[test]
    fn test_loan_view_round_trips_through_json() {
        let view = LoanView::from_loan(&sample_loan());
        let json = view.to_json_pretty().unwrap();

        assert!(json.contains("\"apes#42\""));
        let back: LoanView = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 9);
        assert_eq!(back.status, LoanStatus::Active);
        assert_eq!(back.terms.amount, Amount::from_whole(500, 6));
    }

    #[test]
    fn test_view_derives_maturity() {
        let view = LoanView::from_loan(&sample_loan());
        assert_eq!(
            view.timing.maturity,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap())
        );
    }
}
