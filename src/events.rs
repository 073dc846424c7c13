use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Address, LoanId, NftId};
use crate::units::{Amount, Bps};

/// all records emitted by the loan registry, one per state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // loan lifecycle
    LoanRequested {
        id: LoanId,
        borrower: Address,
        token: Address,
        amount: Amount,
        collateral: NftId,
        /// oracle price snapshot in whole tokens
        collateral_value: u128,
        duration_secs: u64,
        apr_bps: Bps,
        deadline: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    LoanCancelled {
        id: LoanId,
        borrower: Address,
        timestamp: DateTime<Utc>,
    },
    LoanAccepted {
        id: LoanId,
        lender: Address,
        amount: Amount,
        start_time: DateTime<Utc>,
    },
    LoanRepaid {
        id: LoanId,
        payer: Address,
        lender_payable: Amount,
        platform_share: Amount,
        grace_fee: Amount,
        total_payable: Amount,
        timestamp: DateTime<Utc>,
    },
    CollateralClaimed {
        id: LoanId,
        lender: Address,
        collateral: NftId,
        timestamp: DateTime<Utc>,
    },
    LoanLiquidated {
        id: LoanId,
        liquidator: Address,
        lender_payable: Amount,
        platform_share: Amount,
        total_payable: Amount,
        timestamp: DateTime<Utc>,
    },

    // stuck-funds ledger
    StuckTokenCredited {
        token: Address,
        recipient: Address,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },
    StuckTokenWithdrawn {
        token: Address,
        recipient: Address,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },

    // governance
    TreasuryChanged {
        old_treasury: Address,
        new_treasury: Address,
        timestamp: DateTime<Utc>,
    },
    ParameterChanged {
        name: String,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting records during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
