use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{LendingError, Result};
use crate::types::Address;
use crate::units::Amount;

/// fallback accounting for failed lender payouts: per-token, per-recipient
/// credits that accumulate until withdrawn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StuckFundsLedger {
    credits: HashMap<Address, HashMap<Address, Amount>>,
}

impl StuckFundsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// record an undelivered payout
    pub fn credit(&mut self, token: Address, recipient: Address, amount: Amount) {
        let entry = self
            .credits
            .entry(token)
            .or_default()
            .entry(recipient)
            .or_insert(Amount::ZERO);
        *entry += amount;
    }

    pub fn balance(&self, token: &Address, recipient: &Address) -> Amount {
        self.credits
            .get(token)
            .and_then(|per_token| per_token.get(recipient))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// drain the credit for (token, recipient); errors if nothing is owed
    pub fn take(&mut self, token: &Address, recipient: &Address) -> Result<Amount> {
        let amount = self
            .credits
            .get_mut(token)
            .and_then(|per_token| per_token.remove(recipient))
            .unwrap_or(Amount::ZERO);

        if amount.is_zero() {
            return Err(LendingError::NothingToWithdraw {
                token: token.clone(),
                recipient: recipient.clone(),
            });
        }
        Ok(amount)
    }
}
