use serde::{Deserialize, Serialize};
use std::fmt;

/// unique identifier for a loan, assigned monotonically and never reused
pub type LoanId = u64;

/// opaque account identifier for borrowers, lenders, tokens and contracts
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(id: impl Into<String>) -> Self {
        Address(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(id: &str) -> Self {
        Address(id.to_string())
    }
}

/// loan status derived from the persisted flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// requested, awaiting a lender
    Requested,
    /// cancelled by the borrower before acceptance
    Cancelled,
    /// principal disbursed, collateral in escrow
    Active,
    /// settled by repayment, claim or liquidation
    Closed,
}

/// a single non-fungible token, identified by collection and token id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NftId {
    pub collection: Address,
    pub token_id: u64,
}

impl NftId {
    pub fn new(collection: Address, token_id: u64) -> Self {
        Self {
            collection,
            token_id,
        }
    }
}

impl fmt::Display for NftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.collection, self.token_id)
    }
}
