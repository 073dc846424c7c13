use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::collateral::Valuation;
use crate::errors::{LendingError, Result};
use crate::types::{Address, NftId};
use crate::units::Amount;

/// price valuation oracle consumed by the registry
pub trait PriceOracle {
    /// current quote for a single nft
    fn get_valuation(&self, nft: &NftId) -> Result<Valuation>;
}

/// address allow-list gate consulted by every user-facing entry point
pub trait AddressAllowList {
    fn is_address_allowed(&self, address: &Address) -> bool;
}

/// fungible-token ledger with standard balance/allowance transfer semantics,
/// keyed by token contract address
pub trait FungibleToken {
    fn decimals(&self, token: &Address) -> Result<u32>;

    fn balance_of(&self, token: &Address, owner: &Address) -> Amount;

    fn transfer_from(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<()>;
}

/// non-fungible-token custody, keyed by collection address and token id
pub trait NonFungibleToken {
    /// whether the collection exposes the expected nft capability
    fn supports_collection(&self, collection: &Address) -> bool;

    fn owner_of(&self, nft: &NftId) -> Option<Address>;

    fn transfer_from(&mut self, nft: &NftId, from: &Address, to: &Address) -> Result<()>;
}

#[derive(Debug, Default)]
struct TokenBankState {
    decimals: HashMap<Address, u32>,
    balances: HashMap<(Address, Address), Amount>,
    blocked_recipients: HashSet<Address>,
}

/// in-memory fungible-token bank for tests and demos; recipients can be
/// blocked to simulate token-side transfer restrictions
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenBank {
    state: Rc<RefCell<TokenBankState>>,
}

impl MemoryTokenBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_token(&self, token: Address, decimals: u32) {
        self.state.borrow_mut().decimals.insert(token, decimals);
    }

    pub fn mint(&self, token: &Address, owner: &Address, amount: Amount) {
        let mut state = self.state.borrow_mut();
        let entry = state
            .balances
            .entry((token.clone(), owner.clone()))
            .or_insert(Amount::ZERO);
        *entry += amount;
    }

    pub fn block_recipient(&self, recipient: Address) {
        self.state.borrow_mut().blocked_recipients.insert(recipient);
    }

    pub fn unblock_recipient(&self, recipient: &Address) {
        self.state.borrow_mut().blocked_recipients.remove(recipient);
    }

    pub fn balance(&self, token: &Address, owner: &Address) -> Amount {
        self.state
            .borrow()
            .balances
            .get(&(token.clone(), owner.clone()))
            .copied()
            .unwrap_or(Amount::ZERO)
    }
}

impl FungibleToken for MemoryTokenBank {
    fn decimals(&self, token: &Address) -> Result<u32> {
        self.state
            .borrow()
            .decimals
            .get(token)
            .copied()
            .ok_or_else(|| LendingError::TokenNotAllowed {
                token: token.clone(),
            })
    }

    fn balance_of(&self, token: &Address, owner: &Address) -> Amount {
        self.balance(token, owner)
    }

    fn transfer_from(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();

        if state.blocked_recipients.contains(to) {
            return Err(LendingError::TransferFailed {
                token: token.clone(),
                from: from.clone(),
                to: to.clone(),
                amount,
                reason: "recipient blocked".to_string(),
            });
        }

        let from_key = (token.clone(), from.clone());
        let available = state
            .balances
            .get(&from_key)
            .copied()
            .unwrap_or(Amount::ZERO);
        if available < amount {
            return Err(LendingError::TransferFailed {
                token: token.clone(),
                from: from.clone(),
                to: to.clone(),
                amount,
                reason: "insufficient balance".to_string(),
            });
        }

        state.balances.insert(from_key, available - amount);
        let to_entry = state
            .balances
            .entry((token.clone(), to.clone()))
            .or_insert(Amount::ZERO);
        *to_entry += amount;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct NftLedgerState {
    collections: HashSet<Address>,
    owners: HashMap<NftId, Address>,
}

/// in-memory nft custody ledger for tests and demos
#[derive(Debug, Clone, Default)]
pub struct MemoryNftLedger {
    state: Rc<RefCell<NftLedgerState>>,
}

impl MemoryNftLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_collection(&self, collection: Address) {
        self.state.borrow_mut().collections.insert(collection);
    }

    pub fn mint(&self, nft: NftId, owner: Address) {
        self.state.borrow_mut().owners.insert(nft, owner);
    }

    pub fn owner(&self, nft: &NftId) -> Option<Address> {
        self.state.borrow().owners.get(nft).cloned()
    }
}

impl NonFungibleToken for MemoryNftLedger {
    fn supports_collection(&self, collection: &Address) -> bool {
        self.state.borrow().collections.contains(collection)
    }

    fn owner_of(&self, nft: &NftId) -> Option<Address> {
        self.owner(nft)
    }

    fn transfer_from(&mut self, nft: &NftId, from: &Address, to: &Address) -> Result<()> {
        let mut state = self.state.borrow_mut();
        match state.owners.get(nft) {
            Some(owner) if owner == from => {
                state.owners.insert(nft.clone(), to.clone());
                Ok(())
            }
            Some(owner) => Err(LendingError::NftTransferFailed {
                nft: nft.clone(),
                from: from.clone(),
                to: to.clone(),
                reason: format!("held by {}", owner),
            }),
            None => Err(LendingError::NftTransferFailed {
                nft: nft.clone(),
                from: from.clone(),
                to: to.clone(),
                reason: "unknown token".to_string(),
            }),
        }
    }
}

/// mock oracle serving fixed quotes set by the test
#[derive(Debug, Clone, Default)]
pub struct MockOracle {
    quotes: Rc<RefCell<HashMap<NftId, Valuation>>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_valuation(&self, nft: NftId, valuation: Valuation) {
        self.quotes.borrow_mut().insert(nft, valuation);
    }
}

impl PriceOracle for MockOracle {
    fn get_valuation(&self, nft: &NftId) -> Result<Valuation> {
        self.quotes
            .borrow()
            .get(nft)
            .copied()
            .ok_or_else(|| LendingError::ValuationUnavailable { nft: nft.clone() })
    }
}

/// in-memory allow-list
#[derive(Debug, Clone, Default)]
pub struct MemoryAllowList {
    allowed: Rc<RefCell<HashSet<Address>>>,
}

impl MemoryAllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&self, address: Address) {
        self.allowed.borrow_mut().insert(address);
    }

    pub fn revoke(&self, address: &Address) {
        self.allowed.borrow_mut().remove(address);
    }
}

impl AddressAllowList for MemoryAllowList {
    fn is_address_allowed(&self, address: &Address) -> bool {
        self.allowed.borrow().contains(address)
    }
}
