use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::access::{AccessControl, Role};
use crate::collateral::check_borrowable;
use crate::config::ProtocolConfig;
use crate::errors::{LendingError, Result};
use crate::events::{Event, EventStore};
use crate::external::{AddressAllowList, FungibleToken, NonFungibleToken, PriceOracle};
use crate::interest::{grace_fee, liquidation_fee, repayment_breakdown};
use crate::loan::Loan;
use crate::recovery::StuckFundsLedger;
use crate::types::{Address, LoanId, NftId};
use crate::units::{Amount, Bps};

/// lifetime counters kept for reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryTotals {
    pub loans_requested: u64,
    pub loans_cancelled: u64,
    pub loans_accepted: u64,
    pub loans_repaid: u64,
    pub collaterals_claimed: u64,
    pub loans_liquidated: u64,
    /// platform fees routed to the treasury, per token
    pub fees_collected: HashMap<Address, Amount>,
}

/// central loan registry: owns the loan records, orchestrates lifecycle
/// transitions, invokes the fee engine and valuation gate, and triggers
/// token/nft transfers through the collaborator traits.
pub struct LoanRegistry {
    /// the registry's own account, used as collateral escrow and as the
    /// custodian of stuck funds
    address: Address,
    loans: BTreeMap<LoanId, Loan>,
    next_id: LoanId,
    config: ProtocolConfig,
    access: AccessControl,
    stuck: StuckFundsLedger,
    events: EventStore,
    totals: RegistryTotals,
    entered: bool,
    fungible: Box<dyn FungibleToken>,
    nft: Box<dyn NonFungibleToken>,
    oracle: Box<dyn PriceOracle>,
    allow_list: Box<dyn AddressAllowList>,
}

impl LoanRegistry {
    pub fn new(
        address: Address,
        admin: Address,
        treasury: Address,
        fungible: Box<dyn FungibleToken>,
        nft: Box<dyn NonFungibleToken>,
        oracle: Box<dyn PriceOracle>,
        allow_list: Box<dyn AddressAllowList>,
    ) -> Self {
        Self {
            address,
            loans: BTreeMap::new(),
            next_id: 1,
            config: ProtocolConfig::new(treasury),
            access: AccessControl::new(admin),
            stuck: StuckFundsLedger::new(),
            events: EventStore::new(),
            totals: RegistryTotals::default(),
            entered: false,
            fungible,
            nft,
            oracle,
            allow_list,
        }
    }

    // ---- loan lifecycle ----

    /// open a loan request; snapshots the apr and the collateral valuation,
    /// moves no funds
    pub fn request_loan(
        &mut self,
        caller: &Address,
        token: Address,
        amount: Amount,
        collateral: NftId,
        duration_secs: u64,
        deadline: DateTime<Utc>,
        time: &SafeTimeProvider,
    ) -> Result<LoanId> {
        self.non_reentrant(|this| {
            this.do_request_loan(caller, token, amount, collateral, duration_secs, deadline, time)
        })
    }

    /// withdraw a not-yet-accepted request; borrower only, once
    pub fn cancel_loan(
        &mut self,
        caller: &Address,
        id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        self.non_reentrant(|this| this.do_cancel_loan(caller, id, time))
    }

    /// fund a request: disburses principal to the borrower and takes the
    /// collateral into escrow
    pub fn accept_loan(
        &mut self,
        caller: &Address,
        id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        self.non_reentrant(|this| this.do_accept_loan(caller, id, time))
    }

    /// settle the loan: pays the lender and the treasury from the caller and
    /// returns the collateral to the borrower
    pub fn repay_loan(
        &mut self,
        caller: &Address,
        id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        self.non_reentrant(|this| this.do_repay_loan(caller, id, time))
    }

    /// lender takes the collateral of a defaulted loan, forgoing repayment
    pub fn claim_nft(
        &mut self,
        caller: &Address,
        id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        self.non_reentrant(|this| this.do_claim_nft(caller, id, time))
    }

    /// third party settles a defaulted loan after the lender-exclusive
    /// window and takes the collateral
    pub fn liquidate_loan(
        &mut self,
        caller: &Address,
        id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        self.non_reentrant(|this| this.do_liquidate_loan(caller, id, time))
    }

    /// withdraw the caller's accumulated stuck-funds credit for a token
    pub fn withdraw_stuck_token(
        &mut self,
        caller: &Address,
        token: &Address,
        time: &SafeTimeProvider,
    ) -> Result<Amount> {
        self.non_reentrant(|this| this.do_withdraw_stuck_token(caller, token, time))
    }

    fn do_request_loan(
        &mut self,
        caller: &Address,
        token: Address,
        amount: Amount,
        collateral: NftId,
        duration_secs: u64,
        deadline: DateTime<Utc>,
        time: &SafeTimeProvider,
    ) -> Result<LoanId> {
        let now = time.now();

        self.require_allow_listed(caller)?;
        if !self.config.is_token_allowed(&token) {
            return Err(LendingError::TokenNotAllowed { token });
        }
        let apr_bps = self
            .config
            .apr_for_duration(duration_secs)
            .ok_or(LendingError::UnsupportedDuration { duration_secs })?;
        if amount.is_zero() {
            return Err(LendingError::ZeroAmount);
        }
        if deadline <= now {
            return Err(LendingError::DeadlineInPast { deadline });
        }
        if !self.nft.supports_collection(&collateral.collection) {
            return Err(LendingError::UnsupportedCollateral {
                collection: collateral.collection,
            });
        }
        if self.config.is_collateral_disallowed(&collateral) {
            return Err(LendingError::CollateralDisallowed { nft: collateral });
        }

        let valuation = self.oracle.get_valuation(&collateral)?;
        let decimals = self.fungible.decimals(&token)?;
        check_borrowable(&valuation, amount, decimals, now)?;

        let id = self.next_id;
        self.next_id += 1;

        let loan = Loan {
            id,
            borrower: caller.clone(),
            lender: None,
            token: token.clone(),
            amount,
            collateral: collateral.clone(),
            duration_secs,
            apr_bps,
            collateral_value: valuation.price,
            deadline,
            requested_at: now,
            start_time: None,
            cancelled: false,
            paid: false,
        };
        self.loans.insert(id, loan);
        self.totals.loans_requested += 1;

        self.events.emit(Event::LoanRequested {
            id,
            borrower: caller.clone(),
            token,
            amount,
            collateral,
            collateral_value: valuation.price,
            duration_secs,
            apr_bps,
            deadline,
            timestamp: now,
        });

        Ok(id)
    }

    fn do_cancel_loan(
        &mut self,
        caller: &Address,
        id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        let now = time.now();

        let loan = self.loan_or_err(id)?;
        if &loan.borrower != caller {
            return Err(LendingError::NotBorrower {
                id,
                caller: caller.clone(),
            });
        }
        loan.ensure_unaccepted()?;
        loan.ensure_not_cancelled()?;

        let loan = self.loans.get_mut(&id).ok_or(LendingError::LoanNotFound { id })?;
        loan.cancelled = true;
        self.totals.loans_cancelled += 1;

        self.events.emit(Event::LoanCancelled {
            id,
            borrower: caller.clone(),
            timestamp: now,
        });

        Ok(())
    }

    fn do_accept_loan(
        &mut self,
        caller: &Address,
        id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        let now = time.now();

        self.require_allow_listed(caller)?;
        let loan = self.loan_or_err(id)?.clone();
        loan.ensure_not_cancelled()?;
        loan.ensure_unaccepted()?;
        if now > loan.deadline {
            return Err(LendingError::AcceptanceDeadlinePassed {
                id,
                deadline: loan.deadline,
                now,
            });
        }
        if !self.config.is_token_allowed(&loan.token) {
            return Err(LendingError::TokenNotAllowed {
                token: loan.token.clone(),
            });
        }
        if self.config.is_collateral_disallowed(&loan.collateral) {
            return Err(LendingError::CollateralDisallowed {
                nft: loan.collateral.clone(),
            });
        }

        // re-check against a live quote: the lender is not bound by the
        // borrower's first-look snapshot
        let valuation = self.oracle.get_valuation(&loan.collateral)?;
        let decimals = self.fungible.decimals(&loan.token)?;
        check_borrowable(&valuation, loan.amount, decimals, now)?;

        // the borrower must still hold the pledged collateral
        match self.nft.owner_of(&loan.collateral) {
            Some(owner) if owner == loan.borrower => {}
            owner => {
                return Err(LendingError::NftTransferFailed {
                    nft: loan.collateral.clone(),
                    from: loan.borrower.clone(),
                    to: self.address.clone(),
                    reason: match owner {
                        Some(holder) => format!("held by {}", holder),
                        None => "unknown token".to_string(),
                    },
                })
            }
        }

        let escrow = self.address.clone();
        self.fungible
            .transfer_from(&loan.token, caller, &loan.borrower, loan.amount)?;
        self.nft
            .transfer_from(&loan.collateral, &loan.borrower, &escrow)?;

        let stored = self.loans.get_mut(&id).ok_or(LendingError::LoanNotFound { id })?;
        stored.lender = Some(caller.clone());
        stored.start_time = Some(now);
        self.totals.loans_accepted += 1;

        self.events.emit(Event::LoanAccepted {
            id,
            lender: caller.clone(),
            amount: loan.amount,
            start_time: now,
        });

        Ok(())
    }

    fn do_repay_loan(
        &mut self,
        caller: &Address,
        id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        let now = time.now();

        let loan = self.loan_or_err(id)?.clone();
        let lender = loan.ensure_accepted()?.clone();
        loan.ensure_unpaid()?;

        let grace_period = self.config.repay_grace_period_secs;
        let maturity = loan.maturity().ok_or(LendingError::LoanNotAccepted { id })?;
        let grace_deadline = loan
            .grace_deadline(grace_period)
            .ok_or(LendingError::LoanNotAccepted { id })?;
        if now >= grace_deadline {
            return Err(LendingError::GracePeriodOver { id, grace_deadline });
        }

        let decimals = self.fungible.decimals(&loan.token)?;
        let breakdown = repayment_breakdown(
            loan.amount,
            loan.apr_bps,
            &self.config,
            decimals,
            loan.duration_secs,
            loan.elapsed_secs(now),
        );

        let lender_payable = breakdown.lender_payable;
        let late_fee = if now > maturity {
            grace_fee(lender_payable, &self.config)
        } else {
            Amount::ZERO
        };
        let platform_share = breakdown.platform_share() + late_fee;
        let total_payable = lender_payable + platform_share;

        let available = self.fungible.balance_of(&loan.token, caller);
        if available < total_payable {
            return Err(LendingError::InsufficientFunds {
                available,
                requested: total_payable,
            });
        }

        // lender payout runs on the recoverable path: a receiving-side fault
        // must not block the borrower from settling
        let escrow = self.address.clone();
        if let Err(_payout_fault) =
            self.fungible
                .transfer_from(&loan.token, caller, &lender, lender_payable)
        {
            self.fungible
                .transfer_from(&loan.token, caller, &escrow, lender_payable)?;
            self.stuck
                .credit(loan.token.clone(), lender.clone(), lender_payable);
            self.events.emit(Event::StuckTokenCredited {
                token: loan.token.clone(),
                recipient: lender.clone(),
                amount: lender_payable,
                timestamp: now,
            });
        }

        let treasury = self.config.treasury.clone();
        if !platform_share.is_zero() {
            self.fungible
                .transfer_from(&loan.token, caller, &treasury, platform_share)?;
        }
        self.nft
            .transfer_from(&loan.collateral, &escrow, &loan.borrower)?;

        let stored = self.loans.get_mut(&id).ok_or(LendingError::LoanNotFound { id })?;
        stored.paid = true;
        self.totals.loans_repaid += 1;
        self.record_fees(&loan.token, platform_share);

        self.events.emit(Event::LoanRepaid {
            id,
            payer: caller.clone(),
            lender_payable,
            platform_share,
            grace_fee: late_fee,
            total_payable,
            timestamp: now,
        });

        Ok(())
    }

    fn do_claim_nft(
        &mut self,
        caller: &Address,
        id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        let now = time.now();

        let loan = self.loan_or_err(id)?.clone();
        let lender = loan.ensure_accepted()?.clone();
        loan.ensure_unpaid()?;
        if &lender != caller {
            return Err(LendingError::NotLender {
                id,
                caller: caller.clone(),
            });
        }

        let grace_deadline = loan
            .grace_deadline(self.config.repay_grace_period_secs)
            .ok_or(LendingError::LoanNotAccepted { id })?;
        if now <= grace_deadline {
            return Err(LendingError::GracePeriodNotOver { id, grace_deadline });
        }

        let escrow = self.address.clone();
        self.nft.transfer_from(&loan.collateral, &escrow, &lender)?;

        let stored = self.loans.get_mut(&id).ok_or(LendingError::LoanNotFound { id })?;
        stored.paid = true;
        self.totals.collaterals_claimed += 1;

        self.events.emit(Event::CollateralClaimed {
            id,
            lender,
            collateral: loan.collateral,
            timestamp: now,
        });

        Ok(())
    }

    fn do_liquidate_loan(
        &mut self,
        caller: &Address,
        id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        let now = time.now();

        let loan = self.loan_or_err(id)?.clone();
        let lender = loan.ensure_accepted()?.clone();
        loan.ensure_unpaid()?;

        let open_at = loan
            .exclusive_deadline(
                self.config.repay_grace_period_secs,
                self.config.exclusive_window_secs,
            )
            .ok_or(LendingError::LoanNotAccepted { id })?;
        if now <= open_at {
            return Err(LendingError::ExclusiveWindowActive { id, open_at });
        }

        let decimals = self.fungible.decimals(&loan.token)?;
        let breakdown = repayment_breakdown(
            loan.amount,
            loan.apr_bps,
            &self.config,
            decimals,
            loan.duration_secs,
            loan.elapsed_secs(now),
        );
        let lender_payable = breakdown.lender_payable;
        let platform_share = breakdown.platform_share() + liquidation_fee(loan.amount, &self.config);
        let total_payable = lender_payable + platform_share;

        let available = self.fungible.balance_of(&loan.token, caller);
        if available < total_payable {
            return Err(LendingError::InsufficientFunds {
                available,
                requested: total_payable,
            });
        }

        let escrow = self.address.clone();
        let treasury = self.config.treasury.clone();
        self.fungible
            .transfer_from(&loan.token, caller, &lender, lender_payable)?;
        self.fungible
            .transfer_from(&loan.token, caller, &treasury, platform_share)?;
        self.nft.transfer_from(&loan.collateral, &escrow, caller)?;

        let stored = self.loans.get_mut(&id).ok_or(LendingError::LoanNotFound { id })?;
        stored.paid = true;
        self.totals.loans_liquidated += 1;
        self.record_fees(&loan.token, platform_share);

        self.events.emit(Event::LoanLiquidated {
            id,
            liquidator: caller.clone(),
            lender_payable,
            platform_share,
            total_payable,
            timestamp: now,
        });

        Ok(())
    }

    fn do_withdraw_stuck_token(
        &mut self,
        caller: &Address,
        token: &Address,
        time: &SafeTimeProvider,
    ) -> Result<Amount> {
        let now = time.now();

        let amount = self.stuck.balance(token, caller);
        if amount.is_zero() {
            return Err(LendingError::NothingToWithdraw {
                token: token.clone(),
                recipient: caller.clone(),
            });
        }

        let escrow = self.address.clone();
        self.fungible.transfer_from(token, &escrow, caller, amount)?;
        self.stuck.take(token, caller)?;

        self.events.emit(Event::StuckTokenWithdrawn {
            token: token.clone(),
            recipient: caller.clone(),
            amount,
            timestamp: now,
        });

        Ok(amount)
    }

    // ---- governance ----

    pub fn set_protocol_fee(&mut self, caller: &Address, fee_bps: Bps, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.set_protocol_fee(fee_bps)?;
        self.note_parameter_change("protocol_fee", time);
        Ok(())
    }

    pub fn set_repay_grace_period(&mut self, caller: &Address, secs: u64, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.set_repay_grace_period(secs)?;
        self.note_parameter_change("repay_grace_period", time);
        Ok(())
    }

    pub fn set_repay_grace_fee(&mut self, caller: &Address, fee_bps: Bps, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.set_repay_grace_fee(fee_bps)?;
        self.note_parameter_change("repay_grace_fee", time);
        Ok(())
    }

    pub fn set_liquidation_fee(&mut self, caller: &Address, fee_bps: Bps, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.set_liquidation_fee(fee_bps)?;
        self.note_parameter_change("liquidation_fee", time);
        Ok(())
    }

    pub fn set_base_origination_fee(&mut self, caller: &Address, fee_bps: Bps, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.set_base_origination_fee(fee_bps)?;
        self.note_parameter_change("base_origination_fee", time);
        Ok(())
    }

    pub fn set_origination_brackets(&mut self, caller: &Address, brackets: Vec<u128>, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.set_origination_brackets(brackets)?;
        self.note_parameter_change("origination_brackets", time);
        Ok(())
    }

    pub fn set_fee_reduction_factor(&mut self, caller: &Address, factor: u64, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.set_fee_reduction_factor(factor)?;
        self.note_parameter_change("fee_reduction_factor", time);
        Ok(())
    }

    pub fn set_exclusive_window(&mut self, caller: &Address, secs: u64, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.set_exclusive_window(secs)?;
        self.note_parameter_change("exclusive_window", time);
        Ok(())
    }

    pub fn set_apr_for_duration(&mut self, caller: &Address, duration_secs: u64, apr_bps: Bps, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.set_apr_for_duration(duration_secs, apr_bps)?;
        self.note_parameter_change("apr_table", time);
        Ok(())
    }

    pub fn remove_apr_for_duration(&mut self, caller: &Address, duration_secs: u64, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.remove_apr_for_duration(duration_secs);
        self.note_parameter_change("apr_table", time);
        Ok(())
    }

    pub fn allow_token(&mut self, caller: &Address, token: Address, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.allow_token(token);
        self.note_parameter_change("allowed_tokens", time);
        Ok(())
    }

    pub fn disallow_token(&mut self, caller: &Address, token: &Address, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.disallow_token(token);
        self.note_parameter_change("allowed_tokens", time);
        Ok(())
    }

    pub fn disallow_collateral(&mut self, caller: &Address, nft: NftId, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.disallow_collateral(nft);
        self.note_parameter_change("disallowed_collateral", time);
        Ok(())
    }

    pub fn reallow_collateral(&mut self, caller: &Address, nft: &NftId, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.config.reallow_collateral(nft);
        self.note_parameter_change("disallowed_collateral", time);
        Ok(())
    }

    /// treasury changes sit behind the narrower treasury role
    pub fn set_treasury(&mut self, caller: &Address, treasury: Address, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Treasury, caller)?;
        let old_treasury = std::mem::replace(&mut self.config.treasury, treasury.clone());
        self.events.emit(Event::TreasuryChanged {
            old_treasury,
            new_treasury: treasury,
            timestamp: time.now(),
        });
        Ok(())
    }

    pub fn set_price_oracle(&mut self, caller: &Address, oracle: Box<dyn PriceOracle>, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.oracle = oracle;
        self.note_parameter_change("price_oracle", time);
        Ok(())
    }

    pub fn set_allow_list(&mut self, caller: &Address, allow_list: Box<dyn AddressAllowList>, time: &SafeTimeProvider) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.allow_list = allow_list;
        self.note_parameter_change("allow_list", time);
        Ok(())
    }

    pub fn grant_role(&mut self, caller: &Address, role: Role, who: Address) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.access.grant(role, who);
        Ok(())
    }

    pub fn revoke_role(&mut self, caller: &Address, role: Role, who: &Address) -> Result<()> {
        self.access.require_role(Role::Admin, caller)?;
        self.access.revoke(role, who);
        Ok(())
    }

    // ---- read accessors ----

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn loan(&self, id: LoanId) -> Option<&Loan> {
        self.loans.get(&id)
    }

    pub fn loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values()
    }

    pub fn loan_count(&self) -> usize {
        self.loans.len()
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn totals(&self) -> &RegistryTotals {
        &self.totals
    }

    pub fn stuck_balance(&self, token: &Address, recipient: &Address) -> Amount {
        self.stuck.balance(token, recipient)
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }

    // ---- internals ----

    fn non_reentrant<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.entered {
            return Err(LendingError::ReentrantCall);
        }
        self.entered = true;
        let result = f(self);
        self.entered = false;
        result
    }

    fn require_allow_listed(&self, caller: &Address) -> Result<()> {
        if !self.allow_list.is_address_allowed(caller) {
            return Err(LendingError::AddressNotAllowListed {
                address: caller.clone(),
            });
        }
        Ok(())
    }

    fn loan_or_err(&self, id: LoanId) -> Result<&Loan> {
        self.loans.get(&id).ok_or(LendingError::LoanNotFound { id })
    }

    fn record_fees(&mut self, token: &Address, amount: Amount) {
        if amount.is_zero() {
            return;
        }
        let entry = self
            .totals
            .fees_collected
            .entry(token.clone())
            .or_insert(Amount::ZERO);
        *entry += amount;
    }

    fn note_parameter_change(&mut self, name: &str, time: &SafeTimeProvider) {
        self.events.emit(Event::ParameterChanged {
            name: name.to_string(),
            timestamp: time.now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use hourglass_rs::TimeSource;

    use crate::collateral::Valuation;
    use crate::external::{MemoryAllowList, MemoryNftLedger, MemoryTokenBank, MockOracle};
    use crate::types::LoanStatus;

    const DAY: u64 = 86_400;
    const TERM: u64 = 540 * DAY;

    fn addr(s: &str) -> Address {
        Address::from(s)
    }

    struct Harness {
        registry: LoanRegistry,
        bank: MemoryTokenBank,
        nfts: MemoryNftLedger,
        oracle: MockOracle,
        allow_list: MemoryAllowList,
        time: SafeTimeProvider,
        usd: Address,
        nft: NftId,
    }

    fn setup() -> Harness {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let time = SafeTimeProvider::new(TimeSource::Test(t0));

        let bank = MemoryTokenBank::new();
        let usd = addr("usd");
        bank.register_token(usd.clone(), 6);
        bank.mint(&usd, &addr("alice"), Amount::from_whole(30_000, 6));
        bank.mint(&usd, &addr("bob"), Amount::from_whole(200_000, 6));
        bank.mint(&usd, &addr("carol"), Amount::from_whole(200_000, 6));

        let nfts = MemoryNftLedger::new();
        let apes = addr("apes");
        nfts.register_collection(apes.clone());
        let nft = NftId::new(apes, 7);
        nfts.mint(nft.clone(), addr("alice"));

        let oracle = MockOracle::new();
        oracle.set_valuation(
            nft.clone(),
            Valuation {
                timestamp: t0,
                price: 250_000,
                ltv: 50,
            },
        );

        let allow_list = MemoryAllowList::new();
        for who in ["alice", "bob", "carol"] {
            allow_list.allow(addr(who));
        }

        let mut registry = LoanRegistry::new(
            addr("registry"),
            addr("admin"),
            addr("treasury"),
            Box::new(bank.clone()),
            Box::new(nfts.clone()),
            Box::new(oracle.clone()),
            Box::new(allow_list.clone()),
        );
        registry.allow_token(&addr("admin"), usd.clone(), &time).unwrap();
        registry
            .set_apr_for_duration(&addr("admin"), TERM, Bps::new(1_070), &time)
            .unwrap();

        Harness {
            registry,
            bank,
            nfts,
            oracle,
            allow_list,
            time,
            usd,
            nft,
        }
    }

    fn request(h: &mut Harness) -> LoanId {
        let deadline = h.time.now() + Duration::days(3);
        h.registry
            .request_loan(
                &addr("alice"),
                h.usd.clone(),
                Amount::from_whole(100_000, 6),
                h.nft.clone(),
                TERM,
                deadline,
                &h.time,
            )
            .unwrap()
    }

    fn request_and_accept(h: &mut Harness) -> LoanId {
        let id = request(h);
        h.registry.accept_loan(&addr("bob"), id, &h.time).unwrap();
        id
    }

    fn advance(h: &Harness, duration: Duration) {
        h.time.test_control().unwrap().advance(duration);
    }

    #[test]
    fn test_request_snapshots_terms_and_moves_nothing() {
        let mut h = setup();
        let id = request(&mut h);

        let loan = h.registry.loan(id).unwrap();
        assert_eq!(loan.id, 1);
        assert_eq!(loan.borrower, addr("alice"));
        assert_eq!(loan.lender, None);
        assert_eq!(loan.apr_bps, Bps::new(1_070));
        assert_eq!(loan.collateral_value, 250_000);
        assert_eq!(loan.status(), LoanStatus::Requested);

        // no funds or collateral move at request
        assert_eq!(h.bank.balance(&h.usd, &addr("alice")), Amount::from_whole(30_000, 6));
        assert_eq!(h.nfts.owner(&h.nft), Some(addr("alice")));

        let events = h.registry.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::LoanRequested { id: 1, .. })));
    }

    #[test]
    fn test_loan_ids_are_monotonic() {
        let mut h = setup();
        let first = request(&mut h);
        h.registry.cancel_loan(&addr("alice"), first, &h.time).unwrap();
        let second = request(&mut h);
        assert_eq!((first, second), (1, 2));
        assert_eq!(h.registry.loan_count(), 2);
    }

    #[test]
    fn test_request_validation_battery() {
        let mut h = setup();
        let deadline = h.time.now() + Duration::days(3);
        let amount = Amount::from_whole(100_000, 6);

        // not allow-listed
        let err = h
            .registry
            .request_loan(&addr("mallory"), h.usd.clone(), amount, h.nft.clone(), TERM, deadline, &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::AddressNotAllowListed { .. }));

        // token not allow-listed
        let err = h
            .registry
            .request_loan(&addr("alice"), addr("eur"), amount, h.nft.clone(), TERM, deadline, &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::TokenNotAllowed { .. }));

        // no rate for the duration
        let err = h
            .registry
            .request_loan(&addr("alice"), h.usd.clone(), amount, h.nft.clone(), 13 * DAY, deadline, &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::UnsupportedDuration { .. }));

        // zero amount
        let err = h
            .registry
            .request_loan(&addr("alice"), h.usd.clone(), Amount::ZERO, h.nft.clone(), TERM, deadline, &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::ZeroAmount));

        // deadline must be strictly in the future
        let err = h
            .registry
            .request_loan(&addr("alice"), h.usd.clone(), amount, h.nft.clone(), TERM, h.time.now(), &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::DeadlineInPast { .. }));

        // unknown collection
        let stray = NftId::new(addr("penguins"), 1);
        let err = h
            .registry
            .request_loan(&addr("alice"), h.usd.clone(), amount, stray, TERM, deadline, &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::UnsupportedCollateral { .. }));

        // disallowed collateral
        h.registry
            .disallow_collateral(&addr("admin"), h.nft.clone(), &h.time)
            .unwrap();
        let err = h
            .registry
            .request_loan(&addr("alice"), h.usd.clone(), amount, h.nft.clone(), TERM, deadline, &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::CollateralDisallowed { .. }));
        h.registry
            .reallow_collateral(&addr("admin"), &h.nft, &h.time)
            .unwrap();

        // over the borrow ceiling: 250,000 at 50% ltv caps at 125,000
        let err = h
            .registry
            .request_loan(
                &addr("alice"),
                h.usd.clone(),
                Amount::from_whole(125_001, 6),
                h.nft.clone(),
                TERM,
                deadline,
                &h.time,
            )
            .unwrap_err();
        assert!(matches!(err, LendingError::OverMaxBorrow { .. }));

        // stale quote
        h.oracle.set_valuation(
            h.nft.clone(),
            Valuation {
                timestamp: h.time.now() - Duration::seconds(3_601),
                price: 250_000,
                ltv: 50,
            },
        );
        let err = h
            .registry
            .request_loan(&addr("alice"), h.usd.clone(), amount, h.nft.clone(), TERM, deadline, &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::StaleValuation { .. }));

        // nonsense ltv
        h.oracle.set_valuation(
            h.nft.clone(),
            Valuation {
                timestamp: h.time.now(),
                price: 250_000,
                ltv: 101,
            },
        );
        let err = h
            .registry
            .request_loan(&addr("alice"), h.usd.clone(), amount, h.nft.clone(), TERM, deadline, &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::InvalidLtv { ltv: 101 }));

        assert_eq!(h.registry.loan_count(), 0);
    }

    #[test]
    fn test_cancel_only_borrower_only_once_only_before_acceptance() {
        let mut h = setup();
        let id = request(&mut h);

        let err = h.registry.cancel_loan(&addr("bob"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::NotBorrower { .. }));

        h.registry.cancel_loan(&addr("alice"), id, &h.time).unwrap();
        assert_eq!(h.registry.loan(id).unwrap().status(), LoanStatus::Cancelled);

        let err = h.registry.cancel_loan(&addr("alice"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::LoanCancelled { .. }));

        // a cancelled loan cannot be accepted
        let err = h.registry.accept_loan(&addr("bob"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::LoanCancelled { .. }));

        // and an accepted loan cannot be cancelled
        let id = request_and_accept(&mut h);
        let err = h.registry.cancel_loan(&addr("alice"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::LoanAlreadyAccepted { .. }));
    }

    #[test]
    fn test_accept_disburses_and_escrows() {
        let mut h = setup();
        let id = request_and_accept(&mut h);

        let loan = h.registry.loan(id).unwrap();
        assert_eq!(loan.lender, Some(addr("bob")));
        assert_eq!(loan.start_time, Some(h.time.now()));
        assert_eq!(loan.status(), LoanStatus::Active);

        assert_eq!(h.bank.balance(&h.usd, &addr("alice")), Amount::from_whole(130_000, 6));
        assert_eq!(h.bank.balance(&h.usd, &addr("bob")), Amount::from_whole(100_000, 6));
        assert_eq!(h.nfts.owner(&h.nft), Some(addr("registry")));

        let err = h.registry.accept_loan(&addr("carol"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::LoanAlreadyAccepted { .. }));
    }

    #[test]
    fn test_accept_rejected_after_deadline() {
        let mut h = setup();
        let id = request(&mut h);

        advance(&h, Duration::days(3) + Duration::seconds(1));
        let err = h.registry.accept_loan(&addr("bob"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::AcceptanceDeadlinePassed { .. }));
    }

    #[test]
    fn test_accept_rechecks_live_valuation() {
        let mut h = setup();
        let id = request(&mut h);

        // the oracle moved against the borrower between request and accept
        h.oracle.set_valuation(
            h.nft.clone(),
            Valuation {
                timestamp: h.time.now(),
                price: 150_000,
                ltv: 50,
            },
        );
        let err = h.registry.accept_loan(&addr("bob"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::OverMaxBorrow { .. }));

        // the request-time snapshot is untouched by the re-check
        assert_eq!(h.registry.loan(id).unwrap().collateral_value, 250_000);
    }

    #[test]
    fn test_accept_requires_borrower_to_still_hold_collateral() {
        let mut h = setup();
        let id = request(&mut h);

        // alice moved the nft away after requesting
        let mut nfts = h.nfts.clone();
        nfts.transfer_from(&h.nft, &addr("alice"), &addr("carol")).unwrap();

        let err = h.registry.accept_loan(&addr("bob"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::NftTransferFailed { .. }));

        // principal did not move
        assert_eq!(h.bank.balance(&h.usd, &addr("bob")), Amount::from_whole(200_000, 6));
    }

    #[test]
    fn test_repay_before_maturity_reference_scenario() {
        let mut h = setup();
        let id = request_and_accept(&mut h);

        // 30 days into the 540-day term
        advance(&h, Duration::days(30));
        h.registry.repay_loan(&addr("alice"), id, &h.time).unwrap();

        assert_eq!(
            h.bank.balance(&h.usd, &addr("bob")),
            Amount::from_raw(201_733_796_295)
        );
        assert_eq!(
            h.bank.balance(&h.usd, &addr("treasury")),
            Amount::from_raw(753_259_636)
        );
        assert_eq!(
            h.bank.balance(&h.usd, &addr("alice")),
            Amount::from_raw(27_512_944_069)
        );
        assert_eq!(h.nfts.owner(&h.nft), Some(addr("alice")));
        assert_eq!(h.registry.loan(id).unwrap().status(), LoanStatus::Closed);

        let err = h.registry.repay_loan(&addr("alice"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::LoanAlreadyPaid { .. }));
    }

    #[test]
    fn test_repay_within_grace_adds_grace_fee() {
        let mut h = setup();
        let id = request_and_accept(&mut h);

        // one day past maturity, inside the seven-day grace window
        advance(&h, Duration::days(541));
        h.registry.repay_loan(&addr("alice"), id, &h.time).unwrap();

        // full-term interest: lender gets 116,050; the 3% grace fee on that
        // joins the platform share
        assert_eq!(
            h.bank.balance(&h.usd, &addr("bob")),
            Amount::from_raw(216_050_000_000)
        );
        assert_eq!(
            h.bank.balance(&h.usd, &addr("treasury")),
            Amount::from_raw(2_250_000_000 + 510_204_081 + 3_481_500_000)
        );
        assert_eq!(h.nfts.owner(&h.nft), Some(addr("alice")));
    }

    #[test]
    fn test_repay_rejected_after_grace() {
        let mut h = setup();
        let id = request_and_accept(&mut h);

        advance(&h, Duration::days(547));
        let err = h.registry.repay_loan(&addr("alice"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::GracePeriodOver { .. }));
    }

    #[test]
    fn test_apr_snapshot_survives_rate_table_edits() {
        let mut h = setup();
        let id = request(&mut h);

        h.registry
            .set_apr_for_duration(&addr("admin"), TERM, Bps::new(9_000), &h.time)
            .unwrap();
        h.registry.accept_loan(&addr("bob"), id, &h.time).unwrap();

        advance(&h, Duration::days(30));
        h.registry.repay_loan(&addr("alice"), id, &h.time).unwrap();

        // amounts match the 10.7% snapshot, not the edited table
        assert_eq!(
            h.bank.balance(&h.usd, &addr("bob")),
            Amount::from_raw(201_733_796_295)
        );
    }

    #[test]
    fn test_claim_only_lender_only_after_grace() {
        let mut h = setup();
        let id = request_and_accept(&mut h);

        advance(&h, Duration::days(30));
        let err = h.registry.claim_nft(&addr("bob"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::GracePeriodNotOver { .. }));

        // past maturity + grace
        advance(&h, Duration::days(517) + Duration::seconds(1));
        let err = h.registry.claim_nft(&addr("carol"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::NotLender { .. }));

        h.registry.claim_nft(&addr("bob"), id, &h.time).unwrap();
        assert_eq!(h.nfts.owner(&h.nft), Some(addr("bob")));
        assert_eq!(h.registry.loan(id).unwrap().status(), LoanStatus::Closed);

        // no monetary transfer happened
        assert_eq!(h.bank.balance(&h.usd, &addr("bob")), Amount::from_whole(100_000, 6));
        assert_eq!(h.bank.balance(&h.usd, &addr("treasury")), Amount::ZERO);
    }

    #[test]
    fn test_liquidation_waits_out_the_exclusive_window() {
        let mut h = setup();
        let id = request_and_accept(&mut h);

        // exactly at the exclusive deadline: still reserved for the lender
        advance(&h, Duration::days(548));
        let err = h.registry.liquidate_loan(&addr("carol"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::ExclusiveWindowActive { .. }));

        // the window binds the lender too
        let err = h.registry.liquidate_loan(&addr("bob"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::ExclusiveWindowActive { .. }));

        advance(&h, Duration::seconds(1));
        h.registry.liquidate_loan(&addr("carol"), id, &h.time).unwrap();

        // liquidator fronts principal + interest + all fees and takes the nft
        assert_eq!(
            h.bank.balance(&h.usd, &addr("carol")),
            Amount::from_raw(76_189_795_919)
        );
        assert_eq!(
            h.bank.balance(&h.usd, &addr("bob")),
            Amount::from_raw(216_050_000_000)
        );
        assert_eq!(
            h.bank.balance(&h.usd, &addr("treasury")),
            Amount::from_raw(7_760_204_081)
        );
        assert_eq!(h.nfts.owner(&h.nft), Some(addr("carol")));

        // claim lost the race
        let err = h.registry.claim_nft(&addr("bob"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::LoanAlreadyPaid { .. }));
    }

    #[test]
    fn test_failed_lender_payout_is_routed_to_the_stuck_ledger() {
        let mut h = setup();
        let id = request_and_accept(&mut h);

        advance(&h, Duration::days(30));
        h.bank.block_recipient(addr("bob"));
        h.registry.repay_loan(&addr("alice"), id, &h.time).unwrap();

        // repayment settled despite the payout fault: collateral returned,
        // treasury paid, the lender share parked with the registry
        assert_eq!(h.nfts.owner(&h.nft), Some(addr("alice")));
        assert_eq!(
            h.bank.balance(&h.usd, &addr("treasury")),
            Amount::from_raw(753_259_636)
        );
        assert_eq!(h.bank.balance(&h.usd, &addr("bob")), Amount::from_whole(100_000, 6));
        assert_eq!(
            h.bank.balance(&h.usd, &addr("registry")),
            Amount::from_raw(101_733_796_295)
        );
        assert_eq!(
            h.registry.stuck_balance(&h.usd, &addr("bob")),
            Amount::from_raw(101_733_796_295)
        );

        // withdrawal bounces while the restriction stands, credit intact
        let err = h
            .registry
            .withdraw_stuck_token(&addr("bob"), &h.usd.clone(), &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::TransferFailed { .. }));
        assert_eq!(
            h.registry.stuck_balance(&h.usd, &addr("bob")),
            Amount::from_raw(101_733_796_295)
        );

        // once lifted, the credit drains exactly once
        h.bank.unblock_recipient(&addr("bob"));
        let withdrawn = h
            .registry
            .withdraw_stuck_token(&addr("bob"), &h.usd.clone(), &h.time)
            .unwrap();
        assert_eq!(withdrawn, Amount::from_raw(101_733_796_295));
        assert_eq!(
            h.bank.balance(&h.usd, &addr("bob")),
            Amount::from_raw(201_733_796_295)
        );

        let err = h
            .registry
            .withdraw_stuck_token(&addr("bob"), &h.usd.clone(), &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::NothingToWithdraw { .. }));
    }

    #[test]
    fn test_repay_requires_full_funding_upfront() {
        let mut h = setup();
        let id = request_and_accept(&mut h);

        advance(&h, Duration::days(30));
        let err = h.registry.repay_loan(&addr("mallory"), id, &h.time).unwrap_err();
        assert!(matches!(err, LendingError::InsufficientFunds { .. }));

        // the rejected attempt mutated nothing
        assert!(!h.registry.loan(id).unwrap().paid);
        assert_eq!(h.nfts.owner(&h.nft), Some(addr("registry")));
    }

    #[test]
    fn test_anyone_may_fund_a_repayment() {
        let mut h = setup();
        let id = request_and_accept(&mut h);

        advance(&h, Duration::days(30));
        h.registry.repay_loan(&addr("carol"), id, &h.time).unwrap();

        // collateral still comes back to the borrower
        assert_eq!(h.nfts.owner(&h.nft), Some(addr("alice")));
        assert_eq!(
            h.bank.balance(&h.usd, &addr("carol")),
            Amount::from_raw(200_000_000_000 - 102_487_055_931)
        );
    }

    #[test]
    fn test_reentrancy_guard() {
        let mut h = setup();
        h.registry.entered = true;

        let deadline = h.time.now() + Duration::days(3);
        let err = h
            .registry
            .request_loan(
                &addr("alice"),
                h.usd.clone(),
                Amount::from_whole(1_000, 6),
                h.nft.clone(),
                TERM,
                deadline,
                &h.time,
            )
            .unwrap_err();
        assert!(matches!(err, LendingError::ReentrantCall));

        // the guard releases after a completed call
        h.registry.entered = false;
        request(&mut h);
    }

    #[test]
    fn test_governance_roles() {
        let mut h = setup();

        let err = h
            .registry
            .set_protocol_fee(&addr("mallory"), Bps::new(100), &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::MissingRole { role: Role::Admin, .. }));

        // an admin without the treasury role cannot redirect funds
        h.registry
            .grant_role(&addr("admin"), Role::Admin, addr("ops"))
            .unwrap();
        h.registry
            .set_protocol_fee(&addr("ops"), Bps::new(100), &h.time)
            .unwrap();
        let err = h
            .registry
            .set_treasury(&addr("ops"), addr("vault"), &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::MissingRole { role: Role::Treasury, .. }));

        h.registry
            .set_treasury(&addr("admin"), addr("vault"), &h.time)
            .unwrap();
        assert_eq!(h.registry.config().treasury, addr("vault"));

        h.registry
            .revoke_role(&addr("admin"), Role::Admin, &addr("ops"))
            .unwrap();
        let err = h
            .registry
            .set_protocol_fee(&addr("ops"), Bps::new(100), &h.time)
            .unwrap_err();
        assert!(matches!(err, LendingError::MissingRole { .. }));
    }

    #[test]
    fn test_lifecycle_event_trail() {
        let mut h = setup();
        let id = request_and_accept(&mut h);
        advance(&h, Duration::days(30));
        h.registry.repay_loan(&addr("alice"), id, &h.time).unwrap();

        let events = h.registry.take_events();
        let lifecycle: Vec<&Event> = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    Event::LoanRequested { .. } | Event::LoanAccepted { .. } | Event::LoanRepaid { .. }
                )
            })
            .collect();
        assert_eq!(lifecycle.len(), 3);
        assert!(matches!(lifecycle[0], Event::LoanRequested { .. }));
        assert!(matches!(lifecycle[1], Event::LoanAccepted { .. }));
        assert!(matches!(
            lifecycle[2],
            Event::LoanRepaid {
                grace_fee: Amount::ZERO,
                ..
            }
        ));

        // drained once
        assert!(h.registry.take_events().is_empty());
    }

    #[test]
    fn test_totals_track_the_book() {
        let mut h = setup();

        let id = request(&mut h);
        h.registry.cancel_loan(&addr("alice"), id, &h.time).unwrap();

        let id = request_and_accept(&mut h);
        advance(&h, Duration::days(30));
        h.registry.repay_loan(&addr("alice"), id, &h.time).unwrap();

        let totals = h.registry.totals();
        assert_eq!(totals.loans_requested, 2);
        assert_eq!(totals.loans_cancelled, 1);
        assert_eq!(totals.loans_accepted, 1);
        assert_eq!(totals.loans_repaid, 1);
        assert_eq!(
            totals.fees_collected.get(&h.usd),
            Some(&Amount::from_raw(753_259_636))
        );
    }

    #[test]
    fn test_settled_loans_are_retained_for_audit() {
        let mut h = setup();
        let id = request_and_accept(&mut h);
        advance(&h, Duration::days(30));
        h.registry.repay_loan(&addr("alice"), id, &h.time).unwrap();

        let loan = h.registry.loan(id).unwrap();
        assert!(loan.paid);
        assert_eq!(loan.lender, Some(addr("bob")));
        assert_eq!(h.registry.loans().count(), 1);
    }

    #[test]
    fn test_revoked_allow_list_entry_blocks_new_activity() {
        let mut h = setup();
        h.allow_list.revoke(&addr("alice"));

        let deadline = h.time.now() + Duration::days(3);
        let err = h
            .registry
            .request_loan(
                &addr("alice"),
                h.usd.clone(),
                Amount::from_whole(1_000, 6),
                h.nft.clone(),
                TERM,
                deadline,
                &h.time,
            )
            .unwrap_err();
        assert!(matches!(err, LendingError::AddressNotAllowListed { .. }));
    }
}
