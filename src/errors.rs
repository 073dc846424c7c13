use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::access::Role;
use crate::types::{Address, LoanId, NftId};
use crate::units::Amount;

#[derive(Error, Debug)]
pub enum LendingError {
    // validation
    #[error("token not allow-listed: {token}")]
    TokenNotAllowed { token: Address },

    #[error("no rate configured for duration: {duration_secs}s")]
    UnsupportedDuration { duration_secs: u64 },

    #[error("loan amount must be greater than zero")]
    ZeroAmount,

    #[error("acceptance deadline not in the future: {deadline}")]
    DeadlineInPast { deadline: DateTime<Utc> },

    #[error("collection does not expose the nft capability: {collection}")]
    UnsupportedCollateral { collection: Address },

    #[error("collateral disallowed: {nft}")]
    CollateralDisallowed { nft: NftId },

    #[error("valuation is stale: quoted {quoted}, now {now}")]
    StaleValuation {
        quoted: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("invalid ltv from oracle: {ltv}%")]
    InvalidLtv { ltv: u32 },

    #[error("no valuation available for {nft}")]
    ValuationUnavailable { nft: NftId },

    #[error("amount exceeds max borrowable: requested {requested}, max {max}")]
    OverMaxBorrow { requested: Amount, max: Amount },

    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },

    // authorization
    #[error("address not allow-listed: {address}")]
    AddressNotAllowListed { address: Address },

    #[error("caller {caller} is not the borrower of loan {id}")]
    NotBorrower { id: LoanId, caller: Address },

    #[error("caller {caller} is not the lender of loan {id}")]
    NotLender { id: LoanId, caller: Address },

    #[error("caller {caller} is missing role {role:?}")]
    MissingRole { caller: Address, role: Role },

    // loan state
    #[error("loan not found: {id}")]
    LoanNotFound { id: LoanId },

    #[error("loan already accepted: {id}")]
    LoanAlreadyAccepted { id: LoanId },

    #[error("loan not accepted: {id}")]
    LoanNotAccepted { id: LoanId },

    #[error("loan cancelled: {id}")]
    LoanCancelled { id: LoanId },

    #[error("loan already paid: {id}")]
    LoanAlreadyPaid { id: LoanId },

    // timing
    #[error("acceptance deadline passed for loan {id}: deadline {deadline}, now {now}")]
    AcceptanceDeadlinePassed {
        id: LoanId,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("grace period over for loan {id}: repayment closed at {grace_deadline}")]
    GracePeriodOver {
        id: LoanId,
        grace_deadline: DateTime<Utc>,
    },

    #[error("grace period not over for loan {id}: claimable after {grace_deadline}")]
    GracePeriodNotOver {
        id: LoanId,
        grace_deadline: DateTime<Utc>,
    },

    #[error("lender-exclusive window active for loan {id}: liquidatable after {open_at}")]
    ExclusiveWindowActive {
        id: LoanId,
        open_at: DateTime<Utc>,
    },

    // execution
    #[error("reentrant call rejected")]
    ReentrantCall,

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Amount,
        requested: Amount,
    },

    #[error("transfer failed: {token} {amount} from {from} to {to}: {reason}")]
    TransferFailed {
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
        reason: String,
    },

    #[error("nft transfer failed: {nft} from {from} to {to}: {reason}")]
    NftTransferFailed {
        nft: NftId,
        from: Address,
        to: Address,
        reason: String,
    },

    #[error("nothing to withdraw for {recipient} in token {token}")]
    NothingToWithdraw { token: Address, recipient: Address },
}

pub type Result<T> = std::result::Result<T, LendingError>;
