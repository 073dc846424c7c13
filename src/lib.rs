pub mod access;
pub mod collateral;
pub mod config;
pub mod errors;
pub mod events;
pub mod external;
pub mod interest;
pub mod loan;
pub mod recovery;
pub mod registry;
pub mod types;
pub mod units;
pub mod views;

// re-export key types
pub use access::{AccessControl, Role};
pub use collateral::{max_borrowable, Valuation, PRICE_VALIDITY_WINDOW_SECS};
pub use config::ProtocolConfig;
pub use errors::{LendingError, Result};
pub use events::{Event, EventStore};
pub use external::{AddressAllowList, FungibleToken, NonFungibleToken, PriceOracle};
pub use interest::{debt_with_penalty, origination_fee, RepaymentBreakdown};
pub use loan::Loan;
pub use recovery::StuckFundsLedger;
pub use registry::{LoanRegistry, RegistryTotals};
pub use types::{Address, LoanId, LoanStatus, NftId};
pub use units::{Amount, Bps, PRECISION, SECONDS_PER_YEAR};
pub use views::{LoanView, RegistryView};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
