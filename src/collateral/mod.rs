pub mod valuation;

pub use valuation::{
    check_borrowable, max_borrowable, require_fresh, Valuation, PRICE_VALIDITY_WINDOW_SECS,
};
