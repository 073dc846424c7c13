use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// protocol precision constant: 10,000 basis points = 100%
pub const PRECISION: u128 = 10_000;

/// seconds per year under the fixed 360-day convention
pub const SECONDS_PER_YEAR: u64 = 31_104_000;

/// token amount counted in the token's smallest units
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// create from a raw smallest-unit count
    pub fn from_raw(raw: u128) -> Self {
        Amount(raw)
    }

    /// create from whole tokens scaled by the token's decimal precision
    pub fn from_whole(tokens: u128, decimals: u32) -> Self {
        Amount(tokens * 10u128.pow(decimals))
    }

    /// get raw smallest-unit count
    pub fn raw(&self) -> u128 {
        self.0
    }

    /// check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// minimum of two values
    pub fn min(self, other: Self) -> Self {
        Amount(self.0.min(other.0))
    }

    /// maximum of two values
    pub fn max(self, other: Self) -> Self {
        Amount(self.0.max(other.0))
    }

    /// amount × bps / PRECISION, truncated toward zero
    pub fn bps(&self, rate: Bps) -> Amount {
        Amount(self.0 * rate.as_u128() / PRECISION)
    }

    /// amount × numerator / denominator, truncated toward zero
    pub fn mul_div(&self, numerator: u128, denominator: u128) -> Amount {
        Amount(self.0 * numerator / denominator)
    }

    /// subtraction that reports underflow instead of panicking
    pub fn checked_sub(&self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for Amount {
    fn from(raw: u128) -> Self {
        Amount(raw)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        Amount(self.0 + other.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, other: Amount) {
        self.0 += other.0;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Amount) -> Amount {
        Amount(self.0 - other.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, other: Amount) {
        self.0 -= other.0;
    }
}

/// interest or fee rate in basis points
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Bps(u32);

impl Bps {
    pub const ZERO: Bps = Bps(0);

    pub fn new(bps: u32) -> Self {
        Bps(bps)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn as_u128(&self) -> u128 {
        self.0 as u128
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

impl From<u32> for Bps {
    fn from(bps: u32) -> Self {
        Bps(bps)
    }
}

impl Add for Bps {
    type Output = Bps;

    fn add(self, other: Bps) -> Bps {
        Bps(self.0 + other.0)
    }
}
