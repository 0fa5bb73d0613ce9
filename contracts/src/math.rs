//! Fixed-point helpers shared by the engine.
//!
//! Every amount, price and ratio is an 18-decimal integer held in a `U256`.

use odra::casper_types::U256;

/// Fixed-point precision (1e18)
pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

/// Precision of the nominal collateral ratio used for list ordering (1e20)
pub const NICR_PRECISION: u128 = 100_000_000_000_000_000_000;

/// Minimum collateral ratio (110%)
pub const MCR: u128 = 1_100_000_000_000_000_000;

/// Critical system collateral ratio (150%)
pub const CCR: u128 = 1_500_000_000_000_000_000;

/// Product rescale threshold for the stability pool (1e9)
pub const SCALE_FACTOR: u128 = 1_000_000_000;

pub fn decimal_precision() -> U256 {
    U256::from(DECIMAL_PRECISION)
}

pub fn mcr() -> U256 {
    U256::from(MCR)
}

pub fn ccr() -> U256 {
    U256::from(CCR)
}

pub fn scale_factor() -> U256 {
    U256::from(SCALE_FACTOR)
}

/// 10^exp as a `U256`.
pub fn pow10(exp: u32) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Collateral ratio `coll * price / debt`; unbounded when there is no debt.
pub fn compute_cr(coll: U256, debt: U256, price: U256) -> U256 {
    if debt.is_zero() {
        return U256::max_value();
    }
    coll * price / debt
}

/// Price-independent ratio `coll * 1e20 / debt` used to order troves.
pub fn compute_nominal_cr(coll: U256, debt: U256) -> U256 {
    if debt.is_zero() {
        return U256::max_value();
    }
    coll * U256::from(NICR_PRECISION) / debt
}

pub fn min(a: U256, b: U256) -> U256 {
    if a < b {
        a
    } else {
        b
    }
}

pub fn max(a: U256, b: U256) -> U256 {
    if a > b {
        a
    } else {
        b
    }
}

pub fn abs_diff(a: U256, b: U256) -> U256 {
    if a > b {
        a - b
    } else {
        b - a
    }
}
