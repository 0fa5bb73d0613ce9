//! Interfaces of the external contracts the engine talks to.

use odra::prelude::*;
use odra::casper_types::U256;

/// Latest round reported by the primary (aggregator style) oracle
#[odra::odra_type]
pub struct PrimaryRound {
    /// Price scaled by `10^decimals`
    pub answer: i64,
    /// Decimal places of `answer`
    pub decimals: u8,
    /// Block time of the last update
    pub updated_at: u64,
}

/// Latest price reported by the secondary (pull style) oracle
#[odra::odra_type]
pub struct SecondaryPrice {
    /// Price mantissa
    pub price: i64,
    /// Confidence interval, same exponent as `price`
    pub conf: u64,
    /// Decimal exponent, value = `price * 10^expo`
    pub expo: i32,
    /// Block time of publication
    pub publish_time: u64,
    /// Identifier of the price feed
    pub feed_id: String,
}

/// Primary oracle; `None` when the aggregator has no round to report
#[odra::external_contract]
pub trait PrimaryOracle {
    fn latest_round(&self) -> Option<PrimaryRound>;
}

/// Secondary oracle; `None` when no price has been published
#[odra::external_contract]
pub trait SecondaryOracle {
    fn latest_price(&self) -> Option<SecondaryPrice>;
}

/// CEP-18 token (collateral)
#[odra::external_contract]
pub trait Cep18 {
    fn transfer(&mut self, recipient: Address, amount: U256) -> bool;
    fn transfer_from(&mut self, owner: Address, recipient: Address, amount: U256) -> bool;
    fn balance_of(&self, account: Address) -> U256;
}
