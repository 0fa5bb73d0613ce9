//! Price Feed Contract
//!
//! Aggregates two independent oracles into one collateral price.
//!
//! - The primary oracle (aggregator rounds) is authoritative while it works
//! - The secondary oracle (pull prices with confidence) takes over when the
//!   primary breaks, freezes or disagrees
//! - When neither can be trusted the last good price is served
//!
//! Fetching never reverts on oracle failure. The transition table lives in
//! the pure [`resolve`] function so it can be tested without a VM.

use odra::prelude::*;
use odra::casper_types::U256;
use odra::ContractRef;
use crate::errors::CdpError;
use crate::events::{LastGoodPriceUpdated, PriceFeedStatusChanged};
use crate::interfaces::{PrimaryOracleContractRef, PrimaryRound, SecondaryOracleContractRef, SecondaryPrice};
use crate::math::{abs_diff, decimal_precision, max, pow10};
use crate::types::PriceStatus;

/// Primary feed considered frozen after 3 hours (block time is in milliseconds)
const DEFAULT_PRIMARY_TIMEOUT: u64 = 3 * 60 * 60 * 1000;

/// Secondary feed considered frozen after 4 hours
const DEFAULT_SECONDARY_TIMEOUT: u64 = 4 * 60 * 60 * 1000;

/// Max relative difference for two prices to count as similar (5%)
const DEFAULT_MAX_DEVIATION: u64 = 50_000_000_000_000_000;

/// Max secondary confidence interval relative to its price (5%)
const DEFAULT_MAX_CONFIDENCE_BPS: u64 = 500;

const BPS_SCALE: u64 = 10_000;

/// Largest decimal count / negative exponent accepted from a feed
const MAX_FEED_DECIMALS: u32 = 36;

/// Price feed configuration
#[odra::odra_type]
pub struct PriceFeedConfig {
    /// Age after which a primary round is frozen
    pub primary_timeout: u64,
    /// Age after which a secondary price is frozen
    pub secondary_timeout: u64,
    /// Relative deviation (1e18 = 100%) above which prices disagree
    pub max_deviation: U256,
    /// Widest acceptable secondary confidence interval in bps of the price
    pub max_secondary_confidence_bps: u64,
    /// Feed the secondary oracle must report
    pub secondary_feed_id: String,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            primary_timeout: DEFAULT_PRIMARY_TIMEOUT,
            secondary_timeout: DEFAULT_SECONDARY_TIMEOUT,
            max_deviation: U256::from(DEFAULT_MAX_DEVIATION),
            max_secondary_confidence_bps: DEFAULT_MAX_CONFIDENCE_BPS,
            secondary_feed_id: String::new(),
        }
    }
}

/// Health of one feed at fetch time, price scaled to 18 decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedReading {
    Broken,
    Frozen,
    Live(U256),
}

/// Which price a fetch returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceChoice {
    Primary(U256),
    Secondary(U256),
    LastGood,
}

/// Outcome of one pass through the state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceDecision {
    pub status: PriceStatus,
    pub choice: PriceChoice,
}

fn decision(status: PriceStatus, choice: PriceChoice) -> PriceDecision {
    PriceDecision { status, choice }
}

/// Relative difference of `a` and `b` is within `max_deviation`.
pub fn prices_similar(a: U256, b: U256, max_deviation: U256) -> bool {
    let larger = max(a, b);
    if larger.is_zero() {
        return true;
    }
    abs_diff(a, b) * decimal_precision() / larger <= max_deviation
}

/// Next status and returned price for the current status and readings.
pub fn resolve(
    status: PriceStatus,
    primary: FeedReading,
    secondary: FeedReading,
    max_deviation: U256,
) -> PriceDecision {
    use FeedReading::{Broken, Frozen, Live};
    use PriceChoice::{LastGood, Primary, Secondary};
    use PriceStatus::*;

    let similar = |p: U256, s: U256| prices_similar(p, s, max_deviation);

    match status {
        PrimaryWorking => match (primary, secondary) {
            (Broken, Broken) => decision(BothUntrusted, LastGood),
            (Broken, Frozen) => decision(UsingSecondaryPrimaryUntrusted, LastGood),
            (Broken, Live(s)) => decision(UsingSecondaryPrimaryUntrusted, Secondary(s)),
            (Frozen, Broken) => decision(UsingPrimarySecondaryUntrusted, LastGood),
            (Frozen, Frozen) => decision(UsingSecondaryPrimaryFrozen, LastGood),
            (Frozen, Live(s)) => decision(UsingSecondaryPrimaryFrozen, Secondary(s)),
            (Live(p), Broken) => decision(UsingPrimarySecondaryUntrusted, Primary(p)),
            (Live(p), Live(s)) if !similar(p, s) => decision(UsingPrimarySecondaryUntrusted, Primary(p)),
            (Live(p), _) => decision(PrimaryWorking, Primary(p)),
        },
        UsingSecondaryPrimaryUntrusted => match (primary, secondary) {
            (Live(p), Live(s)) if similar(p, s) => decision(PrimaryWorking, Primary(p)),
            (Live(p), Broken | Frozen) => decision(UsingPrimarySecondaryUntrusted, Primary(p)),
            (_, Broken) => decision(BothUntrusted, LastGood),
            (_, Frozen) => decision(status, LastGood),
            (_, Live(s)) => decision(status, Secondary(s)),
        },
        BothUntrusted => match (primary, secondary) {
            (Live(p), Live(s)) if similar(p, s) => decision(PrimaryWorking, Primary(p)),
            (Live(p), Broken | Frozen) => decision(UsingPrimarySecondaryUntrusted, Primary(p)),
            _ => decision(status, LastGood),
        },
        UsingSecondaryPrimaryFrozen => match (primary, secondary) {
            (Broken, Broken) => decision(BothUntrusted, LastGood),
            (Broken, Frozen) => decision(UsingSecondaryPrimaryUntrusted, LastGood),
            (Broken, Live(s)) => decision(UsingSecondaryPrimaryUntrusted, Secondary(s)),
            (Frozen, Broken) => decision(UsingPrimarySecondaryUntrusted, LastGood),
            (Frozen, Frozen) => decision(status, LastGood),
            (Frozen, Live(s)) => decision(status, Secondary(s)),
            (Live(p), Broken) => decision(UsingPrimarySecondaryUntrusted, Primary(p)),
            (Live(p), Frozen) => decision(UsingPrimarySecondaryUntrusted, Primary(p)),
            (Live(p), Live(s)) if similar(p, s) => decision(PrimaryWorking, Primary(p)),
            (Live(_), Live(s)) => decision(UsingSecondaryPrimaryUntrusted, Secondary(s)),
        },
        UsingPrimarySecondaryUntrusted => match (primary, secondary) {
            (Broken, _) => decision(BothUntrusted, LastGood),
            (Frozen, _) => decision(status, LastGood),
            (Live(p), Live(s)) if similar(p, s) => decision(PrimaryWorking, Primary(p)),
            (Live(p), _) => decision(status, Primary(p)),
        },
    }
}

/// Classifies a primary round read at `now`.
pub fn primary_reading(round: Option<PrimaryRound>, now: u64, timeout: u64) -> FeedReading {
    let round = match round {
        Some(round) => round,
        None => return FeedReading::Broken,
    };
    if round.answer <= 0
        || round.updated_at == 0
        || round.updated_at > now
        || u32::from(round.decimals) > MAX_FEED_DECIMALS
    {
        return FeedReading::Broken;
    }
    if now - round.updated_at > timeout {
        return FeedReading::Frozen;
    }

    let answer = U256::from(round.answer as u64);
    let decimals = u32::from(round.decimals);
    let price = if decimals <= 18 {
        answer * pow10(18 - decimals)
    } else {
        answer / pow10(decimals - 18)
    };
    if price.is_zero() {
        return FeedReading::Broken;
    }
    FeedReading::Live(price)
}

/// Classifies a secondary price read at `now`.
pub fn secondary_reading(price: Option<SecondaryPrice>, now: u64, config: &PriceFeedConfig) -> FeedReading {
    let reading = match price {
        Some(reading) => reading,
        None => return FeedReading::Broken,
    };
    if reading.price <= 0
        || reading.publish_time == 0
        || reading.publish_time > now
        || reading.feed_id != config.secondary_feed_id
        || reading.expo < -(MAX_FEED_DECIMALS as i32)
        || reading.expo > 18
    {
        return FeedReading::Broken;
    }

    let mantissa = U256::from(reading.price as u64);
    let confidence_limit = mantissa * U256::from(config.max_secondary_confidence_bps);
    if U256::from(reading.conf) * U256::from(BPS_SCALE) > confidence_limit {
        return FeedReading::Broken;
    }
    if now - reading.publish_time > config.secondary_timeout {
        return FeedReading::Frozen;
    }

    let shift = 18 + reading.expo;
    let price = if shift >= 0 {
        mantissa * pow10(shift as u32)
    } else {
        mantissa / pow10((-shift) as u32)
    };
    if price.is_zero() {
        return FeedReading::Broken;
    }
    FeedReading::Live(price)
}

/// Price Feed Contract
#[odra::module(events = [PriceFeedStatusChanged, LastGoodPriceUpdated])]
pub struct PriceFeed {
    /// Admin (deployer)
    admin: Var<Address>,
    /// Primary oracle contract
    primary_oracle: Var<Address>,
    /// Secondary oracle contract
    secondary_oracle: Var<Address>,
    /// Timeouts and thresholds
    config: Var<PriceFeedConfig>,
    /// Current state machine status
    status: Var<PriceStatus>,
    /// Last price taken from a live feed
    last_good_price: Var<U256>,
}

#[odra::module]
impl PriceFeed {
    /// Initialize the feed; the primary oracle must report a live price.
    pub fn init(&mut self, primary_oracle: Address, secondary_oracle: Address, secondary_feed_id: String) {
        self.admin.set(self.env().caller());
        self.primary_oracle.set(primary_oracle);
        self.secondary_oracle.set(secondary_oracle);
        self.config.set(PriceFeedConfig {
            secondary_feed_id,
            ..Default::default()
        });
        self.status.set(PriceStatus::PrimaryWorking);

        let config = self.get_config();
        match self.read_primary(self.env().get_block_time(), &config) {
            FeedReading::Live(price) => self.store_price(price),
            _ => self.env().revert(CdpError::PrimaryOracleUnavailable),
        }
    }

    /// Returns the price to use now, updating the status machine.
    pub fn fetch_price(&mut self) -> U256 {
        let now = self.env().get_block_time();
        let config = self.get_config();
        let primary = self.read_primary(now, &config);
        let secondary = self.read_secondary(now, &config);

        let current = self.get_status();
        let next = resolve(current, primary, secondary, config.max_deviation);

        if next.status != current {
            self.status.set(next.status);
            self.env().emit_event(PriceFeedStatusChanged { new_status: next.status });
        }

        match next.choice {
            PriceChoice::Primary(price) | PriceChoice::Secondary(price) => {
                self.store_price(price);
                price
            }
            PriceChoice::LastGood => self.get_last_good_price(),
        }
    }

    // ========== Query Functions ==========

    pub fn get_last_good_price(&self) -> U256 {
        self.last_good_price.get_or_default()
    }

    pub fn get_status(&self) -> PriceStatus {
        self.status.get_or_default()
    }

    pub fn get_config(&self) -> PriceFeedConfig {
        self.config.get_or_default()
    }

    // ========== Admin Functions ==========

    /// Replace the configuration (admin only)
    pub fn set_config(&mut self, config: PriceFeedConfig) {
        self.require_admin();
        if config.primary_timeout == 0
            || config.secondary_timeout == 0
            || config.max_deviation.is_zero()
            || config.max_deviation > decimal_precision()
        {
            self.env().revert(CdpError::InvalidConfig);
        }
        self.config.set(config);
    }

    // ========== Internal Functions ==========

    fn read_primary(&self, now: u64, config: &PriceFeedConfig) -> FeedReading {
        match self.primary_oracle.get() {
            Some(oracle) => {
                let round = PrimaryOracleContractRef::new(self.env(), oracle).latest_round();
                primary_reading(round, now, config.primary_timeout)
            }
            None => FeedReading::Broken,
        }
    }

    fn read_secondary(&self, now: u64, config: &PriceFeedConfig) -> FeedReading {
        match self.secondary_oracle.get() {
            Some(oracle) => {
                let price = SecondaryOracleContractRef::new(self.env(), oracle).latest_price();
                secondary_reading(price, now, config)
            }
            None => FeedReading::Broken,
        }
    }

    fn store_price(&mut self, price: U256) {
        self.last_good_price.set(price);
        self.env().emit_event(LastGoodPriceUpdated { last_good_price: price });
    }

    fn require_admin(&self) {
        if self.admin.get() != Some(self.env().caller()) {
            self.env().revert(CdpError::Unauthorized);
        }
    }
}
