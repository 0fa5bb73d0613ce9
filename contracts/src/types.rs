//! Common types used across the engine.

use odra::casper_types::U256;

/// Trove lifecycle status
#[odra::odra_type]
#[derive(Copy, Default)]
pub enum TroveStatus {
    #[default]
    NonExistent,
    Active,
    ClosedByOwner,
    ClosedByLiquidation,
    ClosedByRedemption,
}

/// A collateralized debt position, keyed by its owner.
///
/// `debt` and `collateral` exclude rewards not yet applied from the
/// redistribution accumulators.
#[odra::odra_type]
#[derive(Default)]
pub struct Trove {
    /// Recorded debt (stablecoin, 18 decimals)
    pub debt: U256,
    /// Recorded collateral (18 decimals)
    pub collateral: U256,
    /// Share of redistributed rewards
    pub stake: U256,
    /// Lifecycle status
    pub status: TroveStatus,
    /// Position in the owners array
    pub array_index: u64,
}

/// Cumulative redistribution reward per unit of stake.
///
/// Used both for the global accumulators and for a trove's snapshot of them.
#[odra::odra_type]
#[derive(Copy, Default)]
pub struct RewardIndex {
    /// Collateral reward per unit staked (L_coll)
    pub collateral: U256,
    /// Debt reward per unit staked (L_debt)
    pub debt: U256,
}

/// Redistribution rewards a trove has earned but not yet absorbed
#[odra::odra_type]
#[derive(Copy, Default)]
pub struct PendingRewards {
    pub collateral: U256,
    pub debt: U256,
}

impl PendingRewards {
    pub fn is_zero(&self) -> bool {
        self.collateral.is_zero() && self.debt.is_zero()
    }
}

/// Collateral and debt held by a pool (active or default)
#[odra::odra_type]
#[derive(Copy, Default)]
pub struct PoolBalance {
    pub collateral: U256,
    pub debt: U256,
}

/// Totals captured after each liquidation, used to size new stakes
#[odra::odra_type]
#[derive(Copy, Default)]
pub struct SystemSnapshots {
    pub total_stakes: U256,
    pub total_collateral: U256,
}

/// A trove's recorded amounts plus its pending rewards
#[odra::odra_type]
#[derive(Copy, Default)]
pub struct EntireDebtAndColl {
    pub debt: U256,
    pub collateral: U256,
    pub pending_debt: U256,
    pub pending_collateral: U256,
}

/// Price feed state machine
#[odra::odra_type]
#[derive(Copy, Default)]
pub enum PriceStatus {
    /// Primary oracle trusted and used
    #[default]
    PrimaryWorking,
    /// Secondary oracle used, primary broken or disagreeing
    UsingSecondaryPrimaryUntrusted,
    /// Neither oracle trusted; last good price is served
    BothUntrusted,
    /// Secondary oracle used while the primary is frozen
    UsingSecondaryPrimaryFrozen,
    /// Primary oracle used, secondary broken
    UsingPrimarySecondaryUntrusted,
}

/// Gas compensation paid to whoever triggers a liquidation
#[odra::odra_type]
pub struct LiquidatorIncentive {
    /// Flat stablecoin amount reserved at trove opening and paid on liquidation
    pub debt_gas_compensation: U256,
    /// Collateral compensation is `collateral / divisor`
    pub coll_gas_compensation_divisor: U256,
}

impl Default for LiquidatorIncentive {
    fn default() -> Self {
        Self {
            debt_gas_compensation: U256::from(200u64) * crate::math::decimal_precision(),
            coll_gas_compensation_divisor: U256::from(200u64),
        }
    }
}

/// Aggregate outcome of a liquidation call
#[odra::odra_type]
#[derive(Default)]
pub struct LiquidationTotals {
    /// Number of troves closed
    pub troves_liquidated: u32,
    /// Entire debt of the closed troves
    pub total_debt: U256,
    /// Entire collateral of the closed troves
    pub total_collateral: U256,
    /// Collateral paid to the liquidator
    pub coll_gas_compensation: U256,
    /// Stablecoin paid to the liquidator
    pub debt_gas_compensation: U256,
    /// Debt cancelled against stability pool deposits
    pub debt_offset: U256,
    /// Collateral sent to the stability pool
    pub coll_to_sp: U256,
    /// Debt spread over the remaining troves
    pub debt_redistributed: U256,
    /// Collateral spread over the remaining troves
    pub coll_redistributed: U256,
    /// Collateral credited to owners' surplus balances
    pub coll_surplus: U256,
}
