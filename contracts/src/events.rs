//! Contract events. Events are the engine's only log output.

use odra::prelude::*;
use odra::casper_types::U256;
use crate::types::{PriceStatus, TroveStatus};

// ========== Price Feed ==========

#[odra::event]
pub struct PriceFeedStatusChanged {
    pub new_status: PriceStatus,
}

#[odra::event]
pub struct LastGoodPriceUpdated {
    pub last_good_price: U256,
}

// ========== Trove Manager ==========

/// Emitted whenever a trove's stored amounts change
#[odra::event]
pub struct TroveUpdated {
    pub borrower: Address,
    pub debt: U256,
    pub collateral: U256,
    pub stake: U256,
    pub status: TroveStatus,
}

#[odra::event]
pub struct TroveLiquidated {
    pub borrower: Address,
    pub debt: U256,
    pub collateral: U256,
    pub recovery_mode: bool,
}

/// Summary of one liquidation call
#[odra::event]
pub struct Liquidation {
    pub liquidator: Address,
    pub troves_liquidated: u32,
    pub liquidated_debt: U256,
    pub liquidated_collateral: U256,
    pub coll_gas_compensation: U256,
    pub debt_gas_compensation: U256,
}

#[odra::event]
pub struct RewardIndexUpdated {
    pub l_collateral: U256,
    pub l_debt: U256,
}

#[odra::event]
pub struct TotalStakesUpdated {
    pub total_stakes: U256,
}

#[odra::event]
pub struct SystemSnapshotsUpdated {
    pub total_stakes_snapshot: U256,
    pub total_collateral_snapshot: U256,
}

// ========== Stability Pool ==========

#[odra::event]
pub struct StabilityPoolOffset {
    pub debt_offset: U256,
    pub collateral_added: U256,
}

#[odra::event]
pub struct ProductUpdated {
    pub p: U256,
}

#[odra::event]
pub struct SumUpdated {
    pub epoch: u64,
    pub scale: u64,
    pub sum: U256,
}

#[odra::event]
pub struct EpochUpdated {
    pub epoch: u64,
}

#[odra::event]
pub struct ScaleUpdated {
    pub scale: u64,
}

#[odra::event]
pub struct DepositUpdated {
    pub depositor: Address,
    pub deposit: U256,
}

#[odra::event]
pub struct CollateralGainWithdrawn {
    pub depositor: Address,
    pub collateral: U256,
    /// Compounding loss absorbed since the previous snapshot
    pub stablecoin_loss: U256,
}

// ========== Collateral Surplus ==========

#[odra::event]
pub struct CollBalanceUpdated {
    pub owner: Address,
    pub balance: U256,
}

#[odra::event]
pub struct CollateralClaimed {
    pub owner: Address,
    pub amount: U256,
}

// ========== Sorted Troves ==========

#[odra::event]
pub struct NodeAdded {
    pub id: Address,
    pub nicr: U256,
}

#[odra::event]
pub struct NodeRemoved {
    pub id: Address,
}
