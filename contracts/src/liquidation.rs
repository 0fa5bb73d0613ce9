//! Liquidation classification and value splitting.
//!
//! Given a trove's entire debt and collateral, the price, the system mode and
//! the stability pool size, decides whether the trove is liquidated and how
//! its debt and collateral are split between the stability pool, the
//! remaining troves, the liquidator and the owner's surplus balance.
//!
//! | Mode     | ICR                | Action                                    |
//! |----------|--------------------|-------------------------------------------|
//! | Normal   | `< MCR`            | offset, redistribute the remainder        |
//! | Recovery | `< 100%`           | redistribute everything                   |
//! | Recovery | `100% ..< MCR`     | offset, redistribute the remainder        |
//! | Recovery | `MCR ..< TCR`      | capped offset when the pool covers it all |
//! | any      | otherwise          | skipped                                   |

use odra::casper_types::U256;
use crate::math::{compute_cr, decimal_precision, mcr, min};
use crate::types::{LiquidationTotals, LiquidatorIncentive};

/// System mode at the moment a trove is examined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMode {
    Normal,
    Recovery,
}

/// How a liquidated trove's amounts are split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiquidationValues {
    /// Entire debt of the trove, pending rewards included
    pub entire_debt: U256,
    /// Entire collateral of the trove, pending rewards included
    pub entire_collateral: U256,
    pub coll_gas_compensation: U256,
    pub debt_gas_compensation: U256,
    pub debt_to_offset: U256,
    pub coll_to_sp: U256,
    pub debt_to_redistribute: U256,
    pub coll_to_redistribute: U256,
    pub coll_surplus: U256,
}

/// Classifies a trove and computes its split.
///
/// `None` when the trove is not eligible in the given mode.
pub fn liquidation_values(
    mode: SystemMode,
    debt: U256,
    collateral: U256,
    price: U256,
    tcr: U256,
    sp_deposits: U256,
    incentive: &LiquidatorIncentive,
) -> Option<LiquidationValues> {
    let icr = compute_cr(collateral, debt, price);

    match mode {
        SystemMode::Normal => {
            if icr >= mcr() {
                return None;
            }
            Some(offset_and_redistribute(debt, collateral, sp_deposits, incentive))
        }
        SystemMode::Recovery => {
            if icr < decimal_precision() {
                Some(redistribute_all(debt, collateral, incentive))
            } else if icr < mcr() {
                Some(offset_and_redistribute(debt, collateral, sp_deposits, incentive))
            } else if icr < tcr && debt <= sp_deposits {
                Some(capped_offset(debt, collateral, price, incentive))
            } else {
                None
            }
        }
    }
}

/// Offsets as much debt as the pool holds and redistributes the rest.
pub fn offset_and_redistribute(
    debt: U256,
    collateral: U256,
    sp_deposits: U256,
    incentive: &LiquidatorIncentive,
) -> LiquidationValues {
    let coll_gas_compensation = coll_gas_compensation(collateral, incentive);
    let coll_to_liquidate = collateral - coll_gas_compensation;

    let (debt_to_offset, coll_to_sp) = if sp_deposits.is_zero() {
        (U256::zero(), U256::zero())
    } else {
        let debt_to_offset = min(debt, sp_deposits);
        (debt_to_offset, coll_to_liquidate * debt_to_offset / debt)
    };

    LiquidationValues {
        entire_debt: debt,
        entire_collateral: collateral,
        coll_gas_compensation,
        debt_gas_compensation: incentive.debt_gas_compensation,
        debt_to_offset,
        coll_to_sp,
        debt_to_redistribute: debt - debt_to_offset,
        coll_to_redistribute: coll_to_liquidate - coll_to_sp,
        coll_surplus: U256::zero(),
    }
}

/// Recovery mode with ICR below 100%: the pool is not used.
pub fn redistribute_all(debt: U256, collateral: U256, incentive: &LiquidatorIncentive) -> LiquidationValues {
    let coll_gas_compensation = coll_gas_compensation(collateral, incentive);

    LiquidationValues {
        entire_debt: debt,
        entire_collateral: collateral,
        coll_gas_compensation,
        debt_gas_compensation: incentive.debt_gas_compensation,
        debt_to_redistribute: debt,
        coll_to_redistribute: collateral - coll_gas_compensation,
        ..Default::default()
    }
}

/// Recovery mode with MCR <= ICR < TCR: the pool absorbs the whole debt and
/// receives collateral worth `debt * MCR`; the rest is the owner's surplus.
pub fn capped_offset(
    debt: U256,
    collateral: U256,
    price: U256,
    incentive: &LiquidatorIncentive,
) -> LiquidationValues {
    let capped_coll = debt * mcr() / price;
    let coll_gas_compensation = coll_gas_compensation(capped_coll, incentive);

    LiquidationValues {
        entire_debt: debt,
        entire_collateral: collateral,
        coll_gas_compensation,
        debt_gas_compensation: incentive.debt_gas_compensation,
        debt_to_offset: debt,
        coll_to_sp: capped_coll - coll_gas_compensation,
        coll_surplus: collateral - capped_coll,
        ..Default::default()
    }
}

fn coll_gas_compensation(collateral: U256, incentive: &LiquidatorIncentive) -> U256 {
    if incentive.coll_gas_compensation_divisor.is_zero() {
        return U256::zero();
    }
    collateral / incentive.coll_gas_compensation_divisor
}

impl LiquidationTotals {
    pub fn add(&mut self, values: &LiquidationValues) {
        self.troves_liquidated += 1;
        self.total_debt = self.total_debt + values.entire_debt;
        self.total_collateral = self.total_collateral + values.entire_collateral;
        self.coll_gas_compensation = self.coll_gas_compensation + values.coll_gas_compensation;
        self.debt_gas_compensation = self.debt_gas_compensation + values.debt_gas_compensation;
        self.debt_offset = self.debt_offset + values.debt_to_offset;
        self.coll_to_sp = self.coll_to_sp + values.coll_to_sp;
        self.debt_redistributed = self.debt_redistributed + values.debt_to_redistribute;
        self.coll_redistributed = self.coll_redistributed + values.coll_to_redistribute;
        self.coll_surplus = self.coll_surplus + values.coll_surplus;
    }
}
