//! Stability Pool Contract
//!
//! Holds stablecoin deposits that absorb liquidated debt. Each offset burns
//! debt from the pool and hands the depositors the matching collateral.
//!
//! Key mechanics:
//! - A running product `P` tracks how much of one unit deposited at the start
//!   survives; a deposit compounds as `initial * P / P_snapshot`
//! - A running sum `S` per `(epoch, scale)` tracks collateral gained per unit
//! - `P` is rescaled by 1e9 (new scale) before it loses precision and is
//!   reset (new epoch) when an offset empties the pool
//! - Division remainders are carried into the next offset

use odra::prelude::*;
use odra::casper_types::U256;
use odra::ContractRef;
use crate::errors::CdpError;
use crate::events::{
    CollateralGainWithdrawn, DepositUpdated, EpochUpdated, ProductUpdated, ScaleUpdated,
    StabilityPoolOffset, SumUpdated,
};
use crate::interfaces::Cep18ContractRef;
use crate::math::{decimal_precision, min, scale_factor};
use crate::stablecoin::StablecoinContractRef;

/// Depositor's snapshot at time of deposit/compounding
#[odra::odra_type]
#[derive(Default)]
pub struct DepositSnapshot {
    /// Deposit at the time of the snapshot
    pub deposit: U256,
    /// Product snapshot
    pub p: U256,
    /// Sum at the snapshot's epoch and scale
    pub s: U256,
    /// Epoch at time of deposit
    pub epoch: u64,
    /// Scale at time of deposit
    pub scale: u64,
}

/// Pool statistics
#[odra::odra_type]
pub struct PoolStats {
    /// Total stablecoin deposited
    pub total_deposits: U256,
    /// Collateral held for depositors
    pub collateral_balance: U256,
    /// Total debt absorbed (cumulative)
    pub total_debt_absorbed: U256,
    /// Number of depositors
    pub depositor_count: u64,
}

/// Product-sum algorithm state
#[odra::odra_type]
pub struct ProductSumState {
    /// Current product (starts at 1e18, never zero)
    pub p: U256,
    /// Current epoch (incremented when the pool is emptied)
    pub epoch: u64,
    /// Current scale (incremented when P is rescaled)
    pub scale: u64,
    /// Collateral gain remainder carried between offsets
    pub last_collateral_error: U256,
    /// Debt loss remainder carried between offsets
    pub last_debt_loss_error: U256,
}

impl Default for ProductSumState {
    fn default() -> Self {
        Self {
            p: decimal_precision(),
            epoch: 0,
            scale: 0,
            last_collateral_error: U256::zero(),
            last_debt_loss_error: U256::zero(),
        }
    }
}

impl ProductSumState {
    /// Collateral gain and debt loss per unit deposited for one offset.
    ///
    /// Updates the carried remainders. The loss is rounded up so depositors
    /// never withdraw more than the pool holds.
    pub fn rewards_per_unit_staked(
        &mut self,
        coll_to_add: U256,
        debt_to_offset: U256,
        total_deposits: U256,
    ) -> (U256, U256) {
        let precision = decimal_precision();

        let coll_numerator = coll_to_add * precision + self.last_collateral_error;
        let gain_per_unit = coll_numerator / total_deposits;
        self.last_collateral_error = coll_numerator - gain_per_unit * total_deposits;

        let loss_per_unit = if debt_to_offset == total_deposits {
            self.last_debt_loss_error = U256::zero();
            precision
        } else {
            let loss_numerator = (debt_to_offset * precision).saturating_sub(self.last_debt_loss_error);
            let loss = loss_numerator / total_deposits + U256::one();
            self.last_debt_loss_error = loss * total_deposits - loss_numerator;
            min(loss, precision)
        };

        (gain_per_unit, loss_per_unit)
    }

    /// Shrinks P by `1 - loss_per_unit`, rescaling or starting a new epoch.
    pub fn apply_loss(&mut self, loss_per_unit: U256) {
        let precision = decimal_precision();
        let factor = precision - loss_per_unit;

        if factor.is_zero() {
            self.epoch += 1;
            self.scale = 0;
            self.p = precision;
        } else if self.p * factor / precision < scale_factor() {
            self.p = self.p * factor * scale_factor() / precision;
            self.scale += 1;
        } else {
            self.p = self.p * factor / precision;
        }
    }
}

/// Deposit left after the losses absorbed since `snapshot`.
pub fn compounded_deposit(snapshot: &DepositSnapshot, state: &ProductSumState) -> U256 {
    let initial = snapshot.deposit;
    if initial.is_zero() || snapshot.p.is_zero() {
        return U256::zero();
    }
    // Emptied in an earlier epoch
    if snapshot.epoch < state.epoch {
        return U256::zero();
    }

    let compounded = match state.scale.saturating_sub(snapshot.scale) {
        0 => initial * state.p / snapshot.p,
        1 => initial * state.p / snapshot.p / scale_factor(),
        _ => U256::zero(),
    };

    // Below 1e-9 of the initial deposit the result is rounding noise
    if compounded < initial / scale_factor() {
        return U256::zero();
    }
    compounded
}

/// Collateral gained since `snapshot`.
///
/// `sum_at_scale` and `sum_at_next_scale` are `S` at the snapshot's epoch for
/// its scale and the one after; gains beyond that are negligible.
pub fn collateral_gain(snapshot: &DepositSnapshot, sum_at_scale: U256, sum_at_next_scale: U256) -> U256 {
    if snapshot.deposit.is_zero() || snapshot.p.is_zero() {
        return U256::zero();
    }
    let first_portion = sum_at_scale - snapshot.s;
    let second_portion = sum_at_next_scale / scale_factor();

    snapshot.deposit * (first_portion + second_portion) / snapshot.p / decimal_precision()
}

/// Stability Pool Contract
#[odra::module(events = [
    StabilityPoolOffset,
    ProductUpdated,
    SumUpdated,
    EpochUpdated,
    ScaleUpdated,
    DepositUpdated,
    CollateralGainWithdrawn
])]
pub struct StabilityPool {
    /// Admin (deployer)
    admin: Var<Address>,
    /// Trove manager, the only caller of `offset`
    trove_manager: Var<Address>,
    /// Stablecoin contract
    stablecoin: Var<Address>,
    /// Collateral token contract
    collateral_token: Var<Address>,

    // === Pool State ===
    /// Total stablecoin deposits
    total_deposits: Var<U256>,
    /// Collateral held for depositors
    collateral_balance: Var<U256>,
    /// Total debt absorbed (cumulative)
    total_debt_absorbed: Var<U256>,
    /// Number of depositors with non-zero balance
    depositor_count: Var<u64>,

    // === Product-Sum Algorithm State ===
    ps_state: Var<ProductSumState>,
    /// Sum per (epoch, scale)
    epoch_scale_sum: Mapping<(u64, u64), U256>,

    /// Depositor snapshots
    deposits: Mapping<Address, DepositSnapshot>,
}

#[odra::module]
impl StabilityPool {
    /// Initialize the stability pool
    pub fn init(&mut self) {
        self.admin.set(self.env().caller());
        self.total_deposits.set(U256::zero());
        self.collateral_balance.set(U256::zero());
        self.total_debt_absorbed.set(U256::zero());
        self.depositor_count.set(0);
        self.ps_state.set(ProductSumState::default());
    }

    /// Wire collaborators (admin only, once)
    pub fn set_addresses(&mut self, trove_manager: Address, stablecoin: Address, collateral_token: Address) {
        if self.admin.get() != Some(self.env().caller()) {
            self.env().revert(CdpError::Unauthorized);
        }
        if self.trove_manager.get().is_some() {
            self.env().revert(CdpError::AddressesAlreadySet);
        }
        self.trove_manager.set(trove_manager);
        self.stablecoin.set(stablecoin);
        self.collateral_token.set(collateral_token);
    }

    // ========== Deposit Functions ==========

    /// Deposit stablecoin, paying out any pending collateral gain
    pub fn provide_to_sp(&mut self, amount: U256) {
        if amount.is_zero() {
            self.env().revert(CdpError::SpZeroAmount);
        }

        let depositor = self.env().caller();
        let snapshot = self.deposits.get(&depositor).unwrap_or_default();
        let gain = self.get_depositor_collateral_gain(depositor);
        let compounded = self.get_compounded_deposit(depositor);

        let pool = self.env().self_address();
        self.stablecoin_ref().protocol_transfer(depositor, pool, amount);
        self.total_deposits.set(self.get_total_deposits() + amount);

        if snapshot.deposit.is_zero() {
            self.depositor_count.set(self.depositor_count.get_or_default() + 1);
        }
        self.update_deposit(depositor, compounded + amount);
        self.pay_collateral_gain(depositor, gain, snapshot.deposit.saturating_sub(compounded));
    }

    /// Withdraw up to `amount` of the compounded deposit, paying out gains
    pub fn withdraw_from_sp(&mut self, amount: U256) {
        let depositor = self.env().caller();
        let snapshot = self.deposits.get(&depositor).unwrap_or_default();
        if snapshot.deposit.is_zero() {
            self.env().revert(CdpError::SpNoDeposit);
        }

        let gain = self.get_depositor_collateral_gain(depositor);
        let compounded = self.get_compounded_deposit(depositor);
        let to_withdraw = min(amount, compounded);

        if !to_withdraw.is_zero() {
            let pool = self.env().self_address();
            self.stablecoin_ref().protocol_transfer(pool, depositor, to_withdraw);
            self.total_deposits.set(self.get_total_deposits() - to_withdraw);
        }

        let new_deposit = compounded - to_withdraw;
        if new_deposit.is_zero() {
            let count = self.depositor_count.get_or_default();
            self.depositor_count.set(count.saturating_sub(1));
        }
        self.update_deposit(depositor, new_deposit);
        self.pay_collateral_gain(depositor, gain, snapshot.deposit.saturating_sub(compounded));
    }

    // ========== Liquidation Offset ==========

    /// Cancel `debt_to_offset` against deposits and credit `coll_to_add`.
    ///
    /// The collateral must already have been transferred to the pool.
    pub fn offset(&mut self, debt_to_offset: U256, coll_to_add: U256) {
        if self.trove_manager.get() != Some(self.env().caller()) {
            self.env().revert(CdpError::UnauthorizedProtocol);
        }

        let total = self.get_total_deposits();
        if total.is_zero() || debt_to_offset.is_zero() {
            return;
        }
        if debt_to_offset > total {
            self.env().revert(CdpError::SpOffsetExceedsDeposits);
        }

        let mut state = self.get_product_state();
        let (gain_per_unit, loss_per_unit) = state.rewards_per_unit_staked(coll_to_add, debt_to_offset, total);

        // S accrues at the current epoch and scale, before P moves
        let sum = self.get_sum(state.epoch, state.scale) + gain_per_unit * state.p;
        self.epoch_scale_sum.set(&(state.epoch, state.scale), sum);
        self.env().emit_event(SumUpdated { epoch: state.epoch, scale: state.scale, sum });

        let (epoch_before, scale_before) = (state.epoch, state.scale);
        state.apply_loss(loss_per_unit);
        if state.epoch != epoch_before {
            self.env().emit_event(EpochUpdated { epoch: state.epoch });
        }
        if state.scale != scale_before {
            self.env().emit_event(ScaleUpdated { scale: state.scale });
        }
        self.env().emit_event(ProductUpdated { p: state.p });
        self.ps_state.set(state);

        self.total_deposits.set(total - debt_to_offset);
        self.collateral_balance.set(self.get_collateral_balance() + coll_to_add);
        let absorbed = self.total_debt_absorbed.get_or_default();
        self.total_debt_absorbed.set(absorbed + debt_to_offset);

        let pool = self.env().self_address();
        self.stablecoin_ref().burn_from(pool, debt_to_offset);

        self.env().emit_event(StabilityPoolOffset {
            debt_offset: debt_to_offset,
            collateral_added: coll_to_add,
        });
    }

    // ========== Query Functions ==========

    /// Depositor's deposit after the losses absorbed since the last snapshot
    pub fn get_compounded_deposit(&self, depositor: Address) -> U256 {
        let snapshot = self.deposits.get(&depositor).unwrap_or_default();
        compounded_deposit(&snapshot, &self.get_product_state())
    }

    /// Depositor's pending collateral gain
    pub fn get_depositor_collateral_gain(&self, depositor: Address) -> U256 {
        let snapshot = self.deposits.get(&depositor).unwrap_or_default();
        if snapshot.deposit.is_zero() {
            return U256::zero();
        }
        let sum_at_scale = self.get_sum(snapshot.epoch, snapshot.scale);
        let sum_at_next_scale = self.get_sum(snapshot.epoch, snapshot.scale + 1);
        collateral_gain(&snapshot, sum_at_scale, sum_at_next_scale)
    }

    pub fn get_deposit_snapshot(&self, depositor: Address) -> DepositSnapshot {
        self.deposits.get(&depositor).unwrap_or_default()
    }

    pub fn get_total_deposits(&self) -> U256 {
        self.total_deposits.get_or_default()
    }

    pub fn get_collateral_balance(&self) -> U256 {
        self.collateral_balance.get_or_default()
    }

    pub fn get_product_state(&self) -> ProductSumState {
        self.ps_state.get_or_default()
    }

    pub fn get_sum(&self, epoch: u64, scale: u64) -> U256 {
        self.epoch_scale_sum.get(&(epoch, scale)).unwrap_or_default()
    }

    pub fn get_stats(&self) -> PoolStats {
        PoolStats {
            total_deposits: self.get_total_deposits(),
            collateral_balance: self.get_collateral_balance(),
            total_debt_absorbed: self.total_debt_absorbed.get_or_default(),
            depositor_count: self.depositor_count.get_or_default(),
        }
    }

    // ========== Internal Functions ==========

    fn update_deposit(&mut self, depositor: Address, deposit: U256) {
        let snapshot = if deposit.is_zero() {
            DepositSnapshot::default()
        } else {
            let state = self.get_product_state();
            DepositSnapshot {
                deposit,
                p: state.p,
                s: self.get_sum(state.epoch, state.scale),
                epoch: state.epoch,
                scale: state.scale,
            }
        };
        self.deposits.set(&depositor, snapshot);
        self.env().emit_event(DepositUpdated { depositor, deposit });
    }

    fn pay_collateral_gain(&mut self, depositor: Address, gain: U256, stablecoin_loss: U256) {
        self.env().emit_event(CollateralGainWithdrawn {
            depositor,
            collateral: gain,
            stablecoin_loss,
        });
        if gain.is_zero() {
            return;
        }

        self.collateral_balance.set(self.get_collateral_balance() - gain);
        let token = match self.collateral_token.get() {
            Some(token) => token,
            None => self.env().revert(CdpError::AddressesNotSet),
        };
        if !Cep18ContractRef::new(self.env().clone(), token).transfer(depositor, gain) {
            self.env().revert(CdpError::TokenTransferFailed);
        }
    }

    fn stablecoin_ref(&self) -> StablecoinContractRef {
        match self.stablecoin.get() {
            Some(stablecoin) => StablecoinContractRef::new(self.env().clone(), stablecoin),
            None => self.env().revert(CdpError::AddressesNotSet),
        }
    }
}
