//! Trove Manager Contract
//!
//! Owns the troves and the system-wide accounting, and runs liquidations.
//!
//! - Active pool: collateral and debt of open troves
//! - Default pool: redistributed collateral and debt not yet applied to troves
//! - Reward index `L` and per-trove snapshots for O(1) redistribution
//! - System snapshots used to size the stake of new troves
//!
//! Liquidation flow per trove:
//! 1. Classify against MCR / TCR (mode re-derived from live totals)
//! 2. Offset against the stability pool
//! 3. Redistribute the remainder over the remaining stakes
//! 4. Book capped-liquidation surplus for the owner
//! 5. Pay the liquidator (collateral share plus the debt gas reserve)

use odra::prelude::*;
use odra::casper_types::U256;
use odra::ContractRef;
use crate::coll_surplus_pool::CollSurplusPoolContractRef;
use crate::errors::CdpError;
use crate::events::{
    Liquidation, RewardIndexUpdated, SystemSnapshotsUpdated, TotalStakesUpdated, TroveLiquidated,
    TroveUpdated,
};
use crate::interfaces::Cep18ContractRef;
use crate::liquidation::{self, LiquidationValues, SystemMode};
use crate::math::{ccr, compute_cr, compute_nominal_cr, max, mcr};
use crate::price_feed::PriceFeedContractRef;
use crate::rewards;
use crate::sorted_troves::SortedTrovesContractRef;
use crate::stability_pool::StabilityPoolContractRef;
use crate::stablecoin::StablecoinContractRef;
use crate::types::{
    EntireDebtAndColl, LiquidationTotals, LiquidatorIncentive, PendingRewards, PoolBalance,
    RewardIndex, SystemSnapshots, Trove, TroveStatus,
};

/// Collaborator contracts, wired once after deployment
#[odra::odra_type]
pub struct ProtocolAddresses {
    pub price_feed: Address,
    pub sorted_troves: Address,
    pub stability_pool: Address,
    pub coll_surplus_pool: Address,
    pub stablecoin: Address,
    pub collateral_token: Address,
}

/// Trove Manager Contract
#[odra::module(events = [
    TroveUpdated,
    TroveLiquidated,
    Liquidation,
    RewardIndexUpdated,
    TotalStakesUpdated,
    SystemSnapshotsUpdated
])]
pub struct TroveManager {
    /// Admin (deployer)
    admin: Var<Address>,
    /// Collaborator contracts
    addresses: Var<ProtocolAddresses>,
    /// Liquidator gas compensation
    incentive: Var<LiquidatorIncentive>,

    // === Troves ===
    troves: Mapping<Address, Trove>,
    reward_snapshots: Mapping<Address, RewardIndex>,
    /// Owners of active troves, swap-and-pop on close
    trove_owners: Mapping<u64, Address>,
    trove_owners_count: Var<u64>,

    // === Redistribution ===
    total_stakes: Var<U256>,
    system_snapshots: Var<SystemSnapshots>,
    /// L_collateral / L_debt
    reward_index: Var<RewardIndex>,
    /// Truncation remainders of the last redistribution
    redistribution_errors: Var<RewardIndex>,
    /// Redistributed while no stake existed, folded into the next redistribution
    unassigned_rewards: Var<PoolBalance>,

    // === Pools ===
    active_pool: Var<PoolBalance>,
    default_pool: Var<PoolBalance>,
}

#[odra::module]
impl TroveManager {
    pub fn init(&mut self) {
        self.admin.set(self.env().caller());
        self.incentive.set(LiquidatorIncentive::default());
        self.trove_owners_count.set(0);
        self.total_stakes.set(U256::zero());
        self.system_snapshots.set(SystemSnapshots::default());
        self.reward_index.set(RewardIndex::default());
        self.redistribution_errors.set(RewardIndex::default());
        self.unassigned_rewards.set(PoolBalance::default());
        self.active_pool.set(PoolBalance::default());
        self.default_pool.set(PoolBalance::default());
    }

    // ========== Admin Functions ==========

    /// Wire collaborators (admin only, once)
    pub fn set_addresses(&mut self, addresses: ProtocolAddresses) {
        self.require_admin();
        if self.addresses.get().is_some() {
            self.env().revert(CdpError::AddressesAlreadySet);
        }
        self.addresses.set(addresses);
    }

    /// Change the liquidator incentive (admin only, before the first trove)
    pub fn set_liquidator_incentive(&mut self, incentive: LiquidatorIncentive) {
        self.require_admin();
        // the debt reserve is minted at open, so it cannot change under open troves
        if self.get_trove_owners_count() > 0 || !self.get_entire_system_debt().is_zero() {
            self.env().revert(CdpError::InvalidConfig);
        }
        if incentive.coll_gas_compensation_divisor.is_zero() {
            self.env().revert(CdpError::InvalidConfig);
        }
        self.incentive.set(incentive);
    }

    // ========== Borrower Functions ==========

    /// Open a trove for the caller.
    ///
    /// Pulls `collateral` (caller must have approved this contract), mints
    /// `debt` to the caller and reserves the debt gas compensation.
    pub fn open_trove(
        &mut self,
        collateral: U256,
        debt: U256,
        prev_hint: Option<Address>,
        next_hint: Option<Address>,
    ) {
        let owner = self.env().caller();
        if self.get_trove_status(owner) == TroveStatus::Active {
            self.env().revert(CdpError::TroveAlreadyActive);
        }
        if collateral.is_zero() {
            self.env().revert(CdpError::ZeroCollateral);
        }
        if debt.is_zero() {
            self.env().revert(CdpError::ZeroDebt);
        }

        let addresses = self.protocol_addresses();
        let price = self.fetch_price(&addresses);
        let incentive = self.get_liquidator_incentive();
        let composite_debt = debt + incentive.debt_gas_compensation;
        let icr = compute_cr(collateral, composite_debt, price);

        if self.check_recovery_mode(price) {
            if icr < ccr() {
                self.env().revert(CdpError::BelowCcrInRecoveryMode);
            }
        } else {
            if icr < mcr() {
                self.env().revert(CdpError::BelowMcr);
            }
            let new_tcr = compute_cr(
                self.get_entire_system_coll() + collateral,
                self.get_entire_system_debt() + composite_debt,
                price,
            );
            if new_tcr < ccr() {
                self.env().revert(CdpError::NewTcrBelowCcr);
            }
        }

        let this = self.env().self_address();
        if !Cep18ContractRef::new(self.env().clone(), addresses.collateral_token)
            .transfer_from(owner, this, collateral)
        {
            self.env().revert(CdpError::TokenTransferFailed);
        }

        let index = self.get_trove_owners_count();
        let stake = rewards::compute_new_stake(collateral, &self.get_system_snapshots());
        let trove = Trove {
            debt: composite_debt,
            collateral,
            stake,
            status: TroveStatus::Active,
            array_index: index,
        };
        self.set_total_stakes(self.get_total_stakes() + stake);
        self.troves.set(&owner, trove);
        self.reward_snapshots.set(&owner, self.get_reward_index());
        self.trove_owners.set(&index, owner);
        self.trove_owners_count.set(index + 1);

        let nicr = compute_nominal_cr(collateral, composite_debt);
        SortedTrovesContractRef::new(self.env().clone(), addresses.sorted_troves)
            .insert(owner, nicr, prev_hint, next_hint);

        let mut active = self.get_active_pool();
        active.collateral = active.collateral + collateral;
        active.debt = active.debt + composite_debt;
        self.active_pool.set(active);

        let mut stablecoin = StablecoinContractRef::new(self.env().clone(), addresses.stablecoin);
        stablecoin.mint(owner, debt);
        stablecoin.mint(this, incentive.debt_gas_compensation);

        self.env().emit_event(TroveUpdated {
            borrower: owner,
            debt: composite_debt,
            collateral,
            stake,
            status: TroveStatus::Active,
        });
    }

    /// Fold the borrower's pending redistribution rewards into the trove
    pub fn apply_pending_rewards(&mut self, borrower: Address) {
        if self.get_trove_status(borrower) != TroveStatus::Active {
            self.env().revert(CdpError::TroveNotActive);
        }
        let addresses = self.protocol_addresses();
        self.apply_pending_rewards_internal(&addresses, borrower);
    }

    // ========== Liquidation ==========

    /// Liquidate a single trove
    pub fn liquidate(&mut self, borrower: Address) -> LiquidationTotals {
        if self.get_trove_status(borrower) != TroveStatus::Active {
            self.env().revert(CdpError::TroveNotActive);
        }
        self.liquidate_list(vec![borrower])
    }

    /// Walk up to `max_count` troves from the lowest collateral ratio,
    /// liquidating the eligible ones
    pub fn liquidate_sequence(&mut self, max_count: u32) -> LiquidationTotals {
        if max_count == 0 {
            self.env().revert(CdpError::NothingToLiquidate);
        }

        let addresses = self.protocol_addresses();
        let liquidator = self.env().caller();
        let price = self.fetch_price(&addresses);
        let sorted = SortedTrovesContractRef::new(self.env().clone(), addresses.sorted_troves);

        let mut totals = LiquidationTotals::default();
        let mut cursor = sorted.get_first();
        let mut examined = 0u32;

        while let Some(borrower) = cursor {
            if examined == max_count {
                break;
            }
            examined += 1;

            let next = sorted.get_next(borrower);
            let icr = self.get_current_icr(borrower, price);
            let tcr = self.get_tcr(price);
            let threshold = if tcr < ccr() { max(mcr(), tcr) } else { mcr() };
            // every later trove has a higher ratio
            if icr >= threshold {
                break;
            }

            if let Some(values) = self.liquidate_trove(&addresses, borrower, price, liquidator) {
                totals.add(&values);
            }
            cursor = next;
        }

        self.finish_liquidation(liquidator, totals)
    }

    /// Liquidate the given troves in order, skipping inactive and ineligible ones
    pub fn liquidate_list(&mut self, borrowers: Vec<Address>) -> LiquidationTotals {
        let addresses = self.protocol_addresses();
        let liquidator = self.env().caller();
        let price = self.fetch_price(&addresses);

        let mut totals = LiquidationTotals::default();
        for borrower in borrowers {
            if let Some(values) = self.liquidate_trove(&addresses, borrower, price, liquidator) {
                totals.add(&values);
            }
        }

        self.finish_liquidation(liquidator, totals)
    }

    // ========== Solvency Views ==========

    pub fn get_entire_system_coll(&self) -> U256 {
        self.get_active_pool().collateral + self.get_default_pool().collateral
    }

    pub fn get_entire_system_debt(&self) -> U256 {
        self.get_active_pool().debt + self.get_default_pool().debt
    }

    /// Total collateral ratio at `price`
    pub fn get_tcr(&self, price: U256) -> U256 {
        compute_cr(self.get_entire_system_coll(), self.get_entire_system_debt(), price)
    }

    pub fn check_recovery_mode(&self, price: U256) -> bool {
        self.get_tcr(price) < ccr()
    }

    /// ICR over the trove's entire amounts, pending rewards included
    pub fn get_current_icr(&self, borrower: Address, price: U256) -> U256 {
        let entire = self.get_entire_debt_and_coll(borrower);
        compute_cr(entire.collateral, entire.debt, price)
    }

    pub fn get_nominal_icr(&self, borrower: Address) -> U256 {
        let entire = self.get_entire_debt_and_coll(borrower);
        compute_nominal_cr(entire.collateral, entire.debt)
    }

    pub fn get_entire_debt_and_coll(&self, borrower: Address) -> EntireDebtAndColl {
        let trove = self.get_trove(borrower);
        let pending = self.get_pending_rewards(borrower);
        EntireDebtAndColl {
            debt: trove.debt + pending.debt,
            collateral: trove.collateral + pending.collateral,
            pending_debt: pending.debt,
            pending_collateral: pending.collateral,
        }
    }

    // ========== Trove Views ==========

    pub fn get_trove(&self, borrower: Address) -> Trove {
        self.troves.get(&borrower).unwrap_or_default()
    }

    pub fn get_trove_status(&self, borrower: Address) -> TroveStatus {
        self.get_trove(borrower).status
    }

    pub fn get_reward_snapshot(&self, borrower: Address) -> RewardIndex {
        self.reward_snapshots.get(&borrower).unwrap_or_default()
    }

    pub fn get_pending_rewards(&self, borrower: Address) -> PendingRewards {
        let trove = self.get_trove(borrower);
        if trove.status != TroveStatus::Active {
            return PendingRewards::default();
        }
        rewards::pending_rewards(trove.stake, &self.get_reward_snapshot(borrower), &self.get_reward_index())
    }

    pub fn has_pending_rewards(&self, borrower: Address) -> bool {
        !self.get_pending_rewards(borrower).is_zero()
    }

    pub fn get_trove_owners_count(&self) -> u64 {
        self.trove_owners_count.get_or_default()
    }

    pub fn get_trove_from_owners_array(&self, index: u64) -> Option<Address> {
        if index >= self.get_trove_owners_count() {
            return None;
        }
        self.trove_owners.get(&index)
    }

    // ========== Accumulator Views ==========

    pub fn get_total_stakes(&self) -> U256 {
        self.total_stakes.get_or_default()
    }

    pub fn get_system_snapshots(&self) -> SystemSnapshots {
        self.system_snapshots.get_or_default()
    }

    pub fn get_reward_index(&self) -> RewardIndex {
        self.reward_index.get_or_default()
    }

    pub fn get_redistribution_errors(&self) -> RewardIndex {
        self.redistribution_errors.get_or_default()
    }

    /// Default pool amounts no trove has a claim on yet
    pub fn get_unassigned_rewards(&self) -> PoolBalance {
        self.unassigned_rewards.get_or_default()
    }

    pub fn get_active_pool(&self) -> PoolBalance {
        self.active_pool.get_or_default()
    }

    pub fn get_default_pool(&self) -> PoolBalance {
        self.default_pool.get_or_default()
    }

    pub fn get_liquidator_incentive(&self) -> LiquidatorIncentive {
        self.incentive.get_or_default()
    }

    pub fn get_addresses(&self) -> Option<ProtocolAddresses> {
        self.addresses.get()
    }

    // ========== Internal: Liquidation ==========

    fn liquidate_trove(
        &mut self,
        addresses: &ProtocolAddresses,
        borrower: Address,
        price: U256,
        liquidator: Address,
    ) -> Option<LiquidationValues> {
        if self.get_trove_status(borrower) != TroveStatus::Active {
            return None;
        }

        let entire = self.get_entire_debt_and_coll(borrower);
        let tcr = self.get_tcr(price);
        let mode = if tcr < ccr() { SystemMode::Recovery } else { SystemMode::Normal };
        let sp_deposits = StabilityPoolContractRef::new(self.env().clone(), addresses.stability_pool)
            .get_total_deposits();

        let values = liquidation::liquidation_values(
            mode,
            entire.debt,
            entire.collateral,
            price,
            tcr,
            sp_deposits,
            &self.get_liquidator_incentive(),
        )?;

        self.move_pending_to_active(&PendingRewards {
            collateral: entire.pending_collateral,
            debt: entire.pending_debt,
        });
        self.remove_stake(borrower);
        self.close_trove(addresses, borrower, TroveStatus::ClosedByLiquidation);

        self.offset_with_stability_pool(addresses, &values);
        self.redistribute(values.debt_to_redistribute, values.coll_to_redistribute);
        self.book_surplus(addresses, borrower, values.coll_surplus);
        self.update_system_snapshots_exclude_coll_remainder(values.coll_gas_compensation);
        self.pay_liquidator(addresses, liquidator, &values);

        self.env().emit_event(TroveLiquidated {
            borrower,
            debt: entire.debt,
            collateral: entire.collateral,
            recovery_mode: mode == SystemMode::Recovery,
        });
        Some(values)
    }

    fn finish_liquidation(&mut self, liquidator: Address, totals: LiquidationTotals) -> LiquidationTotals {
        if totals.troves_liquidated == 0 {
            self.env().revert(CdpError::NothingToLiquidate);
        }
        self.env().emit_event(Liquidation {
            liquidator,
            troves_liquidated: totals.troves_liquidated,
            liquidated_debt: totals.total_debt,
            liquidated_collateral: totals.total_collateral,
            coll_gas_compensation: totals.coll_gas_compensation,
            debt_gas_compensation: totals.debt_gas_compensation,
        });
        totals
    }

    fn offset_with_stability_pool(&mut self, addresses: &ProtocolAddresses, values: &LiquidationValues) {
        if values.debt_to_offset.is_zero() {
            return;
        }

        let mut active = self.get_active_pool();
        active.debt = active.debt - values.debt_to_offset;
        active.collateral = active.collateral - values.coll_to_sp;
        self.active_pool.set(active);

        self.send_collateral(addresses, addresses.stability_pool, values.coll_to_sp);
        StabilityPoolContractRef::new(self.env().clone(), addresses.stability_pool)
            .offset(values.debt_to_offset, values.coll_to_sp);
    }

    /// Spread debt and collateral over the remaining stakes.
    ///
    /// With no stakes left the amounts wait in the default pool as
    /// unassigned rewards and ride along with the next redistribution.
    fn redistribute(&mut self, debt: U256, collateral: U256) {
        if debt.is_zero() && collateral.is_zero() {
            return;
        }

        let unassigned = self.get_unassigned_rewards();
        let errors = self.get_redistribution_errors();
        match rewards::redistribution(
            debt + unassigned.debt,
            collateral + unassigned.collateral,
            self.get_total_stakes(),
            &errors,
        ) {
            Some(split) => {
                let mut index = self.get_reward_index();
                index.collateral = index.collateral + split.per_unit_staked.collateral;
                index.debt = index.debt + split.per_unit_staked.debt;
                self.reward_index.set(index);
                self.redistribution_errors.set(split.errors);
                self.unassigned_rewards.set(PoolBalance::default());
                self.env().emit_event(RewardIndexUpdated {
                    l_collateral: index.collateral,
                    l_debt: index.debt,
                });
            }
            None => self.unassigned_rewards.set(PoolBalance {
                collateral: unassigned.collateral + collateral,
                debt: unassigned.debt + debt,
            }),
        }

        let mut active = self.get_active_pool();
        active.collateral = active.collateral - collateral;
        active.debt = active.debt - debt;
        self.active_pool.set(active);

        let mut default = self.get_default_pool();
        default.collateral = default.collateral + collateral;
        default.debt = default.debt + debt;
        self.default_pool.set(default);
    }

    fn book_surplus(&mut self, addresses: &ProtocolAddresses, owner: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }

        let mut active = self.get_active_pool();
        active.collateral = active.collateral - amount;
        self.active_pool.set(active);

        self.send_collateral(addresses, addresses.coll_surplus_pool, amount);
        CollSurplusPoolContractRef::new(self.env().clone(), addresses.coll_surplus_pool)
            .account_surplus(owner, amount);
    }

    fn pay_liquidator(&mut self, addresses: &ProtocolAddresses, liquidator: Address, values: &LiquidationValues) {
        let mut active = self.get_active_pool();
        active.collateral = active.collateral - values.coll_gas_compensation;
        self.active_pool.set(active);
        self.send_collateral(addresses, liquidator, values.coll_gas_compensation);

        if !values.debt_gas_compensation.is_zero() {
            StablecoinContractRef::new(self.env().clone(), addresses.stablecoin)
                .transfer(liquidator, values.debt_gas_compensation);
        }
    }

    fn update_system_snapshots_exclude_coll_remainder(&mut self, coll_remainder: U256) {
        let snapshots = SystemSnapshots {
            total_stakes: self.get_total_stakes(),
            total_collateral: self.get_active_pool().collateral - coll_remainder
                + self.get_default_pool().collateral,
        };
        self.system_snapshots.set(snapshots);
        self.env().emit_event(SystemSnapshotsUpdated {
            total_stakes_snapshot: snapshots.total_stakes,
            total_collateral_snapshot: snapshots.total_collateral,
        });
    }

    // ========== Internal: Troves ==========

    fn apply_pending_rewards_internal(&mut self, addresses: &ProtocolAddresses, borrower: Address) {
        let trove = self.get_trove(borrower);
        let snapshot = self.get_reward_snapshot(borrower);
        let (updated, new_snapshot, applied) =
            rewards::apply_pending(&trove, &snapshot, &self.get_reward_index());

        self.reward_snapshots.set(&borrower, new_snapshot);
        if applied.is_zero() {
            return;
        }

        self.move_pending_to_active(&applied);
        self.troves.set(&borrower, updated.clone());

        // keep the index key in step with the trove's new ratio
        let mut sorted = SortedTrovesContractRef::new(self.env().clone(), addresses.sorted_troves);
        let prev = sorted.get_prev(borrower);
        let next = sorted.get_next(borrower);
        sorted.re_insert(borrower, compute_nominal_cr(updated.collateral, updated.debt), prev, next);

        self.env().emit_event(TroveUpdated {
            borrower,
            debt: updated.debt,
            collateral: updated.collateral,
            stake: updated.stake,
            status: updated.status,
        });
    }

    fn move_pending_to_active(&mut self, pending: &PendingRewards) {
        if pending.is_zero() {
            return;
        }

        let mut default = self.get_default_pool();
        default.collateral = default.collateral - pending.collateral;
        default.debt = default.debt - pending.debt;
        self.default_pool.set(default);

        let mut active = self.get_active_pool();
        active.collateral = active.collateral + pending.collateral;
        active.debt = active.debt + pending.debt;
        self.active_pool.set(active);
    }

    fn remove_stake(&mut self, borrower: Address) {
        let mut trove = self.get_trove(borrower);
        self.set_total_stakes(self.get_total_stakes() - trove.stake);
        trove.stake = U256::zero();
        self.troves.set(&borrower, trove);
    }

    fn close_trove(&mut self, addresses: &ProtocolAddresses, borrower: Address, status: TroveStatus) {
        let trove = self.get_trove(borrower);
        let last_index = self.get_trove_owners_count() - 1;

        if trove.array_index != last_index {
            // Swap-remove: move the last owner into the freed slot
            if let Some(moved) = self.trove_owners.get(&last_index) {
                self.trove_owners.set(&trove.array_index, moved);
                let mut moved_trove = self.get_trove(moved);
                moved_trove.array_index = trove.array_index;
                self.troves.set(&moved, moved_trove);
            }
        }
        self.trove_owners_count.set(last_index);

        self.troves.set(&borrower, Trove { status, ..Default::default() });
        self.reward_snapshots.set(&borrower, RewardIndex::default());
        SortedTrovesContractRef::new(self.env().clone(), addresses.sorted_troves).remove(borrower);

        self.env().emit_event(TroveUpdated {
            borrower,
            debt: U256::zero(),
            collateral: U256::zero(),
            stake: U256::zero(),
            status,
        });
    }

    fn set_total_stakes(&mut self, total_stakes: U256) {
        self.total_stakes.set(total_stakes);
        self.env().emit_event(TotalStakesUpdated { total_stakes });
    }

    // ========== Internal: Collaborators ==========

    fn fetch_price(&self, addresses: &ProtocolAddresses) -> U256 {
        PriceFeedContractRef::new(self.env().clone(), addresses.price_feed).fetch_price()
    }

    fn send_collateral(&self, addresses: &ProtocolAddresses, recipient: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        if !Cep18ContractRef::new(self.env().clone(), addresses.collateral_token).transfer(recipient, amount) {
            self.env().revert(CdpError::TokenTransferFailed);
        }
    }

    fn protocol_addresses(&self) -> ProtocolAddresses {
        match self.addresses.get() {
            Some(addresses) => addresses,
            None => self.env().revert(CdpError::AddressesNotSet),
        }
    }

    fn require_admin(&self) {
        if self.admin.get() != Some(self.env().caller()) {
            self.env().revert(CdpError::Unauthorized);
        }
    }
}
