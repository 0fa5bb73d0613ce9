use odra::casper_types::U256;
use odra::prelude::Addressable;
use odra::host::HostRef;
use pretty_assertions::assert_eq;
use stake_cdp_contracts::errors::CdpError;
use stake_cdp_contracts::types::{LiquidatorIncentive, PendingRewards, TroveStatus};

use crate::fixture::{cents, dec, Protocol};

#[test]
fn open_trove_records_position() {
    let mut protocol = Protocol::setup_with_reserve(200, dec(10));
    let alice = protocol.account(1);
    protocol.open_trove(alice, dec(2), dec(100));

    let trove = protocol.trove_manager.get_trove(alice);
    assert_eq!(trove.status, TroveStatus::Active);
    assert_eq!(trove.collateral, dec(2));
    // debt includes the liquidation reserve
    assert_eq!(trove.debt, dec(110));
    assert_eq!(trove.stake, dec(2));
    assert_eq!(trove.array_index, 0);

    assert_eq!(protocol.stablecoin.balance_of(alice), dec(100));
    assert_eq!(protocol.stablecoin.balance_of(protocol.trove_manager.address().clone()), dec(10));
    assert_eq!(protocol.collateral.balance_of(protocol.trove_manager.address().clone()), dec(2));
    assert!(protocol.sorted.contains(alice));
    assert_eq!(protocol.trove_manager.get_trove_owners_count(), 1);
    assert_eq!(protocol.trove_manager.get_trove_from_owners_array(0), Some(alice));
    assert_eq!(protocol.trove_manager.get_entire_system_coll(), dec(2));
    assert_eq!(protocol.trove_manager.get_entire_system_debt(), dec(110));
}

#[test]
fn open_trove_rejects_invalid_positions() {
    let mut protocol = Protocol::setup(200);
    let alice = protocol.account(1);
    protocol.env.set_caller(alice);

    assert_eq!(
        protocol.trove_manager.try_open_trove(U256::zero(), dec(100), None, None),
        Err(CdpError::ZeroCollateral.into())
    );
    assert_eq!(
        protocol.trove_manager.try_open_trove(dec(1), U256::zero(), None, None),
        Err(CdpError::ZeroDebt.into())
    );
    // 1 * 200 / 190 = 105%
    assert_eq!(
        protocol.trove_manager.try_open_trove(dec(1), dec(190), None, None),
        Err(CdpError::BelowMcr.into())
    );
    // 1 * 200 / 150 = 133%, fine for MCR but drags the system below CCR
    assert_eq!(
        protocol.trove_manager.try_open_trove(dec(1), dec(150), None, None),
        Err(CdpError::NewTcrBelowCcr.into())
    );
}

#[test]
fn one_trove_per_owner() {
    let mut protocol = Protocol::setup(200);
    let alice = protocol.account(1);
    protocol.open_trove(alice, dec(2), dec(100));

    protocol.env.set_caller(alice);
    assert_eq!(
        protocol.trove_manager.try_open_trove(dec(2), dec(100), None, None),
        Err(CdpError::TroveAlreadyActive.into())
    );
}

#[test]
fn recovery_mode_requires_ccr_to_open() {
    let mut protocol = Protocol::setup(200);
    let alice = protocol.account(1);
    let bob = protocol.account(2);
    // 160% at 200, 128% at 160
    protocol.open_trove(alice, dec(8), dec(1000));
    protocol.set_price(160);
    assert!(protocol.trove_manager.check_recovery_mode(protocol.price()));

    protocol.env.set_caller(bob);
    // 140% is below CCR
    assert_eq!(
        protocol.trove_manager.try_open_trove(dec(7), dec(800), None, None),
        Err(CdpError::BelowCcrInRecoveryMode.into())
    );

    protocol.open_trove(bob, dec(2), dec(200));
    assert!(protocol.is_active(bob));
}

#[test]
fn sorted_list_orders_by_nominal_icr() {
    let mut protocol = Protocol::setup(200);
    let alice = protocol.account(1);
    let bob = protocol.account(2);
    let carol = protocol.account(3);
    let dave = protocol.account(4);

    protocol.open_trove(alice, dec(3), dec(100));
    protocol.open_trove(bob, dec(1), dec(100));
    protocol.open_trove(carol, dec(2), dec(100));
    protocol.open_trove(dave, dec(2), dec(100));

    // equal ratios keep insertion order
    assert_eq!(protocol.sorted_ids(), vec![bob, carol, dave, alice]);
    assert_eq!(protocol.sorted.get_last(), Some(alice));
    assert_eq!(protocol.sorted.get_size(), 4);
    assert_eq!(protocol.sorted.get_nicr(bob), Some(dec(1)));
}

#[test]
fn scenario_recovery_mode_boundary_is_strict() {
    let mut protocol = Protocol::setup(300);
    let alice = protocol.account(1);
    let bob = protocol.account(2);
    // 225% each at 300
    protocol.open_trove(alice, dec(3), dec(400));
    protocol.open_trove(bob, dec(3), dec(400));

    protocol.set_price(200);
    assert_eq!(protocol.trove_manager.get_current_icr(alice, protocol.price()), cents(150));
    assert_eq!(protocol.trove_manager.get_tcr(protocol.price()), cents(150));
    assert!(!protocol.trove_manager.check_recovery_mode(protocol.price()));

    protocol.set_price(199);
    assert!(protocol.trove_manager.check_recovery_mode(protocol.price()));
}

#[test]
fn liquidator_incentive_is_frozen_once_troves_exist() {
    let mut protocol = Protocol::setup(200);
    let alice = protocol.account(1);
    protocol.open_trove(alice, dec(2), dec(100));

    assert_eq!(
        protocol.trove_manager.try_set_liquidator_incentive(LiquidatorIncentive::default()),
        Err(CdpError::InvalidConfig.into())
    );
}

#[test]
fn addresses_can_only_be_wired_once() {
    let mut protocol = Protocol::setup(200);
    let addresses = protocol.trove_manager.get_addresses().unwrap();
    assert_eq!(
        protocol.trove_manager.try_set_addresses(addresses),
        Err(CdpError::AddressesAlreadySet.into())
    );
}

/// alice is redistributed over bob and carol, who hold equal stakes
fn redistribute_over_two() -> (Protocol, odra::prelude::Address, odra::prelude::Address) {
    let mut protocol = Protocol::setup(200);
    let alice = protocol.account(1);
    let bob = protocol.account(2);
    let carol = protocol.account(3);
    protocol.open_trove(carol, dec(10), dec(500));
    protocol.open_trove(bob, dec(10), dec(1000));
    protocol.open_trove(alice, dec(1), dec(150));

    // alice at 106%, system at 203%
    protocol.set_price(160);
    protocol.trove_manager.liquidate(alice);
    (protocol, bob, carol)
}

#[test]
fn redistribution_accrues_pending_rewards() {
    let (protocol, bob, carol) = redistribute_over_two();

    // 0.995 collateral and 150 debt split over 20 units of stake
    let index = protocol.trove_manager.get_reward_index();
    assert_eq!(index.collateral, U256::from(49_750_000_000_000_000u64));
    assert_eq!(index.debt, cents(750));

    let expected = PendingRewards {
        collateral: U256::from(497_500_000_000_000_000u64),
        debt: dec(75),
    };
    assert_eq!(protocol.trove_manager.get_pending_rewards(bob), expected);
    assert_eq!(protocol.trove_manager.get_pending_rewards(carol), expected);
    assert!(protocol.trove_manager.has_pending_rewards(bob));

    let entire = protocol.trove_manager.get_entire_debt_and_coll(bob);
    assert_eq!(entire.debt, dec(1075));
    assert_eq!(entire.collateral, dec(10) + expected.collateral);

    let default_pool = protocol.trove_manager.get_default_pool();
    assert_eq!(default_pool.collateral, U256::from(995_000_000_000_000_000u64));
    assert_eq!(default_pool.debt, dec(150));
}

#[test]
fn apply_pending_rewards_is_idempotent() {
    let (mut protocol, bob, _) = redistribute_over_two();

    protocol.trove_manager.apply_pending_rewards(bob);
    let first = protocol.trove_manager.get_trove(bob);
    let first_snapshot = protocol.trove_manager.get_reward_snapshot(bob);

    protocol.trove_manager.apply_pending_rewards(bob);
    assert_eq!(protocol.trove_manager.get_trove(bob), first);
    assert_eq!(protocol.trove_manager.get_reward_snapshot(bob), first_snapshot);

    assert_eq!(first.debt, dec(1075));
    assert_eq!(first.collateral, U256::from(10_497_500_000_000_000_000u128));
    assert!(!protocol.trove_manager.has_pending_rewards(bob));
    assert_eq!(first_snapshot, protocol.trove_manager.get_reward_index());

    // carol's share is still waiting
    let default_pool = protocol.trove_manager.get_default_pool();
    assert_eq!(default_pool.debt, dec(75));
    assert_eq!(default_pool.collateral, U256::from(497_500_000_000_000_000u64));
}

#[test]
fn apply_pending_rewards_requires_active_trove() {
    let (mut protocol, _, _) = redistribute_over_two();
    let alice = protocol.account(1);
    assert_eq!(
        protocol.trove_manager.try_apply_pending_rewards(alice),
        Err(CdpError::TroveNotActive.into())
    );
}

#[test]
fn new_stake_uses_system_snapshots() {
    let (mut protocol, _, _) = redistribute_over_two();
    let dave = protocol.account(4);

    let snapshots = protocol.trove_manager.get_system_snapshots();
    assert_eq!(snapshots.total_stakes, dec(20));
    assert_eq!(snapshots.total_collateral, U256::from(20_995_000_000_000_000_000u128));

    protocol.open_trove(dave, dec(5), dec(200));
    let expected = dec(5) * dec(20) / U256::from(20_995_000_000_000_000_000u128);
    assert_eq!(protocol.trove_manager.get_trove(dave).stake, expected);
    assert_eq!(protocol.trove_manager.get_total_stakes(), dec(20) + expected);
}
