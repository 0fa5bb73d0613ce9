use odra::casper_types::U256;
use odra::host::HostRef;
use odra::prelude::*;
use pretty_assertions::assert_eq;
use stake_cdp_contracts::errors::CdpError;
use stake_cdp_contracts::types::{RewardIndex, TroveStatus};

use crate::fixture::{cents, dec, Protocol};

/// Active troves and sorted list membership agree
fn assert_index_matches_status(protocol: &Protocol, accounts: &[Address]) {
    for account in accounts {
        assert_eq!(
            protocol.is_active(*account),
            protocol.sorted.contains(*account),
            "status and list disagree for {:?}",
            account
        );
    }
}

/// Sum of active stakes equals the stake snapshot
fn assert_stakes_match_snapshot(protocol: &Protocol, accounts: &[Address]) {
    let total = accounts
        .iter()
        .filter(|account| protocol.is_active(**account))
        .fold(U256::zero(), |sum, account| sum + protocol.trove_manager.get_trove(*account).stake);
    assert_eq!(total, protocol.trove_manager.get_system_snapshots().total_stakes);
    assert_eq!(total, protocol.trove_manager.get_total_stakes());
}

/// victim: 250 debt, 120% at price 100; whale keeps the system in recovery
/// at ~129% and funds the pool with `deposit`
fn capped_band_setup(deposit: u64) -> (Protocol, Address, Address) {
    let mut protocol = Protocol::setup(200);
    let whale = protocol.account(1);
    let victim = protocol.account(2);
    protocol.open_trove(whale, dec(8), dec(600));
    protocol.open_trove(victim, dec(3), dec(250));
    protocol.deposit(whale, dec(deposit));

    protocol.set_price(100);
    assert!(protocol.trove_manager.check_recovery_mode(protocol.price()));
    assert_eq!(protocol.trove_manager.get_current_icr(victim, protocol.price()), cents(120));
    (protocol, whale, victim)
}

#[test]
fn scenario_recovery_below_100_percent_redistributes_everything() {
    let mut protocol = Protocol::setup(200);
    let alice = protocol.account(1);
    let liquidator = protocol.account(9);
    protocol.open_trove(alice, dec(1), dec(100));

    // ICR 75%, recovery mode, empty stability pool
    protocol.set_price(75);
    assert!(protocol.trove_manager.check_recovery_mode(protocol.price()));

    protocol.env.set_caller(liquidator);
    let totals = protocol.trove_manager.liquidate(alice);

    assert_eq!(totals.troves_liquidated, 1);
    assert_eq!(totals.debt_offset, U256::zero());
    assert_eq!(totals.debt_redistributed, dec(100));
    assert_eq!(totals.coll_redistributed, cents(995) / U256::from(10u64));
    assert_eq!(totals.coll_surplus, U256::zero());
    assert_eq!(protocol.trove_manager.get_trove_status(alice), TroveStatus::ClosedByLiquidation);
    assert_eq!(protocol.trove_manager.get_total_stakes(), U256::zero());
    assert_eq!(protocol.surplus_pool.get_collateral(alice), U256::zero());
    assert_eq!(protocol.stability_pool.get_collateral_balance(), U256::zero());

    // no stakes left to absorb it: parked in the default pool, index untouched
    assert_eq!(protocol.trove_manager.get_reward_index(), RewardIndex::default());
    let default_pool = protocol.trove_manager.get_default_pool();
    assert_eq!(default_pool.debt, dec(100));
    assert_eq!(default_pool.collateral, cents(995) / U256::from(10u64));

    // 0.5% of the collateral goes to the caller
    assert_eq!(protocol.collateral.balance_of(liquidator), cents(1) / U256::from(2u64));
    assert!(protocol.sorted.is_empty());
}

#[test]
fn scenario_capped_band_skipped_when_pool_too_small() {
    let (mut protocol, whale, victim) = capped_band_setup(100);
    let before = protocol.trove_manager.get_trove(victim);

    assert_eq!(
        protocol.trove_manager.try_liquidate(victim),
        Err(CdpError::NothingToLiquidate.into())
    );
    assert_eq!(protocol.trove_manager.get_trove(victim), before);
    assert!(protocol.sorted.contains(victim));
    assert_eq!(protocol.stability_pool.get_total_deposits(), dec(100));

    // the walk skips the victim and stops at the whale
    assert_eq!(
        protocol.trove_manager.try_liquidate_sequence(10),
        Err(CdpError::NothingToLiquidate.into())
    );
    assert!(protocol.is_active(victim));
    assert!(protocol.is_active(whale));
}

#[test]
fn scenario_capped_band_offsets_and_books_surplus() {
    let (mut protocol, whale, victim) = capped_band_setup(300);
    let liquidator = protocol.account(9);

    protocol.env.set_caller(liquidator);
    let totals = protocol.trove_manager.liquidate(victim);

    assert_eq!(totals.troves_liquidated, 1);
    assert_eq!(totals.debt_offset, dec(250));
    assert_eq!(totals.debt_redistributed, U256::zero());
    assert_eq!(totals.coll_redistributed, U256::zero());
    assert_eq!(protocol.trove_manager.get_reward_index(), RewardIndex::default());

    // capped at 250 * 1.1 / 100 = 2.75, the rest is the owner's
    assert_eq!(totals.coll_surplus, cents(25));
    assert_eq!(protocol.surplus_pool.get_collateral(victim), cents(25));
    assert_eq!(protocol.surplus_pool.get_total_collateral(), cents(25));

    // 0.5% of the capped amount to the caller, the rest to the pool
    let coll_gas = U256::from(13_750_000_000_000_000u64);
    assert_eq!(totals.coll_gas_compensation, coll_gas);
    assert_eq!(protocol.collateral.balance_of(liquidator), coll_gas);
    assert_eq!(protocol.stability_pool.get_collateral_balance(), cents(275) - coll_gas);
    assert_eq!(protocol.stability_pool.get_total_deposits(), dec(50));

    assert_eq!(protocol.trove_manager.get_trove_status(victim), TroveStatus::ClosedByLiquidation);
    assert_eq!(protocol.trove_manager.get_entire_system_coll(), dec(8));
    assert_eq!(protocol.trove_manager.get_entire_system_debt(), dec(600));
    assert_index_matches_status(&protocol, &[whale, victim]);
    assert_stakes_match_snapshot(&protocol, &[whale, victim]);
}

#[test]
fn surplus_is_claimable_once() {
    let (mut protocol, _, victim) = capped_band_setup(300);
    protocol.trove_manager.liquidate(victim);

    protocol.surplus_pool.claim_collateral(victim);
    assert_eq!(protocol.collateral.balance_of(victim), cents(25));
    assert_eq!(protocol.surplus_pool.get_collateral(victim), U256::zero());
    assert_eq!(protocol.surplus_pool.get_total_collateral(), U256::zero());

    assert_eq!(
        protocol.surplus_pool.try_claim_collateral(victim),
        Err(CdpError::NoCollateralAvailable.into())
    );
}

/// seven 100-debt troves at 102..130% under a whale, recovery mode at
/// price 100, 500 in the pool
fn ccr_restore_setup() -> (Protocol, Address, Vec<Address>) {
    let mut protocol = Protocol::setup(200);
    let whale = protocol.account(8);
    let ratios = [102u64, 105, 108, 115, 120, 125, 130];
    let troves: Vec<Address> = (1..=ratios.len()).map(|i| protocol.account(i)).collect();

    protocol.open_trove(whale, dec(31), dec(2000));
    for (trove, ratio) in troves.iter().zip(ratios.iter()) {
        // 100 debt, ratio% at price 100
        protocol.open_trove(*trove, cents(*ratio), dec(100));
    }
    protocol.deposit(whale, dec(500));
    assert_eq!(protocol.sorted_ids()[..7].to_vec(), troves);

    protocol.set_price(100);
    assert!(protocol.trove_manager.check_recovery_mode(protocol.price()));
    (protocol, whale, troves)
}

#[test]
fn scenario_sequence_stops_once_ccr_is_restored() {
    let (mut protocol, whale, troves) = ccr_restore_setup();

    let liquidator = protocol.account(9);
    protocol.env.set_caller(liquidator);
    let totals = protocol.trove_manager.liquidate_sequence(20);

    // three below MCR, then one capped before the TCR crosses 150%
    assert_eq!(totals.troves_liquidated, 4);
    assert_eq!(totals.debt_offset, dec(400));
    assert_eq!(totals.debt_redistributed, U256::zero());
    assert_eq!(totals.coll_surplus, cents(5));
    for trove in &troves[..4] {
        assert_eq!(protocol.trove_manager.get_trove_status(*trove), TroveStatus::ClosedByLiquidation);
    }
    for trove in &troves[4..] {
        assert!(protocol.is_active(*trove));
    }
    assert!(protocol.is_active(whale));

    let tcr = protocol.trove_manager.get_tcr(protocol.price());
    assert!(tcr >= cents(150));
    assert!(!protocol.trove_manager.check_recovery_mode(protocol.price()));
    assert_eq!(protocol.stability_pool.get_total_deposits(), dec(100));

    let mut everyone = troves.clone();
    everyone.push(whale);
    assert_index_matches_status(&protocol, &everyone);
    assert_stakes_match_snapshot(&protocol, &everyone);
    assert_eq!(protocol.trove_manager.get_trove_owners_count(), 4);
}

#[test]
fn list_rechecks_mode_after_each_trove() {
    let (mut protocol, whale, troves) = ccr_restore_setup();

    let liquidator = protocol.account(9);
    protocol.env.set_caller(liquidator);
    let totals = protocol.trove_manager.liquidate_list(troves.clone());

    // the 120% trove would be capped in recovery mode (debt 100, pool 100)
    // but the system is back in normal mode by the time it is examined
    assert_eq!(totals.troves_liquidated, 4);
    assert_eq!(totals.debt_offset, dec(400));
    assert_eq!(totals.coll_surplus, cents(5));
    assert!(!protocol.trove_manager.check_recovery_mode(protocol.price()));
    assert_eq!(protocol.stability_pool.get_total_deposits(), dec(100));
    for trove in &troves[4..] {
        assert!(protocol.is_active(*trove));
    }

    let mut everyone = troves.clone();
    everyone.push(whale);
    assert_index_matches_status(&protocol, &everyone);
    assert_stakes_match_snapshot(&protocol, &everyone);
}

#[test]
fn troves_opened_after_the_last_stake_share_redistributions() {
    let mut protocol = Protocol::setup(200);
    let alice = protocol.account(1);
    let bob = protocol.account(2);
    let carol = protocol.account(3);
    protocol.open_trove(alice, dec(1), dec(100));
    protocol.set_price(75);
    protocol.trove_manager.liquidate(alice);
    assert_eq!(protocol.trove_manager.get_total_stakes(), U256::zero());

    let unassigned = protocol.trove_manager.get_unassigned_rewards();
    assert_eq!(unassigned.debt, dec(100));
    assert_eq!(unassigned.collateral, cents(995) / U256::from(10u64));

    // 750% and 150% at 75
    protocol.open_trove(bob, dec(10), dec(100));
    protocol.open_trove(carol, dec(1), dec(50));
    assert_eq!(protocol.trove_manager.get_trove(bob).stake, dec(10));
    assert_eq!(protocol.trove_manager.get_trove(carol).stake, dec(1));
    assert_eq!(protocol.trove_manager.get_total_stakes(), dec(11));

    // carol at 80%, system at 192%
    protocol.set_price(40);
    protocol.trove_manager.liquidate(carol);

    // carol's 50 / 0.995 plus alice's unassigned 100 / 0.995, all on bob
    let index = protocol.trove_manager.get_reward_index();
    assert_eq!(index.debt, dec(15));
    assert_eq!(index.collateral, cents(199) / U256::from(10u64));
    assert_eq!(protocol.trove_manager.get_unassigned_rewards().debt, U256::zero());

    let pending = protocol.trove_manager.get_pending_rewards(bob);
    assert_eq!(pending.debt, dec(150));
    assert_eq!(pending.collateral, cents(199));

    protocol.trove_manager.apply_pending_rewards(bob);
    let default_pool = protocol.trove_manager.get_default_pool();
    assert_eq!(default_pool.debt, U256::zero());
    assert_eq!(default_pool.collateral, U256::zero());
    assert_eq!(protocol.trove_manager.get_trove(bob).debt, dec(250));
}

#[test]
fn sorted_order_follows_live_ratios_after_redistribution() {
    let mut protocol = Protocol::setup(200);
    let whale = protocol.account(1);
    let alice = protocol.account(2);
    let victim = protocol.account(3);
    let dave = protocol.account(4);
    protocol.open_trove(whale, dec(20), dec(1000));
    protocol.open_trove(alice, dec(1), dec(100));
    protocol.open_trove(victim, dec(1), dec(150));

    // victim at 100%, redistributed over whale and alice
    protocol.set_price(150);
    protocol.trove_manager.liquidate(victim);

    // 0.990 nominal, above alice's 0.977 once her pending rewards count
    protocol.open_trove(dave, dec(1), dec(101));
    let ids = protocol.sorted_ids();
    assert_eq!(ids, vec![alice, dave, whale]);
    let nicrs: Vec<U256> = ids
        .iter()
        .map(|id| protocol.trove_manager.get_nominal_icr(*id))
        .collect();
    assert!(nicrs.windows(2).all(|pair| pair[0] <= pair[1]));

    // alice 109.5%, dave 110.9%: the walk reaches alice first
    protocol.set_price(112);
    let totals = protocol.trove_manager.liquidate_sequence(10);
    assert_eq!(totals.troves_liquidated, 1);
    assert!(!protocol.is_active(alice));
    assert!(protocol.is_active(dave));
    assert!(protocol.is_active(whale));
}

#[test]
fn sequence_honours_max_count() {
    let mut protocol = Protocol::setup(200);
    let whale = protocol.account(1);
    let alice = protocol.account(2);
    let bob = protocol.account(3);
    protocol.open_trove(whale, dec(20), dec(1000));
    protocol.open_trove(alice, dec(1), dec(100));
    protocol.open_trove(bob, dec(1), dec(100));

    // alice and bob at 105%, system at 192%
    protocol.set_price(105);
    let totals = protocol.trove_manager.liquidate_sequence(1);

    assert_eq!(totals.troves_liquidated, 1);
    assert!(!protocol.is_active(alice));
    assert!(protocol.is_active(bob));

    assert_eq!(
        protocol.trove_manager.try_liquidate_sequence(0),
        Err(CdpError::NothingToLiquidate.into())
    );
}

#[test]
fn list_skips_inactive_duplicate_and_healthy_troves() {
    let mut protocol = Protocol::setup(200);
    let whale = protocol.account(1);
    let alice = protocol.account(2);
    let stranger = protocol.account(3);
    protocol.open_trove(whale, dec(20), dec(1000));
    protocol.open_trove(alice, dec(1), dec(100));

    protocol.set_price(105);
    let totals = protocol
        .trove_manager
        .liquidate_list(vec![stranger, alice, alice, whale]);

    assert_eq!(totals.troves_liquidated, 1);
    assert_eq!(totals.total_debt, dec(100));
    assert_eq!(totals.total_collateral, dec(1));
    assert!(!protocol.is_active(alice));
    assert!(protocol.is_active(whale));
}

#[test]
fn healthy_batch_reverts_atomically() {
    let mut protocol = Protocol::setup(200);
    let alice = protocol.account(1);
    let bob = protocol.account(2);
    protocol.open_trove(alice, dec(2), dec(100));
    protocol.open_trove(bob, dec(3), dec(100));
    let alice_before = protocol.trove_manager.get_trove(alice);
    let active_before = protocol.trove_manager.get_active_pool();

    assert_eq!(
        protocol.trove_manager.try_liquidate_list(vec![alice, bob]),
        Err(CdpError::NothingToLiquidate.into())
    );
    assert_eq!(
        protocol.trove_manager.try_liquidate(alice),
        Err(CdpError::NothingToLiquidate.into())
    );
    assert_eq!(protocol.trove_manager.get_trove(alice), alice_before);
    assert_eq!(protocol.trove_manager.get_active_pool(), active_before);
    assert_eq!(protocol.sorted.get_size(), 2);
}

#[test]
fn liquidating_closed_trove_fails() {
    let mut protocol = Protocol::setup(200);
    let alice = protocol.account(1);
    assert_eq!(
        protocol.trove_manager.try_liquidate(alice),
        Err(CdpError::TroveNotActive.into())
    );
}

#[test]
fn liquidator_receives_debt_reserve() {
    let mut protocol = Protocol::setup_with_reserve(200, dec(10));
    let whale = protocol.account(1);
    let alice = protocol.account(2);
    let liquidator = protocol.account(9);
    protocol.open_trove(whale, dec(20), dec(1000));
    // 1 * 200 / 110 = 181%, 105 / 110 = 95% after the drop
    protocol.open_trove(alice, dec(1), dec(100));

    protocol.set_price(105);
    protocol.env.set_caller(liquidator);
    let totals = protocol.trove_manager.liquidate(alice);

    assert_eq!(totals.debt_gas_compensation, dec(10));
    assert_eq!(totals.total_debt, dec(110));
    assert_eq!(protocol.stablecoin.balance_of(liquidator), dec(10));
    assert_eq!(
        protocol.stablecoin.balance_of(protocol.trove_manager.address().clone()),
        dec(10)
    );
}

#[test]
fn closing_swaps_last_owner_into_freed_slot() {
    let mut protocol = Protocol::setup(200);
    let whale = protocol.account(1);
    let alice = protocol.account(2);
    let bob = protocol.account(3);
    protocol.open_trove(alice, dec(1), dec(100));
    protocol.open_trove(whale, dec(20), dec(1000));
    protocol.open_trove(bob, dec(2), dec(100));

    protocol.set_price(105);
    protocol.trove_manager.liquidate(alice);

    assert_eq!(protocol.trove_manager.get_trove_owners_count(), 2);
    assert_eq!(protocol.trove_manager.get_trove_from_owners_array(0), Some(bob));
    assert_eq!(protocol.trove_manager.get_trove(bob).array_index, 0);
    assert_eq!(protocol.trove_manager.get_trove_from_owners_array(2), None);

    let closed = protocol.trove_manager.get_trove(alice);
    assert_eq!(closed.debt, U256::zero());
    assert_eq!(closed.collateral, U256::zero());
    assert_eq!(closed.stake, U256::zero());
    assert_eq!(protocol.trove_manager.get_reward_snapshot(alice), RewardIndex::default());
}

#[test]
fn protocol_entry_points_reject_outsiders() {
    let mut protocol = Protocol::setup(200);
    let outsider = protocol.account(5);
    protocol.env.set_caller(outsider);

    assert_eq!(
        protocol.stability_pool.try_offset(dec(1), dec(1)),
        Err(CdpError::UnauthorizedProtocol.into())
    );
    assert_eq!(
        protocol.surplus_pool.try_account_surplus(outsider, dec(1)),
        Err(CdpError::UnauthorizedProtocol.into())
    );
    assert_eq!(
        protocol.sorted.try_insert(outsider, dec(1), None, None),
        Err(CdpError::UnauthorizedProtocol.into())
    );
    assert_eq!(
        protocol.stablecoin.try_mint(outsider, dec(1)),
        Err(CdpError::UnauthorizedProtocol.into())
    );
}
