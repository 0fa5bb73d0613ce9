//! Redistribution reward accumulator.
//!
//! A redistribution spreads debt and collateral over every active trove in
//! proportion to its stake without touching the troves. Two global indices
//! (`L_collateral`, `L_debt`) grow by the amount per unit of stake; each trove
//! keeps a snapshot of the indices from its last update, so its pending share
//! is `stake * (L - snapshot)`.
//!
//! The functions here are pure. `TroveManager` owns the storage.

use odra::casper_types::U256;
use crate::math::decimal_precision;
use crate::types::{PendingRewards, RewardIndex, SystemSnapshots, Trove, TroveStatus};

/// Rewards earned by `stake` since `snapshot` was taken.
pub fn pending_rewards(stake: U256, snapshot: &RewardIndex, index: &RewardIndex) -> PendingRewards {
    if stake.is_zero() {
        return PendingRewards::default();
    }
    PendingRewards {
        collateral: stake * (index.collateral - snapshot.collateral) / decimal_precision(),
        debt: stake * (index.debt - snapshot.debt) / decimal_precision(),
    }
}

/// Folds pending rewards into an active trove and advances its snapshot.
///
/// Returns the updated trove, the new snapshot and the amounts applied.
/// Inactive troves come back unchanged with nothing applied.
pub fn apply_pending(
    trove: &Trove,
    snapshot: &RewardIndex,
    index: &RewardIndex,
) -> (Trove, RewardIndex, PendingRewards) {
    if trove.status != TroveStatus::Active {
        return (trove.clone(), *snapshot, PendingRewards::default());
    }

    let pending = pending_rewards(trove.stake, snapshot, index);
    let mut updated = trove.clone();
    updated.collateral = updated.collateral + pending.collateral;
    updated.debt = updated.debt + pending.debt;
    (updated, *index, pending)
}

/// Per-unit increments produced by one redistribution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Redistribution {
    /// Added to `L_collateral` / `L_debt`
    pub per_unit_staked: RewardIndex,
    /// Truncation remainders carried into the next redistribution
    pub errors: RewardIndex,
}

/// Splits `debt` and `collateral` over `total_stakes`, carrying the
/// truncation error of the previous call.
///
/// `None` when there is no debt to spread or no stake to absorb it.
pub fn redistribution(
    debt: U256,
    collateral: U256,
    total_stakes: U256,
    last_errors: &RewardIndex,
) -> Option<Redistribution> {
    if debt.is_zero() || total_stakes.is_zero() {
        return None;
    }

    let coll_numerator = collateral * decimal_precision() + last_errors.collateral;
    let debt_numerator = debt * decimal_precision() + last_errors.debt;

    let coll_per_unit = coll_numerator / total_stakes;
    let debt_per_unit = debt_numerator / total_stakes;

    Some(Redistribution {
        per_unit_staked: RewardIndex {
            collateral: coll_per_unit,
            debt: debt_per_unit,
        },
        errors: RewardIndex {
            collateral: coll_numerator - coll_per_unit * total_stakes,
            debt: debt_numerator - debt_per_unit * total_stakes,
        },
    })
}

/// Stake for `collateral` given the snapshots of the last liquidation.
///
/// Stake equals collateral before any liquidation, and again once the last
/// stake has been liquidated away.
pub fn compute_new_stake(collateral: U256, snapshots: &SystemSnapshots) -> U256 {
    if snapshots.total_stakes.is_zero() || snapshots.total_collateral.is_zero() {
        return collateral;
    }
    collateral * snapshots.total_stakes / snapshots.total_collateral
}
