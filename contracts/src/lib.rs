//! Stake-CDP Contracts
//!
//! Liquidation and solvency engine of a Liquity-style CDP protocol on Casper.
//!
//! ## Architecture
//!
//! - **TroveManager**: Troves, system pools, redistribution index and liquidations
//! - **SortedTroves**: Troves ordered by nominal ICR, riskiest first
//! - **StabilityPool**: Absorbs liquidated debt, pays collateral gains (product-sum)
//! - **CollSurplusPool**: Escrow for capped recovery-mode liquidation surplus
//! - **PriceFeed**: Primary/secondary oracle state machine with last good price
//! - **Stablecoin**: Protocol stablecoin with protocol-only mint/burn
//!
//! Pure math lives in `math`, `rewards` and `liquidation` and is unit tested
//! without a contract environment.
//!
//! ## Recovery Mode
//!
//! When TCR drops below CCR (150%):
//! - Opening a trove requires ICR >= CCR
//! - Troves below TCR may be liquidated with collateral capped at MCR

#![cfg_attr(target_arch = "wasm32", no_std)]

#[cfg(target_arch = "wasm32")]
extern crate alloc;

// Re-export odra for downstream usage
pub use odra;

// Core module declarations
pub mod math;
pub mod types;
pub mod errors;
pub mod events;
pub mod interfaces;
pub mod rewards;
pub mod liquidation;

// Contract modules
pub mod price_feed;
pub mod sorted_troves;
pub mod stablecoin;
pub mod stability_pool;
pub mod coll_surplus_pool;
pub mod trove_manager;
