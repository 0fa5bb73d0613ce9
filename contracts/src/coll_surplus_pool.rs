//! Collateral Surplus Pool Contract
//!
//! Escrows collateral left over when a trove is liquidated at a capped
//! amount in recovery mode. The owner claims it back at any time.

use odra::prelude::*;
use odra::casper_types::U256;
use odra::ContractRef;
use crate::errors::CdpError;
use crate::events::{CollBalanceUpdated, CollateralClaimed};
use crate::interfaces::Cep18ContractRef;

/// Collateral Surplus Pool Contract
#[odra::module(events = [CollBalanceUpdated, CollateralClaimed])]
pub struct CollSurplusPool {
    /// Admin (deployer)
    admin: Var<Address>,
    /// Trove manager, the only account allowed to book surplus
    trove_manager: Var<Address>,
    /// Collateral token contract
    collateral_token: Var<Address>,
    /// Claimable collateral per owner
    balances: Mapping<Address, U256>,
    /// Collateral held by the pool
    total_collateral: Var<U256>,
}

#[odra::module]
impl CollSurplusPool {
    pub fn init(&mut self) {
        self.admin.set(self.env().caller());
        self.total_collateral.set(U256::zero());
    }

    /// Wire collaborators (admin only, once)
    pub fn set_addresses(&mut self, trove_manager: Address, collateral_token: Address) {
        if self.admin.get() != Some(self.env().caller()) {
            self.env().revert(CdpError::Unauthorized);
        }
        if self.trove_manager.get().is_some() {
            self.env().revert(CdpError::AddressesAlreadySet);
        }
        self.trove_manager.set(trove_manager);
        self.collateral_token.set(collateral_token);
    }

    /// Credit `amount` to `owner` (trove manager only).
    ///
    /// The collateral must already have been transferred to the pool.
    pub fn account_surplus(&mut self, owner: Address, amount: U256) {
        if self.trove_manager.get() != Some(self.env().caller()) {
            self.env().revert(CdpError::UnauthorizedProtocol);
        }

        let balance = self.get_collateral(owner) + amount;
        self.balances.set(&owner, balance);
        self.total_collateral.set(self.get_total_collateral() + amount);
        self.env().emit_event(CollBalanceUpdated { owner, balance });
    }

    /// Pay `owner` their whole surplus
    pub fn claim_collateral(&mut self, owner: Address) {
        let amount = self.get_collateral(owner);
        if amount.is_zero() {
            self.env().revert(CdpError::NoCollateralAvailable);
        }

        self.balances.set(&owner, U256::zero());
        self.total_collateral.set(self.get_total_collateral() - amount);
        self.env().emit_event(CollBalanceUpdated { owner, balance: U256::zero() });

        let token = match self.collateral_token.get() {
            Some(token) => token,
            None => self.env().revert(CdpError::AddressesNotSet),
        };
        if !Cep18ContractRef::new(self.env().clone(), token).transfer(owner, amount) {
            self.env().revert(CdpError::TokenTransferFailed);
        }
        self.env().emit_event(CollateralClaimed { owner, amount });
    }

    // ========== Query Functions ==========

    pub fn get_collateral(&self, owner: Address) -> U256 {
        self.balances.get(&owner).unwrap_or_default()
    }

    pub fn get_total_collateral(&self) -> U256 {
        self.total_collateral.get_or_default()
    }
}
