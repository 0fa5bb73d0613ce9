//! Stablecoin Contract
//!
//! CEP-18 compatible USD stablecoin. Balances are mirrored into the standard
//! CEP-18 named keys and dictionaries so wallets can read them.
//! Only protocol contracts (trove manager, stability pool) can mint, burn or
//! move balances on a holder's behalf.

use odra::prelude::*;
use odra::casper_types::{U256, Key};
use odra::casper_types::bytesrepr::ToBytes;
use crate::errors::CdpError;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

const TOKEN_NAME: &str = "Stake USD";
const TOKEN_SYMBOL: &str = "SUSD";
const TOKEN_DECIMALS: u8 = 18;
const CEP18_NAME_KEY: &str = "name";
const CEP18_SYMBOL_KEY: &str = "symbol";
const CEP18_DECIMALS_KEY: &str = "decimals";
const CEP18_TOTAL_SUPPLY_KEY: &str = "total_supply";
const CEP18_BALANCES_DICT: &str = "balances";
const CEP18_ALLOWANCES_DICT: &str = "allowances";

/// Stablecoin Contract
#[odra::module]
pub struct Stablecoin {
    /// Total supply
    total_supply: Var<U256>,
    /// Balance mapping
    balances: Mapping<Address, U256>,
    /// Allowance mapping (owner, spender)
    allowances: Mapping<(Address, Address), U256>,
    /// Admin (deployer), manages protocol contracts
    admin: Var<Address>,
    /// Protocol contracts allowed to mint/burn/move
    protocol_contracts: Mapping<Address, bool>,
}

#[odra::module]
impl Stablecoin {
    /// Initialize the stablecoin
    pub fn init(&mut self) {
        self.admin.set(self.env().caller());
        self.total_supply.set(U256::zero());
        self.env().init_dictionary(CEP18_BALANCES_DICT);
        self.env().init_dictionary(CEP18_ALLOWANCES_DICT);
        self.env().set_named_value(CEP18_NAME_KEY, String::from(TOKEN_NAME));
        self.env().set_named_value(CEP18_SYMBOL_KEY, String::from(TOKEN_SYMBOL));
        self.env().set_named_value(CEP18_DECIMALS_KEY, TOKEN_DECIMALS);
        self.env().set_named_value(CEP18_TOTAL_SUPPLY_KEY, U256::zero());
    }

    // ========== CEP-18 Standard Functions ==========

    pub fn name(&self) -> String {
        String::from(TOKEN_NAME)
    }

    pub fn symbol(&self) -> String {
        String::from(TOKEN_SYMBOL)
    }

    pub fn decimals(&self) -> u8 {
        TOKEN_DECIMALS
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply.get_or_default()
    }

    pub fn balance_of(&self, account: Address) -> U256 {
        self.balances.get(&account).unwrap_or_default()
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances.get(&(owner, spender)).unwrap_or_default()
    }

    pub fn transfer(&mut self, recipient: Address, amount: U256) -> bool {
        let sender = self.env().caller();
        self.transfer_internal(sender, recipient, amount);
        true
    }

    pub fn approve(&mut self, spender: Address, amount: U256) -> bool {
        let owner = self.env().caller();
        self.approve_internal(owner, spender, amount);
        true
    }

    /// Transfer on the owner's behalf (requires allowance)
    pub fn transfer_from(&mut self, owner: Address, recipient: Address, amount: U256) -> bool {
        let spender = self.env().caller();

        let current_allowance = self.allowance(owner, spender);
        if current_allowance < amount {
            self.env().revert(CdpError::InsufficientAllowance);
        }

        self.transfer_internal(owner, recipient, amount);
        self.approve_internal(owner, spender, current_allowance - amount);
        true
    }

    // ========== Protocol Functions (Restricted) ==========

    /// Mint new tokens (protocol contracts only)
    pub fn mint(&mut self, to: Address, amount: U256) {
        self.require_protocol();

        let new_balance = self.balance_of(to) + amount;
        self.balances.set(&to, new_balance);
        self.set_balance_cep18(to, new_balance);

        let new_supply = self.total_supply() + amount;
        self.total_supply.set(new_supply);
        self.set_total_supply_cep18(new_supply);
    }

    /// Burn tokens from an account (protocol contracts only)
    pub fn burn_from(&mut self, from: Address, amount: U256) {
        self.require_protocol();
        self.burn_from_internal(from, amount);
    }

    /// Move tokens between accounts (protocol contracts only)
    ///
    /// Used by the stability pool to take in and pay out deposits.
    pub fn protocol_transfer(&mut self, from: Address, to: Address, amount: U256) {
        self.require_protocol();
        self.transfer_internal(from, to, amount);
    }

    // ========== Admin Functions ==========

    pub fn add_protocol_contract(&mut self, contract_address: Address) {
        self.require_admin();
        self.protocol_contracts.set(&contract_address, true);
    }

    pub fn remove_protocol_contract(&mut self, contract_address: Address) {
        self.require_admin();
        self.protocol_contracts.set(&contract_address, false);
    }

    pub fn is_protocol_contract(&self, account: Address) -> bool {
        self.protocol_contracts.get(&account).unwrap_or(false)
    }

    // ========== Internal Functions ==========

    fn transfer_internal(&mut self, from: Address, to: Address, amount: U256) {
        let from_balance = self.balance_of(from);
        if from_balance < amount {
            self.env().revert(CdpError::InsufficientTokenBalance);
        }

        let new_from_balance = from_balance - amount;
        self.balances.set(&from, new_from_balance);
        self.set_balance_cep18(from, new_from_balance);

        let new_to_balance = self.balance_of(to) + amount;
        self.balances.set(&to, new_to_balance);
        self.set_balance_cep18(to, new_to_balance);
    }

    fn approve_internal(&mut self, owner: Address, spender: Address, amount: U256) {
        self.allowances.set(&(owner, spender), amount);
        self.set_allowance_cep18(owner, spender, amount);
    }

    fn burn_from_internal(&mut self, from: Address, amount: U256) {
        let current_balance = self.balance_of(from);
        if current_balance < amount {
            self.env().revert(CdpError::InsufficientTokenBalance);
        }

        let new_balance = current_balance - amount;
        self.balances.set(&from, new_balance);
        self.set_balance_cep18(from, new_balance);

        let new_supply = self.total_supply() - amount;
        self.total_supply.set(new_supply);
        self.set_total_supply_cep18(new_supply);
    }

    fn set_balance_cep18(&self, owner: Address, amount: U256) {
        let key = balance_key(owner);
        self.env().set_dictionary_value(CEP18_BALANCES_DICT, key.as_bytes(), amount);
    }

    fn set_allowance_cep18(&self, owner: Address, spender: Address, amount: U256) {
        let key = allowance_key(owner, spender);
        self.env().set_dictionary_value(CEP18_ALLOWANCES_DICT, key.as_bytes(), amount);
    }

    fn set_total_supply_cep18(&self, amount: U256) {
        self.env().set_named_value(CEP18_TOTAL_SUPPLY_KEY, amount);
    }

    fn require_protocol(&self) {
        if !self.is_protocol_contract(self.env().caller()) {
            self.env().revert(CdpError::UnauthorizedProtocol);
        }
    }

    fn require_admin(&self) {
        if self.admin.get() != Some(self.env().caller()) {
            self.env().revert(CdpError::Unauthorized);
        }
    }
}

/// CEP-18 balance dictionary key: base64 of the serialized `Key`
fn balance_key(owner: Address) -> String {
    let bytes = Key::from(owner).to_bytes().unwrap_or_default();
    BASE64_STANDARD.encode(bytes)
}

/// CEP-18 allowance dictionary key: base64 of owner key bytes followed by spender key bytes
fn allowance_key(owner: Address, spender: Address) -> String {
    let mut bytes = Key::from(owner).to_bytes().unwrap_or_default();
    bytes.extend_from_slice(&Key::from(spender).to_bytes().unwrap_or_default());
    BASE64_STANDARD.encode(bytes)
}
