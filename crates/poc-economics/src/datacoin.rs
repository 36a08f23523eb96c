//! # DataCoin
//!
//! Capped-supply reward token with the ERC-20 surface.
//!
//! ## Roles
//!
//! - **Owner**: manages the minter and burner sets and may mint and burn itself
//! - **Minter**: may mint up to `MAX_SUPPLY`
//! - **Burner**: may burn from any account holding enough balance
//!
//! Each call takes the sender as its first argument and runs under a single
//! write lock. A failed call leaves balances, supply and the event log as
//! they were.

use crate::constants::*;
use parking_lot::RwLock;
use poc_core::{serde_amount, Address, Balance};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Reason recorded by `burn_self`
pub const SELF_BURN_REASON: &str = "Self burn";

/// Token event log entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum TokenEvent {
    Transfer {
        from: Address,
        to: Address,
        #[serde(with = "serde_amount")]
        amount: Balance,
    },
    Approval {
        owner: Address,
        spender: Address,
        #[serde(with = "serde_amount")]
        amount: Balance,
    },
    TokensMinted {
        to: Address,
        #[serde(with = "serde_amount")]
        amount: Balance,
        reason: String,
    },
    TokensBurned {
        from: Address,
        #[serde(with = "serde_amount")]
        amount: Balance,
        reason: String,
    },
    MinterAdded { minter: Address },
    MinterRemoved { minter: Address },
    BurnerAdded { burner: Address },
    BurnerRemoved { burner: Address },
    OwnershipTransferred { previous_owner: Address, new_owner: Address },
}

/// Complete token state, also the snapshot format
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenState {
    pub owner: Address,
    pub balances: HashMap<Address, Balance>,
    pub allowances: HashMap<Address, HashMap<Address, Balance>>,
    pub minters: HashSet<Address>,
    pub burners: HashSet<Address>,
    pub total_supply: Balance,
    pub events: Vec<TokenEvent>,
}

impl TokenState {
    fn is_minter(&self, account: &Address) -> bool {
        self.minters.contains(account) || *account == self.owner
    }

    fn is_burner(&self, account: &Address) -> bool {
        self.burners.contains(account) || *account == self.owner
    }

    fn only_owner(&self, caller: &Address) -> Result<(), TokenError> {
        if *caller != self.owner {
            return Err(TokenError::OwnableUnauthorizedAccount(*caller));
        }
        Ok(())
    }

    fn balance(&self, account: &Address) -> Balance {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn debit(&mut self, from: &Address, amount: Balance) {
        let balance = self.balance(from);
        self.balances.insert(*from, balance - amount);
    }

    fn credit(&mut self, to: &Address, amount: Balance) {
        *self.balances.entry(*to).or_insert(0) += amount;
    }

    fn move_balance(&mut self, from: Address, to: Address, amount: Balance) -> Result<(), TokenError> {
        if from.is_zero() {
            return Err(TokenError::ERC20InvalidSender(from));
        }
        if to.is_zero() {
            return Err(TokenError::ERC20InvalidReceiver(to));
        }

        let balance = self.balance(&from);
        if balance < amount {
            return Err(TokenError::ERC20InsufficientBalance {
                sender: from,
                balance,
                needed: amount,
            });
        }

        self.debit(&from, amount);
        self.credit(&to, amount);
        self.events.push(TokenEvent::Transfer { from, to, amount });
        Ok(())
    }
}

/// DataCoin ledger
#[derive(Debug)]
pub struct DataCoin {
    state: RwLock<TokenState>,
}

impl DataCoin {
    /// Deploy with zero supply; `owner` is implicitly minter and burner
    pub fn new(owner: Address) -> Self {
        Self {
            state: RwLock::new(TokenState {
                owner,
                ..Default::default()
            }),
        }
    }

    /// Restore from a snapshot
    pub fn from_snapshot(state: TokenState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Copy of the full state
    pub fn snapshot(&self) -> TokenState {
        self.state.read().clone()
    }

    pub fn name(&self) -> &'static str {
        NAME
    }

    pub fn symbol(&self) -> &'static str {
        SYMBOL
    }

    pub fn decimals(&self) -> u8 {
        DECIMALS
    }

    pub fn owner(&self) -> Address {
        self.state.read().owner
    }

    /// Mint new tokens
    pub fn mint(&self, caller: Address, to: Address, amount: Balance, reason: &str) -> Result<(), TokenError> {
        let mut state = self.state.write();

        if !state.is_minter(&caller) {
            return Err(TokenError::NotAuthorizedMinter);
        }
        if to.is_zero() {
            return Err(TokenError::MintToZeroAddress);
        }
        if amount == 0 {
            return Err(TokenError::ZeroAmount);
        }

        let new_supply = state
            .total_supply
            .checked_add(amount)
            .filter(|supply| *supply <= MAX_SUPPLY)
            .ok_or(TokenError::ExceedsMaxSupply)?;

        state.total_supply = new_supply;
        state.credit(&to, amount);
        state.events.push(TokenEvent::Transfer {
            from: Address::ZERO,
            to,
            amount,
        });
        state.events.push(TokenEvent::TokensMinted {
            to,
            amount,
            reason: reason.to_string(),
        });

        tracing::info!(%to, amount, reason, "DataCoin minted");
        Ok(())
    }

    /// Burn tokens from an account
    pub fn burn(&self, caller: Address, from: Address, amount: Balance, reason: &str) -> Result<(), TokenError> {
        let mut state = self.state.write();

        if !state.is_burner(&caller) {
            return Err(TokenError::NotAuthorizedBurner);
        }
        if from.is_zero() {
            return Err(TokenError::BurnFromZeroAddress);
        }

        Self::burn_locked(&mut state, from, amount, reason)
    }

    /// Burn the caller's own tokens
    pub fn burn_self(&self, caller: Address, amount: Balance) -> Result<(), TokenError> {
        let mut state = self.state.write();
        Self::burn_locked(&mut state, caller, amount, SELF_BURN_REASON)
    }

    fn burn_locked(state: &mut TokenState, from: Address, amount: Balance, reason: &str) -> Result<(), TokenError> {
        if amount == 0 {
            return Err(TokenError::ZeroAmount);
        }
        if state.balance(&from) < amount {
            return Err(TokenError::InsufficientBalance);
        }

        state.debit(&from, amount);
        state.total_supply -= amount;
        state.events.push(TokenEvent::Transfer {
            from,
            to: Address::ZERO,
            amount,
        });
        state.events.push(TokenEvent::TokensBurned {
            from,
            amount,
            reason: reason.to_string(),
        });

        tracing::info!(%from, amount, reason, "DataCoin burned");
        Ok(())
    }

    pub fn add_minter(&self, caller: Address, minter: Address) -> Result<(), TokenError> {
        let mut state = self.state.write();
        state.only_owner(&caller)?;
        if minter.is_zero() {
            return Err(TokenError::InvalidMinter);
        }

        state.minters.insert(minter);
        state.events.push(TokenEvent::MinterAdded { minter });
        Ok(())
    }

    pub fn remove_minter(&self, caller: Address, minter: Address) -> Result<(), TokenError> {
        let mut state = self.state.write();
        state.only_owner(&caller)?;

        state.minters.remove(&minter);
        state.events.push(TokenEvent::MinterRemoved { minter });
        Ok(())
    }

    pub fn add_burner(&self, caller: Address, burner: Address) -> Result<(), TokenError> {
        let mut state = self.state.write();
        state.only_owner(&caller)?;
        if burner.is_zero() {
            return Err(TokenError::InvalidBurner);
        }

        state.burners.insert(burner);
        state.events.push(TokenEvent::BurnerAdded { burner });
        Ok(())
    }

    pub fn remove_burner(&self, caller: Address, burner: Address) -> Result<(), TokenError> {
        let mut state = self.state.write();
        state.only_owner(&caller)?;

        state.burners.remove(&burner);
        state.events.push(TokenEvent::BurnerRemoved { burner });
        Ok(())
    }

    /// Hand the owner role to another account
    pub fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<(), TokenError> {
        let mut state = self.state.write();
        state.only_owner(&caller)?;
        if new_owner.is_zero() {
            return Err(TokenError::OwnableInvalidOwner(new_owner));
        }

        let previous_owner = std::mem::replace(&mut state.owner, new_owner);
        state.events.push(TokenEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
        });
        Ok(())
    }

    // === ERC-20 surface ===

    pub fn transfer(&self, caller: Address, to: Address, amount: Balance) -> Result<(), TokenError> {
        self.state.write().move_balance(caller, to, amount)
    }

    pub fn approve(&self, caller: Address, spender: Address, amount: Balance) -> Result<(), TokenError> {
        if spender.is_zero() {
            return Err(TokenError::ERC20InvalidSpender(spender));
        }

        let mut state = self.state.write();
        state.allowances.entry(caller).or_default().insert(spender, amount);
        state.events.push(TokenEvent::Approval {
            owner: caller,
            spender,
            amount,
        });
        Ok(())
    }

    /// Spend an allowance; `Balance::MAX` is never decreased
    pub fn transfer_from(
        &self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Balance,
    ) -> Result<(), TokenError> {
        let mut state = self.state.write();

        let allowance = state
            .allowances
            .get(&from)
            .and_then(|m| m.get(&caller))
            .copied()
            .unwrap_or(0);

        if allowance < amount {
            return Err(TokenError::ERC20InsufficientAllowance {
                spender: caller,
                allowance,
                needed: amount,
            });
        }

        state.move_balance(from, to, amount)?;

        if allowance != Balance::MAX {
            state
                .allowances
                .entry(from)
                .or_default()
                .insert(caller, allowance - amount);
        }
        Ok(())
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Balance {
        self.state
            .read()
            .allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn balance_of(&self, account: &Address) -> Balance {
        self.state.read().balance(account)
    }

    pub fn total_supply(&self) -> Balance {
        self.state.read().total_supply
    }

    pub fn remaining_supply(&self) -> Balance {
        MAX_SUPPLY - self.total_supply()
    }

    pub fn is_minter(&self, account: &Address) -> bool {
        self.state.read().is_minter(account)
    }

    pub fn is_burner(&self, account: &Address) -> bool {
        self.state.read().is_burner(account)
    }

    /// Event log in emission order
    pub fn events(&self) -> Vec<TokenEvent> {
        self.state.read().events.clone()
    }
}

/// Token errors, displayed as the contract revert reasons
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("OwnableUnauthorizedAccount({0})")]
    OwnableUnauthorizedAccount(Address),

    #[error("OwnableInvalidOwner({0})")]
    OwnableInvalidOwner(Address),

    #[error("Not authorized minter")]
    NotAuthorizedMinter,

    #[error("Not authorized burner")]
    NotAuthorizedBurner,

    #[error("Cannot mint to zero address")]
    MintToZeroAddress,

    #[error("Cannot burn from zero address")]
    BurnFromZeroAddress,

    #[error("Amount must be greater than 0")]
    ZeroAmount,

    #[error("Would exceed max supply")]
    ExceedsMaxSupply,

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Invalid minter address")]
    InvalidMinter,

    #[error("Invalid burner address")]
    InvalidBurner,

    #[error("ERC20InsufficientBalance({sender}, {balance}, {needed})")]
    ERC20InsufficientBalance {
        sender: Address,
        balance: Balance,
        needed: Balance,
    },

    #[error("ERC20InsufficientAllowance({spender}, {allowance}, {needed})")]
    ERC20InsufficientAllowance {
        spender: Address,
        allowance: Balance,
        needed: Balance,
    },

    #[error("ERC20InvalidSender({0})")]
    ERC20InvalidSender(Address),

    #[error("ERC20InvalidReceiver({0})")]
    ERC20InvalidReceiver(Address),

    #[error("ERC20InvalidSpender({0})")]
    ERC20InvalidSpender(Address),
}

impl TokenError {
    /// Whether the sender lacked the required role
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::OwnableUnauthorizedAccount(_) | Self::NotAuthorizedMinter | Self::NotAuthorizedBurner
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn owner() -> Address {
        Address::repeat_byte(0x01)
    }

    fn user() -> Address {
        Address::repeat_byte(0x02)
    }

    fn minter() -> Address {
        Address::repeat_byte(0x03)
    }

    #[test]
    fn test_metadata() {
        let token = DataCoin::new(owner());
        assert_eq!(token.name(), "DataCoin");
        assert_eq!(token.symbol(), "DATA");
        assert_eq!(token.decimals(), 18);
        assert_eq!(token.total_supply(), 0);
        assert_eq!(token.remaining_supply(), MAX_SUPPLY);
    }

    #[test]
    fn test_owner_is_implicit_minter_and_burner() {
        let token = DataCoin::new(owner());
        assert!(token.is_minter(&owner()));
        assert!(token.is_burner(&owner()));
        assert!(!token.is_minter(&user()));

        token.mint(owner(), user(), 100, "test").unwrap();
        assert_eq!(token.balance_of(&user()), 100);
        assert_eq!(token.total_supply(), 100);
    }

    #[test]
    fn test_non_minter_rejected() {
        let token = DataCoin::new(owner());
        let err = token.mint(user(), user(), 100, "test").unwrap_err();

        assert_eq!(err.to_string(), "Not authorized minter");
        assert!(err.is_unauthorized());
        assert_eq!(token.total_supply(), 0);
        assert!(token.events().is_empty());
    }

    #[test]
    fn test_mint_guards() {
        let token = DataCoin::new(owner());

        assert_eq!(
            token.mint(owner(), Address::ZERO, 1, "x"),
            Err(TokenError::MintToZeroAddress)
        );
        assert_eq!(token.mint(owner(), user(), 0, "x"), Err(TokenError::ZeroAmount));

        token.mint(owner(), user(), MAX_SUPPLY, "genesis").unwrap();
        assert_eq!(
            token.mint(owner(), user(), 1, "x"),
            Err(TokenError::ExceedsMaxSupply)
        );
        assert_eq!(token.remaining_supply(), 0);
    }

    #[test]
    fn test_minter_role_management() {
        let token = DataCoin::new(owner());

        assert!(matches!(
            token.add_minter(user(), minter()),
            Err(TokenError::OwnableUnauthorizedAccount(_))
        ));
        assert_eq!(token.add_minter(owner(), Address::ZERO), Err(TokenError::InvalidMinter));

        token.add_minter(owner(), minter()).unwrap();
        token.mint(minter(), user(), 5, "reward").unwrap();

        token.remove_minter(owner(), minter()).unwrap();
        assert_eq!(
            token.mint(minter(), user(), 5, "reward"),
            Err(TokenError::NotAuthorizedMinter)
        );
    }

    #[test]
    fn test_burn_and_burn_self() {
        let token = DataCoin::new(owner());
        let burner = Address::repeat_byte(0x04);
        token.mint(owner(), user(), 50, "seed").unwrap();

        assert_eq!(token.burn(burner, user(), 10, "x"), Err(TokenError::NotAuthorizedBurner));
        assert_eq!(token.add_burner(owner(), Address::ZERO), Err(TokenError::InvalidBurner));
        token.add_burner(owner(), burner).unwrap();

        assert_eq!(
            token.burn(burner, Address::ZERO, 10, "x"),
            Err(TokenError::BurnFromZeroAddress)
        );
        assert_eq!(token.burn(burner, user(), 51, "x"), Err(TokenError::InsufficientBalance));

        token.burn(burner, user(), 10, "penalty").unwrap();
        token.burn_self(user(), 15).unwrap();

        assert_eq!(token.balance_of(&user()), 25);
        assert_eq!(token.total_supply(), 25);
        assert!(token.events().contains(&TokenEvent::TokensBurned {
            from: user(),
            amount: 15,
            reason: SELF_BURN_REASON.to_string(),
        }));
    }

    #[test]
    fn test_transfer_and_allowance() {
        let token = DataCoin::new(owner());
        let spender = Address::repeat_byte(0x05);
        token.mint(owner(), user(), 100, "seed").unwrap();

        token.transfer(user(), owner(), 30).unwrap();
        assert_eq!(token.balance_of(&owner()), 30);

        assert!(matches!(
            token.transfer(user(), owner(), 1_000),
            Err(TokenError::ERC20InsufficientBalance { balance: 70, .. })
        ));

        token.approve(user(), spender, 20).unwrap();
        assert!(matches!(
            token.transfer_from(spender, user(), spender, 21),
            Err(TokenError::ERC20InsufficientAllowance { allowance: 20, .. })
        ));

        token.transfer_from(spender, user(), spender, 20).unwrap();
        assert_eq!(token.allowance(&user(), &spender), 0);
        assert_eq!(token.balance_of(&spender), 20);
        assert_eq!(token.total_supply(), 100);
    }

    #[test]
    fn test_ownership_transfer() {
        let token = DataCoin::new(owner());
        token.transfer_ownership(owner(), user()).unwrap();

        assert_eq!(token.owner(), user());
        assert!(token.is_minter(&user()));
        assert!(!token.is_minter(&owner()));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let token = DataCoin::new(owner());
        token.mint(owner(), user(), 42, "seed").unwrap();

        let json = serde_json::to_string(&token.snapshot()).unwrap();
        let restored = DataCoin::from_snapshot(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.balance_of(&user()), 42);
        assert_eq!(restored.total_supply(), 42);
        assert_eq!(restored.events(), token.events());
    }

    proptest! {
        #[test]
        fn prop_supply_never_exceeds_cap(amounts in proptest::collection::vec(1u128..MAX_SUPPLY / 3, 1..12)) {
            let token = DataCoin::new(owner());
            let mut expected: u128 = 0;

            for amount in amounts {
                match token.mint(owner(), user(), amount, "prop") {
                    Ok(()) => expected += amount,
                    Err(e) => prop_assert_eq!(e, TokenError::ExceedsMaxSupply),
                }
                prop_assert!(token.total_supply() <= MAX_SUPPLY);
            }

            prop_assert_eq!(token.total_supply(), expected);
            prop_assert_eq!(token.balance_of(&user()), expected);
        }
    }
}
