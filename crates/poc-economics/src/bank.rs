//! Native currency balances
//!
//! Stands in for ETH account balances. Stake value is moved from the user
//! into the escrow account and back on refund, so balance changes are
//! observable the same way they are on chain.

use parking_lot::RwLock;
use poc_core::{Address, Wei};
use std::collections::HashMap;
use thiserror::Error;

/// Native balance ledger
#[derive(Debug, Default)]
pub struct NativeBank {
    balances: RwLock<HashMap<Address, Wei>>,
}

impl NativeBank {
    /// Create an empty bank
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore balances from a snapshot
    pub fn from_snapshot(balances: HashMap<Address, Wei>) -> Self {
        Self {
            balances: RwLock::new(balances),
        }
    }

    /// Copy of all balances, the snapshot format
    pub fn snapshot(&self) -> HashMap<Address, Wei> {
        self.balances.read().clone()
    }

    /// Credit new value to an account (faucet / genesis funding)
    pub fn credit(&self, account: Address, amount: Wei) -> Result<Wei, BankError> {
        let mut balances = self.balances.write();
        let balance = balances.entry(account).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(BankError::Overflow)?;
        Ok(*balance)
    }

    /// Move value between accounts
    pub fn transfer(&self, from: Address, to: Address, amount: Wei) -> Result<(), BankError> {
        let mut balances = self.balances.write();

        let available = balances.get(&from).copied().unwrap_or(0);
        if available < amount {
            return Err(BankError::InsufficientFunds {
                account: from,
                needed: amount,
                available,
            });
        }

        if from == to {
            return Ok(());
        }

        let to_balance = balances.get(&to).copied().unwrap_or(0);
        let new_to = to_balance.checked_add(amount).ok_or(BankError::Overflow)?;

        balances.insert(from, available - amount);
        balances.insert(to, new_to);
        Ok(())
    }

    /// Get balance of an account
    pub fn balance_of(&self, account: &Address) -> Wei {
        self.balances.read().get(account).copied().unwrap_or(0)
    }

    /// Sum of all balances
    pub fn total(&self) -> Wei {
        self.balances.read().values().sum()
    }
}

/// Bank errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    #[error("Insufficient funds for {account}: needed {needed}, available {available}")]
    InsufficientFunds {
        account: Address,
        needed: Wei,
        available: Wei,
    },

    #[error("Balance overflow")]
    Overflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_and_transfer() {
        let bank = NativeBank::new();
        let alice = Address::repeat_byte(1);
        let bob = Address::repeat_byte(2);

        bank.credit(alice, 1_000).unwrap();
        bank.transfer(alice, bob, 400).unwrap();

        assert_eq!(bank.balance_of(&alice), 600);
        assert_eq!(bank.balance_of(&bob), 400);
        assert_eq!(bank.total(), 1_000);
    }

    #[test]
    fn test_insufficient_funds_leaves_state() {
        let bank = NativeBank::new();
        let alice = Address::repeat_byte(1);
        let bob = Address::repeat_byte(2);

        bank.credit(alice, 10).unwrap();
        let err = bank.transfer(alice, bob, 11).unwrap_err();

        assert!(matches!(err, BankError::InsufficientFunds { needed: 11, available: 10, .. }));
        assert_eq!(bank.balance_of(&alice), 10);
        assert_eq!(bank.balance_of(&bob), 0);
    }

    #[test]
    fn test_credit_overflow() {
        let bank = NativeBank::new();
        let alice = Address::repeat_byte(1);

        bank.credit(alice, u128::MAX).unwrap();
        assert_eq!(bank.credit(alice, 1), Err(BankError::Overflow));
    }
}
