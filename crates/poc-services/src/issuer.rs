//! Reward issuance
//!
//! Services never touch the token ledger directly; they go through a
//! `RewardIssuer`, which mints on behalf of a configured minter account and
//! hands back a transaction hash for the history. Issuance is not retried:
//! a failed issue is reported to the caller, which undoes its own state.

use crate::error::Result;
use async_trait::async_trait;
use poc_core::{derive_tx_hash, Address, Balance, SharedClock};
use poc_economics::DataCoin;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Proof of a reward credited to an account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardReceipt {
    pub to: Address,
    #[serde(with = "poc_core::serde_amount")]
    pub amount: Balance,
    pub reason: String,
    pub transaction_hash: String,
    pub timestamp: i64,
}

/// Credits DataCoin rewards
#[async_trait]
pub trait RewardIssuer: Send + Sync {
    /// Mint `amount` to `to`
    async fn issue(&self, to: Address, amount: Balance, reason: &str) -> Result<RewardReceipt>;
}

/// Issuer backed by the in-process DataCoin ledger
pub struct LedgerIssuer {
    token: Arc<DataCoin>,
    minter: Address,
    clock: SharedClock,
    nonce: AtomicU64,
}

impl LedgerIssuer {
    /// `minter` must hold the minter role
    pub fn new(token: Arc<DataCoin>, minter: Address, clock: SharedClock) -> Self {
        Self {
            token,
            minter,
            clock,
            nonce: AtomicU64::new(0),
        }
    }

    pub fn minter(&self) -> Address {
        self.minter
    }

    fn receipt(&self, op: &[u8], account: Address, amount: Balance, reason: &str) -> RewardReceipt {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let timestamp = self.clock.now();
        RewardReceipt {
            to: account,
            amount,
            reason: reason.to_string(),
            transaction_hash: derive_tx_hash(&[
                op,
                account.as_bytes(),
                &amount.to_be_bytes(),
                &nonce.to_be_bytes(),
                &timestamp.to_be_bytes(),
            ]),
            timestamp,
        }
    }
}

#[async_trait]
impl RewardIssuer for LedgerIssuer {
    async fn issue(&self, to: Address, amount: Balance, reason: &str) -> Result<RewardReceipt> {
        self.token.mint(self.minter, to, amount, reason)?;
        Ok(self.receipt(b"mint", to, amount, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use poc_core::ManualClock;
    use poc_economics::TokenError;

    #[tokio::test]
    async fn test_issue_mints_and_hashes_uniquely() {
        let owner = Address::repeat_byte(1);
        let user = Address::repeat_byte(2);
        let token = Arc::new(DataCoin::new(owner));
        let issuer = LedgerIssuer::new(token.clone(), owner, ManualClock::shared(50));

        let a = issuer.issue(user, 3, "Module 1 completion reward").await.unwrap();
        let b = issuer.issue(user, 3, "Module 2 completion reward").await.unwrap();

        assert_eq!(token.balance_of(&user), 6);
        assert_ne!(a.transaction_hash, b.transaction_hash);
        assert_eq!(a.timestamp, 50);
    }

    #[tokio::test]
    async fn test_unauthorized_minter_fails() {
        let token = Arc::new(DataCoin::new(Address::repeat_byte(1)));
        let issuer = LedgerIssuer::new(token.clone(), Address::repeat_byte(9), ManualClock::shared(0));

        let err = issuer.issue(Address::repeat_byte(2), 1, "x").await.unwrap_err();
        assert!(matches!(err, ServiceError::Token(TokenError::NotAuthorizedMinter)));
        assert_eq!(token.total_supply(), 0);
    }
}
