//! Per-user transaction history
//!
//! One document per user holds that user's records in insertion order;
//! reads return them newest first. When a user has no stored history but
//! the ledgers hold events for them, the history is rebuilt from those
//! events on first read.

use crate::error::{Result, ServiceError};
use poc_core::{derive_tx_hash, serde_amount, Address, Balance, CourseId, SharedClock};
use poc_economics::{DataCoin, StakingEvent, StakingManager, TokenEvent};
use poc_storage::{collections, Collection, DocumentStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a transaction did
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Stake,
    Refund,
    Datacoin,
    ConsumerData,
    Certificate,
}

impl TransactionKind {
    /// Asset the amount is denominated in
    pub fn asset(&self) -> &'static str {
        match self {
            Self::Stake | Self::Refund => "ETH",
            Self::Datacoin | Self::ConsumerData => "DATA",
            Self::Certificate => "SBT",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Success,
    Failed,
    Pending,
}

/// One history entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: String,
    pub user_address: Address,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Smallest unit of `kind.asset()`
    #[serde(with = "serde_amount")]
    pub amount: Balance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<CourseId>,
    pub timestamp: i64,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Input for `TransactionLog::record`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub user_address: Address,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(with = "serde_amount", default)]
    pub amount: Balance,
    #[serde(default)]
    pub course_id: Option<CourseId>,
    /// Generated when absent
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl NewTransaction {
    pub fn new(user_address: Address, kind: TransactionKind, amount: Balance) -> Self {
        Self {
            user_address,
            kind,
            amount,
            course_id: None,
            hash: None,
            timestamp: None,
            status: None,
            reason: None,
        }
    }

    pub fn course(mut self, course_id: CourseId) -> Self {
        self.course_id = Some(course_id);
        self
    }

    pub fn hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserTransactions {
    transactions: Vec<TransactionRecord>,
}

/// Transaction history service
#[derive(Clone)]
pub struct TransactionLog {
    log: Collection<UserTransactions>,
    clock: SharedClock,
    ledgers: Option<(Arc<StakingManager>, Arc<DataCoin>)>,
}

impl TransactionLog {
    pub fn new(store: Arc<dyn DocumentStore>, clock: SharedClock) -> Self {
        Self {
            log: Collection::new(store, collections::TRANSACTIONS),
            clock,
            ledgers: None,
        }
    }

    /// Enable backfilling empty histories from ledger events
    pub fn with_ledgers(mut self, staking: Arc<StakingManager>, token: Arc<DataCoin>) -> Self {
        self.ledgers = Some((staking, token));
        self
    }

    /// Append a record; a record whose hash is already stored is returned as is
    pub async fn record(&self, tx: NewTransaction) -> Result<TransactionRecord> {
        let timestamp = tx.timestamp.unwrap_or_else(|| self.clock.now());
        let id = tx.user_address.to_hex();

        let mut stored = None;
        self.log
            .modify::<_, ServiceError>(&id, |current| {
                let mut doc = current.unwrap_or_default();
                let hash = tx.hash.clone().unwrap_or_else(|| {
                    derive_tx_hash(&[
                        tx.user_address.as_bytes(),
                        &tx.amount.to_be_bytes(),
                        &timestamp.to_be_bytes(),
                        &(doc.transactions.len() as u64).to_be_bytes(),
                    ])
                });

                if let Some(existing) = doc.transactions.iter().find(|t| t.hash == hash) {
                    stored = Some(existing.clone());
                    return Ok(doc);
                }

                let record = TransactionRecord {
                    hash,
                    user_address: tx.user_address,
                    kind: tx.kind,
                    amount: tx.amount,
                    course_id: tx.course_id,
                    timestamp,
                    status: tx.status.unwrap_or_default(),
                    reason: tx.reason.clone(),
                };
                stored = Some(record.clone());
                doc.transactions.push(record);
                Ok(doc)
            })
            .await?;

        stored.ok_or_else(|| ServiceError::Internal("transaction not recorded".into()))
    }

    /// Stored history, newest first
    pub async fn list(&self, user: &Address) -> Result<Vec<TransactionRecord>> {
        let mut records = self
            .log
            .get(&user.to_hex())
            .await?
            .map(|v| v.value.transactions)
            .unwrap_or_default();
        records.reverse();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// History, rebuilt from ledger events when nothing is stored yet
    pub async fn list_or_backfill(&self, user: &Address) -> Result<Vec<TransactionRecord>> {
        let records = self.list(user).await?;
        if !records.is_empty() {
            return Ok(records);
        }
        let Some((staking, token)) = &self.ledgers else {
            return Ok(records);
        };

        let rebuilt = records_from_events(user, staking, token, self.clock.now());
        if rebuilt.is_empty() {
            return Ok(rebuilt);
        }

        tracing::info!(%user, count = rebuilt.len(), "Backfilling transaction history from ledger events");
        let id = user.to_hex();
        self.log
            .modify::<_, ServiceError>(&id, |current| {
                let mut doc = current.unwrap_or_default();
                if doc.transactions.is_empty() {
                    doc.transactions = rebuilt.clone();
                }
                Ok(doc)
            })
            .await?;

        self.list(user).await
    }
}

/// History entries for `user` derived from the staking and token event logs
///
/// Stake entries carry the stake's own timestamp. The event logs have no
/// clock of their own, so every other entry is stamped `now`.
pub fn records_from_events(
    user: &Address,
    staking: &StakingManager,
    token: &DataCoin,
    now: i64,
) -> Vec<TransactionRecord> {
    let event_hash =
        |log: &str, index: usize| derive_tx_hash(&[log.as_bytes(), user.as_bytes(), &(index as u64).to_be_bytes()]);
    let entry = |hash: String, kind: TransactionKind, amount: Balance, course_id: Option<CourseId>| TransactionRecord {
        hash,
        user_address: *user,
        kind,
        amount,
        course_id,
        timestamp: now,
        status: TransactionStatus::Success,
        reason: None,
    };

    let mut records = Vec::new();

    for (index, event) in staking.events().into_iter().enumerate() {
        match event {
            StakingEvent::Staked { user: u, course_id, amount } if u == *user => {
                let mut record = entry(event_hash("staking", index), TransactionKind::Stake, amount, Some(course_id));
                record.timestamp = staking.get_stake(user, course_id).timestamp;
                records.push(record);
            }
            StakingEvent::StakeRefunded { user: u, course_id, amount } if u == *user => {
                records.push(entry(event_hash("staking", index), TransactionKind::Refund, amount, Some(course_id)));
            }
            StakingEvent::CourseCompleted {
                user: u,
                course_id,
                certificate_cid,
            } if u == *user => {
                let mut record = entry(event_hash("staking", index), TransactionKind::Certificate, 0, Some(course_id));
                record.reason = Some(certificate_cid);
                records.push(record);
            }
            _ => {}
        }
    }

    for (index, event) in token.events().into_iter().enumerate() {
        if let TokenEvent::TokensMinted { to, amount, reason } = event {
            if to == *user {
                let mut record = entry(event_hash("token", index), TransactionKind::Datacoin, amount, None);
                record.reason = Some(reason);
                records.push(record);
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use poc_core::ManualClock;
    use poc_economics::NativeBank;
    use poc_storage::MemoryStore;

    fn log(now: i64) -> (TransactionLog, Arc<ManualClock>) {
        let clock = ManualClock::shared(now);
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (TransactionLog::new(store, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let (log, clock) = log(100);
        let user = Address::repeat_byte(7);

        log.record(NewTransaction::new(user, TransactionKind::Stake, 5).course(1))
            .await
            .unwrap();
        clock.advance(10);
        log.record(NewTransaction::new(user, TransactionKind::Datacoin, 3).reason("Module 1 completion reward"))
            .await
            .unwrap();

        let records = log.list(&user).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, TransactionKind::Datacoin);
        assert_eq!(records[0].timestamp, 110);
        assert_eq!(records[1].course_id, Some(1));
        assert!(log.list(&Address::repeat_byte(8)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_hash_recorded_once() {
        let (log, _) = log(0);
        let user = Address::repeat_byte(7);
        let tx = NewTransaction::new(user, TransactionKind::Refund, 9).hash("0xabc");

        log.record(tx.clone()).await.unwrap();
        log.record(tx).await.unwrap();
        assert_eq!(log.list(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backfill_from_ledger_events() {
        let clock = ManualClock::shared(1_000);
        let owner = Address::repeat_byte(1);
        let user = Address::repeat_byte(2);
        let bank = Arc::new(NativeBank::new());
        bank.credit(user, 1_000).unwrap();

        let staking = Arc::new(StakingManager::new(Address::repeat_byte(0xee), owner, bank, clock.clone()));
        staking.add_course(owner, 1, 100).unwrap();
        staking.stake(user, 1, 100).unwrap();
        let token = Arc::new(DataCoin::new(owner));
        token.mint(owner, user, 3, "Module 1 completion reward").unwrap();

        let store = Arc::new(MemoryStore::new(clock.clone()));
        let log = TransactionLog::new(store, clock.clone()).with_ledgers(staking, token);

        let records = log.list_or_backfill(&user).await.unwrap();
        let kinds: Vec<_> = records.iter().map(|r| r.kind).collect();
        assert_eq!(records.len(), 2);
        assert!(kinds.contains(&TransactionKind::Stake));
        assert!(kinds.contains(&TransactionKind::Datacoin));

        // persisted, so a second read does not rebuild
        assert_eq!(log.list(&user).await.unwrap().len(), 2);
        assert!(log.list_or_backfill(&Address::repeat_byte(3)).await.unwrap().is_empty());
    }
}
