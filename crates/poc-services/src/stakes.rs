//! Stake enrollment and stake records
//!
//! Staking is the entry point of a course: the escrow takes the stake, the
//! progress record is created and a stake record (`stakingTransactions`)
//! follows the stake through its lifecycle:
//!
//! ```text
//!   active ──(all modules done)──► completed ──(refund)──► refunded
//! ```

use crate::courses::CourseService;
use crate::error::{Result, ServiceError};
use crate::progress::{CourseProgress, ProgressService};
use crate::transactions::{NewTransaction, TransactionKind, TransactionLog};
use poc_core::{derive_tx_hash, format_units, serde_amount, Address, ChainId, CourseId, SharedClock, Wei, DECIMALS};
use poc_economics::{Stake, StakingManager};
use poc_storage::{collections, Collection, DocumentStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeStatus {
    Active,
    Completed,
    Refunded,
}

/// Off-chain record of one stake
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingRecord {
    pub transaction_hash: String,
    pub user_id: Address,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub course_id: CourseId,
    pub course_name: String,
    pub total_modules: u32,
    /// Decimal ETH, for display
    pub stake_amount: String,
    #[serde(with = "serde_amount")]
    pub stake_amount_wei: Wei,
    pub network: String,
    pub chain_id: ChainId,
    pub completed_modules: u32,
    pub is_completed: bool,
    pub staked_at: i64,
    pub last_activity_at: i64,
    pub completed_at: Option<i64>,
    pub status: StakeStatus,
}

/// Store of stake records
#[derive(Clone)]
pub struct StakingRecords {
    records: Collection<StakingRecord>,
    clock: SharedClock,
}

impl StakingRecords {
    pub fn new(store: Arc<dyn DocumentStore>, clock: SharedClock) -> Self {
        Self {
            records: Collection::new(store, collections::STAKING_TRANSACTIONS),
            clock,
        }
    }

    fn id(user: &Address, course_id: CourseId) -> String {
        CourseProgress::document_id(user, course_id)
    }

    pub async fn create(&self, record: &StakingRecord) -> Result<()> {
        self.records
            .create(&Self::id(&record.user_id, record.course_id), record)
            .await?;
        Ok(())
    }

    pub async fn get(&self, user: &Address, course_id: CourseId) -> Result<Option<StakingRecord>> {
        Ok(self.records.get(&Self::id(user, course_id)).await?.map(|v| v.value))
    }

    /// Records of one user, newest stake first
    pub async fn list_for_user(&self, user: &Address) -> Result<Vec<StakingRecord>> {
        let mut records = self.records.find(|r: &StakingRecord| r.user_id == *user).await?;
        records.sort_by(|a, b| b.staked_at.cmp(&a.staked_at));
        Ok(records)
    }

    /// Track module progress; the record turns `completed` once every module is done
    pub async fn record_progress(&self, user: &Address, course_id: CourseId, completed_modules: u32) -> Result<StakingRecord> {
        let now = self.clock.now();
        let stored = self
            .records
            .modify::<_, ServiceError>(&Self::id(user, course_id), |current| {
                let mut record = current.ok_or_else(|| ServiceError::not_found("No staking record"))?;
                record.completed_modules = completed_modules;
                record.last_activity_at = now;
                if completed_modules >= record.total_modules && record.status == StakeStatus::Active {
                    record.is_completed = true;
                    record.status = StakeStatus::Completed;
                    record.completed_at = Some(now);
                }
                Ok(record)
            })
            .await?;
        Ok(stored.value)
    }

    pub async fn mark_refunded(&self, user: &Address, course_id: CourseId) -> Result<StakingRecord> {
        let now = self.clock.now();
        let stored = self
            .records
            .modify::<_, ServiceError>(&Self::id(user, course_id), |current| {
                let mut record = current.ok_or_else(|| ServiceError::not_found("No staking record"))?;
                record.is_completed = true;
                record.status = StakeStatus::Refunded;
                record.completed_at = record.completed_at.or(Some(now));
                record.last_activity_at = now;
                Ok(record)
            })
            .await?;
        Ok(stored.value)
    }
}

/// Network label stamped on stake records
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkLabel {
    pub name: String,
    pub chain_id: ChainId,
}

impl Default for NetworkLabel {
    fn default() -> Self {
        Self {
            name: "Ethereum Sepolia".to_string(),
            chain_id: 11_155_111,
        }
    }
}

/// Stake request as received from a learner
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeRequest {
    pub user_address: Address,
    pub course_id: CourseId,
    /// Value sent with the stake, in wei
    #[serde(with = "serde_amount")]
    pub amount: Wei,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

/// Result of a successful stake
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub stake: Stake,
    pub transaction_hash: String,
    pub progress: CourseProgress,
    pub record: Option<StakingRecord>,
}

/// Ledger and catalog view of one (user, course) stake
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeView {
    pub user: Address,
    pub course_id: CourseId,
    pub stake: Stake,
    pub has_staked: bool,
    pub has_completed: bool,
    #[serde(with = "serde_amount")]
    pub course_stake_amount: Wei,
    pub course_active: bool,
}

/// Staking entry point
#[derive(Clone)]
pub struct EnrollmentService {
    staking: Arc<StakingManager>,
    courses: CourseService,
    progress: ProgressService,
    records: StakingRecords,
    transactions: TransactionLog,
    clock: SharedClock,
    network: NetworkLabel,
}

impl EnrollmentService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        courses: CourseService,
        progress: ProgressService,
        transactions: TransactionLog,
        clock: SharedClock,
    ) -> Self {
        Self {
            staking: courses.staking().clone(),
            records: StakingRecords::new(store, clock.clone()),
            courses,
            progress,
            transactions,
            clock,
            network: NetworkLabel::default(),
        }
    }

    pub fn with_network(mut self, network: NetworkLabel) -> Self {
        self.network = network;
        self
    }

    pub fn records(&self) -> &StakingRecords {
        &self.records
    }

    /// Escrow the stake, then create the progress and stake records
    ///
    /// The ledger call is the commit point. Once it succeeds the stake is
    /// reported as made: failures of the catalog lookup or of any record
    /// write are logged and skipped. A progress record that could not be
    /// stored is created later by the first module completion.
    pub async fn stake(&self, request: StakeRequest) -> Result<Enrollment> {
        let user = request.user_address;
        let course_id = request.course_id;

        let stake = self.staking.stake(user, course_id, request.amount)?;
        let transaction_hash = derive_tx_hash(&[
            b"stake",
            user.as_bytes(),
            &course_id.to_be_bytes(),
            &stake.timestamp.to_be_bytes(),
        ]);

        let course = match self.courses.get(course_id).await {
            Ok(course) => course,
            Err(err) => {
                tracing::warn!(%user, course_id, error = %err, "Course lookup failed after stake");
                None
            }
        };
        let total_modules = course.as_ref().map(|c| c.total_modules);
        let now = self.clock.now();
        let progress = match self.progress.enroll(user, course_id, total_modules, stake.amount).await {
            Ok(progress) => progress,
            Err(err) => {
                tracing::warn!(%user, course_id, error = %err, "Progress record not stored");
                let total = total_modules.unwrap_or(self.progress.settings().default_total_modules);
                CourseProgress::new(user, course_id, total, stake.amount, now)
            }
        };

        let record = StakingRecord {
            transaction_hash: transaction_hash.clone(),
            user_id: user,
            user_email: request.user_email,
            user_name: request.user_name,
            course_id,
            course_name: course.map(|c| c.title).unwrap_or_else(|| format!("Course {course_id}")),
            total_modules: progress.total_modules,
            stake_amount: format_units(stake.amount, DECIMALS),
            stake_amount_wei: stake.amount,
            network: self.network.name.clone(),
            chain_id: self.network.chain_id,
            completed_modules: progress.completed_modules,
            is_completed: false,
            staked_at: stake.timestamp,
            last_activity_at: now,
            completed_at: None,
            status: StakeStatus::Active,
        };
        let record = match self.records.create(&record).await {
            Ok(()) => Some(record),
            Err(err) => {
                tracing::warn!(%user, course_id, error = %err, "Stake record not stored");
                None
            }
        };

        let tx = NewTransaction::new(user, TransactionKind::Stake, stake.amount)
            .course(course_id)
            .hash(transaction_hash.clone());
        if let Err(err) = self.transactions.record(tx).await {
            tracing::warn!(%user, course_id, error = %err, "Stake transaction not recorded");
        }

        Ok(Enrollment {
            stake,
            transaction_hash,
            progress,
            record,
        })
    }

    pub fn stake_view(&self, user: Address, course_id: CourseId) -> StakeView {
        StakeView {
            user,
            course_id,
            stake: self.staking.get_stake(&user, course_id),
            has_staked: self.staking.has_staked(&user, course_id),
            has_completed: self.staking.has_completed(&user, course_id),
            course_stake_amount: self.staking.course_stake_amount(course_id),
            course_active: self.staking.is_course_active(course_id),
        }
    }
}
