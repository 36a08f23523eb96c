//! Learning progress
//!
//! One document per (user, course), id `{user}_{course}` with the address in
//! lowercase hex. Module 1 starts unlocked; completing a module unlocks the
//! next one. Every change is a conditional write against the version that
//! was read, so concurrent completions of different modules never lose an
//! update and a module can only be completed once.
//!
//! ## Module reward
//!
//! ```text
//!   modify(doc)  ──► module marked, next unlocked      (commit)
//!       │
//!   issuer.issue(3 DATA)
//!       ├─ ok  ──► tx hash stored, history appended
//!       └─ err ──► modify(doc) undoes the module      (rollback)
//! ```

use crate::courses::CourseService;
use crate::error::{Result, ServiceError};
use crate::issuer::{RewardIssuer, RewardReceipt};
use crate::stakes::StakingRecords;
use crate::transactions::{NewTransaction, TransactionKind, TransactionLog};
use poc_core::{serde_amount, Address, Balance, CourseId, ModuleId, SharedClock, Wei};
use poc_economics::constants::{DEFAULT_TOTAL_MODULES, MODULE_REWARD};
use poc_economics::{RewardKind, StakingError};
use poc_storage::{collections, Collection, DocumentStore, StorageError, Versioned};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Progress service settings
#[derive(Clone, Debug)]
pub struct ProgressSettings {
    /// Minted per completed module
    pub module_reward: Balance,
    /// Reject completing a module before the previous one
    pub sequential: bool,
    /// Used when neither the catalog nor the request names a module count
    pub default_total_modules: u32,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            module_reward: MODULE_REWARD,
            sequential: true,
            default_total_modules: DEFAULT_TOTAL_MODULES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgress {
    pub module_id: ModuleId,
    pub completed: bool,
    pub unlocked: bool,
    pub completed_at: Option<i64>,
    #[serde(default, with = "serde_amount::option")]
    pub reward_earned: Option<Balance>,
    pub transaction_hash: Option<String>,
}

impl ModuleProgress {
    fn new(module_id: ModuleId) -> Self {
        Self {
            module_id,
            completed: false,
            unlocked: module_id == 1,
            completed_at: None,
            reward_earned: None,
            transaction_hash: None,
        }
    }
}

/// Submitted assignment and its review
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSubmission {
    pub assignment_id: String,
    pub submitted_at: i64,
    pub submission_data: serde_json::Value,
    pub is_verified: bool,
    pub verified_at: Option<i64>,
    pub verified_by: Option<Address>,
    pub feedback: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    pub user: Address,
    pub course_id: CourseId,
    pub total_modules: u32,
    pub completed_modules: u32,
    /// floor(100 * completed / total)
    pub progress_percentage: u32,
    pub modules: Vec<ModuleProgress>,
    pub is_course_completed: bool,
    #[serde(with = "serde_amount")]
    pub stake_amount: Wei,
    pub stake_returned: bool,
    pub certificate_id: Option<u64>,
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub assignments: Vec<AssignmentSubmission>,
    #[serde(default)]
    pub total_assignments: u32,
    #[serde(default)]
    pub verified_assignments: u32,
    #[serde(default, with = "serde_amount")]
    pub total_rewards_earned: Balance,
    pub created_at: i64,
    pub updated_at: i64,
    /// Storage version the record was read at
    #[serde(default)]
    pub version: u64,
}

impl CourseProgress {
    pub fn new(user: Address, course_id: CourseId, total_modules: u32, stake_amount: Wei, now: i64) -> Self {
        let mut progress = Self {
            user,
            course_id,
            total_modules,
            completed_modules: 0,
            progress_percentage: 0,
            modules: (1..=total_modules).map(ModuleProgress::new).collect(),
            is_course_completed: false,
            stake_amount,
            stake_returned: false,
            certificate_id: None,
            completed_at: None,
            assignments: Vec::new(),
            total_assignments: 0,
            verified_assignments: 0,
            total_rewards_earned: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        progress.recompute();
        progress
    }

    pub fn document_id(user: &Address, course_id: CourseId) -> String {
        format!("{}_{}", user.to_hex(), course_id)
    }

    pub fn module(&self, module_id: ModuleId) -> Option<&ModuleProgress> {
        module_id
            .checked_sub(1)
            .and_then(|idx| self.modules.get(idx as usize))
    }

    /// Derived counters from the module and assignment lists
    fn recompute(&mut self) {
        self.completed_modules = self.modules.iter().filter(|m| m.completed).count() as u32;
        self.progress_percentage = if self.total_modules == 0 {
            0
        } else {
            self.completed_modules * 100 / self.total_modules
        };
        self.is_course_completed = self.total_modules > 0 && self.completed_modules == self.total_modules;
        self.total_assignments = self.assignments.len() as u32;
        self.verified_assignments = self.assignments.iter().filter(|a| a.is_verified).count() as u32;
    }
}

fn versioned(v: Versioned<CourseProgress>) -> CourseProgress {
    let mut progress = v.value;
    progress.version = v.version;
    progress
}

/// Result of `ProgressService::complete_module`
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCompletion {
    pub progress: CourseProgress,
    pub reward: Option<RewardReceipt>,
}

/// Progress kinds that `award` accepts
const AWARDABLE: [RewardKind; 5] = [
    RewardKind::DailyStreak,
    RewardKind::CourseProgress,
    RewardKind::Milestone,
    RewardKind::WeeklyStreak,
    RewardKind::MonthlyStreak,
];

/// Learning progress service
#[derive(Clone)]
pub struct ProgressService {
    progress: Collection<CourseProgress>,
    records: StakingRecords,
    courses: CourseService,
    issuer: Arc<dyn RewardIssuer>,
    transactions: TransactionLog,
    clock: SharedClock,
    settings: ProgressSettings,
}

impl ProgressService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        courses: CourseService,
        issuer: Arc<dyn RewardIssuer>,
        transactions: TransactionLog,
        clock: SharedClock,
    ) -> Self {
        Self {
            progress: Collection::new(store.clone(), collections::PROGRESS),
            records: StakingRecords::new(store, clock.clone()),
            courses,
            issuer,
            transactions,
            clock,
            settings: ProgressSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ProgressSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ProgressSettings {
        &self.settings
    }

    /// Catalog count, else the caller's hint, else the configured default
    async fn total_modules(&self, course_id: CourseId, hint: Option<u32>) -> Result<u32> {
        let total = self
            .courses
            .total_modules(course_id)
            .await?
            .or(hint.filter(|n| *n > 0))
            .unwrap_or(self.settings.default_total_modules);
        Ok(total)
    }

    pub async fn get(&self, user: &Address, course_id: CourseId) -> Result<Option<CourseProgress>> {
        Ok(self
            .progress
            .get(&CourseProgress::document_id(user, course_id))
            .await?
            .map(versioned))
    }

    /// Stored record, or a fresh one written on first read
    pub async fn get_or_init(&self, user: Address, course_id: CourseId, hint: Option<u32>) -> Result<CourseProgress> {
        if let Some(progress) = self.get(&user, course_id).await? {
            return Ok(progress);
        }

        let total = self.total_modules(course_id, hint).await?;
        let fresh = CourseProgress::new(user, course_id, total, 0, self.clock.now());
        let id = CourseProgress::document_id(&user, course_id);

        match self.progress.create(&id, &fresh).await {
            Ok(version) => Ok(CourseProgress { version, ..fresh }),
            Err(StorageError::AlreadyExists { .. }) => self
                .get(&user, course_id)
                .await?
                .ok_or_else(|| ServiceError::Internal(format!("progress {id} vanished"))),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the record for a new stake; an existing record keeps its modules
    pub async fn enroll(
        &self,
        user: Address,
        course_id: CourseId,
        total_modules: Option<u32>,
        stake_amount: Wei,
    ) -> Result<CourseProgress> {
        let total = self.total_modules(course_id, total_modules).await?;
        let now = self.clock.now();

        let stored = self
            .progress
            .modify::<_, ServiceError>(&CourseProgress::document_id(&user, course_id), |current| {
                Ok(match current {
                    Some(mut progress) => {
                        if progress.stake_amount == 0 {
                            progress.stake_amount = stake_amount;
                            progress.updated_at = now;
                        }
                        progress
                    }
                    None => CourseProgress::new(user, course_id, total, stake_amount, now),
                })
            })
            .await?;

        tracing::debug!(%user, course_id, "Enrolled");
        Ok(versioned(stored))
    }

    /// Mark a module completed and pay its reward exactly once
    pub async fn complete_module(
        &self,
        user: Address,
        course_id: CourseId,
        module_id: ModuleId,
        total_modules: Option<u32>,
    ) -> Result<ModuleCompletion> {
        if module_id == 0 {
            return Err(ServiceError::validation("Module id must be at least 1"));
        }

        let total = self.total_modules(course_id, total_modules).await?;
        let now = self.clock.now();
        let reward = self.settings.module_reward;
        let sequential = self.settings.sequential;
        let id = CourseProgress::document_id(&user, course_id);
        let idx = (module_id - 1) as usize;

        let mut unlocked_next = false;
        let committed = self
            .progress
            .modify::<_, ServiceError>(&id, |current| {
                let mut progress = current.unwrap_or_else(|| CourseProgress::new(user, course_id, total, 0, now));

                let module = progress.modules.get_mut(idx).ok_or_else(|| {
                    ServiceError::validation(format!("Module {module_id} does not exist in course {course_id}"))
                })?;
                if module.completed {
                    return Err(ServiceError::ModuleAlreadyCompleted { module_id });
                }
                if sequential && !module.unlocked {
                    return Err(ServiceError::ModuleLocked { module_id });
                }

                module.completed = true;
                module.unlocked = true;
                module.completed_at = Some(now);
                module.reward_earned = Some(reward);
                module.transaction_hash = None;

                unlocked_next = false;
                if let Some(next) = progress.modules.get_mut(idx + 1) {
                    if !next.unlocked {
                        next.unlocked = true;
                        unlocked_next = true;
                    }
                }

                progress.total_rewards_earned = progress.total_rewards_earned.saturating_add(reward);
                progress.updated_at = now;
                progress.recompute();
                Ok(progress)
            })
            .await?;

        tracing::info!(
            %user,
            course_id,
            module_id,
            completed = committed.value.completed_modules,
            total = committed.value.total_modules,
            "Module completed"
        );

        if reward == 0 {
            self.after_completion(&committed.value).await;
            return Ok(ModuleCompletion {
                progress: versioned(committed),
                reward: None,
            });
        }

        let reason = format!("Module {module_id} completion reward");
        let receipt = match self.issuer.issue(user, reward, &reason).await {
            Ok(receipt) => receipt,
            Err(err) => {
                tracing::warn!(%user, course_id, module_id, error = %err, "Module reward failed, rolling back");
                self.rollback_module(&id, idx, unlocked_next, reward).await;
                return Err(err);
            }
        };

        let hash = receipt.transaction_hash.clone();
        let progress = match self
            .progress
            .modify::<_, ServiceError>(&id, |current| {
                let mut progress = current.ok_or_else(|| ServiceError::not_found("Progress record missing"))?;
                if let Some(module) = progress.modules.get_mut(idx) {
                    module.transaction_hash = Some(hash.clone());
                }
                Ok(progress)
            })
            .await
        {
            Ok(stored) => versioned(stored),
            Err(err) => {
                tracing::warn!(%user, course_id, module_id, error = %err, "Reward hash not stored");
                versioned(committed)
            }
        };

        let tx = NewTransaction::new(user, TransactionKind::Datacoin, reward)
            .course(course_id)
            .hash(receipt.transaction_hash.clone())
            .reason(reason);
        if let Err(err) = self.transactions.record(tx).await {
            tracing::warn!(%user, error = %err, "Failed to record module reward transaction");
        }
        self.after_completion(&progress).await;

        Ok(ModuleCompletion {
            progress,
            reward: Some(receipt),
        })
    }

    /// Undo a committed module whose reward could not be issued
    async fn rollback_module(&self, id: &str, idx: usize, relock_next: bool, reward: Balance) {
        let result = self
            .progress
            .modify::<_, ServiceError>(id, |current| {
                let mut progress = current.ok_or_else(|| ServiceError::not_found("Progress record missing"))?;
                if let Some(module) = progress.modules.get_mut(idx) {
                    if module.completed && module.transaction_hash.is_none() {
                        module.completed = false;
                        module.completed_at = None;
                        module.reward_earned = None;
                        progress.total_rewards_earned = progress.total_rewards_earned.saturating_sub(reward);
                    }
                }
                if relock_next {
                    if let Some(next) = progress.modules.get_mut(idx + 1) {
                        if !next.completed {
                            next.unlocked = false;
                        }
                    }
                }
                progress.recompute();
                Ok(progress)
            })
            .await;

        if let Err(err) = result {
            tracing::error!(id, error = %err, "Module rollback failed");
        }
    }

    async fn after_completion(&self, progress: &CourseProgress) {
        if let Err(err) = self
            .records
            .record_progress(&progress.user, progress.course_id, progress.completed_modules)
            .await
        {
            tracing::debug!(user = %progress.user, course_id = progress.course_id, error = %err, "No staking record to update");
        }
    }

    /// Pay a streak or milestone reward
    pub async fn award(&self, user: Address, kind: RewardKind, course_id: Option<CourseId>) -> Result<RewardReceipt> {
        if !AWARDABLE.contains(&kind) {
            return Err(ServiceError::validation(format!(
                "Reward type {kind} is not awarded for progress"
            )));
        }

        let reason = format!("{} reward", kind.as_str());
        let receipt = self.issuer.issue(user, kind.amount(), &reason).await?;

        let mut tx = NewTransaction::new(user, TransactionKind::Datacoin, kind.amount())
            .hash(receipt.transaction_hash.clone())
            .reason(reason);
        tx.course_id = course_id;
        if let Err(err) = self.transactions.record(tx).await {
            tracing::warn!(%user, error = %err, "Failed to record reward transaction");
        }

        tracing::info!(%user, kind = %kind, amount = receipt.amount, "Progress reward issued");
        Ok(receipt)
    }

    /// All records of one user, by course id
    pub async fn list_for_user(&self, user: &Address) -> Result<Vec<CourseProgress>> {
        let mut all = self.progress.find(|p: &CourseProgress| p.user == *user).await?;
        all.sort_by_key(|p| p.course_id);
        Ok(all)
    }

    pub async fn is_module_unlocked(&self, user: &Address, course_id: CourseId, module_id: ModuleId) -> Result<bool> {
        Ok(self
            .get(user, course_id)
            .await?
            .and_then(|p| p.module(module_id).map(|m| m.unlocked))
            .unwrap_or(module_id == 1))
    }

    /// Record that the stake came back with a certificate
    pub async fn mark_stake_returned(
        &self,
        user: &Address,
        course_id: CourseId,
        certificate_id: u64,
    ) -> Result<CourseProgress> {
        let now = self.clock.now();
        let stored = self
            .progress
            .modify::<_, ServiceError>(&CourseProgress::document_id(user, course_id), |current| {
                let mut progress = current.ok_or_else(|| ServiceError::not_found("No progress found for this course"))?;
                progress.stake_returned = true;
                progress.certificate_id = Some(certificate_id);
                progress.completed_at = progress.completed_at.or(Some(now));
                progress.updated_at = now;
                Ok(progress)
            })
            .await?;
        Ok(versioned(stored))
    }

    /// Store (or replace) a submission for one of the course's assignments
    pub async fn submit_assignment(
        &self,
        user: Address,
        course_id: CourseId,
        assignment_id: &str,
        submission_data: serde_json::Value,
    ) -> Result<CourseProgress> {
        if assignment_id.trim().is_empty() {
            return Err(ServiceError::validation("Assignment id is required"));
        }
        if let Some(course) = self.courses.get(course_id).await? {
            if !course.assignments.iter().any(|a| a.id == assignment_id) {
                return Err(ServiceError::not_found(format!("Assignment {assignment_id} not found")));
            }
        }

        let now = self.clock.now();
        let stored = self
            .progress
            .modify::<_, ServiceError>(&CourseProgress::document_id(&user, course_id), |current| {
                let mut progress = current.ok_or_else(|| ServiceError::not_found("No progress found for this course"))?;
                progress.assignments.retain(|a| a.assignment_id != assignment_id);
                progress.assignments.push(AssignmentSubmission {
                    assignment_id: assignment_id.to_string(),
                    submitted_at: now,
                    submission_data: submission_data.clone(),
                    is_verified: false,
                    verified_at: None,
                    verified_by: None,
                    feedback: None,
                });
                progress.updated_at = now;
                progress.recompute();
                Ok(progress)
            })
            .await?;

        tracing::info!(%user, course_id, assignment_id, "Assignment submitted");
        Ok(versioned(stored))
    }

    /// Verifier sign-off on a submitted assignment
    pub async fn verify_assignment(
        &self,
        verifier: Address,
        user: Address,
        course_id: CourseId,
        assignment_id: &str,
        feedback: Option<String>,
    ) -> Result<CourseProgress> {
        if !self.courses.staking().is_verifier(&verifier) {
            return Err(StakingError::NotAuthorizedVerifier.into());
        }

        let now = self.clock.now();
        let stored = self
            .progress
            .modify::<_, ServiceError>(&CourseProgress::document_id(&user, course_id), |current| {
                let mut progress = current.ok_or_else(|| ServiceError::not_found("No progress found for this course"))?;
                let submission = progress
                    .assignments
                    .iter_mut()
                    .find(|a| a.assignment_id == assignment_id)
                    .ok_or_else(|| ServiceError::not_found(format!("No submission for assignment {assignment_id}")))?;
                submission.is_verified = true;
                submission.verified_at = Some(now);
                submission.verified_by = Some(verifier);
                submission.feedback = feedback.clone();
                progress.updated_at = now;
                progress.recompute();
                Ok(progress)
            })
            .await?;

        tracing::info!(%user, course_id, assignment_id, %verifier, "Assignment verified");
        Ok(versioned(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, LEARNER, OWNER};
    use crate::ServiceOptions;
    use poc_economics::constants::ONE_DATA;

    #[tokio::test]
    async fn test_new_record_unlocks_first_module() {
        let progress = CourseProgress::new(LEARNER, 1, 4, 0, 0);
        assert_eq!(progress.modules.len(), 4);
        assert!(progress.module(1).unwrap().unlocked);
        assert!(!progress.module(2).unwrap().unlocked);
        assert!(progress.module(0).is_none());
        assert_eq!(CourseProgress::document_id(&LEARNER, 1), format!("{}_1", LEARNER.to_hex()));
    }

    #[tokio::test]
    async fn test_get_or_init_uses_catalog_count() {
        let h = Harness::new();
        h.course(1, 6).await;

        let fresh = h.services.progress.get_or_init(LEARNER, 1, Some(3)).await.unwrap();
        assert_eq!(fresh.total_modules, 6);
        assert_eq!(fresh.version, 1);

        let other = h.services.progress.get_or_init(LEARNER, 2, Some(3)).await.unwrap();
        assert_eq!(other.total_modules, 3);
        let default = h.services.progress.get_or_init(LEARNER, 3, None).await.unwrap();
        assert_eq!(default.total_modules, 4);

        // second read returns the stored record
        let again = h.services.progress.get_or_init(LEARNER, 1, None).await.unwrap();
        assert_eq!(again, fresh);
    }

    #[tokio::test]
    async fn test_complete_module_pays_once() {
        let h = Harness::new();
        h.course(1, 4).await;
        h.stake(LEARNER, 1).await;

        let done = h.services.progress.complete_module(LEARNER, 1, 1, None).await.unwrap();
        assert_eq!(done.progress.completed_modules, 1);
        assert_eq!(done.progress.progress_percentage, 25);
        assert!(done.progress.module(2).unwrap().unlocked);
        let reward = done.reward.unwrap();
        assert_eq!(reward.amount, 3 * ONE_DATA);
        assert_eq!(
            done.progress.module(1).unwrap().transaction_hash.as_deref(),
            Some(reward.transaction_hash.as_str())
        );

        let err = h.services.progress.complete_module(LEARNER, 1, 1, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::ModuleAlreadyCompleted { module_id: 1 }));
        assert_eq!(h.services.ledgers.token.balance_of(&LEARNER), 3 * ONE_DATA);

        let history = h.services.transactions.list(&LEARNER).await.unwrap();
        assert!(history
            .iter()
            .any(|t| t.reason.as_deref() == Some("Module 1 completion reward")));
    }

    #[tokio::test]
    async fn test_locked_and_unknown_modules() {
        let h = Harness::new();
        h.course(1, 2).await;

        let err = h.services.progress.complete_module(LEARNER, 1, 2, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::ModuleLocked { module_id: 2 }));
        let err = h.services.progress.complete_module(LEARNER, 1, 3, None).await.unwrap_err();
        assert_eq!(err.status(), 400);
        let err = h.services.progress.complete_module(LEARNER, 1, 0, None).await.unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(h.services.ledgers.token.total_supply(), 0);
    }

    #[tokio::test]
    async fn test_any_order_when_not_sequential() {
        let mut options = ServiceOptions::new(OWNER);
        options.progress.sequential = false;
        let h = Harness::with_options(options);
        h.course(1, 3).await;

        h.services.progress.complete_module(LEARNER, 1, 3, None).await.unwrap();
        let done = h.services.progress.complete_module(LEARNER, 1, 1, None).await.unwrap();
        assert_eq!(done.progress.completed_modules, 2);
        assert!(!done.progress.is_course_completed);
    }

    #[tokio::test]
    async fn test_failed_reward_rolls_back() {
        // issuer mints from an account without the minter role
        let h = Harness::with_options(ServiceOptions::new(Address::repeat_byte(0x77)));
        h.course(1, 4).await;

        let err = h.services.progress.complete_module(LEARNER, 1, 1, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Token(_)));

        let stored = h.services.progress.get(&LEARNER, 1).await.unwrap().unwrap();
        assert_eq!(stored.completed_modules, 0);
        assert!(!stored.module(1).unwrap().completed);
        assert!(!stored.module(2).unwrap().unlocked);
        assert_eq!(stored.total_rewards_earned, 0);

        // once the role is granted the same module can be completed
        h.services.ledgers.token.add_minter(OWNER, Address::repeat_byte(0x77)).unwrap();
        h.services.progress.complete_module(LEARNER, 1, 1, None).await.unwrap();
        assert_eq!(h.services.ledgers.token.balance_of(&LEARNER), 3 * ONE_DATA);
    }

    #[tokio::test]
    async fn test_concurrent_completions_do_not_lose_updates() {
        let mut options = ServiceOptions::new(OWNER);
        options.progress.sequential = false;
        let h = Harness::with_options(options);
        h.course(1, 2).await;
        h.services.progress.get_or_init(LEARNER, 1, None).await.unwrap();

        let a = h.services.progress.clone();
        let b = h.services.progress.clone();
        let (ra, rb) = tokio::join!(
            a.complete_module(LEARNER, 1, 1, None),
            b.complete_module(LEARNER, 1, 2, None)
        );
        ra.unwrap();
        rb.unwrap();

        let stored = h.services.progress.get(&LEARNER, 1).await.unwrap().unwrap();
        assert_eq!(stored.completed_modules, 2);
        assert!(stored.is_course_completed);
        assert_eq!(h.services.ledgers.token.balance_of(&LEARNER), 6 * ONE_DATA);
    }

    #[tokio::test]
    async fn test_award_only_progress_kinds() {
        let h = Harness::new();
        let receipt = h
            .services
            .progress
            .award(LEARNER, RewardKind::DailyStreak, None)
            .await
            .unwrap();
        assert_eq!(receipt.amount, 5 * ONE_DATA);

        let err = h
            .services
            .progress
            .award(LEARNER, RewardKind::RepositoryApproval, None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn test_assignment_submit_and_verify() {
        let h = Harness::new();
        let mut course = crate::courses::NewCourse::new(9, "Assignments");
        course.assignments.push(crate::courses::NewAssignment {
            heading: "Ship it".into(),
            description: String::new(),
            allow_repo_submission: true,
        });
        let info = h.services.courses.register(OWNER, course).await.unwrap();
        let assignment_id = info.assignments[0].id.clone();
        h.services.progress.get_or_init(LEARNER, 9, None).await.unwrap();

        let err = h
            .services
            .progress
            .submit_assignment(LEARNER, 9, "nope", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);

        let submitted = h
            .services
            .progress
            .submit_assignment(LEARNER, 9, &assignment_id, serde_json::json!({"repo": "https://github.com/a/b"}))
            .await
            .unwrap();
        assert_eq!(submitted.total_assignments, 1);
        assert_eq!(submitted.verified_assignments, 0);

        let err = h
            .services
            .progress
            .verify_assignment(LEARNER, LEARNER, 9, &assignment_id, None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 403);

        let verified = h
            .services
            .progress
            .verify_assignment(OWNER, LEARNER, 9, &assignment_id, Some("Nice".into()))
            .await
            .unwrap();
        assert_eq!(verified.verified_assignments, 1);
        assert_eq!(verified.assignments[0].verified_by, Some(OWNER));
    }
}
