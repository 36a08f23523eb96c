//! # Course Staking
//!
//! Escrow that holds one stake per (user, course) until a verifier marks the
//! course completed, at which point the full stake is refunded.
//!
//! ## Stake Lifecycle
//!
//! ```text
//! (none) ──stake──► (completed=false, refunded=false)
//!                          │
//!                    completeCourse
//!                          ▼
//!                  (completed=true, refunded=true)
//! ```
//!
//! The transition is one-way. A missing stake reads as the zero stake.

use crate::bank::{BankError, NativeBank};
use parking_lot::RwLock;
use poc_core::{serde_amount, Address, CourseId, SharedClock, Wei};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Stake record for one (user, course) pair
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stake {
    /// Staked amount in wei, immutable once set
    #[serde(with = "serde_amount")]
    pub amount: Wei,
    /// Unix seconds
    pub timestamp: i64,
    pub completed: bool,
    pub refunded: bool,
}

impl Stake {
    /// Whether a stake has been placed
    pub fn exists(&self) -> bool {
        self.amount > 0
    }
}

/// Course configuration on the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseConfig {
    #[serde(with = "serde_amount")]
    pub stake_amount: Wei,
    pub active: bool,
}

/// Staking event log entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum StakingEvent {
    Staked {
        user: Address,
        course_id: CourseId,
        #[serde(with = "serde_amount")]
        amount: Wei,
    },
    CourseCompleted {
        user: Address,
        course_id: CourseId,
        certificate_cid: String,
    },
    StakeRefunded {
        user: Address,
        course_id: CourseId,
        #[serde(with = "serde_amount")]
        amount: Wei,
    },
    CourseAdded {
        course_id: CourseId,
        #[serde(with = "serde_amount")]
        stake_amount: Wei,
    },
    CourseUpdated {
        course_id: CourseId,
        #[serde(with = "serde_amount")]
        stake_amount: Wei,
        active: bool,
    },
    VerifierAdded { verifier: Address },
    VerifierRemoved { verifier: Address },
    EmergencyWithdraw {
        owner: Address,
        #[serde(with = "serde_amount")]
        amount: Wei,
    },
}

/// One pair left untouched by a batch completion
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedCompletion {
    pub user: Address,
    pub course_id: CourseId,
    pub reason: String,
}

/// Result of `batch_complete_courses`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub completed: Vec<(Address, CourseId)>,
    pub skipped: Vec<SkippedCompletion>,
}

/// Complete escrow state, also the snapshot format
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingState {
    pub owner: Address,
    pub stakes: HashMap<Address, BTreeMap<CourseId, Stake>>,
    pub courses: BTreeMap<CourseId, CourseConfig>,
    pub verifiers: HashSet<Address>,
    pub events: Vec<StakingEvent>,
}

impl StakingState {
    fn only_owner(&self, caller: &Address) -> Result<(), StakingError> {
        if *caller != self.owner {
            return Err(StakingError::OwnableUnauthorizedAccount(*caller));
        }
        Ok(())
    }

    fn only_verifier(&self, caller: &Address) -> Result<(), StakingError> {
        if !self.verifiers.contains(caller) && *caller != self.owner {
            return Err(StakingError::NotAuthorizedVerifier);
        }
        Ok(())
    }

    fn stake(&self, user: &Address, course_id: CourseId) -> Stake {
        self.stakes
            .get(user)
            .and_then(|m| m.get(&course_id))
            .copied()
            .unwrap_or_default()
    }

    /// Reason a pair cannot be completed, if any
    fn completion_blocker(&self, user: &Address, course_id: CourseId) -> Option<StakingError> {
        let stake = self.stake(user, course_id);
        if !stake.exists() {
            Some(StakingError::NoStakeFound)
        } else if stake.completed {
            Some(StakingError::AlreadyCompleted)
        } else if stake.refunded {
            Some(StakingError::AlreadyRefunded)
        } else {
            None
        }
    }
}

/// Course stake escrow
pub struct StakingManager {
    /// Escrow account in the bank
    address: Address,
    bank: Arc<NativeBank>,
    clock: SharedClock,
    state: RwLock<StakingState>,
}

impl StakingManager {
    /// Deploy with `owner` as the first verifier
    pub fn new(address: Address, owner: Address, bank: Arc<NativeBank>, clock: SharedClock) -> Self {
        let mut verifiers = HashSet::new();
        verifiers.insert(owner);

        Self::from_snapshot(
            address,
            bank,
            clock,
            StakingState {
                owner,
                verifiers,
                ..Default::default()
            },
        )
    }

    /// Restore from a snapshot
    pub fn from_snapshot(address: Address, bank: Arc<NativeBank>, clock: SharedClock, state: StakingState) -> Self {
        Self {
            address,
            bank,
            clock,
            state: RwLock::new(state),
        }
    }

    /// Copy of the full state
    pub fn snapshot(&self) -> StakingState {
        self.state.read().clone()
    }

    /// Escrow account address
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.state.read().owner
    }

    /// Register a course; new courses are active
    pub fn add_course(&self, caller: Address, course_id: CourseId, stake_amount: Wei) -> Result<(), StakingError> {
        let mut state = self.state.write();
        state.only_owner(&caller)?;

        if state.courses.contains_key(&course_id) {
            return Err(StakingError::CourseAlreadyExists);
        }
        if stake_amount == 0 {
            return Err(StakingError::ZeroStakeAmount);
        }

        state.courses.insert(
            course_id,
            CourseConfig {
                stake_amount,
                active: true,
            },
        );
        state.events.push(StakingEvent::CourseAdded {
            course_id,
            stake_amount,
        });

        tracing::info!(course_id, stake_amount, "Course added");
        Ok(())
    }

    /// Change stake amount and active flag; existing stakes keep their amount
    pub fn update_course(
        &self,
        caller: Address,
        course_id: CourseId,
        stake_amount: Wei,
        active: bool,
    ) -> Result<(), StakingError> {
        let mut state = self.state.write();
        state.only_owner(&caller)?;

        if !state.courses.contains_key(&course_id) {
            return Err(StakingError::CourseNotFound);
        }
        if stake_amount == 0 {
            return Err(StakingError::ZeroStakeAmount);
        }

        state.courses.insert(course_id, CourseConfig { stake_amount, active });
        state.events.push(StakingEvent::CourseUpdated {
            course_id,
            stake_amount,
            active,
        });

        tracing::info!(course_id, stake_amount, active, "Course updated");
        Ok(())
    }

    pub fn add_verifier(&self, caller: Address, verifier: Address) -> Result<(), StakingError> {
        let mut state = self.state.write();
        state.only_owner(&caller)?;
        if verifier.is_zero() {
            return Err(StakingError::InvalidVerifier);
        }

        state.verifiers.insert(verifier);
        state.events.push(StakingEvent::VerifierAdded { verifier });
        tracing::info!(%verifier, "Verifier added");
        Ok(())
    }

    pub fn remove_verifier(&self, caller: Address, verifier: Address) -> Result<(), StakingError> {
        let mut state = self.state.write();
        state.only_owner(&caller)?;

        state.verifiers.remove(&verifier);
        state.events.push(StakingEvent::VerifierRemoved { verifier });
        tracing::info!(%verifier, "Verifier removed");
        Ok(())
    }

    /// Stake exactly the course amount, paid from the caller's native balance
    pub fn stake(&self, caller: Address, course_id: CourseId, value: Wei) -> Result<Stake, StakingError> {
        let mut state = self.state.write();

        let course = state.courses.get(&course_id).copied();
        if !course.map(|c| c.active).unwrap_or(false) {
            return Err(StakingError::CourseNotActive);
        }
        let course = course.ok_or(StakingError::CourseNotFound)?;

        if value != course.stake_amount {
            return Err(StakingError::IncorrectStakeAmount);
        }
        if state.stake(&caller, course_id).exists() {
            return Err(StakingError::AlreadyStaked);
        }

        self.bank.transfer(caller, self.address, value)?;

        let stake = Stake {
            amount: value,
            timestamp: self.clock.now(),
            completed: false,
            refunded: false,
        };
        state.stakes.entry(caller).or_default().insert(course_id, stake);
        state.events.push(StakingEvent::Staked {
            user: caller,
            course_id,
            amount: value,
        });

        tracing::info!(user = %caller, course_id, amount = value, "Stake placed");
        Ok(stake)
    }

    /// Mark a course completed and refund the stake
    pub fn complete_course(
        &self,
        caller: Address,
        user: Address,
        course_id: CourseId,
        certificate_cid: &str,
    ) -> Result<Stake, StakingError> {
        let mut state = self.state.write();
        state.only_verifier(&caller)?;

        if let Some(err) = state.completion_blocker(&user, course_id) {
            return Err(err);
        }

        self.refund_locked(&mut state, user, course_id, certificate_cid)
            .map_err(|_| StakingError::RefundTransferFailed)
    }

    /// Complete many pairs, skipping the ones that cannot be completed
    pub fn batch_complete_courses(
        &self,
        caller: Address,
        users: &[Address],
        course_ids: &[CourseId],
        certificate_cids: &[String],
    ) -> Result<BatchOutcome, StakingError> {
        let mut state = self.state.write();
        state.only_verifier(&caller)?;

        if users.len() != course_ids.len() {
            return Err(StakingError::ArraysLengthMismatch);
        }
        if users.len() != certificate_cids.len() {
            return Err(StakingError::CidsLengthMismatch);
        }

        let mut outcome = BatchOutcome::default();

        for ((user, course_id), cid) in users.iter().zip(course_ids).zip(certificate_cids) {
            let result = match state.completion_blocker(user, *course_id) {
                Some(err) => Err(err),
                None => self
                    .refund_locked(&mut state, *user, *course_id, cid)
                    .map_err(|_| StakingError::RefundTransferFailed),
            };

            match result {
                Ok(_) => outcome.completed.push((*user, *course_id)),
                Err(err) => {
                    tracing::warn!(%user, course_id, reason = %err, "Batch completion skipped");
                    outcome.skipped.push(SkippedCompletion {
                        user: *user,
                        course_id: *course_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Flip the stake to (true, true) and pay it back; no change on failure
    fn refund_locked(
        &self,
        state: &mut StakingState,
        user: Address,
        course_id: CourseId,
        certificate_cid: &str,
    ) -> Result<Stake, BankError> {
        let mut stake = state.stake(&user, course_id);

        self.bank.transfer(self.address, user, stake.amount)?;

        stake.completed = true;
        stake.refunded = true;
        state.stakes.entry(user).or_default().insert(course_id, stake);
        state.events.push(StakingEvent::CourseCompleted {
            user,
            course_id,
            certificate_cid: certificate_cid.to_string(),
        });
        state.events.push(StakingEvent::StakeRefunded {
            user,
            course_id,
            amount: stake.amount,
        });

        tracing::info!(%user, course_id, amount = stake.amount, "Course completed, stake refunded");
        Ok(stake)
    }

    /// Sweep the whole escrow balance to the owner
    pub fn emergency_withdraw(&self, caller: Address) -> Result<Wei, StakingError> {
        let mut state = self.state.write();
        state.only_owner(&caller)?;

        let balance = self.bank.balance_of(&self.address);
        if balance == 0 {
            return Err(StakingError::NoBalanceToWithdraw);
        }

        let owner = state.owner;
        self.bank
            .transfer(self.address, owner, balance)
            .map_err(|_| StakingError::WithdrawalFailed)?;
        state.events.push(StakingEvent::EmergencyWithdraw { owner, amount: balance });

        tracing::warn!(%owner, amount = balance, "Emergency withdraw");
        Ok(balance)
    }

    // === Views ===

    pub fn get_stake(&self, user: &Address, course_id: CourseId) -> Stake {
        self.state.read().stake(user, course_id)
    }

    pub fn has_staked(&self, user: &Address, course_id: CourseId) -> bool {
        self.get_stake(user, course_id).exists()
    }

    pub fn has_completed(&self, user: &Address, course_id: CourseId) -> bool {
        self.get_stake(user, course_id).completed
    }

    /// Configured stake, zero for unknown courses
    pub fn course_stake_amount(&self, course_id: CourseId) -> Wei {
        self.state
            .read()
            .courses
            .get(&course_id)
            .map(|c| c.stake_amount)
            .unwrap_or(0)
    }

    pub fn is_course_active(&self, course_id: CourseId) -> bool {
        self.state
            .read()
            .courses
            .get(&course_id)
            .map(|c| c.active)
            .unwrap_or(false)
    }

    pub fn course(&self, course_id: CourseId) -> Option<CourseConfig> {
        self.state.read().courses.get(&course_id).copied()
    }

    pub fn is_verifier(&self, account: &Address) -> bool {
        let state = self.state.read();
        state.verifiers.contains(account) || *account == state.owner
    }

    /// Stakes for `user` in the order of `course_ids`
    pub fn get_user_stakes(&self, user: &Address, course_ids: &[CourseId]) -> Vec<Stake> {
        let state = self.state.read();
        course_ids.iter().map(|id| state.stake(user, *id)).collect()
    }

    pub fn contract_balance(&self) -> Wei {
        self.bank.balance_of(&self.address)
    }

    /// Event log in emission order
    pub fn events(&self) -> Vec<StakingEvent> {
        self.state.read().events.clone()
    }
}

/// Staking errors, displayed as the contract revert reasons
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StakingError {
    #[error("OwnableUnauthorizedAccount({0})")]
    OwnableUnauthorizedAccount(Address),

    #[error("Not authorized verifier")]
    NotAuthorizedVerifier,

    #[error("Course already exists")]
    CourseAlreadyExists,

    #[error("Stake amount must be greater than 0")]
    ZeroStakeAmount,

    #[error("Course does not exist")]
    CourseNotFound,

    #[error("Invalid verifier address")]
    InvalidVerifier,

    #[error("Course is not active")]
    CourseNotActive,

    #[error("Incorrect stake amount")]
    IncorrectStakeAmount,

    #[error("Already staked for this course")]
    AlreadyStaked,

    #[error("No stake found for this user and course")]
    NoStakeFound,

    #[error("Course already marked as completed")]
    AlreadyCompleted,

    #[error("Stake already refunded")]
    AlreadyRefunded,

    #[error("Refund transfer failed")]
    RefundTransferFailed,

    #[error("No balance to withdraw")]
    NoBalanceToWithdraw,

    #[error("Withdrawal failed")]
    WithdrawalFailed,

    #[error("Arrays length mismatch")]
    ArraysLengthMismatch,

    #[error("Certificate CIDs length mismatch")]
    CidsLengthMismatch,

    #[error(transparent)]
    Bank(#[from] BankError),
}

impl StakingError {
    /// Whether the sender lacked the required role
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::OwnableUnauthorizedAccount(_) | Self::NotAuthorizedVerifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_COURSE_STAKE;
    use poc_core::ManualClock;
    use proptest::prelude::*;

    const STAKE: Wei = DEFAULT_COURSE_STAKE;

    fn owner() -> Address {
        Address::repeat_byte(0x0a)
    }

    fn user() -> Address {
        Address::repeat_byte(0x0b)
    }

    fn escrow() -> Address {
        Address::repeat_byte(0xee)
    }

    fn setup() -> (StakingManager, Arc<NativeBank>) {
        let bank = Arc::new(NativeBank::new());
        bank.credit(user(), 10 * STAKE).unwrap();

        let manager = StakingManager::new(escrow(), owner(), bank.clone(), ManualClock::shared(1_700_000_000));
        manager.add_course(owner(), 1, STAKE).unwrap();
        (manager, bank)
    }

    #[test]
    fn test_owner_is_verifier() {
        let (manager, _) = setup();
        assert!(manager.is_verifier(&owner()));
        assert!(!manager.is_verifier(&user()));
    }

    #[test]
    fn test_add_course_guards() {
        let (manager, _) = setup();

        assert!(matches!(
            manager.add_course(user(), 2, STAKE),
            Err(StakingError::OwnableUnauthorizedAccount(_))
        ));
        assert_eq!(manager.add_course(owner(), 1, STAKE), Err(StakingError::CourseAlreadyExists));
        assert_eq!(manager.add_course(owner(), 2, 0), Err(StakingError::ZeroStakeAmount));
        assert_eq!(manager.update_course(owner(), 9, STAKE, true), Err(StakingError::CourseNotFound));
    }

    #[test]
    fn test_stake_and_complete_refunds() {
        let (manager, bank) = setup();
        let before = bank.balance_of(&user());

        let stake = manager.stake(user(), 1, STAKE).unwrap();
        assert_eq!(stake.timestamp, 1_700_000_000);
        assert!(manager.has_staked(&user(), 1));
        assert_eq!(manager.contract_balance(), STAKE);
        assert_eq!(bank.balance_of(&user()), before - STAKE);

        let done = manager.complete_course(owner(), user(), 1, "bafy-cert").unwrap();
        assert!(done.completed && done.refunded);
        assert!(manager.has_completed(&user(), 1));
        assert_eq!(bank.balance_of(&user()), before);
        assert_eq!(manager.contract_balance(), 0);

        let events = manager.events();
        assert!(events.contains(&StakingEvent::CourseCompleted {
            user: user(),
            course_id: 1,
            certificate_cid: "bafy-cert".to_string(),
        }));
        assert!(events.contains(&StakingEvent::StakeRefunded {
            user: user(),
            course_id: 1,
            amount: STAKE,
        }));
    }

    #[test]
    fn test_stake_guards() {
        let (manager, _) = setup();

        assert_eq!(manager.stake(user(), 7, STAKE), Err(StakingError::CourseNotActive));
        assert_eq!(manager.stake(user(), 1, STAKE + 1), Err(StakingError::IncorrectStakeAmount));

        manager.stake(user(), 1, STAKE).unwrap();
        assert_eq!(manager.stake(user(), 1, STAKE), Err(StakingError::AlreadyStaked));

        manager.update_course(owner(), 1, STAKE, false).unwrap();
        manager.add_course(owner(), 2, STAKE).unwrap();
        manager.update_course(owner(), 2, STAKE, false).unwrap();
        assert_eq!(manager.stake(user(), 2, STAKE), Err(StakingError::CourseNotActive));
    }

    #[test]
    fn test_stake_requires_funds() {
        let (manager, bank) = setup();
        let poor = Address::repeat_byte(0x0c);

        let err = manager.stake(poor, 1, STAKE).unwrap_err();
        assert!(matches!(err, StakingError::Bank(BankError::InsufficientFunds { .. })));
        assert!(!manager.has_staked(&poor, 1));
        assert_eq!(bank.balance_of(&escrow()), 0);
    }

    #[test]
    fn test_complete_is_one_way() {
        let (manager, _) = setup();

        assert_eq!(
            manager.complete_course(owner(), user(), 1, "cid"),
            Err(StakingError::NoStakeFound)
        );

        manager.stake(user(), 1, STAKE).unwrap();
        assert_eq!(
            manager.complete_course(user(), user(), 1, "cid"),
            Err(StakingError::NotAuthorizedVerifier)
        );

        manager.complete_course(owner(), user(), 1, "cid").unwrap();
        assert_eq!(
            manager.complete_course(owner(), user(), 1, "cid"),
            Err(StakingError::AlreadyCompleted)
        );
    }

    #[test]
    fn test_refund_failure_leaves_stake_untouched() {
        let (manager, bank) = setup();
        manager.stake(user(), 1, STAKE).unwrap();
        manager.emergency_withdraw(owner()).unwrap();
        assert_eq!(bank.balance_of(&owner()), STAKE);

        assert_eq!(
            manager.complete_course(owner(), user(), 1, "cid"),
            Err(StakingError::RefundTransferFailed)
        );
        let stake = manager.get_stake(&user(), 1);
        assert!(!stake.completed && !stake.refunded);
    }

    #[test]
    fn test_emergency_withdraw_guards() {
        let (manager, _) = setup();
        assert!(matches!(
            manager.emergency_withdraw(user()),
            Err(StakingError::OwnableUnauthorizedAccount(_))
        ));
        assert_eq!(manager.emergency_withdraw(owner()), Err(StakingError::NoBalanceToWithdraw));
    }

    #[test]
    fn test_verifier_management() {
        let (manager, _) = setup();
        let verifier = Address::repeat_byte(0x0d);

        assert_eq!(manager.add_verifier(owner(), Address::ZERO), Err(StakingError::InvalidVerifier));
        manager.add_verifier(owner(), verifier).unwrap();
        manager.stake(user(), 1, STAKE).unwrap();
        manager.complete_course(verifier, user(), 1, "cid").unwrap();

        manager.remove_verifier(owner(), verifier).unwrap();
        assert!(!manager.is_verifier(&verifier));
    }

    #[test]
    fn test_batch_reports_skips() {
        let (manager, bank) = setup();
        let other = Address::repeat_byte(0x0c);
        bank.credit(other, STAKE).unwrap();

        manager.stake(user(), 1, STAKE).unwrap();
        manager.stake(other, 1, STAKE).unwrap();
        manager.complete_course(owner(), other, 1, "early").unwrap();

        let users = vec![user(), other, Address::repeat_byte(0x0f)];
        let courses = vec![1, 1, 1];
        let cids = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let outcome = manager.batch_complete_courses(owner(), &users, &courses, &cids).unwrap();
        assert_eq!(outcome.completed, vec![(user(), 1)]);
        assert_eq!(outcome.skipped.len(), 2);
        assert_eq!(outcome.skipped[0].reason, "Course already marked as completed");
        assert_eq!(outcome.skipped[1].reason, "No stake found for this user and course");
        assert!(manager.has_completed(&user(), 1));
    }

    #[test]
    fn test_batch_length_checks() {
        let (manager, _) = setup();
        let cids = vec!["a".to_string()];

        assert_eq!(
            manager.batch_complete_courses(owner(), &[user()], &[1, 2], &cids),
            Err(StakingError::ArraysLengthMismatch)
        );
        assert_eq!(
            manager.batch_complete_courses(owner(), &[user()], &[1], &[]),
            Err(StakingError::CidsLengthMismatch)
        );
        assert_eq!(
            manager.batch_complete_courses(user(), &[user()], &[1], &cids),
            Err(StakingError::NotAuthorizedVerifier)
        );
    }

    #[test]
    fn test_get_user_stakes_and_missing_stake() {
        let (manager, _) = setup();
        manager.stake(user(), 1, STAKE).unwrap();

        let stakes = manager.get_user_stakes(&user(), &[1, 99]);
        assert_eq!(stakes[0].amount, STAKE);
        assert_eq!(stakes[1], Stake::default());
        assert_eq!(manager.course_stake_amount(99), 0);
    }

    proptest! {
        #[test]
        fn prop_at_most_one_stake_per_pair(values in proptest::collection::vec(0u128..3 * STAKE, 1..8)) {
            let (manager, bank) = setup();
            let start = bank.balance_of(&user());
            let mut successes = 0;

            for value in values {
                if manager.stake(user(), 1, value).is_ok() {
                    successes += 1;
                }
            }

            prop_assert!(successes <= 1);
            prop_assert_eq!(bank.balance_of(&user()) + manager.contract_balance(), start);
        }
    }
}
