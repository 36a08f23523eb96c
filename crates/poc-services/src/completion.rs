//! Course completion
//!
//! A verifier closes a course once every module is done: the escrow refunds
//! the stake (the commit point), then the certificate is issued and the
//! off-chain records catch up. Re-running a completion whose ledger step
//! already happened picks up at the certificate, reusing the CID recorded
//! in the ledger's `CourseCompleted` event.

use crate::certificates::{certificate_cid, Certificate, CertificateRegistry, CertificateRequest};
use crate::courses::CourseService;
use crate::error::{Result, ServiceError};
use crate::progress::{CourseProgress, ProgressService};
use crate::stakes::StakingRecords;
use crate::transactions::{NewTransaction, TransactionKind, TransactionLog};
use poc_core::{Address, Balance, CourseId, SharedClock};
use poc_economics::{SkippedCompletion, Stake, StakingError, StakingEvent, StakingManager};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Result of one completed course
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReceipt {
    pub user: Address,
    pub course_id: CourseId,
    pub stake: Stake,
    pub certificate: Certificate,
    /// DATA already paid out for the course's modules
    #[serde(with = "poc_core::serde_amount")]
    pub data_coins_allocated: Balance,
}

/// Result of a batch completion
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCompletionReport {
    pub completed: Vec<CompletionReceipt>,
    pub skipped: Vec<SkippedCompletion>,
}

/// One (user, course) pair in a batch request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionTarget {
    pub user_address: Address,
    pub course_id: CourseId,
}

/// Completion flow
#[derive(Clone)]
pub struct CompletionService {
    staking: Arc<StakingManager>,
    courses: CourseService,
    progress: ProgressService,
    certificates: CertificateRegistry,
    records: StakingRecords,
    transactions: TransactionLog,
    clock: SharedClock,
}

impl CompletionService {
    pub fn new(
        courses: CourseService,
        progress: ProgressService,
        certificates: CertificateRegistry,
        records: StakingRecords,
        transactions: TransactionLog,
        clock: SharedClock,
    ) -> Self {
        Self {
            staking: courses.staking().clone(),
            courses,
            progress,
            certificates,
            records,
            transactions,
            clock,
        }
    }

    /// Progress record with every module done, or why not
    async fn finished_progress(&self, user: &Address, course_id: CourseId) -> Result<CourseProgress> {
        let progress = self
            .progress
            .get(user, course_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("No progress found for this course"))?;
        if !progress.is_course_completed {
            return Err(ServiceError::validation(format!(
                "Course modules not completed: {}/{}",
                progress.completed_modules, progress.total_modules
            )));
        }
        Ok(progress)
    }

    /// CID the ledger recorded for an earlier completion of this pair
    fn recorded_cid(&self, user: &Address, course_id: CourseId) -> Option<String> {
        self.staking.events().into_iter().rev().find_map(|event| match event {
            StakingEvent::CourseCompleted {
                user: u,
                course_id: c,
                certificate_cid,
            } if u == *user && c == course_id => Some(certificate_cid),
            _ => None,
        })
    }

    fn only_verifier(&self, verifier: &Address) -> Result<()> {
        if !self.staking.is_verifier(verifier) {
            return Err(StakingError::NotAuthorizedVerifier.into());
        }
        Ok(())
    }

    pub async fn complete_course(&self, verifier: Address, user: Address, course_id: CourseId) -> Result<CompletionReceipt> {
        self.only_verifier(&verifier)?;
        let progress = self.finished_progress(&user, course_id).await?;
        let cid = certificate_cid(&user, course_id, self.clock.now());

        let cid = match self.staking.complete_course(verifier, user, course_id, &cid) {
            Ok(_) => cid,
            Err(StakingError::AlreadyCompleted) => {
                match (self.certificates.get(&user, course_id).await?, self.recorded_cid(&user, course_id)) {
                    (None, Some(recorded)) => {
                        tracing::info!(%user, course_id, "Resuming completion after ledger refund");
                        recorded
                    }
                    _ => return Err(StakingError::AlreadyCompleted.into()),
                }
            }
            Err(e) => return Err(e.into()),
        };

        self.finish(verifier, progress, cid).await
    }

    /// Off-chain half of a completion whose ledger step succeeded
    async fn finish(&self, verifier: Address, progress: CourseProgress, cid: String) -> Result<CompletionReceipt> {
        let user = progress.user;
        let course_id = progress.course_id;
        let stake = self.staking.get_stake(&user, course_id);
        let course_title = self
            .courses
            .get(course_id)
            .await?
            .map(|c| c.title)
            .unwrap_or_else(|| format!("Course {course_id}"));

        let certificate = self
            .certificates
            .issue(CertificateRequest {
                owner: user,
                course_id,
                course_title,
                cid,
                modules_completed: progress.total_modules,
                stake_amount: stake.amount,
                issued_by: verifier,
            })
            .await?;

        self.progress
            .mark_stake_returned(&user, course_id, certificate.token_id)
            .await?;

        if let Err(err) = self.records.mark_refunded(&user, course_id).await {
            tracing::debug!(%user, course_id, error = %err, "No staking record to close");
        }

        let refund = NewTransaction::new(user, TransactionKind::Refund, stake.amount).course(course_id);
        let minted = NewTransaction::new(user, TransactionKind::Certificate, 0)
            .course(course_id)
            .reason(certificate.cid.clone());
        for tx in [refund, minted] {
            if let Err(err) = self.transactions.record(tx).await {
                tracing::warn!(%user, course_id, error = %err, "Completion transaction not recorded");
            }
        }

        Ok(CompletionReceipt {
            user,
            course_id,
            stake,
            data_coins_allocated: progress.total_rewards_earned,
            certificate,
        })
    }

    /// Complete many pairs; pairs that cannot complete are reported, not fatal
    ///
    /// A pair listed more than once is handled once.
    pub async fn batch_complete(&self, verifier: Address, targets: &[CompletionTarget]) -> Result<BatchCompletionReport> {
        self.only_verifier(&verifier)?;
        let mut report = BatchCompletionReport::default();
        let mut ready = Vec::with_capacity(targets.len());
        let mut seen = HashSet::with_capacity(targets.len());

        for target in targets.iter().filter(|t| seen.insert((t.user_address, t.course_id))) {
            match self.finished_progress(&target.user_address, target.course_id).await {
                Ok(progress) => ready.push(progress),
                Err(err) => report.skipped.push(SkippedCompletion {
                    user: target.user_address,
                    course_id: target.course_id,
                    reason: err.to_string(),
                }),
            }
        }

        let now = self.clock.now();
        let users: Vec<_> = ready.iter().map(|p| p.user).collect();
        let course_ids: Vec<_> = ready.iter().map(|p| p.course_id).collect();
        let cids: Vec<_> = ready
            .iter()
            .map(|p| certificate_cid(&p.user, p.course_id, now))
            .collect();

        let outcome = self
            .staking
            .batch_complete_courses(verifier, &users, &course_ids, &cids)?;
        report.skipped.extend(outcome.skipped);

        for (progress, cid) in ready.into_iter().zip(cids) {
            let pair = (progress.user, progress.course_id);
            if !outcome.completed.contains(&pair) {
                continue;
            }
            match self.finish(verifier, progress, cid).await {
                Ok(receipt) => report.completed.push(receipt),
                Err(err) => {
                    tracing::warn!(user = %pair.0, course_id = pair.1, error = %err, "Completion bookkeeping failed");
                    report.skipped.push(SkippedCompletion {
                        user: pair.0,
                        course_id: pair.1,
                        reason: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            "Batch completion finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stakes::StakeStatus;
    use crate::testing::{Harness, LEARNER, OWNER, STAKE};
    use poc_core::Address;
    use poc_economics::constants::ONE_DATA;

    async fn finished(h: &Harness, user: Address, course_id: CourseId) {
        h.course(course_id, 2).await;
        h.stake(user, course_id).await;
        h.finish_modules(user, course_id, 2).await;
    }

    #[tokio::test]
    async fn test_complete_course_refunds_and_certifies() {
        let h = Harness::new();
        finished(&h, LEARNER, 1).await;
        let before = h.services.ledgers.bank.balance_of(&LEARNER);

        let receipt = h.services.completion.complete_course(OWNER, LEARNER, 1).await.unwrap();

        assert_eq!(h.services.ledgers.bank.balance_of(&LEARNER), before + STAKE);
        assert!(receipt.stake.completed && receipt.stake.refunded);
        assert_eq!(receipt.data_coins_allocated, 6 * ONE_DATA);
        assert_eq!(receipt.certificate.course_title, "Course 1");
        assert_eq!(receipt.certificate.modules_completed, 2);
        assert_eq!(receipt.certificate.issued_by, OWNER);

        let progress = h.services.progress.get(&LEARNER, 1).await.unwrap().unwrap();
        assert!(progress.stake_returned);
        assert_eq!(progress.certificate_id, Some(receipt.certificate.token_id));

        let record = h.services.enrollment.records().get(&LEARNER, 1).await.unwrap().unwrap();
        assert_eq!(record.status, StakeStatus::Refunded);

        let kinds: Vec<_> = h
            .services
            .transactions
            .list(&LEARNER)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert!(kinds.contains(&TransactionKind::Refund));
        assert!(kinds.contains(&TransactionKind::Certificate));

        let err = h.services.completion.complete_course(OWNER, LEARNER, 1).await.unwrap_err();
        assert_eq!(err.to_string(), "Course already marked as completed");
    }

    #[tokio::test]
    async fn test_unfinished_modules_block_completion() {
        let h = Harness::new();
        h.course(1, 3).await;
        h.stake(LEARNER, 1).await;
        h.finish_modules(LEARNER, 1, 1).await;

        let err = h.services.completion.complete_course(OWNER, LEARNER, 1).await.unwrap_err();
        assert_eq!(err.to_string(), "Course modules not completed: 1/3");
        assert!(!h.services.ledgers.staking.has_completed(&LEARNER, 1));

        let err = h.services.completion.complete_course(OWNER, LEARNER, 7).await.unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn test_only_verifiers_complete() {
        let h = Harness::new();
        finished(&h, LEARNER, 1).await;

        let err = h.services.completion.complete_course(LEARNER, LEARNER, 1).await.unwrap_err();
        assert_eq!(err.status(), 403);
        assert!(h.services.certificates.get(&LEARNER, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resume_after_ledger_step() {
        let h = Harness::new();
        finished(&h, LEARNER, 1).await;

        // ledger completed out of band, certificate never issued
        h.services
            .ledgers
            .staking
            .complete_course(OWNER, LEARNER, 1, "QmRecorded")
            .unwrap();

        let receipt = h.services.completion.complete_course(OWNER, LEARNER, 1).await.unwrap();
        assert_eq!(receipt.certificate.cid, "QmRecorded");
    }

    #[tokio::test]
    async fn test_batch_reports_skips() {
        let h = Harness::new();
        let other = Address::repeat_byte(0x03);
        h.services.ledgers.bank.credit(other, STAKE).unwrap();

        finished(&h, LEARNER, 1).await;
        h.course(2, 2).await;
        h.stake(other, 2).await;

        let report = h
            .services
            .completion
            .batch_complete(
                OWNER,
                &[
                    CompletionTarget { user_address: LEARNER, course_id: 1 },
                    CompletionTarget { user_address: other, course_id: 2 },
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].user, LEARNER);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].user, other);
        assert!(report.skipped[0].reason.starts_with("Course modules not completed"));

        let err = h
            .services
            .completion
            .batch_complete(LEARNER, &[CompletionTarget { user_address: other, course_id: 2 }])
            .await
            .unwrap_err();
        assert_eq!(err.status(), 403);
    }

    #[tokio::test]
    async fn test_non_verifier_rejected_before_progress_checks() {
        let h = Harness::new();
        h.course(1, 3).await;

        // no progress at all: a verifier would get 404, a stranger gets 403
        let err = h.services.completion.complete_course(LEARNER, LEARNER, 1).await.unwrap_err();
        assert_eq!(err.status(), 403);
        assert_eq!(err.to_string(), "Not authorized verifier");

        h.stake(LEARNER, 1).await;
        let err = h.services.completion.complete_course(LEARNER, LEARNER, 1).await.unwrap_err();
        assert_eq!(err.status(), 403);
        let err = h.services.completion.complete_course(OWNER, LEARNER, 1).await.unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn test_batch_handles_repeated_pair_once() {
        let h = Harness::new();
        finished(&h, LEARNER, 1).await;
        let target = CompletionTarget { user_address: LEARNER, course_id: 1 };

        let report = h
            .services
            .completion
            .batch_complete(OWNER, &[target, target, target])
            .await
            .unwrap();

        assert_eq!(report.completed.len(), 1);
        assert!(report.skipped.is_empty(), "{:?}", report.skipped);
        assert_eq!(h.services.certificates.list_for_owner(&LEARNER).await.unwrap().len(), 1);
    }
}
