//! Repository submissions and commit review
//!
//! Learners submit GitHub repositories; verifiers approve or reject them
//! and review individual commits. Rewards go to the submitter. Reward
//! issuance is best-effort here: a failed mint is logged and the review
//! stands, and `data_coins_earned` only counts what was actually issued.
//!
//! Approvals and verified commits also add to the submitter's reputation
//! score, one point per DATA of the reward.

use crate::error::{Result, ServiceError};
use crate::issuer::{RewardIssuer, RewardReceipt};
use crate::transactions::{NewTransaction, TransactionKind, TransactionLog};
use poc_core::{Address, SharedClock};
use poc_economics::constants::ONE_DATA;
use poc_economics::{Reputation, RewardKind, StakingError, StakingManager};
use poc_storage::{collections, Collection, DocumentStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author: String,
    #[serde(default)]
    pub author_email: String,
    /// Unix seconds
    pub date: i64,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub status: CommitStatus,
    #[serde(default)]
    pub verified_at: Option<i64>,
    #[serde(default)]
    pub verified_by: Option<Address>,
    /// Whole DATA
    #[serde(default)]
    pub data_coins_earned: u64,
    #[serde(default)]
    pub verification_notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    pub user_address: Address,
    pub user_name: String,
    pub user_email: String,
    pub github_username: String,
    pub repo_url: String,
    pub repo_name: String,
    pub repo_owner: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub stars: u32,
    pub forks: u32,
    pub is_private: bool,
    pub status: RepositoryStatus,
    pub submitted_at: i64,
    pub reviewed_at: Option<i64>,
    pub reviewed_by: Option<Address>,
    /// Set by the first approval; later approvals pay nothing
    #[serde(default)]
    pub approval_paid: bool,
    /// Whole DATA issued for this repository
    pub data_coins_earned: u64,
    pub total_commits: u32,
    pub verified_commits: u32,
    pub commits: Vec<Commit>,
}

impl Repository {
    fn recount(&mut self) {
        self.total_commits = self.commits.len() as u32;
        self.verified_commits = self
            .commits
            .iter()
            .filter(|c| c.status == CommitStatus::Verified)
            .count() as u32;
    }
}

/// Repository metadata as fetched from GitHub by the client
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoData {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub forks: u32,
    #[serde(default)]
    pub is_private: bool,
    /// Defaults to `owner`
    #[serde(default)]
    pub github_username: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRepository {
    pub user_address: Address,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,
    pub repo_url: String,
    pub repo_data: RepoData,
}

/// Commit as delivered for review
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommit {
    pub sha: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_email: String,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub files_changed: Vec<String>,
}

/// Review of a single commit
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReview {
    pub commit_sha: String,
    pub status: CommitStatus,
    pub verified_by: Address,
    /// Whole DATA; defaults to the commit verification reward
    #[serde(default)]
    pub data_coins_earned: Option<u64>,
    #[serde(default)]
    pub verification_notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStats {
    pub total_repositories: u32,
    pub pending_repositories: u32,
    pub approved_repositories: u32,
    pub rejected_repositories: u32,
    pub total_commits: u32,
    pub verified_commits: u32,
    pub total_data_coins_earned: u64,
}

/// Repository workflow service
#[derive(Clone)]
pub struct RepositoryService {
    repos: Collection<Repository>,
    staking: Arc<StakingManager>,
    issuer: Arc<dyn RewardIssuer>,
    transactions: TransactionLog,
    reputation: Option<(Arc<Reputation>, Address)>,
    clock: SharedClock,
}

impl RepositoryService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        staking: Arc<StakingManager>,
        issuer: Arc<dyn RewardIssuer>,
        transactions: TransactionLog,
        clock: SharedClock,
    ) -> Self {
        Self {
            repos: Collection::new(store, collections::REPOSITORIES),
            staking,
            issuer,
            transactions,
            reputation: None,
            clock,
        }
    }

    /// Record reviewed contributions on `reputation`, sent from `recorder`
    pub fn with_reputation(mut self, reputation: Arc<Reputation>, recorder: Address) -> Self {
        self.reputation = Some((reputation, recorder));
        self
    }

    fn only_verifier(&self, reviewer: &Address) -> Result<()> {
        if !self.staking.is_verifier(reviewer) {
            return Err(StakingError::NotAuthorizedVerifier.into());
        }
        Ok(())
    }

    /// Store a submission and pay the submission reward
    pub async fn submit(&self, submission: NewRepository) -> Result<Repository> {
        let url = submission.repo_url.trim();
        if url.is_empty() {
            return Err(ServiceError::validation("Repository URL is required"));
        }
        if !url.starts_with("https://github.com/") {
            return Err(ServiceError::validation("Only GitHub repositories can be submitted"));
        }
        let data = submission.repo_data;
        if data.name.is_empty() || data.owner.is_empty() {
            return Err(ServiceError::validation("Repository name and owner are required"));
        }

        let duplicate = self
            .repos
            .find(|r: &Repository| r.user_address == submission.user_address && r.repo_url == url)
            .await?;
        if !duplicate.is_empty() {
            return Err(ServiceError::conflict("Repository already submitted"));
        }

        let repo = Repository {
            id: uuid::Uuid::new_v4().simple().to_string(),
            user_address: submission.user_address,
            user_name: submission.user_name,
            user_email: submission.user_email,
            github_username: data.github_username.unwrap_or_else(|| data.owner.clone()),
            repo_url: url.to_string(),
            repo_name: data.name,
            repo_owner: data.owner,
            description: data.description,
            language: data.language,
            stars: data.stars,
            forks: data.forks,
            is_private: data.is_private,
            status: RepositoryStatus::Pending,
            submitted_at: self.clock.now(),
            reviewed_at: None,
            reviewed_by: None,
            approval_paid: false,
            data_coins_earned: 0,
            total_commits: 0,
            verified_commits: 0,
            commits: Vec::new(),
        };
        self.repos.create(&repo.id, &repo).await?;
        tracing::info!(id = %repo.id, user = %repo.user_address, url = %repo.repo_url, "Repository submitted");

        let whole = RewardKind::RepositorySubmission.whole_amount();
        self.reward(&repo, whole, "Repository submission").await?;
        self.get(&repo.id).await
    }

    pub async fn get(&self, id: &str) -> Result<Repository> {
        self.repos
            .get(id)
            .await?
            .map(|v| v.value)
            .ok_or_else(|| ServiceError::not_found("Repository not found"))
    }

    /// One user's repositories, newest first
    pub async fn list_for_user(&self, user: &Address) -> Result<Vec<Repository>> {
        let mut repos = self.repos.find(|r: &Repository| r.user_address == *user).await?;
        repos.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(repos)
    }

    /// Every repository, newest first
    pub async fn list_all(&self) -> Result<Vec<Repository>> {
        let mut repos = self.repos.find(|_: &Repository| true).await?;
        repos.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(repos)
    }

    /// Verifier review; the first approval ever pays the approval reward (or
    /// `data_coins` if given), even if the repository is later rejected and
    /// approved again
    pub async fn update_status(
        &self,
        id: &str,
        status: RepositoryStatus,
        reviewed_by: Address,
        data_coins: Option<u64>,
    ) -> Result<Repository> {
        self.only_verifier(&reviewed_by)?;
        let now = self.clock.now();
        let mut newly_approved = false;

        let stored = self
            .repos
            .modify::<_, ServiceError>(id, |current| {
                let mut repo = current.ok_or_else(|| ServiceError::not_found("Repository not found"))?;
                newly_approved = status == RepositoryStatus::Approved && !repo.approval_paid;
                if newly_approved {
                    repo.approval_paid = true;
                }
                repo.status = status;
                repo.reviewed_at = Some(now);
                repo.reviewed_by = Some(reviewed_by);
                Ok(repo)
            })
            .await?;

        tracing::info!(id, status = ?status, reviewer = %reviewed_by, "Repository reviewed");

        if newly_approved {
            let whole = data_coins
                .filter(|n| *n > 0)
                .unwrap_or_else(|| RewardKind::RepositoryApproval.whole_amount());
            self.reward(&stored.value, whole, "Repository approval").await?;
            self.record_reputation(&stored.value, whole);
            return self.get(id).await;
        }
        Ok(stored.value)
    }

    /// Attach commits for review; shas already present are ignored
    pub async fn add_commits(&self, id: &str, commits: Vec<NewCommit>) -> Result<Repository> {
        let stored = self
            .repos
            .modify::<_, ServiceError>(id, |current| {
                let mut repo = current.ok_or_else(|| ServiceError::not_found("Repository not found"))?;
                let mut seen: HashSet<String> = repo.commits.iter().map(|c| c.sha.clone()).collect();
                for commit in &commits {
                    if commit.sha.is_empty() || !seen.insert(commit.sha.clone()) {
                        continue;
                    }
                    repo.commits.push(Commit {
                        sha: commit.sha.clone(),
                        message: commit.message.clone(),
                        author: commit.author.clone(),
                        author_email: commit.author_email.clone(),
                        date: commit.date,
                        additions: commit.additions,
                        deletions: commit.deletions,
                        files_changed: commit.files_changed.clone(),
                        status: CommitStatus::Pending,
                        verified_at: None,
                        verified_by: None,
                        data_coins_earned: 0,
                        verification_notes: None,
                    });
                }
                repo.recount();
                Ok(repo)
            })
            .await?;

        tracing::debug!(id, total = stored.value.total_commits, "Commits added");
        Ok(stored.value)
    }

    /// Review one pending commit; a verified commit pays its reward
    pub async fn verify_commit(&self, id: &str, review: CommitReview) -> Result<Repository> {
        self.only_verifier(&review.verified_by)?;
        if review.status == CommitStatus::Pending {
            return Err(ServiceError::validation("Commit review must verify or reject"));
        }
        let now = self.clock.now();

        let stored = self
            .repos
            .modify::<_, ServiceError>(id, |current| {
                let mut repo = current.ok_or_else(|| ServiceError::not_found("Repository not found"))?;
                let commit = repo
                    .commits
                    .iter_mut()
                    .find(|c| c.sha == review.commit_sha)
                    .ok_or_else(|| ServiceError::not_found(format!("Commit {} not found", review.commit_sha)))?;
                if commit.status != CommitStatus::Pending {
                    return Err(ServiceError::conflict("Commit already reviewed"));
                }
                commit.status = review.status;
                commit.verified_at = Some(now);
                commit.verified_by = Some(review.verified_by);
                commit.verification_notes = review.verification_notes.clone();
                repo.recount();
                Ok(repo)
            })
            .await?;

        tracing::info!(id, sha = %review.commit_sha, status = ?review.status, "Commit reviewed");

        if review.status != CommitStatus::Verified {
            return Ok(stored.value);
        }

        let whole = review
            .data_coins_earned
            .filter(|n| *n > 0)
            .unwrap_or_else(|| RewardKind::CommitVerification.whole_amount());
        self.record_reputation(&stored.value, whole);
        if self.reward(&stored.value, whole, "Commit verification").await?.is_some() {
            let sha = review.commit_sha.clone();
            self.repos
                .modify::<_, ServiceError>(id, |current| {
                    let mut repo = current.ok_or_else(|| ServiceError::not_found("Repository not found"))?;
                    if let Some(commit) = repo.commits.iter_mut().find(|c| c.sha == sha) {
                        commit.data_coins_earned = whole;
                    }
                    Ok(repo)
                })
                .await?;
        }
        self.get(id).await
    }

    pub async fn stats(&self) -> Result<RepositoryStats> {
        let repos = self.repos.find(|_: &Repository| true).await?;
        let mut stats = RepositoryStats::default();
        for repo in &repos {
            stats.total_repositories += 1;
            match repo.status {
                RepositoryStatus::Pending => stats.pending_repositories += 1,
                RepositoryStatus::Approved => stats.approved_repositories += 1,
                RepositoryStatus::Rejected => stats.rejected_repositories += 1,
            }
            stats.total_commits += repo.total_commits;
            stats.verified_commits += repo.verified_commits;
            stats.total_data_coins_earned += repo.data_coins_earned;
        }
        Ok(stats)
    }

    /// Credit the submitter's reputation; failures are logged only
    fn record_reputation(&self, repo: &Repository, score: u64) {
        let Some((reputation, recorder)) = &self.reputation else {
            return;
        };
        if let Err(err) = reputation.record_contribution(*recorder, repo.user_address, score) {
            tracing::warn!(id = %repo.id, user = %repo.user_address, error = %err, "Reputation not recorded");
        }
    }

    /// Mint `whole` DATA to the submitter and add it to the repository total
    ///
    /// Issuance failures are logged and yield `None`; storage failures after a
    /// successful mint are returned.
    async fn reward(&self, repo: &Repository, whole: u64, label: &str) -> Result<Option<RewardReceipt>> {
        let amount = u128::from(whole) * ONE_DATA;
        let reason = format!("{label}: {}", repo.repo_name);

        let receipt = match self.issuer.issue(repo.user_address, amount, &reason).await {
            Ok(receipt) => receipt,
            Err(err) => {
                tracing::warn!(id = %repo.id, user = %repo.user_address, error = %err, "Repository reward not issued");
                return Ok(None);
            }
        };

        self.repos
            .modify::<_, ServiceError>(&repo.id, |current| {
                let mut stored = current.ok_or_else(|| ServiceError::not_found("Repository not found"))?;
                stored.data_coins_earned = stored.data_coins_earned.saturating_add(whole);
                Ok(stored)
            })
            .await?;

        let tx = NewTransaction::new(repo.user_address, TransactionKind::Datacoin, amount)
            .hash(receipt.transaction_hash.clone())
            .reason(reason);
        if let Err(err) = self.transactions.record(tx).await {
            tracing::warn!(id = %repo.id, error = %err, "Repository reward transaction not recorded");
        }

        Ok(Some(receipt))
    }
}
