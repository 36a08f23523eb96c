//! Consumer data contributions
//!
//! A learner proves activity on an outside service (GitHub, Uber, Amazon)
//! with a zkTLS proof. The proof goes through a `ProofVerifier`, the
//! verified claims are priced with `consumer_data_reward`, and the first
//! verified contribution of a user earns a one-time bonus.

use crate::error::{Result, ServiceError};
use crate::transactions::{NewTransaction, TransactionKind, TransactionLog};
use async_trait::async_trait;
use poc_core::{Address, SharedClock};
use poc_economics::constants::ONE_DATA;
use poc_economics::{consumer_data_reward, DataSource, RewardKind};
use poc_storage::{collections, Collection, DocumentStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::issuer::RewardIssuer;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubClaims {
    pub commits: u64,
    pub pull_requests: u64,
    pub issues: u64,
    pub repositories: u64,
    pub contribution_streak: u64,
    /// commits + pull requests + issues, saturating
    pub total_contributions: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UberClaims {
    pub rides: u64,
    pub total_distance: f64,
    pub total_spent: f64,
    pub average_ride_cost: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmazonClaims {
    pub orders: u64,
    pub categories: Vec<String>,
    pub total_spent: f64,
    pub average_order_value: f64,
}

/// Verified facts extracted from a proof
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConsumerClaims {
    Github(GithubClaims),
    Uber(UberClaims),
    Amazon(AmazonClaims),
}

fn count(data: &Value, key: &str) -> u64 {
    data.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn amount(data: &Value, key: &str) -> f64 {
    data.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn average(total: f64, n: u64) -> f64 {
    if n == 0 {
        0.0
    } else {
        total / n as f64
    }
}

impl ConsumerClaims {
    /// Read the claims for `source`, treating missing fields as zero
    pub fn from_value(source: DataSource, data: &Value) -> Self {
        match source {
            DataSource::Github => {
                let (commits, pull_requests, issues) =
                    (count(data, "commits"), count(data, "pullRequests"), count(data, "issues"));
                Self::Github(GithubClaims {
                    commits,
                    pull_requests,
                    issues,
                    repositories: count(data, "repositories"),
                    contribution_streak: count(data, "contributionStreak"),
                    total_contributions: commits.saturating_add(pull_requests).saturating_add(issues),
                })
            }
            DataSource::Uber => {
                let rides = count(data, "rides");
                let total_spent = amount(data, "totalSpent");
                Self::Uber(UberClaims {
                    rides,
                    total_distance: amount(data, "totalDistance"),
                    total_spent,
                    average_ride_cost: average(total_spent, rides),
                })
            }
            DataSource::Amazon => {
                let orders = count(data, "orders");
                let total_spent = amount(data, "totalSpent");
                Self::Amazon(AmazonClaims {
                    orders,
                    categories: data
                        .get("categories")
                        .and_then(Value::as_array)
                        .map(|c| c.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                        .unwrap_or_default(),
                    total_spent,
                    average_order_value: average(total_spent, orders),
                })
            }
        }
    }

    /// Activity count the reward schedule is applied to
    pub fn activity(&self) -> u64 {
        match self {
            Self::Github(c) => c.total_contributions,
            Self::Uber(c) => c.rides,
            Self::Amazon(c) => c.orders,
        }
    }
}

/// Outcome of a successful proof check
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedProof {
    pub claims: ConsumerClaims,
    pub proof_hash: String,
    pub data_hash: String,
}

/// zkTLS proof verification
#[async_trait]
pub trait ProofVerifier: Send + Sync {
    /// Verify `proof_data` for `source`, returning the claims or a rejection reason
    async fn verify(&self, source: DataSource, proof_data: &str) -> std::result::Result<VerifiedProof, String>;
}

/// Deterministic verifier that trusts the claims carried in the proof
///
/// `proof_data` must be a JSON object; claims are read from its `claims`
/// member if present, else from the object itself. No signature is checked.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClaimsVerifier;

fn blake3_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(blake3::hash(bytes).as_bytes()))
}

#[async_trait]
impl ProofVerifier for ClaimsVerifier {
    async fn verify(&self, source: DataSource, proof_data: &str) -> std::result::Result<VerifiedProof, String> {
        let parsed: Value = serde_json::from_str(proof_data).map_err(|e| format!("invalid proof data: {e}"))?;
        if !parsed.is_object() {
            return Err("proof data must be a JSON object".to_string());
        }
        let data = parsed.get("claims").filter(|c| c.is_object()).unwrap_or(&parsed);

        let claims = ConsumerClaims::from_value(source, data);
        let encoded = serde_json::to_vec(&claims).map_err(|e| e.to_string())?;

        Ok(VerifiedProof {
            proof_hash: blake3_hex(proof_data.as_bytes()),
            data_hash: blake3_hex(&encoded),
            claims,
        })
    }
}

/// Stored contribution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerContribution {
    pub user_address: Address,
    pub data_source: DataSource,
    pub proof_hash: String,
    pub data_hash: String,
    pub timestamp: i64,
    /// Whole DATA, bonus included
    pub data_coins_earned: u64,
    pub verified: bool,
    pub is_first_verification: bool,
    pub claims: ConsumerClaims,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zk_proof: Option<Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct UserContributions {
    contributions: Vec<ConsumerContribution>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounts {
    pub github: u32,
    pub uber: u32,
    pub amazon: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionStats {
    pub total_contributions: u32,
    pub total_data_coins: u64,
    pub by_source: SourceCounts,
    pub last_contribution: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionSummary {
    pub contributions: Vec<ConsumerContribution>,
    pub stats: ContributionStats,
}

/// Result of `ConsumerDataService::submit`
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub contribution: ConsumerContribution,
    pub data_coins_earned: u64,
    pub transaction_hash: Option<String>,
}

/// Consumer data service
#[derive(Clone)]
pub struct ConsumerDataService {
    contributions: Collection<UserContributions>,
    verifier: Arc<dyn ProofVerifier>,
    issuer: Arc<dyn RewardIssuer>,
    transactions: TransactionLog,
    clock: SharedClock,
}

impl ConsumerDataService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        verifier: Arc<dyn ProofVerifier>,
        issuer: Arc<dyn RewardIssuer>,
        transactions: TransactionLog,
        clock: SharedClock,
    ) -> Self {
        Self {
            contributions: Collection::new(store, collections::CONSUMER_DATA),
            verifier,
            issuer,
            transactions,
            clock,
        }
    }

    /// Verify a proof, store the contribution and mint its reward
    ///
    /// The contribution is stored first; if minting fails it is removed
    /// again and the error returned, so a proof is paid at most once. A
    /// proof is a replay if its bytes or its claims match an earlier one
    /// from the same user.
    pub async fn submit(
        &self,
        user: Address,
        source: DataSource,
        proof_data: &str,
        zk_proof: Option<Value>,
    ) -> Result<SubmissionReceipt> {
        if proof_data.trim().is_empty() {
            return Err(ServiceError::validation("Missing required fields"));
        }

        let proof = self
            .verifier
            .verify(source, proof_data)
            .await
            .map_err(ServiceError::ProofRejected)?;

        let base = consumer_data_reward(source, proof.claims.activity());
        let bonus = RewardKind::ConsumerDataVerified.whole_amount();
        let now = self.clock.now();
        let id = user.to_hex();

        let mut recorded = None;
        self.contributions
            .modify::<_, ServiceError>(&id, |current| {
                let mut doc = current.unwrap_or_default();
                let replayed = doc.contributions.iter().any(|c| {
                    c.proof_hash == proof.proof_hash || (c.data_source == source && c.data_hash == proof.data_hash)
                });
                if replayed {
                    return Err(ServiceError::conflict("Proof already submitted"));
                }
                let first = doc.contributions.is_empty();
                let contribution = ConsumerContribution {
                    user_address: user,
                    data_source: source,
                    proof_hash: proof.proof_hash.clone(),
                    data_hash: proof.data_hash.clone(),
                    timestamp: now,
                    data_coins_earned: base + if first { bonus } else { 0 },
                    verified: true,
                    is_first_verification: first,
                    claims: proof.claims.clone(),
                    zk_proof: zk_proof.clone(),
                };
                recorded = Some(contribution.clone());
                doc.contributions.push(contribution);
                Ok(doc)
            })
            .await?;

        let contribution = recorded.ok_or_else(|| ServiceError::Internal("contribution not recorded".into()))?;
        let earned = contribution.data_coins_earned;
        tracing::info!(%user, source = %source, earned, first = contribution.is_first_verification, "Consumer data verified");

        if earned == 0 {
            return Ok(SubmissionReceipt {
                contribution,
                data_coins_earned: 0,
                transaction_hash: None,
            });
        }

        let amount = u128::from(earned) * ONE_DATA;
        let receipt = match self
            .issuer
            .issue(user, amount, &format!("Consumer data verification: {source}"))
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                tracing::warn!(%user, source = %source, error = %err, "Consumer data reward failed, removing contribution");
                self.remove(&id, &contribution.proof_hash).await;
                return Err(err);
            }
        };

        let tx = NewTransaction::new(user, TransactionKind::ConsumerData, amount)
            .hash(receipt.transaction_hash.clone())
            .reason(format!("Verified {source} data"));
        if let Err(err) = self.transactions.record(tx).await {
            tracing::warn!(%user, error = %err, "Consumer data transaction not recorded");
        }

        Ok(SubmissionReceipt {
            contribution,
            data_coins_earned: earned,
            transaction_hash: Some(receipt.transaction_hash),
        })
    }

    async fn remove(&self, id: &str, proof_hash: &str) {
        let result = self
            .contributions
            .modify::<_, ServiceError>(id, |current| {
                let mut doc = current.unwrap_or_default();
                doc.contributions.retain(|c| c.proof_hash != proof_hash);
                Ok(doc)
            })
            .await;
        if let Err(err) = result {
            tracing::error!(id, error = %err, "Failed to remove unpaid contribution");
        }
    }

    /// Contributions in submission order, with totals
    pub async fn list(&self, user: &Address) -> Result<ContributionSummary> {
        let contributions = self
            .contributions
            .get(&user.to_hex())
            .await?
            .map(|v| v.value.contributions)
            .unwrap_or_default();

        let mut stats = ContributionStats {
            total_contributions: contributions.len() as u32,
            last_contribution: contributions.last().map(|c| c.timestamp),
            ..Default::default()
        };
        for c in &contributions {
            stats.total_data_coins += c.data_coins_earned;
            match c.data_source {
                DataSource::Github => stats.by_source.github += 1,
                DataSource::Uber => stats.by_source.uber += 1,
                DataSource::Amazon => stats.by_source.amazon += 1,
            }
        }

        Ok(ContributionSummary { contributions, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::LedgerIssuer;
    use poc_core::ManualClock;
    use poc_economics::DataCoin;
    use poc_storage::MemoryStore;
    use serde_json::json;

    const OWNER: Address = Address::repeat_byte(1);
    const USER: Address = Address::repeat_byte(2);

    fn service(minter: Address) -> (ConsumerDataService, Arc<DataCoin>, TransactionLog) {
        let clock = ManualClock::shared(1_000);
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new(clock.clone()));
        let token = Arc::new(DataCoin::new(OWNER));
        let issuer = Arc::new(LedgerIssuer::new(token.clone(), minter, clock.clone()));
        let transactions = TransactionLog::new(store.clone(), clock.clone());
        let service = ConsumerDataService::new(store, Arc::new(ClaimsVerifier), issuer, transactions.clone(), clock);
        (service, token, transactions)
    }

    #[tokio::test]
    async fn test_claims_parsing_defaults_missing_fields() {
        let proof = ClaimsVerifier
            .verify(DataSource::Github, r#"{"claims": {"commits": 3, "issues": 2}}"#)
            .await
            .unwrap();
        match proof.claims {
            ConsumerClaims::Github(c) => {
                assert_eq!(c.total_contributions, 5);
                assert_eq!(c.pull_requests, 0);
            }
            other => panic!("unexpected claims {other:?}"),
        }
        assert!(proof.proof_hash.starts_with("0x"));

        let uber = ConsumerClaims::from_value(DataSource::Uber, &json!({"rides": 4, "totalSpent": 20.0}));
        assert_eq!(uber.activity(), 4);
        assert!(matches!(uber, ConsumerClaims::Uber(UberClaims { average_ride_cost, .. }) if average_ride_cost == 5.0));

        assert!(ClaimsVerifier.verify(DataSource::Amazon, "[1, 2]").await.is_err());
        assert!(ClaimsVerifier.verify(DataSource::Amazon, "not json").await.is_err());
    }

    #[tokio::test]
    async fn test_first_verification_bonus_once() {
        let (service, token, transactions) = service(OWNER);

        let first = service
            .submit(USER, DataSource::Github, r#"{"commits": 25, "pullRequests": 8, "issues": 12}"#, None)
            .await
            .unwrap();
        // min(45 * 10, 100) + 20
        assert_eq!(first.data_coins_earned, 120);
        assert!(first.contribution.is_first_verification);

        let second = service
            .submit(USER, DataSource::Uber, r#"{"rides": 45}"#, None)
            .await
            .unwrap();
        // floor(4.5 months * 5)
        assert_eq!(second.data_coins_earned, 22);
        assert!(!second.contribution.is_first_verification);

        assert_eq!(token.balance_of(&USER), 142 * ONE_DATA);
        assert_eq!(transactions.list(&USER).await.unwrap().len(), 2);

        let summary = service.list(&USER).await.unwrap();
        assert_eq!(summary.stats.total_contributions, 2);
        assert_eq!(summary.stats.total_data_coins, 142);
        assert_eq!(summary.stats.by_source, SourceCounts { github: 1, uber: 1, amazon: 0 });
        assert_eq!(summary.stats.last_contribution, Some(1_000));
    }

    #[tokio::test]
    async fn test_replayed_proof_rejected() {
        let (service, token, _) = service(OWNER);
        let proof = r#"{"orders": 18}"#;

        service.submit(USER, DataSource::Amazon, proof, None).await.unwrap();
        let err = service.submit(USER, DataSource::Amazon, proof, None).await.unwrap_err();
        assert_eq!(err.status(), 409);
        // floor(3.6 months * 5) + 20
        assert_eq!(token.balance_of(&USER), 38 * ONE_DATA);
    }

    #[tokio::test]
    async fn test_failed_mint_leaves_no_contribution() {
        let (service, token, _) = service(Address::repeat_byte(9));

        let err = service
            .submit(USER, DataSource::Github, r#"{"commits": 1}"#, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Token(_)));
        assert_eq!(token.total_supply(), 0);
        assert!(service.list(&USER).await.unwrap().contributions.is_empty());
    }

    #[tokio::test]
    async fn test_huge_claims_saturate() {
        let proof = ClaimsVerifier
            .verify(DataSource::Github, r#"{"commits": 18446744073709551615, "pullRequests": 1, "issues": 1}"#)
            .await
            .unwrap();
        assert_eq!(proof.claims.activity(), u64::MAX);

        let (service, token, _) = service(OWNER);
        let receipt = service
            .submit(USER, DataSource::Github, r#"{"commits": 18446744073709551615, "pullRequests": 1}"#, None)
            .await
            .unwrap();
        // capped at 100, plus the first-verification bonus
        assert_eq!(receipt.data_coins_earned, 120);
        assert_eq!(token.balance_of(&USER), 120 * ONE_DATA);
    }

    #[tokio::test]
    async fn test_reformatted_proof_is_still_a_replay() {
        let (service, token, _) = service(OWNER);

        service
            .submit(USER, DataSource::Github, r#"{"commits": 4, "issues": 1}"#, None)
            .await
            .unwrap();
        let err = service
            .submit(USER, DataSource::Github, "{ \"issues\": 1,\n  \"commits\": 4 }", None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 409);
        let err = service
            .submit(USER, DataSource::Github, r#"{"claims": {"commits": 4, "issues": 1}}"#, None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 409);

        // 5 * 10 + 20
        assert_eq!(token.balance_of(&USER), 70 * ONE_DATA);
        assert_eq!(service.list(&USER).await.unwrap().contributions.len(), 1);
    }
}
