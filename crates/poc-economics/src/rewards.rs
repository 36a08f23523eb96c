//! # Reward Schedule
//!
//! Fixed DataCoin amounts for learning progress, contribution proofs and
//! repository review.
//!
//! | Kind | DATA |
//! |------|------|
//! | `daily_streak` | 5 |
//! | `course_progress` | 3 |
//! | `milestone` | 8 |
//! | `weekly_streak` | 15 |
//! | `monthly_streak` | 50 |
//! | `github_contribution` | 10 |
//! | `uber_ride_data` | 5 |
//! | `amazon_purchase_data` | 5 |
//! | `consumer_data_verified` | 20 |
//! | `repository_submission` | 10 |
//! | `commit_verification` | 5 |
//! | `repository_approval` | 50 |

use crate::constants::ONE_DATA;
use poc_core::Balance;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reward kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    DailyStreak,
    CourseProgress,
    Milestone,
    WeeklyStreak,
    MonthlyStreak,
    GithubContribution,
    UberRideData,
    AmazonPurchaseData,
    ConsumerDataVerified,
    RepositorySubmission,
    CommitVerification,
    RepositoryApproval,
}

impl RewardKind {
    pub const ALL: [RewardKind; 12] = [
        Self::DailyStreak,
        Self::CourseProgress,
        Self::Milestone,
        Self::WeeklyStreak,
        Self::MonthlyStreak,
        Self::GithubContribution,
        Self::UberRideData,
        Self::AmazonPurchaseData,
        Self::ConsumerDataVerified,
        Self::RepositorySubmission,
        Self::CommitVerification,
        Self::RepositoryApproval,
    ];

    /// Reward in whole DATA
    pub fn whole_amount(&self) -> u64 {
        match self {
            Self::DailyStreak => 5,
            Self::CourseProgress => 3,
            Self::Milestone => 8,
            Self::WeeklyStreak => 15,
            Self::MonthlyStreak => 50,
            Self::GithubContribution => 10,
            Self::UberRideData => 5,
            Self::AmazonPurchaseData => 5,
            Self::ConsumerDataVerified => 20,
            Self::RepositorySubmission => 10,
            Self::CommitVerification => 5,
            Self::RepositoryApproval => 50,
        }
    }

    /// Reward in the smallest unit
    pub fn amount(&self) -> Balance {
        self.whole_amount() as Balance * ONE_DATA
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyStreak => "daily_streak",
            Self::CourseProgress => "course_progress",
            Self::Milestone => "milestone",
            Self::WeeklyStreak => "weekly_streak",
            Self::MonthlyStreak => "monthly_streak",
            Self::GithubContribution => "github_contribution",
            Self::UberRideData => "uber_ride_data",
            Self::AmazonPurchaseData => "amazon_purchase_data",
            Self::ConsumerDataVerified => "consumer_data_verified",
            Self::RepositorySubmission => "repository_submission",
            Self::CommitVerification => "commit_verification",
            Self::RepositoryApproval => "repository_approval",
        }
    }
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown reward type: {s}"))
    }
}

/// Consumer data source backed by a zkTLS proof
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Github,
    Uber,
    Amazon,
}

impl DataSource {
    pub const ALL: [DataSource; 3] = [Self::Github, Self::Uber, Self::Amazon];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Uber => "uber",
            Self::Amazon => "amazon",
        }
    }

    /// Schedule entry the source is paid under
    pub fn reward_kind(&self) -> RewardKind {
        match self {
            Self::Github => RewardKind::GithubContribution,
            Self::Uber => RewardKind::UberRideData,
            Self::Amazon => RewardKind::AmazonPurchaseData,
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|src| src.as_str() == s)
            .copied()
            .ok_or_else(|| "Invalid data source".to_string())
    }
}

/// Cap on GitHub contribution rewards (whole DATA)
pub const GITHUB_REWARD_CAP: u64 = 100;

/// Months of history credited at most
pub const MAX_MONTHS: u64 = 12;

/// Assumed rides per month of Uber history
pub const RIDES_PER_MONTH: u64 = 10;

/// Assumed orders per month of Amazon history
pub const ORDERS_PER_MONTH: u64 = 5;

/// Whole DATA earned for a verified proof, before the first-proof bonus
///
/// `activity` is total contributions for GitHub, rides for Uber and orders
/// for Amazon. Monthly sources pay their schedule amount per month of
/// history, capped at twelve months and rounded down.
pub fn consumer_data_reward(source: DataSource, activity: u64) -> u64 {
    let per_unit = source.reward_kind().whole_amount();

    match source {
        DataSource::Github => activity.saturating_mul(per_unit).min(GITHUB_REWARD_CAP),
        DataSource::Uber => activity.min(MAX_MONTHS * RIDES_PER_MONTH) * per_unit / RIDES_PER_MONTH,
        DataSource::Amazon => activity.min(MAX_MONTHS * ORDERS_PER_MONTH) * per_unit / ORDERS_PER_MONTH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_amounts() {
        assert_eq!(RewardKind::CourseProgress.amount(), 3 * ONE_DATA);
        assert_eq!(RewardKind::RepositoryApproval.whole_amount(), 50);
        assert_eq!(RewardKind::ConsumerDataVerified.whole_amount(), 20);
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in RewardKind::ALL {
            assert_eq!(kind.as_str().parse::<RewardKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert!("free_money".parse::<RewardKind>().is_err());
    }

    #[test]
    fn test_github_reward_capped() {
        assert_eq!(consumer_data_reward(DataSource::Github, 4), 40);
        assert_eq!(consumer_data_reward(DataSource::Github, 45), 100);
        assert_eq!(consumer_data_reward(DataSource::Github, u64::MAX), 100);
    }

    #[test]
    fn test_uber_reward_by_month() {
        assert_eq!(consumer_data_reward(DataSource::Uber, 45), 22);
        assert_eq!(consumer_data_reward(DataSource::Uber, 9), 4);
        assert_eq!(consumer_data_reward(DataSource::Uber, 500), 60);
    }

    #[test]
    fn test_amazon_reward_by_month() {
        assert_eq!(consumer_data_reward(DataSource::Amazon, 18), 18);
        assert_eq!(consumer_data_reward(DataSource::Amazon, 61), 60);
        assert_eq!(consumer_data_reward(DataSource::Amazon, 0), 0);
    }

    #[test]
    fn test_source_parse() {
        assert_eq!("uber".parse::<DataSource>().unwrap(), DataSource::Uber);
        assert_eq!("spotify".parse::<DataSource>().unwrap_err(), "Invalid data source");
    }
}
