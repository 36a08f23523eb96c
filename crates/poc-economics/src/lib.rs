//! # Proof of Contribution Economics
//!
//! In-process ledgers with the guard and revert semantics of the deployed
//! contracts. Every call takes the transaction sender explicitly and runs
//! under one write lock, so calls are atomic and totally ordered.
//!
//! ## Ledgers
//!
//! | Ledger | Holds | Gate |
//! |--------|-------|------|
//! | `NativeBank` | native balances (wei) | none, value moves only via transfers |
//! | `DataCoin` | DATA balances, allowances | owner, minters, burners |
//! | `StakingManager` | stakes, courses, escrow | owner, verifiers |
//! | `Reputation` | contribution scores | owner, one minter |
//!
//! ## DataCoin Rewards
//!
//! | Event | Reward |
//! |-------|--------|
//! | Module completed | 3 DATA |
//! | Daily streak | 5 DATA |
//! | Repository approved | 50 DATA |
//! | First consumer-data proof | +20 DATA |

pub mod bank;
pub mod datacoin;
pub mod reputation;
pub mod rewards;
pub mod staking;

// Re-exports
pub use bank::{BankError, NativeBank};
pub use datacoin::{DataCoin, TokenError, TokenEvent, TokenState};
pub use reputation::{Contributor, Reputation, ReputationError, ReputationEvent, ReputationState};
pub use rewards::{consumer_data_reward, DataSource, RewardKind};
pub use staking::{
    BatchOutcome, CourseConfig, SkippedCompletion, Stake, StakingError, StakingEvent, StakingManager, StakingState,
};

/// DataCoin token constants
pub mod constants {
    use poc_core::ONE_UNIT;

    /// Token symbol
    pub const SYMBOL: &str = "DATA";

    /// Token name
    pub const NAME: &str = "DataCoin";

    /// Decimal places (same as ETH)
    pub const DECIMALS: u8 = 18;

    /// One DATA in smallest unit
    pub const ONE_DATA: u128 = ONE_UNIT;

    /// Hard cap: 1 billion DATA
    pub const MAX_SUPPLY: u128 = 1_000_000_000 * ONE_DATA;

    /// Reward for each completed course module
    pub const MODULE_REWARD: u128 = 3 * ONE_DATA;

    /// Default stake for a newly listed course: 0.0001 ETH
    pub const DEFAULT_COURSE_STAKE: u128 = 100_000_000_000_000;

    /// Module count assumed when a course does not say
    pub const DEFAULT_TOTAL_MODULES: u32 = 4;
}

#[cfg(test)]
mod tests {
    use super::constants::*;

    #[test]
    fn test_supply_constants() {
        assert_eq!(MAX_SUPPLY, 1_000_000_000 * 10u128.pow(18));
        assert_eq!(MODULE_REWARD, 3_000_000_000_000_000_000);
        assert_eq!(poc_core::format_units(DEFAULT_COURSE_STAKE, DECIMALS), "0.0001");
    }
}
