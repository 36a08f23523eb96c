//! # Reputation
//!
//! Contribution score per address. The owner, and the single minter the
//! owner appoints, record contributions; anyone reads scores and the
//! leaderboard.

use parking_lot::RwLock;
use poc_core::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Reputation event log entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum ReputationEvent {
    ContributionRecorded { contributor: Address, score: u64, total: u64 },
    MinterSet { minter: Address },
}

/// Complete reputation state, also the snapshot format
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationState {
    pub owner: Address,
    pub minter: Option<Address>,
    pub scores: HashMap<Address, u64>,
    pub events: Vec<ReputationEvent>,
}

impl ReputationState {
    fn can_record(&self, caller: &Address) -> bool {
        *caller == self.owner || self.minter.as_ref() == Some(caller)
    }
}

/// Leaderboard row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contributor {
    pub address: Address,
    pub score: u64,
}

/// Reputation ledger
#[derive(Debug)]
pub struct Reputation {
    state: RwLock<ReputationState>,
}

impl Reputation {
    pub fn new(owner: Address) -> Self {
        Self {
            state: RwLock::new(ReputationState {
                owner,
                ..Default::default()
            }),
        }
    }

    pub fn from_snapshot(state: ReputationState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn snapshot(&self) -> ReputationState {
        self.state.read().clone()
    }

    pub fn owner(&self) -> Address {
        self.state.read().owner
    }

    pub fn minter(&self) -> Option<Address> {
        self.state.read().minter
    }

    /// Appoint the recording account; replaces any previous minter
    pub fn set_minter(&self, caller: Address, minter: Address) -> Result<(), ReputationError> {
        let mut state = self.state.write();
        if caller != state.owner {
            return Err(ReputationError::OwnableUnauthorizedAccount(caller));
        }
        if minter.is_zero() {
            return Err(ReputationError::InvalidMinter);
        }

        state.minter = Some(minter);
        state.events.push(ReputationEvent::MinterSet { minter });
        Ok(())
    }

    /// Add `score` to the contributor's total and return the new total
    pub fn record_contribution(&self, caller: Address, contributor: Address, score: u64) -> Result<u64, ReputationError> {
        let mut state = self.state.write();
        if !state.can_record(&caller) {
            return Err(ReputationError::NotAuthorized);
        }
        if contributor.is_zero() {
            return Err(ReputationError::InvalidContributor);
        }
        if score == 0 {
            return Err(ReputationError::ZeroScore);
        }

        let entry = state.scores.entry(contributor).or_insert(0);
        *entry = entry.saturating_add(score);
        let total = *entry;
        state.events.push(ReputationEvent::ContributionRecorded {
            contributor,
            score,
            total,
        });

        tracing::info!(%contributor, score, total, "Contribution recorded");
        Ok(total)
    }

    pub fn score_of(&self, contributor: &Address) -> u64 {
        self.state.read().scores.get(contributor).copied().unwrap_or(0)
    }

    pub fn can_record(&self, caller: &Address) -> bool {
        self.state.read().can_record(caller)
    }

    /// Highest scores first; equal scores ordered by address
    pub fn top_contributors(&self, limit: usize) -> Vec<Contributor> {
        let state = self.state.read();
        let mut ranked: Vec<Contributor> = state
            .scores
            .iter()
            .map(|(address, score)| Contributor {
                address: *address,
                score: *score,
            })
            .collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.address.cmp(&b.address)));
        ranked.truncate(limit);
        ranked
    }

    pub fn events(&self) -> Vec<ReputationEvent> {
        self.state.read().events.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReputationError {
    #[error("OwnableUnauthorizedAccount({0})")]
    OwnableUnauthorizedAccount(Address),

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Invalid minter address")]
    InvalidMinter,

    #[error("Invalid contributor address")]
    InvalidContributor,

    #[error("Score must be greater than 0")]
    ZeroScore,
}

impl ReputationError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::OwnableUnauthorizedAccount(_) | Self::NotAuthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Address = Address::repeat_byte(0x01);
    const MINTER: Address = Address::repeat_byte(0x03);
    const A: Address = Address::repeat_byte(0x0a);
    const B: Address = Address::repeat_byte(0x0b);

    #[test]
    fn test_records_and_ranks_contributions() {
        let rep = Reputation::new(OWNER);
        rep.set_minter(OWNER, MINTER).unwrap();

        rep.record_contribution(OWNER, A, 10).unwrap();
        rep.record_contribution(MINTER, B, 20).unwrap();

        assert_eq!(rep.score_of(&A), 10);
        assert_eq!(rep.score_of(&B), 20);

        let top = rep.top_contributors(2);
        assert_eq!(top[0], Contributor { address: B, score: 20 });
        assert_eq!(top[1].address, A);
        assert_eq!(rep.top_contributors(1).len(), 1);
        assert_eq!(rep.top_contributors(10).len(), 2);
    }

    #[test]
    fn test_scores_accumulate_and_ties_order_by_address() {
        let rep = Reputation::new(OWNER);
        assert_eq!(rep.record_contribution(OWNER, B, 5).unwrap(), 5);
        assert_eq!(rep.record_contribution(OWNER, B, 5).unwrap(), 10);
        rep.record_contribution(OWNER, A, 10).unwrap();

        let order: Vec<_> = rep.top_contributors(5).into_iter().map(|c| c.address).collect();
        assert_eq!(order, vec![A, B]);
    }

    #[test]
    fn test_role_guard() {
        let rep = Reputation::new(OWNER);

        let err = rep.record_contribution(MINTER, A, 1).unwrap_err();
        assert_eq!(err, ReputationError::NotAuthorized);
        assert!(err.is_unauthorized());

        let err = rep.set_minter(MINTER, MINTER).unwrap_err();
        assert_eq!(err, ReputationError::OwnableUnauthorizedAccount(MINTER));

        rep.set_minter(OWNER, MINTER).unwrap();
        rep.set_minter(OWNER, B).unwrap();
        assert!(!rep.can_record(&MINTER));
        assert_eq!(rep.record_contribution(MINTER, A, 1), Err(ReputationError::NotAuthorized));

        assert_eq!(rep.record_contribution(OWNER, A, 0), Err(ReputationError::ZeroScore));
        assert_eq!(
            rep.record_contribution(OWNER, Address::ZERO, 1),
            Err(ReputationError::InvalidContributor)
        );
        assert_eq!(rep.score_of(&A), 0);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let rep = Reputation::new(OWNER);
        rep.record_contribution(OWNER, A, 7).unwrap();

        let restored = Reputation::from_snapshot(rep.snapshot());
        assert_eq!(restored.score_of(&A), 7);
        assert_eq!(restored.events().len(), 1);
    }
}
