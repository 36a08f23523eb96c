//! Error types for the off-chain services

use poc_core::CoreError;
use poc_economics::{ReputationError, StakingError, TokenError};
use poc_storage::StorageError;
use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors returned by the services
#[derive(Debug, Error)]
pub enum ServiceError {
    // === Request Errors ===
    /// Malformed or out-of-range input
    #[error("{0}")]
    Validation(String),

    /// Referenced record does not exist
    #[error("{0}")]
    NotFound(String),

    /// Caller lacks the role for the operation
    #[error("{0}")]
    Forbidden(String),

    /// Operation clashes with existing state
    #[error("{0}")]
    Conflict(String),

    // === Progress ===
    #[error("Module already completed")]
    ModuleAlreadyCompleted { module_id: u32 },

    #[error("Module {module_id} is locked")]
    ModuleLocked { module_id: u32 },

    // === Proofs ===
    #[error("Proof verification failed: {0}")]
    ProofRejected(String),

    // === Ledgers ===
    #[error(transparent)]
    Staking(#[from] StakingError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Reputation(#[from] ReputationError),

    #[error(transparent)]
    Core(#[from] CoreError),

    // === Storage ===
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// HTTP status used when the error crosses the API
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::ProofRejected(_) | Self::Core(_) => 400,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) | Self::ModuleAlreadyCompleted { .. } | Self::ModuleLocked { .. } => 409,
            Self::Staking(e) if e.is_unauthorized() => 403,
            Self::Token(e) if e.is_unauthorized() => 403,
            Self::Reputation(e) if e.is_unauthorized() => 403,
            Self::Staking(_) | Self::Token(_) | Self::Reputation(_) => 400,
            Self::Storage(StorageError::AlreadyExists { .. }) => 409,
            Self::Storage(e) if e.is_conflict() => 409,
            Self::Storage(_) | Self::Internal(_) => 500,
        }
    }

    /// Stable numeric code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::Validation(_) => 2001,
            Self::NotFound(_) => 2002,
            Self::Forbidden(_) => 2003,
            Self::Conflict(_) => 2004,
            Self::ModuleAlreadyCompleted { .. } => 2101,
            Self::ModuleLocked { .. } => 2102,
            Self::ProofRejected(_) => 2201,
            Self::Staking(_) => 3001,
            Self::Token(_) => 3002,
            Self::Reputation(_) => 3003,
            Self::Core(e) => e.code(),
            Self::Storage(_) => 4001,
            Self::Internal(_) => 9999,
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_conflict())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poc_core::Address;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServiceError::validation("bad").status(), 400);
        assert_eq!(ServiceError::not_found("none").status(), 404);
        assert_eq!(ServiceError::ModuleAlreadyCompleted { module_id: 1 }.status(), 409);
        assert_eq!(ServiceError::from(StakingError::NotAuthorizedVerifier).status(), 403);
        assert_eq!(
            ServiceError::from(StakingError::OwnableUnauthorizedAccount(Address::ZERO)).status(),
            403
        );
        assert_eq!(ServiceError::from(StakingError::IncorrectStakeAmount).status(), 400);
        assert_eq!(ServiceError::from(TokenError::NotAuthorizedMinter).status(), 403);
        assert_eq!(ServiceError::from(ReputationError::NotAuthorized).status(), 403);
        assert_eq!(ServiceError::from(ReputationError::ZeroScore).status(), 400);
        assert_eq!(ServiceError::from(StorageError::Backend("down".into())).status(), 500);
    }

    #[test]
    fn test_revert_message_passes_through() {
        let err = ServiceError::from(StakingError::AlreadyStaked);
        assert_eq!(err.to_string(), "Already staked for this course");
    }
}
