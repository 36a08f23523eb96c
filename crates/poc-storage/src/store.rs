//! Document store interface

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Stored document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    /// Starts at 1, bumped on every write
    pub version: u64,
    /// Unix seconds of the last write
    pub updated_at: i64,
    pub data: serde_json::Value,
}

/// Condition a write must satisfy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional write
    Any,
    /// Document must not exist yet
    Absent,
    /// Document must exist at exactly this version
    Version(u64),
}

impl Precondition {
    /// Check against the current version (`None` if absent)
    pub fn holds(&self, current: Option<u64>) -> bool {
        match (self, current) {
            (Self::Any, _) => true,
            (Self::Absent, None) => true,
            (Self::Version(expected), Some(found)) => *expected == found,
            _ => false,
        }
    }
}

/// Persistence client
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Write a document if the precondition holds, returning the new version
    async fn put(&self, collection: &str, id: &str, data: serde_json::Value, precondition: Precondition)
        -> Result<u64>;

    /// Remove a document, returning whether it existed
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// All documents in a collection, ordered by id
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_holds() {
        assert!(Precondition::Any.holds(None));
        assert!(Precondition::Any.holds(Some(4)));
        assert!(Precondition::Absent.holds(None));
        assert!(!Precondition::Absent.holds(Some(1)));
        assert!(Precondition::Version(2).holds(Some(2)));
        assert!(!Precondition::Version(2).holds(Some(3)));
        assert!(!Precondition::Version(2).holds(None));
    }
}
