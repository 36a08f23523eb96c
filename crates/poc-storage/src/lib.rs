//! # Proof of Contribution Storage
//!
//! Schema-less JSON documents grouped in named collections, with a version
//! counter per document for optimistic concurrency.
//!
//! ## Collections
//!
//! - `courses` - course catalog
//! - `usersLearningProgress` - per (user, course) module progress
//! - `stakingTransactions` - stake records and their lifecycle
//! - `repositories` - repository submissions and their commits
//! - `consumerData` - verified consumer data contributions
//! - `networkRPCs` / `contractAddresses` - network registry
//! - `transactions` - per-user transaction history
//! - `certificates` - soulbound course certificates
//!
//! The store is constructed by the caller and handed to each service as an
//! `Arc<dyn DocumentStore>`.

pub mod collection;
pub mod error;
pub mod memory;
pub mod store;

pub use collection::{Collection, Versioned, MAX_WRITE_ATTEMPTS};
pub use error::{Result, StorageError};
pub use memory::MemoryStore;
pub use store::{Document, DocumentStore, Precondition};

pub mod collections {
    //! Collection names

    pub const COURSES: &str = "courses";
    pub const PROGRESS: &str = "usersLearningProgress";
    pub const STAKING_TRANSACTIONS: &str = "stakingTransactions";
    pub const REPOSITORIES: &str = "repositories";
    pub const CONSUMER_DATA: &str = "consumerData";
    pub const NETWORK_RPCS: &str = "networkRPCs";
    pub const CONTRACT_ADDRESSES: &str = "contractAddresses";
    pub const TRANSACTIONS: &str = "transactions";
    pub const CERTIFICATES: &str = "certificates";
}
