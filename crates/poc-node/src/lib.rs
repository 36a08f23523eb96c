//! # Proof of Contribution Node
//!
//! Configuration, HTTP API, metrics and lifecycle for the Proof of
//! Contribution services.

pub mod api;
pub mod config;
pub mod metrics;
pub mod node;

pub use api::{router, AppState};
pub use config::NodeConfig;
pub use metrics::Metrics;
pub use node::{NodeState, PocNode};
