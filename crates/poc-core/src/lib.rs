//! # Proof of Contribution Core
//!
//! Shared building blocks for the Proof of Contribution workspace:
//! - `Address` - 20-byte account address in the EVM format
//! - `Wei` / `Balance` - fixed-point integer amounts (18 decimals)
//! - `Clock` - injectable wall clock used for every timestamp
//! - `CoreError` - parsing failures for the types above
//!
//! ```text
//!   stake (wei) ──► StakingManager ──► escrow
//!                        │
//!   module done ──► ProgressService ──► DataCoin.mint (3 DATA)
//!                        │
//!   all modules ──► verifier ──► completeCourse ──► refund + certificate
//! ```

pub mod clock;
pub mod error;
pub mod types;

pub use clock::*;
pub use error::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
    pub use crate::error::{CoreError, Result};
    pub use crate::types::*;
}
