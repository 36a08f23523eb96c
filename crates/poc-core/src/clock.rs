//! Wall clocks
//!
//! Every timestamp in the system (stake creation, module completion, cache
//! expiry) is read through a `Clock` so tests can pin and advance time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of unix timestamps (seconds)
pub trait Clock: Send + Sync {
    /// Current unix time in seconds
    fn now(&self) -> i64;

    /// Current unix time in milliseconds
    fn now_millis(&self) -> i64 {
        self.now() * 1000
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the system time
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Shared handle to the system clock
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for deterministic tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Shared handle frozen at `start`
    pub fn shared(start: i64) -> Arc<Self> {
        Arc::new(Self::new(start))
    }

    /// Set the current time
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move time forward by `secs`
    pub fn advance(&self, secs: i64) -> i64 {
        self.now.fetch_add(secs, Ordering::SeqCst) + secs
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
