//! Injectable clock so registry/cookie-store TTL logic is deterministically
//! testable without sleeping real wall-clock time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A monotonic-ish source of "now", in whole seconds.
///
/// Production code uses [`SystemClock`]; tests use [`TestClock`] to advance
/// time deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time since the Unix epoch.
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// A manually-advanced clock for tests.
pub struct TestClock {
    secs: AtomicU64,
}

impl TestClock {
    pub fn new(start_secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(start_secs),
        }
    }

    pub fn advance(&self, delta_secs: u64) {
        self.secs.fetch_add(delta_secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}
