//! In-flight outbound connection attempt tracking, used to deduplicate
//! concurrent dials and to decide whether we should reach out to an
//! endpoint at all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::endpoint::Endpoint;
use crate::registry::ChannelRegistry;

struct Inner {
    attempts: HashMap<Endpoint, u64>,
}

/// A time-bounded map of in-flight outbound connection attempts.
pub struct AttemptRegistry {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    stopped: AtomicBool,
}

impl AttemptRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                attempts: HashMap::new(),
            }),
            clock,
            stopped: AtomicBool::new(false),
        }
    }

    /// Record a dial beginning. Callers should check [`Self::is_in_progress`]
    /// first and skip the dial if one is already recorded. A no-op once the
    /// registry has been stopped.
    pub fn begin(&self, endpoint: Endpoint) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let now = self.clock.now();
        self.inner
            .lock()
            .expect("attempt registry mutex poisoned")
            .attempts
            .insert(endpoint, now);
    }

    /// Remove the attempt entry; called on every terminal outcome (success,
    /// failure, or timeout).
    pub fn end(&self, endpoint: &Endpoint) {
        self.inner
            .lock()
            .expect("attempt registry mutex poisoned")
            .attempts
            .remove(endpoint);
    }

    pub fn is_in_progress(&self, endpoint: &Endpoint) -> bool {
        self.inner
            .lock()
            .expect("attempt registry mutex poisoned")
            .attempts
            .contains_key(endpoint)
    }

    /// Remove entries older than `cutoff`.
    pub fn purge(&self, cutoff: u64) {
        self.inner
            .lock()
            .expect("attempt registry mutex poisoned")
            .attempts
            .retain(|_, last_attempt| *last_attempt >= cutoff);
    }

    /// True iff `endpoint` is not currently being dialed, not currently
    /// connected, not our own listening endpoint, and not rate-limited by
    /// the per-IP connection cap. Always false once the registry is stopped.
    pub fn reachout(&self, endpoint: &Endpoint, self_endpoint: &Endpoint, registry: &ChannelRegistry) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        if endpoint == self_endpoint {
            return false;
        }
        if self.is_in_progress(endpoint) {
            return false;
        }
        if registry.find_by_endpoint(endpoint).is_some() {
            return false;
        }
        if registry.max_ip_connections(endpoint) {
            return false;
        }
        true
    }

    /// Set the stop flag and clear all in-flight attempts. Subsequent
    /// `begin`/`reachout` calls become no-ops/failures.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.inner
            .lock()
            .expect("attempt registry mutex poisoned")
            .attempts
            .clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Default for AttemptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ep(n: u8) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, n)), 7075)
    }

    #[test]
    fn begin_then_in_progress() {
        let reg = AttemptRegistry::new();
        let e = ep(1);
        assert!(!reg.is_in_progress(&e));
        reg.begin(e);
        assert!(reg.is_in_progress(&e));
        reg.end(&e);
        assert!(!reg.is_in_progress(&e));
    }

    #[test]
    fn stop_clears_attempts_and_rejects_further_calls() {
        let reg = AttemptRegistry::new();
        let e = ep(3);
        reg.begin(e);
        assert!(reg.is_in_progress(&e));

        reg.stop();

        assert!(reg.is_stopped());
        assert!(!reg.is_in_progress(&e));
        reg.begin(ep(4));
        assert!(!reg.is_in_progress(&ep(4)));
    }

    #[test]
    fn purge_removes_stale_attempts() {
        let clock = Arc::new(crate::clock::TestClock::new(100));
        let reg = AttemptRegistry::with_clock(clock.clone());
        let e = ep(2);
        reg.begin(e);
        clock.advance(1000);
        reg.purge(clock.now() - 10);
        assert!(!reg.is_in_progress(&e));
    }
}
