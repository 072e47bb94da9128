//! SYN-cookie challenge-response handshake.
//!
//! Binds a peer's claimed identity to a fresh, server-chosen challenge,
//! preventing replay and proving the peer controls the private key behind
//! its advertised node id before it is admitted to the registry. Rate-limits
//! per IP and caps total outstanding cookies to bound memory use.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use burst_crypto::{random_32, verify_signature};
use burst_types::Signature;

use crate::clock::{Clock, SystemClock};
use crate::endpoint::Endpoint;
use crate::ids::{Cookie, NodeId};

struct CookieEntry {
    cookie: Cookie,
    created_at: u64,
}

struct Inner {
    pending: HashMap<Endpoint, CookieEntry>,
    per_ip_count: HashMap<IpAddr, usize>,
}

/// Time-bounded map of pending identity challenges, with per-IP rate capping.
pub struct SynCookieStore {
    inner: Mutex<Inner>,
    max_cookies_per_ip: usize,
    clock: Arc<dyn Clock>,
    stopped: AtomicBool,
}

impl SynCookieStore {
    pub fn new(max_cookies_per_ip: usize) -> Self {
        Self::with_clock(max_cookies_per_ip, Arc::new(SystemClock))
    }

    pub fn with_clock(max_cookies_per_ip: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                per_ip_count: HashMap::new(),
            }),
            max_cookies_per_ip,
            clock,
            stopped: AtomicBool::new(false),
        }
    }

    /// Issue a fresh cookie for `endpoint`, or `None` if the store is
    /// stopped, the IP is at its outstanding-cookie cap, or an entry already
    /// exists for this endpoint.
    pub fn assign(&self, endpoint: Endpoint) -> Option<Cookie> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        let ip = endpoint.canonical_ip();
        let mut inner = self.inner.lock().expect("syn cookie mutex poisoned");

        if inner.pending.contains_key(&endpoint) {
            return None;
        }
        let outstanding = inner.per_ip_count.get(&ip).copied().unwrap_or(0);
        if outstanding >= self.max_cookies_per_ip {
            return None;
        }

        let cookie = Cookie(random_32());
        inner.pending.insert(
            endpoint,
            CookieEntry {
                cookie,
                created_at: self.clock.now(),
            },
        );
        *inner.per_ip_count.entry(ip).or_insert(0) += 1;
        Some(cookie)
    }

    /// Validate a peer's signed response. Returns `true` on failure and
    /// `false` on success — the error convention is inverted to match the
    /// reference implementation's "true means invalid" handshake check.
    /// Always fails once the store has been stopped.
    pub fn validate(&self, endpoint: Endpoint, node_id: &NodeId, signature: &Signature) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return true;
        }
        let ip = endpoint.canonical_ip();
        let mut inner = self.inner.lock().expect("syn cookie mutex poisoned");

        let Entry::Occupied(occupied) = inner.pending.entry(endpoint) else {
            return true;
        };
        let entry = occupied.get();
        if !verify_signature(entry.cookie.as_bytes(), signature, node_id) {
            return true;
        }

        occupied.remove();
        if let Some(count) = inner.per_ip_count.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.per_ip_count.remove(&ip);
            }
        }
        false
    }

    /// Remove all entries issued before `cutoff`, decrementing per-IP counts.
    pub fn cleanup(&self, cutoff: u64) {
        let mut inner = self.inner.lock().expect("syn cookie mutex poisoned");
        let stale: Vec<Endpoint> = inner
            .pending
            .iter()
            .filter(|(_, entry)| entry.created_at < cutoff)
            .map(|(ep, _)| *ep)
            .collect();
        for ep in stale {
            let ip = ep.canonical_ip();
            inner.pending.remove(&ep);
            if let Some(count) = inner.per_ip_count.get_mut(&ip) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    inner.per_ip_count.remove(&ip);
                }
            }
        }
    }

    /// Number of outstanding cookies for `ip`. Invariant 6 of the registry
    /// spec: this must always equal the live entry count for that IP.
    pub fn outstanding_for_ip(&self, ip: IpAddr) -> usize {
        self.inner
            .lock()
            .expect("syn cookie mutex poisoned")
            .per_ip_count
            .get(&ip)
            .copied()
            .unwrap_or(0)
    }

    /// Drop all outstanding cookies, e.g. on shutdown.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("syn cookie mutex poisoned");
        inner.pending.clear();
        inner.per_ip_count.clear();
    }

    /// Set the stop flag and clear all outstanding cookies. Subsequent
    /// `assign`/`validate` calls become no-ops/failures.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
