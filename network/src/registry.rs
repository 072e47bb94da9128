//! The multi-indexed live-channel collection: the heart of the peer
//! transport core. A single mutex guards a primary `endpoint -> Channel` map
//! plus auxiliary indices kept in sync by hand on every insert, erase, and
//! `modify`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use rand::seq::index::sample;
use rand::thread_rng;

use crate::channel::{Channel, RegistryTouch};
use crate::clock::Clock;
use crate::endpoint::Endpoint;
use crate::error::NetworkError;
use crate::ids::NodeId;

struct Inner {
    by_endpoint: HashMap<Endpoint, Arc<Channel>>,
    by_node_id: HashMap<NodeId, HashSet<Endpoint>>,
    by_ip: HashMap<IpAddr, HashSet<Endpoint>>,
    sequence: Vec<Endpoint>,
    last_sent_order: BTreeSet<(u64, Endpoint)>,
    last_sent_index: HashMap<Endpoint, u64>,
    bootstrap_order: BTreeSet<(u64, Endpoint)>,
    bootstrap_index: HashMap<Endpoint, u64>,
}

impl Inner {
    fn new() -> Self {
        Self {
            by_endpoint: HashMap::new(),
            by_node_id: HashMap::new(),
            by_ip: HashMap::new(),
            sequence: Vec::new(),
            last_sent_order: BTreeSet::new(),
            last_sent_index: HashMap::new(),
            bootstrap_order: BTreeSet::new(),
            bootstrap_index: HashMap::new(),
        }
    }

    fn reindex_last_sent(&mut self, endpoint: Endpoint, new_ts: u64) {
        if let Some(old) = self.last_sent_index.remove(&endpoint) {
            self.last_sent_order.remove(&(old, endpoint));
        }
        self.last_sent_order.insert((new_ts, endpoint));
        self.last_sent_index.insert(endpoint, new_ts);
    }

    fn reindex_bootstrap(&mut self, endpoint: Endpoint, new_ts: u64) {
        if let Some(old) = self.bootstrap_index.remove(&endpoint) {
            self.bootstrap_order.remove(&(old, endpoint));
        }
        self.bootstrap_order.insert((new_ts, endpoint));
        self.bootstrap_index.insert(endpoint, new_ts);
    }

    fn drop_bootstrap_entry(&mut self, endpoint: &Endpoint) {
        if let Some(old) = self.bootstrap_index.remove(endpoint) {
            self.bootstrap_order.remove(&(old, *endpoint));
        }
    }

    fn remove_endpoint(&mut self, endpoint: &Endpoint) -> Option<Arc<Channel>> {
        let channel = self.by_endpoint.remove(endpoint)?;
        let ip = endpoint.canonical_ip();
        if let Some(set) = self.by_ip.get_mut(&ip) {
            set.remove(endpoint);
            if set.is_empty() {
                self.by_ip.remove(&ip);
            }
        }
        if let Some(node_id) = channel.node_id() {
            if let Some(set) = self.by_node_id.get_mut(&node_id) {
                set.remove(endpoint);
                if set.is_empty() {
                    self.by_node_id.remove(&node_id);
                }
            }
        }
        self.sequence.retain(|e| e != endpoint);
        if let Some(old) = self.last_sent_index.remove(endpoint) {
            self.last_sent_order.remove(&(old, *endpoint));
        }
        self.drop_bootstrap_entry(endpoint);
        Some(channel)
    }
}

/// The live peer-connection registry.
pub struct ChannelRegistry {
    inner: Mutex<Inner>,
    max_per_ip: usize,
    clock: Arc<dyn Clock>,
    stopped: AtomicBool,
}

impl ChannelRegistry {
    pub fn new(max_per_ip: usize, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::new()),
            max_per_ip,
            clock,
            stopped: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("registry mutex poisoned")
    }

    /// Add `channel` to every index. Fails if the endpoint is already
    /// present or the per-IP cap would be exceeded.
    pub fn insert(self: &Arc<Self>, channel: Arc<Channel>) -> Result<(), NetworkError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(NetworkError::Stopped);
        }
        let endpoint = channel.endpoint();
        let ip = endpoint.canonical_ip();
        let mut inner = self.lock();

        if inner.by_endpoint.contains_key(&endpoint) {
            return Err(NetworkError::AlreadyPresent);
        }
        let current = inner.by_ip.get(&ip).map(HashSet::len).unwrap_or(0);
        if current >= self.max_per_ip {
            return Err(NetworkError::PerIpCapped);
        }

        inner.by_ip.entry(ip).or_default().insert(endpoint);
        if let Some(node_id) = channel.node_id() {
            inner.by_node_id.entry(node_id).or_default().insert(endpoint);
            inner.reindex_bootstrap(endpoint, channel.last_bootstrap_attempt());
        }
        inner.sequence.push(endpoint);
        inner.reindex_last_sent(endpoint, channel.last_packet_sent());
        inner.by_endpoint.insert(endpoint, Arc::clone(&channel));

        let hook: Weak<dyn RegistryTouch> = Arc::downgrade(self) as Weak<dyn RegistryTouch>;
        channel.attach_registry(hook);
        Ok(())
    }

    /// Remove the channel at `endpoint` from every index; no-op if absent.
    /// Does not close the socket — callers who still hold the `Arc<Channel>`
    /// keep it (and its socket) alive.
    pub fn erase(&self, endpoint: &Endpoint) {
        self.lock().remove_endpoint(endpoint);
    }

    pub fn find_by_endpoint(&self, endpoint: &Endpoint) -> Option<Arc<Channel>> {
        self.lock().by_endpoint.get(endpoint).cloned()
    }

    /// Any one channel bound to `node_id`; deterministic choice not required.
    pub fn find_by_node_id(&self, node_id: &NodeId) -> Option<Arc<Channel>> {
        let inner = self.lock();
        let endpoint = inner.by_node_id.get(node_id)?.iter().next().copied()?;
        inner.by_endpoint.get(&endpoint).cloned()
    }

    pub fn size(&self) -> usize {
        self.lock().by_endpoint.len()
    }

    /// Snapshot of all channels, in insertion order.
    pub fn list(&self) -> Vec<Arc<Channel>> {
        let inner = self.lock();
        inner
            .sequence
            .iter()
            .filter_map(|ep| inner.by_endpoint.get(ep).cloned())
            .collect()
    }

    /// Fill `out` with up to `out.len()` distinct channels sampled uniformly
    /// at random without replacement. If fewer channels exist than
    /// requested, the tail is left at the wildcard endpoint / `None`.
    pub fn random_fill(&self, out: &mut [Option<Arc<Channel>>]) {
        let inner = self.lock();
        let n = inner.sequence.len();
        let k = out.len().min(n);
        let mut rng = thread_rng();
        let picked = sample(&mut rng, n, k);
        for (slot, idx) in out.iter_mut().zip(picked.iter()) {
            let endpoint = inner.sequence[idx];
            *slot = inner.by_endpoint.get(&endpoint).cloned();
        }
        for slot in out.iter_mut().skip(k) {
            *slot = None;
        }
    }

    /// Same sampling as [`Self::random_fill`], deduplicated by construction
    /// since sampling is without replacement.
    pub fn random_set(&self, k: usize) -> HashSet<Arc<Channel>> {
        let inner = self.lock();
        let n = inner.sequence.len();
        let k = k.min(n);
        let mut rng = thread_rng();
        let picked = sample(&mut rng, n, k);
        picked
            .iter()
            .filter_map(|idx| inner.by_endpoint.get(&inner.sequence[idx]).cloned())
            .collect()
    }

    /// The eligible channel (node_id known) with the oldest
    /// `last_bootstrap_attempt`; updates that channel's timestamp to now and
    /// returns its endpoint. The wildcard endpoint if none is eligible.
    pub fn bootstrap_peer(&self) -> Endpoint {
        let now = self.clock.now();
        let mut inner = self.lock();
        let Some(&(_, endpoint)) = inner.bootstrap_order.iter().next() else {
            return Endpoint::wildcard();
        };
        if let Some(channel) = inner.by_endpoint.get(&endpoint).cloned() {
            channel.set_last_bootstrap_attempt_raw(now);
            inner.reindex_bootstrap(endpoint, now);
        }
        endpoint
    }

    /// Apply `f` to the channel at `endpoint`, repairing any auxiliary
    /// indices whose key it touches. Returns `false` if absent.
    pub fn modify(&self, endpoint: &Endpoint, f: impl FnOnce(&Channel)) -> bool {
        let mut inner = self.lock();
        let Some(channel) = inner.by_endpoint.get(endpoint).cloned() else {
            return false;
        };
        let old_node_id = channel.node_id();
        let old_last_sent = channel.last_packet_sent();
        let old_bootstrap = channel.last_bootstrap_attempt();

        f(&channel);

        let new_node_id = channel.node_id();
        if old_node_id != new_node_id {
            if let Some(old_id) = old_node_id {
                if let Some(set) = inner.by_node_id.get_mut(&old_id) {
                    set.remove(endpoint);
                    if set.is_empty() {
                        inner.by_node_id.remove(&old_id);
                    }
                }
            }
            if let Some(new_id) = new_node_id {
                inner.by_node_id.entry(new_id).or_default().insert(*endpoint);
                inner.reindex_bootstrap(*endpoint, channel.last_bootstrap_attempt());
            }
        }

        let new_last_sent = channel.last_packet_sent();
        if old_last_sent != new_last_sent {
            inner.reindex_last_sent(*endpoint, new_last_sent);
        }

        let new_bootstrap = channel.last_bootstrap_attempt();
        if old_bootstrap != new_bootstrap && channel.node_id().is_some() {
            inner.reindex_bootstrap(*endpoint, new_bootstrap);
        }

        true
    }

    /// Set `last_packet_sent` of the channel at `endpoint` to now.
    pub fn update(&self, endpoint: &Endpoint) {
        let now = self.clock.now();
        self.modify(endpoint, |channel| channel.set_last_packet_sent_raw(now));
    }

    /// True iff the per-IP count for `endpoint.ip` is already at the cap.
    pub fn max_ip_connections(&self, endpoint: &Endpoint) -> bool {
        let inner = self.lock();
        let ip = endpoint.canonical_ip();
        inner.by_ip.get(&ip).map(HashSet::len).unwrap_or(0) >= self.max_per_ip
    }

    /// Remove channels whose socket has closed or whose `last_packet_sent`
    /// predates `cutoff`. Returns the number removed.
    pub fn purge(&self, cutoff: u64) -> usize {
        let mut inner = self.lock();
        let stale: Vec<Endpoint> = inner
            .by_endpoint
            .iter()
            .filter(|(_, channel)| !channel.is_open() || channel.last_packet_sent() < cutoff)
            .map(|(ep, _)| *ep)
            .collect();
        let removed = stale.len();
        for endpoint in &stale {
            if let Some(channel) = inner.remove_endpoint(endpoint) {
                channel.close();
            }
        }
        removed
    }

    /// Channels idle longer than `cutoff` (i.e. due for a keepalive).
    pub fn idle_since(&self, cutoff: u64) -> Vec<Arc<Channel>> {
        let inner = self.lock();
        inner
            .last_sent_order
            .iter()
            .take_while(|(ts, _)| *ts < cutoff)
            .filter_map(|(_, ep)| inner.by_endpoint.get(ep).cloned())
            .collect()
    }

    /// Close every channel, clear all indices, and stop accepting new ones.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut inner = self.lock();
        for channel in inner.by_endpoint.values() {
            channel.close();
        }
        *inner = Inner::new();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl RegistryTouch for ChannelRegistry {
    fn touch_sent(&self, endpoint: Endpoint, now: u64) {
        self.lock().reindex_last_sent(endpoint, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::ids::NodeId;
    use crate::metrics::NoopMetricsSink;
    use burst_crypto::generate_keypair;
    use std::io;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool as StdAtomicBool, Ordering as StdOrdering};

    use crate::channel::{Channel, PeerSocket, SendCompletion};

    struct FakeSocket {
        remote: Endpoint,
        open: StdAtomicBool,
    }

    impl PeerSocket for FakeSocket {
        fn send_raw(&self, bytes: Vec<u8>, on_complete: SendCompletion) {
            on_complete(Ok(bytes.len()));
        }
        fn close(&self) {
            self.open.store(false, StdOrdering::SeqCst);
        }
        fn remote_endpoint(&self) -> Endpoint {
            self.remote
        }
        fn is_open(&self) -> bool {
            self.open.load(StdOrdering::SeqCst)
        }
    }

    fn channel_with_id(
        ep: Endpoint,
        clock: Arc<dyn Clock>,
        node_id: Option<NodeId>,
    ) -> Arc<Channel> {
        let socket = Arc::new(FakeSocket {
            remote: ep,
            open: StdAtomicBool::new(true),
        });
        let channel = Channel::new(ep, socket, clock, Arc::new(NoopMetricsSink));
        if let Some(id) = node_id {
            channel.set_node_id(id).expect("fresh channel");
        }
        channel
    }

    fn ep(n: u8) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(172, 16, 0, n)), 7075)
    }

    #[test]
    fn insert_rejects_duplicate_endpoint() {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(0));
        let registry = ChannelRegistry::new(8, clock.clone());
        let e = ep(1);
        assert!(registry.insert(channel_with_id(e, clock.clone(), None)).is_ok());
        let err = registry
            .insert(channel_with_id(e, clock.clone(), None))
            .unwrap_err();
        assert!(matches!(err, NetworkError::AlreadyPresent));
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn per_ip_cap_enforced() {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(0));
        let registry = ChannelRegistry::new(2, clock.clone());
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let a = Endpoint::new(ip, 1);
        let b = Endpoint::new(ip, 2);
        let c = Endpoint::new(ip, 3);
        assert!(registry.insert(channel_with_id(a, clock.clone(), None)).is_ok());
        assert!(registry.insert(channel_with_id(b, clock.clone(), None)).is_ok());
        let err = registry
            .insert(channel_with_id(c, clock.clone(), None))
            .unwrap_err();
        assert!(matches!(err, NetworkError::PerIpCapped));
        assert_eq!(registry.size(), 2);
        assert!(registry.max_ip_connections(&c));
    }

    #[test]
    fn find_by_node_id_ignores_unidentified_channels() {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(0));
        let registry = ChannelRegistry::new(8, clock.clone());
        let kp = generate_keypair();
        registry
            .insert(channel_with_id(ep(1), clock.clone(), None))
            .unwrap();
        assert!(registry.find_by_node_id(&kp.public).is_none());
        registry
            .insert(channel_with_id(ep(2), clock.clone(), Some(kp.public)))
            .unwrap();
        assert!(registry.find_by_node_id(&kp.public).is_some());
    }

    #[test]
    fn purge_removes_idle_and_closed_channels() {
        let clock = Arc::new(TestClock::new(1_000));
        let registry = ChannelRegistry::new(8, clock.clone());
        let e = ep(1);
        registry
            .insert(channel_with_id(e, clock.clone() as Arc<dyn Clock>, None))
            .unwrap();
        clock.advance(1_000);
        let removed = registry.purge(clock.now() - 10);
        assert_eq!(removed, 1);
        assert!(registry.find_by_endpoint(&e).is_none());
    }

    #[test]
    fn bootstrap_peer_picks_oldest_then_rotates() {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(1_000));
        let registry = ChannelRegistry::new(8, clock.clone());
        let kp_a = generate_keypair();
        let kp_b = generate_keypair();
        let kp_c = generate_keypair();

        let a = channel_with_id(ep(1), clock.clone(), Some(kp_a.public));
        a.set_last_bootstrap_attempt_raw(100);
        let b = channel_with_id(ep(2), clock.clone(), Some(kp_b.public));
        b.set_last_bootstrap_attempt_raw(200);
        let c = channel_with_id(ep(3), clock.clone(), Some(kp_c.public));
        c.set_last_bootstrap_attempt_raw(300);

        registry.insert(a).unwrap();
        registry.insert(b).unwrap();
        registry.insert(c).unwrap();

        assert_eq!(registry.bootstrap_peer(), ep(1));
        assert_eq!(registry.bootstrap_peer(), ep(2));
        assert_eq!(registry.bootstrap_peer(), ep(3));
        // A's timestamp is now newest, so the next call returns B again.
        assert_eq!(registry.bootstrap_peer(), ep(2));
    }

    #[test]
    fn random_fill_pads_tail_when_registry_smaller_than_k() {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(0));
        let registry = ChannelRegistry::new(8, clock.clone());
        registry
            .insert(channel_with_id(ep(1), clock.clone(), None))
            .unwrap();
        let mut out: Vec<Option<Arc<Channel>>> = vec![None, None, None];
        registry.random_fill(&mut out);
        assert_eq!(out.iter().filter(|c| c.is_some()).count(), 1);
    }

    #[test]
    fn sending_repositions_last_sent_index() {
        let clock = Arc::new(TestClock::new(1_000));
        let registry = ChannelRegistry::new(8, clock.clone() as Arc<dyn Clock>);
        let e = ep(1);
        let channel = channel_with_id(e, clock.clone() as Arc<dyn Clock>, None);
        registry.insert(channel.clone()).unwrap();

        clock.advance(50);
        let (tx, rx) = std::sync::mpsc::channel::<io::Result<usize>>();
        channel.send(vec![1, 2, 3], crate::ids::MessageCategory::Other, {
            let tx = tx.clone();
            Box::new(move |result| {
                let _ = tx.send(result);
            })
        });
        rx.recv().unwrap().unwrap();

        let idle = registry.idle_since(clock.now());
        assert!(idle.is_empty(), "freshly-sent channel should not be idle");
    }
}
