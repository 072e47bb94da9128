//! Periodic purge, cookie cleanup, and keepalive emission, each driven by an
//! external timer collaborator at the cadence the tunables imply.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::channel::{Channel, SendCompletion};
use crate::clock::Clock;
use crate::config::NetworkTunables;
use crate::ids::MessageCategory;
use crate::registry::ChannelRegistry;
use crate::syn_cookie::SynCookieStore;

/// Something that can turn "this channel is idle" into a keepalive payload.
/// The core treats the actual message contents as opaque.
pub trait KeepaliveSource: Send + Sync {
    fn build_keepalive(&self) -> Vec<u8>;
}

/// Observes how many channels each purge tick removed, so callers can
/// surface it as a metric without the housekeeping loop depending on any
/// particular metrics backend.
pub trait PurgeObserver: Send + Sync {
    fn observe_purged(&self, count: usize);
}

/// Drive the three housekeeping loops as background tasks, returning their
/// join handles so a caller can abort or await them on shutdown. Each loop
/// exits once its respective store's stop flag is observed true.
pub fn spawn_housekeeping(
    registry: Arc<ChannelRegistry>,
    cookies: Arc<SynCookieStore>,
    clock: Arc<dyn Clock>,
    tunables: NetworkTunables,
    keepalive_source: Arc<dyn KeepaliveSource>,
    purge_observer: Arc<dyn PurgeObserver>,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(ongoing_purge(
            Arc::clone(&registry),
            Arc::clone(&clock),
            tunables.idle_timeout_secs,
            purge_observer,
        )),
        tokio::spawn(ongoing_syn_cookie_cleanup(
            Arc::clone(&cookies),
            Arc::clone(&clock),
            tunables.cookie_ttl_secs,
        )),
        tokio::spawn(ongoing_keepalive(
            registry,
            clock,
            tunables.keepalive_period_secs,
            keepalive_source,
        )),
    ]
}

async fn ongoing_purge(
    registry: Arc<ChannelRegistry>,
    clock: Arc<dyn Clock>,
    idle_timeout_secs: u64,
    purge_observer: Arc<dyn PurgeObserver>,
) {
    let mut ticker = interval(Duration::from_secs((idle_timeout_secs / 2).max(1)));
    loop {
        ticker.tick().await;
        if registry.is_stopped() {
            return;
        }
        let cutoff = clock.now().saturating_sub(idle_timeout_secs);
        let purged = registry.purge(cutoff);
        purge_observer.observe_purged(purged);
    }
}

async fn ongoing_syn_cookie_cleanup(cookies: Arc<SynCookieStore>, clock: Arc<dyn Clock>, cookie_ttl_secs: u64) {
    let mut ticker = interval(Duration::from_secs((cookie_ttl_secs / 2).max(1)));
    loop {
        ticker.tick().await;
        if cookies.is_stopped() {
            return;
        }
        let cutoff = clock.now().saturating_sub(cookie_ttl_secs);
        cookies.cleanup(cutoff);
    }
}

async fn ongoing_keepalive(
    registry: Arc<ChannelRegistry>,
    clock: Arc<dyn Clock>,
    keepalive_period_secs: u64,
    keepalive_source: Arc<dyn KeepaliveSource>,
) {
    let mut ticker = interval(Duration::from_secs((keepalive_period_secs / 2).max(1)));
    loop {
        ticker.tick().await;
        if registry.is_stopped() {
            return;
        }
        let cutoff = clock.now().saturating_sub(keepalive_period_secs);
        for channel in registry.idle_since(cutoff) {
            send_keepalive(&channel, keepalive_source.build_keepalive());
        }
    }
}

fn send_keepalive(channel: &Arc<Channel>, payload: Vec<u8>) {
    let on_complete: SendCompletion = Box::new(|_| {});
    channel.send(payload, MessageCategory::Keepalive, on_complete);
}
