//! The peer transport node — wires the channel registry, SYN-cookie store,
//! attempt registry, and establishment state machine together behind a
//! listener loop and a bootstrap dial loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use burst_network::{
    accept_inbound, start_tcp, AttemptRegistry, ChannelRegistry, Endpoint, EstablishmentContext,
    EstablishmentOutcome, NoUdpFallback, SynCookieStore, SystemClock,
};
use burst_types::KeyPair;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::identity;
use crate::metrics::NodeMetrics;
use crate::shutdown::ShutdownController;

/// A running peer-transport node: the registry plus the background tasks
/// that keep it populated and bounded.
pub struct PeerTransportNode {
    config: NodeConfig,
    self_endpoint: Endpoint,
    registry: Arc<ChannelRegistry>,
    cookies: Arc<SynCookieStore>,
    attempts: Arc<AttemptRegistry>,
    context: Arc<EstablishmentContext>,
    metrics: Arc<NodeMetrics>,
    shutdown: Arc<ShutdownController>,
}

impl PeerTransportNode {
    /// Build a new node from `config`. Loads (or generates) the node's
    /// persistent identity key but does not bind any sockets yet.
    pub fn new(config: NodeConfig, metrics: Arc<NodeMetrics>) -> Result<Self, NodeError> {
        let identity: KeyPair = match &config.identity_key_path {
            Some(path) => identity::load_or_generate(path)?,
            None => identity::ephemeral(),
        };

        let clock = Arc::new(SystemClock);
        let self_endpoint = Endpoint::new(config.bind_addr, config.port);
        let registry = ChannelRegistry::new(config.tunables.max_per_ip, clock.clone());
        let cookies = Arc::new(SynCookieStore::with_clock(
            config.tunables.max_cookies_per_ip,
            clock.clone(),
        ));
        let attempts = Arc::new(AttemptRegistry::with_clock(clock.clone()));

        let context = Arc::new(EstablishmentContext {
            registry: registry.clone(),
            cookies: cookies.clone(),
            attempts: attempts.clone(),
            metrics: metrics.clone() as Arc<dyn burst_network::MetricsSink>,
            clock,
            identity,
            udp_fallback: Arc::new(NoUdpFallback),
        });

        Ok(Self {
            config,
            self_endpoint,
            registry,
            cookies,
            attempts,
            context,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
        })
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn shutdown(&self) -> &Arc<ShutdownController> {
        &self.shutdown
    }

    /// Bind the listener, spawn the accept loop, the bootstrap dial loop,
    /// and housekeeping, then block until shutdown is signaled.
    pub async fn run(&self) -> Result<(), NodeError> {
        let listener = TcpListener::bind((self.config.bind_addr, self.config.port)).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening for peer connections");

        let accept_handle = tokio::spawn(Self::accept_loop(
            listener,
            Arc::clone(&self.context),
            Arc::clone(&self.metrics),
            self.shutdown.subscribe(),
        ));

        let bootstrap_targets = self.parse_bootstrap_peers();
        let dial_handle = tokio::spawn(Self::dial_loop(
            bootstrap_targets,
            Arc::clone(&self.context),
            Arc::clone(&self.attempts),
            Arc::clone(&self.registry),
            self.self_endpoint,
            Arc::clone(&self.metrics),
            self.shutdown.subscribe(),
        ));

        let housekeeping_handles = burst_network::spawn_housekeeping(
            Arc::clone(&self.registry),
            Arc::clone(&self.cookies),
            Arc::new(SystemClock),
            self.config.tunables.clone(),
            Arc::new(NoKeepalivePayload),
            Arc::clone(&self.metrics) as Arc<dyn burst_network::PurgeObserver>,
        );

        self.shutdown.wait_for_signal().await;
        self.registry.stop();
        self.cookies.stop();
        self.attempts.stop();

        let _ = accept_handle.await;
        let _ = dial_handle.await;
        for handle in housekeeping_handles {
            handle.abort();
        }
        Ok(())
    }

    fn parse_bootstrap_peers(&self) -> Vec<Endpoint> {
        self.config
            .bootstrap_peers
            .iter()
            .filter_map(|s| s.parse::<SocketAddr>().ok())
            .map(|addr| Endpoint::new(addr.ip(), addr.port()))
            .collect()
    }

    async fn accept_loop(
        listener: TcpListener,
        context: Arc<EstablishmentContext>,
        metrics: Arc<NodeMetrics>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!("accept loop shutting down");
                    return;
                }
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to accept inbound connection");
                            continue;
                        }
                    };
                    let remote = Endpoint::new(addr.ip(), addr.port());
                    let context = Arc::clone(&context);
                    let metrics = Arc::clone(&metrics);
                    tokio::spawn(async move {
                        match accept_inbound(&context, stream, remote).await {
                            EstablishmentOutcome::Ready(_) => {
                                metrics.connections_accepted.inc();
                                metrics.peer_count.set(context.registry.size() as i64);
                            }
                            EstablishmentOutcome::Existing(_) => {}
                            EstablishmentOutcome::Failed => {
                                metrics.handshake_failures.inc();
                            }
                        }
                    });
                }
            }
        }
    }

    async fn dial_loop(
        targets: Vec<Endpoint>,
        context: Arc<EstablishmentContext>,
        attempts: Arc<AttemptRegistry>,
        registry: Arc<ChannelRegistry>,
        self_endpoint: Endpoint,
        metrics: Arc<NodeMetrics>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        for target in targets {
            if shutdown_rx.try_recv().is_ok() {
                return;
            }
            if !attempts.reachout(&target, &self_endpoint, &registry) {
                continue;
            }
            metrics.connections_dialed.inc();
            match start_tcp(&context, target).await {
                EstablishmentOutcome::Ready(_) => {
                    metrics.peer_count.set(registry.size() as i64);
                }
                EstablishmentOutcome::Existing(_) => {}
                EstablishmentOutcome::Failed => {
                    metrics.handshake_failures.inc();
                }
            }
        }

        let _ = shutdown_rx.recv().await;
        tracing::info!("dial loop shutting down");
    }
}

/// The gossip layer that would normally assemble a keepalive payload is out
/// of scope for this core; an empty payload still exercises the send path.
struct NoKeepalivePayload;

impl burst_network::KeepaliveSource for NoKeepalivePayload {
    fn build_keepalive(&self) -> Vec<u8> {
        Vec::new()
    }
}
