//! Outbound connection establishment: dial, identity handshake, admission.
//!
//! `start_tcp` drives a target endpoint through Dialing -> Identifying ->
//! Admitting -> Ready, falling back to a UDP collaborator (or outright
//! failure, if none is configured) on any handshake error.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use burst_crypto::sign_message;
use burst_types::KeyPair;

use crate::attempts::AttemptRegistry;
use crate::channel::{Channel, TcpPeerSocket};
use crate::clock::Clock;
use crate::codec::{decode_identity_response, encode_cookie, encode_identity_response};
use crate::endpoint::Endpoint;
use crate::error::NetworkError;
use crate::ids::NodeId;
use crate::metrics::MetricsSink;
use crate::registry::ChannelRegistry;
use crate::syn_cookie::SynCookieStore;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_FRAME_LEN: u32 = 4096;

/// The terminal result of an establishment attempt.
pub enum EstablishmentOutcome {
    /// The handshake completed and the new channel was admitted.
    Ready(Arc<Channel>),
    /// A channel for this endpoint already existed (inbound/outbound race);
    /// the new connection was discarded in favor of the existing one.
    Existing(Arc<Channel>),
    /// Dialing or the handshake failed and no fallback resolved it.
    Failed,
}

/// Invoked when dialing or the handshake fails outright; out of scope for
/// this core beyond handing off the endpoint and the one-shot continuation.
pub trait UdpFallback: Send + Sync {
    fn fallback(&self, endpoint: Endpoint, on_done: Box<dyn FnOnce(Option<Arc<Channel>>) + Send>);
}

/// Default fallback when no UDP transport is wired up: always fails.
#[derive(Default)]
pub struct NoUdpFallback;

impl UdpFallback for NoUdpFallback {
    fn fallback(&self, _endpoint: Endpoint, on_done: Box<dyn FnOnce(Option<Arc<Channel>>) + Send>) {
        on_done(None);
    }
}

/// Shared collaborators the establishment state machine needs.
pub struct EstablishmentContext {
    pub registry: Arc<ChannelRegistry>,
    pub cookies: Arc<SynCookieStore>,
    pub attempts: Arc<AttemptRegistry>,
    pub metrics: Arc<dyn MetricsSink>,
    pub clock: Arc<dyn Clock>,
    pub identity: KeyPair,
    pub udp_fallback: Arc<dyn UdpFallback>,
}

/// Dial `target`, perform the identity handshake, and admit the resulting
/// channel into the registry. Always leaves the attempt registry without an
/// entry for `target` once it returns.
pub async fn start_tcp(ctx: &EstablishmentContext, target: Endpoint) -> EstablishmentOutcome {
    if ctx.attempts.is_in_progress(&target) {
        return EstablishmentOutcome::Failed;
    }
    ctx.attempts.begin(target);

    let outcome = dial_and_identify(ctx, target).await;
    ctx.attempts.end(&target);

    match outcome {
        Ok(channel) => admit(ctx, channel).await,
        Err(_) => fallback(ctx, target).await,
    }
}

async fn fallback(ctx: &EstablishmentContext, target: Endpoint) -> EstablishmentOutcome {
    let (tx, rx) = tokio::sync::oneshot::channel();
    ctx.udp_fallback.fallback(
        target,
        Box::new(move |channel| {
            let _ = tx.send(channel);
        }),
    );
    match rx.await {
        Ok(Some(channel)) => EstablishmentOutcome::Ready(channel),
        _ => EstablishmentOutcome::Failed,
    }
}

async fn dial_and_identify(
    ctx: &EstablishmentContext,
    target: Endpoint,
) -> io::Result<Arc<Channel>> {
    let addr: SocketAddr = target.into();
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| timeout_error("connect"))??;

    let (mut read_half, mut write_half) = stream.into_split();

    let cookie = ctx
        .cookies
        .assign(target)
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrInUse, "cookie store capped"))?;

    write_frame(&mut write_half, &encode_cookie(&cookie)).await?;

    let response = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_frame(&mut read_half))
        .await
        .map_err(|_| timeout_error("handshake"))??;
    let (peer_node_id, signature) =
        decode_identity_response(&response).ok_or_else(|| malformed_error())?;

    if ctx.cookies.validate(target, &peer_node_id, &signature) {
        return Err(malformed_error());
    }

    let socket = TcpPeerSocket::new(write_half, target);
    let channel = Channel::new(target, socket, ctx.clock.clone(), ctx.metrics.clone());
    channel
        .set_node_id(peer_node_id)
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "node id already set"))?;
    Ok(channel)
}

async fn admit(ctx: &EstablishmentContext, channel: Arc<Channel>) -> EstablishmentOutcome {
    match ctx.registry.insert(channel.clone()) {
        Ok(()) => EstablishmentOutcome::Ready(channel),
        Err(NetworkError::AlreadyPresent) => {
            channel.close();
            match ctx.registry.find_by_endpoint(&channel.endpoint()) {
                Some(existing) => EstablishmentOutcome::Existing(existing),
                None => EstablishmentOutcome::Failed,
            }
        }
        Err(_) => {
            channel.close();
            EstablishmentOutcome::Failed
        }
    }
}

/// Complete the server side of the handshake for an already-accepted inbound
/// TCP stream: receive the identity advertisement the dialer sent under our
/// cookie and prove our own identity over it, then admit the channel.
pub async fn accept_inbound(
    ctx: &EstablishmentContext,
    stream: TcpStream,
    remote: Endpoint,
) -> EstablishmentOutcome {
    match accept_and_identify(ctx, stream, remote).await {
        Ok(channel) => admit(ctx, channel).await,
        Err(_) => EstablishmentOutcome::Failed,
    }
}

async fn accept_and_identify(
    ctx: &EstablishmentContext,
    stream: TcpStream,
    remote: Endpoint,
) -> io::Result<Arc<Channel>> {
    let (mut read_half, mut write_half) = stream.into_split();

    let cookie_bytes = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_frame(&mut read_half))
        .await
        .map_err(|_| timeout_error("handshake"))??;
    let cookie =
        crate::codec::decode_cookie(&cookie_bytes).ok_or_else(malformed_error)?;

    let our_node_id = public_key_as_node_id(&ctx.identity);
    let signature = sign_message(cookie.as_bytes(), &ctx.identity.private);
    write_frame(
        &mut write_half,
        &encode_identity_response(&our_node_id, &signature),
    )
    .await?;

    let socket = TcpPeerSocket::new(write_half, remote);
    Ok(Channel::new(remote, socket, ctx.clock.clone(), ctx.metrics.clone()))
}

fn public_key_as_node_id(identity: &KeyPair) -> NodeId {
    identity.public
}

async fn write_frame(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    payload: &[u8],
) -> io::Result<()> {
    let len_bytes = (payload.len() as u32).to_be_bytes();
    write_half.write_all(&len_bytes).await?;
    write_half.write_all(payload).await?;
    write_half.flush().await
}

async fn read_frame(read_half: &mut tokio::net::tcp::OwnedReadHalf) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    read_half.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(malformed_error());
    }
    let mut body = vec![0u8; len as usize];
    read_half.read_exact(&mut body).await?;
    Ok(body)
}

fn timeout_error(stage: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{stage} timed out"))
}

fn malformed_error() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "malformed handshake frame")
}
