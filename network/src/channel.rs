//! A live peer connection: identity, send path, and bookkeeping timestamps.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::endpoint::Endpoint;
use crate::ids::{Direction, MessageCategory, NodeId};
use crate::metrics::MetricsSink;

/// A completion callback invoked exactly once with the write result.
pub type SendCompletion = Box<dyn FnOnce(io::Result<usize>) + Send>;

/// The byte-stream socket a [`Channel`] exclusively owns.
///
/// Implementations must serialize writes: completions for the same socket
/// fire in submission order. The core only ever holds this behind an `Arc`,
/// never a `Box`, so a [`Channel`] can hand out the same socket identity to
/// equality/hash checks.
pub trait PeerSocket: Send + Sync {
    /// Submit `bytes` for writing; invoke `on_complete` exactly once when the
    /// OS-level write finishes (or fails).
    fn send_raw(&self, bytes: Vec<u8>, on_complete: SendCompletion);

    /// Close the socket. Outstanding writes complete with an aborted error.
    fn close(&self);

    /// The peer's remote endpoint.
    fn remote_endpoint(&self) -> Endpoint;

    /// Whether the socket is still open.
    fn is_open(&self) -> bool;
}

/// Registry-side hook a [`Channel`] notifies after a successful send, so the
/// `last_packet_sent` ordered index can be repaired. Held weakly: a Channel
/// never keeps its owning registry alive.
pub(crate) trait RegistryTouch: Send + Sync {
    fn touch_sent(&self, endpoint: Endpoint, now: u64);
}

/// One live outbound/inbound peer connection.
pub struct Channel {
    endpoint: Endpoint,
    socket: Arc<dyn PeerSocket>,
    node_id: OnceLock<NodeId>,
    last_packet_sent: AtomicU64,
    last_bootstrap_attempt: AtomicU64,
    registry_hook: Mutex<Option<Weak<dyn RegistryTouch>>>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
}

impl Channel {
    pub fn new(
        endpoint: Endpoint,
        socket: Arc<dyn PeerSocket>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Arc<Self> {
        let now = clock.now();
        Arc::new(Self {
            endpoint,
            socket,
            node_id: OnceLock::new(),
            last_packet_sent: AtomicU64::new(now),
            last_bootstrap_attempt: AtomicU64::new(0),
            registry_hook: Mutex::new(None),
            metrics,
            clock,
        })
    }

    /// Hand `buffer` to the owned socket. `on_complete` fires exactly once.
    /// Updates `last_packet_sent` iff the write reports `bytes_written > 0`.
    pub fn send(
        self: &Arc<Self>,
        buffer: Vec<u8>,
        category: MessageCategory,
        on_complete: SendCompletion,
    ) {
        if !self.socket.is_open() {
            on_complete(Err(not_connected()));
            return;
        }
        let this = Arc::clone(self);
        let len = buffer.len();
        self.socket.send_raw(
            buffer,
            Box::new(move |result| {
                if let Ok(written) = &result {
                    if *written > 0 {
                        this.mark_sent();
                    }
                }
                this.metrics.record(category, Direction::Outbound, len);
                on_complete(result);
            }),
        );
    }

    fn mark_sent(&self) {
        let now = self.clock.now();
        self.last_packet_sent.store(now, Ordering::SeqCst);
        if let Some(hook) = self
            .registry_hook
            .lock()
            .expect("registry hook mutex poisoned")
            .as_ref()
            .and_then(Weak::upgrade)
        {
            hook.touch_sent(self.endpoint, now);
        }
    }

    /// Attach the owning registry so sends reposition its ordered index.
    pub(crate) fn attach_registry(&self, hook: Weak<dyn RegistryTouch>) {
        *self.registry_hook.lock().expect("registry hook mutex poisoned") = Some(hook);
    }

    /// The peer endpoint this channel was constructed for; stable for the
    /// channel's lifetime regardless of socket state.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Returns the peer endpoint, or the wildcard endpoint if the socket has
    /// since been closed.
    pub fn remote_endpoint(&self) -> Endpoint {
        if self.socket.is_open() {
            self.endpoint
        } else {
            Endpoint::wildcard()
        }
    }

    /// The bound identity, if the handshake has completed.
    pub fn node_id(&self) -> Option<NodeId> {
        self.node_id.get().copied()
    }

    /// Bind the peer's identity. Succeeds only the first time; the identity
    /// is never cleared afterward.
    pub fn set_node_id(&self, id: NodeId) -> Result<(), NodeId> {
        self.node_id.set(id)
    }

    pub fn last_packet_sent(&self) -> u64 {
        self.last_packet_sent.load(Ordering::SeqCst)
    }

    pub fn last_bootstrap_attempt(&self) -> u64 {
        self.last_bootstrap_attempt.load(Ordering::SeqCst)
    }

    pub(crate) fn set_last_packet_sent_raw(&self, ts: u64) {
        self.last_packet_sent.store(ts, Ordering::SeqCst);
    }

    pub(crate) fn set_last_bootstrap_attempt_raw(&self, ts: u64) {
        self.last_bootstrap_attempt.store(ts, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_open()
    }

    pub fn close(&self) {
        self.socket.close();
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.socket.close();
    }
}

impl PartialEq for Channel {
    /// Two channels are equal iff they share the same owning socket instance.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.socket, &other.socket)
    }
}

impl Eq for Channel {}

impl std::hash::Hash for Channel {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.socket) as *const () as usize).hash(state);
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("endpoint", &self.endpoint)
            .field("node_id", &self.node_id.get())
            .finish()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel socket is closed")
}

/// A single queued write job, processed in submission order by the writer
/// task spawned in [`TcpPeerSocket::new`].
enum WriteJob {
    Send {
        bytes: Vec<u8>,
        on_complete: SendCompletion,
    },
    Close,
}

/// The production [`PeerSocket`]: a length-prefixed framing writer over a
/// real TCP write half, with writes serialized through a dedicated task so
/// completions fire in submission order even under concurrent callers.
pub struct TcpPeerSocket {
    remote: Endpoint,
    tx: mpsc::UnboundedSender<WriteJob>,
    open: Arc<AtomicBool>,
}

impl TcpPeerSocket {
    pub fn new(write_half: OwnedWriteHalf, remote: Endpoint) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        tokio::spawn(Self::writer_task(write_half, rx, Arc::clone(&open)));
        Arc::new(Self { remote, tx, open })
    }

    async fn writer_task(
        mut writer: OwnedWriteHalf,
        mut rx: mpsc::UnboundedReceiver<WriteJob>,
        open: Arc<AtomicBool>,
    ) {
        while let Some(job) = rx.recv().await {
            match job {
                WriteJob::Send { bytes, on_complete } => {
                    if !open.load(Ordering::SeqCst) {
                        on_complete(Err(not_connected()));
                        continue;
                    }
                    let result = Self::write_frame(&mut writer, &bytes).await;
                    if result.is_err() {
                        open.store(false, Ordering::SeqCst);
                    }
                    on_complete(result);
                }
                WriteJob::Close => {
                    open.store(false, Ordering::SeqCst);
                    let _ = writer.shutdown().await;
                    break;
                }
            }
        }
        open.store(false, Ordering::SeqCst);
    }

    async fn write_frame(writer: &mut OwnedWriteHalf, payload: &[u8]) -> io::Result<usize> {
        let len_bytes = (payload.len() as u32).to_be_bytes();
        writer.write_all(&len_bytes).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        Ok(payload.len())
    }
}

impl PeerSocket for TcpPeerSocket {
    fn send_raw(&self, bytes: Vec<u8>, on_complete: SendCompletion) {
        if let Err(mpsc::error::SendError(job)) =
            self.tx.send(WriteJob::Send { bytes, on_complete })
        {
            // Writer task has already exited; complete with an aborted error
            // instead of dropping the callback silently.
            if let WriteJob::Send { on_complete, .. } = job {
                on_complete(Err(io::Error::new(
                    io::ErrorKind::Other,
                    "operation aborted",
                )));
            }
        }
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.tx.send(WriteJob::Close);
    }

    fn remote_endpoint(&self) -> Endpoint {
        self.remote
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
