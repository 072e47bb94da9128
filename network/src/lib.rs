//! The TCP peer transport core: live connection registry, SYN-cookie
//! identity handshake, outbound connection establishment, and the
//! housekeeping tasks that keep both bounded over time.

pub mod attempts;
pub mod channel;
pub mod clock;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod establishment;
pub mod housekeeping;
pub mod ids;
pub mod metrics;
pub mod registry;
pub mod syn_cookie;

pub use attempts::AttemptRegistry;
pub use channel::{Channel, PeerSocket, SendCompletion, TcpPeerSocket};
pub use clock::{Clock, SystemClock, TestClock};
pub use config::NetworkTunables;
pub use endpoint::Endpoint;
pub use error::NetworkError;
pub use establishment::{start_tcp, accept_inbound, EstablishmentContext, EstablishmentOutcome, NoUdpFallback, UdpFallback};
pub use housekeeping::{spawn_housekeeping, KeepaliveSource, PurgeObserver};
pub use ids::{Cookie, Direction, MessageCategory, NodeId};
pub use metrics::{MetricsSink, NoopMetricsSink};
pub use registry::ChannelRegistry;
pub use syn_cookie::SynCookieStore;
