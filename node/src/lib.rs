//! Peer transport node — binds the TCP listener, dials bootstrap peers, and
//! keeps the channel registry, SYN-cookie store, and housekeeping tasks
//! running for the lifetime of the process.

pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod shutdown;

pub use config::NodeConfig;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::PeerTransportNode;
pub use shutdown::ShutdownController;
