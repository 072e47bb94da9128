//! Error kinds returned across the peer transport core's public boundary.
//!
//! Registry mutations never panic or throw across the boundary: every
//! failure mode here is returned to the caller as one of these variants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    /// `insert` was called with an endpoint already present in the registry.
    #[error("endpoint already present in the registry")]
    AlreadyPresent,

    /// The per-IP connection or cookie cap has been reached.
    #[error("per-IP connection cap reached")]
    PerIpCapped,

    /// The identity handshake failed or the peer disconnected before completing it.
    #[error("handshake unresolved")]
    Unresolved,

    /// The operation targets a channel whose socket is already closed.
    #[error("not connected")]
    NotConnected,

    /// The registry (or store) has been stopped.
    #[error("stopped")]
    Stopped,

    /// The underlying socket reported an error, propagated verbatim.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}
