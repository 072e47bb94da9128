//! Peer identity and cookie types, plus the metrics pass-through tag.

use burst_types::PublicKey;

/// A peer's long-lived identity. Zero is reserved and never valid.
pub type NodeId = PublicKey;

/// A 32-byte unpredictable SYN-cookie challenge.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cookie(pub [u8; 32]);

impl Cookie {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Opaque tag describing what kind of payload is being sent, forwarded
/// verbatim to the metrics sink. The registry never interprets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    Handshake,
    Keepalive,
    Publish,
    ConfirmReq,
    ConfirmAck,
    Bootstrap,
    Telemetry,
    Other,
}

/// Direction of a metered transfer, for the metrics sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}
