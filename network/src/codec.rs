//! Wire framing for the identity handshake and keepalive messages.
//!
//! The transport core consumes this codec as an injected collaborator; it
//! never invents its own message formats beyond the fixed-size handshake
//! frames required by the protocol.

use burst_types::{PublicKey, Signature};

use crate::ids::Cookie;

/// Server -> client: the freshly assigned SYN cookie. Exactly 32 bytes.
pub fn encode_cookie(cookie: &Cookie) -> Vec<u8> {
    cookie.as_bytes().to_vec()
}

pub fn decode_cookie(bytes: &[u8]) -> Option<Cookie> {
    let array: [u8; 32] = bytes.try_into().ok()?;
    Some(Cookie(array))
}

/// Client -> server: `node_id || signature`, 32 + 64 = 96 bytes.
pub fn encode_identity_response(node_id: &PublicKey, signature: &Signature) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + 64);
    out.extend_from_slice(node_id.as_bytes());
    out.extend_from_slice(&signature.0);
    out
}

pub fn decode_identity_response(bytes: &[u8]) -> Option<(PublicKey, Signature)> {
    if bytes.len() != 96 {
        return None;
    }
    let node_id = PublicKey(bytes[0..32].try_into().ok()?);
    let signature = Signature(bytes[32..96].try_into().ok()?);
    Some((node_id, signature))
}

/// An empty keepalive payload; higher layers may enrich this with peer
/// lists, but the transport core only needs something to send on a timer.
pub fn encode_keepalive() -> Vec<u8> {
    Vec::new()
}
