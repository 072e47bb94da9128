//! Fundamental types for the peer transport core.
//!
//! This crate defines the identity and timestamp types shared by the
//! crypto primitives and the network crate: key pairs, signatures, and
//! the monotonic timestamp used throughout channel bookkeeping.

pub mod keys;
pub mod network;
pub mod time;

pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
pub use time::Timestamp;
