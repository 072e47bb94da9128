//! Cryptographic primitives for the peer transport core.
//!
//! - **Ed25519** for signing and verifying the SYN-cookie handshake.
//! - OS-backed randomness for cookie generation.

pub mod keys;
pub mod random;
pub mod sign;

pub use keys::generate_keypair;
pub use random::random_32;
pub use sign::{sign_message, verify_signature};
