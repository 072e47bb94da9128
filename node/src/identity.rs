//! Loading and persisting the node's long-lived Ed25519 identity key.

use std::path::Path;

use burst_crypto::keypair_from_private;
use burst_types::{KeyPair, PrivateKey};

use crate::error::NodeError;

/// Load the key pair from `path`, generating and persisting a fresh one if
/// the file does not exist.
pub fn load_or_generate(path: &Path) -> Result<KeyPair, NodeError> {
    if let Ok(hex_str) = std::fs::read_to_string(path) {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| NodeError::Config(format!("invalid identity key file: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| NodeError::Config("identity key file must hold 32 bytes".to_string()))?;
        return Ok(keypair_from_private(PrivateKey(arr)));
    }

    let keypair = burst_crypto::generate_keypair();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, hex::encode(keypair.private.0))?;
    Ok(keypair)
}

/// Generate an ephemeral key pair that is not persisted anywhere.
pub fn ephemeral() -> KeyPair {
    burst_crypto::generate_keypair()
}
