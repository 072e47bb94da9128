//! Cryptographic-quality randomness for SYN cookies and nonces.

/// Generate 32 bytes of cryptographically secure random data.
pub fn random_32() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes).expect("OS random source unavailable");
    bytes
}
