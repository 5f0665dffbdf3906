//! Ephemeral identity generation
//!
//! Connections, players, and sessions are keyed by fixed-length random hex
//! tokens. 256 bits of randomness makes collisions negligible at any
//! realistic connection or session count.

use std::fmt::Write;

use rand::RngCore;

/// Token length in random bytes (rendered as twice as many hex characters)
const TOKEN_BYTES: usize = 32;

/// Identity assigned to a connection and reused as the player identity
pub type ClientId = String;

/// Identity assigned to a session
pub type SessionId = String;

/// Generate a fresh 64-character lowercase hex token
pub fn generate() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);

    let mut token = String::with_capacity(TOKEN_BYTES * 2);
    for byte in bytes {
        // Infallible for String targets
        let _ = write!(token, "{byte:02x}");
    }
    token
}
