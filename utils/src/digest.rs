//! Content hashing.
//!
//! One digest function is used everywhere content identity matters: baseline
//! comparison, external-change detection, snapshot tokens, and the read-only
//! sync diagnostics. Keeping a single algorithm means any two copies of the
//! same text always compare equal across subsystems.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a text buffer.
#[must_use]
pub fn content_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
