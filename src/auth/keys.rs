//! Credential material: generation, fingerprinting, display prefix.
//!
//! Raw keys are `bm_` followed by url-safe base64 of 24 random bytes. Only
//! the sha256 fingerprint and an 8-character prefix are ever stored; the raw
//! key is handed to the caller exactly once, wrapped in [`SecretString`] so
//! it cannot end up in a log line by accident.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

/// Number of leading raw-key characters retained for display and search.
pub const KEY_PREFIX_LEN: usize = 8;

const KEY_ENTROPY_BYTES: usize = 24;

/// Generate a fresh high-entropy API key.
pub fn generate_key() -> SecretString {
    let mut raw = [0u8; KEY_ENTROPY_BYTES];
    rand::thread_rng().fill_bytes(&mut raw);
    SecretString::new(format!("bm_{}", URL_SAFE_NO_PAD.encode(raw)))
}

/// One-way fingerprint of a raw key: sha256, lowercase hex (64 chars).
pub fn fingerprint_hex(raw_key: &str) -> String {
    let digest = Sha256::digest(raw_key.as_bytes());
    format!("{:x}", digest)
}

/// Non-sensitive display prefix of a raw key.
pub fn display_prefix(raw_key: &str) -> String {
    raw_key.chars().take(KEY_PREFIX_LEN).collect()
}

/// Fingerprint a secret key without exposing it at the call site.
pub fn fingerprint_secret(key: &SecretString) -> String {
    fingerprint_hex(key.expose_secret())
}

/// Display prefix of a secret key.
pub fn prefix_of_secret(key: &SecretString) -> String {
    display_prefix(key.expose_secret())
}
