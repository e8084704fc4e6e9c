//! Content fingerprints for record payloads.
//!
//! The digest guards against accidental corruption in transit and in the
//! local cache. It is not a MAC and offers no confidentiality.

use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 digest of `payload`.
pub fn fingerprint(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Checks `checksum` against the fingerprint of `payload`.
pub fn verify(payload: &[u8], checksum: &str) -> bool {
    fingerprint(payload).eq_ignore_ascii_case(checksum.trim())
}
