//! Integrity: SHA-256 digest of persisted payloads, verified on restore.

use sha2::{Digest, Sha256};

pub const DIGEST_LEN: usize = 32;

/// Hash a payload. Returns 32-byte digest.
pub fn digest(payload: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.finalize().into()
}

/// Verify payload against expected digest.
pub fn verify(payload: &[u8], expected: &[u8; DIGEST_LEN]) -> bool {
    digest(payload) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_verify_roundtrip() {
        let payload = b"dispatch history";
        let d = digest(payload);
        assert!(verify(payload, &d));
    }

    #[test]
    fn verify_rejects_tampered() {
        let d = digest(b"dispatch history");
        assert!(!verify(b"dispatch histories", &d));
    }
}
