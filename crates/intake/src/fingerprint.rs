//! Content fingerprinting
//!
//! The fingerprint identifies a document revision for idempotency. The
//! strongest available identity wins: a computed SHA-256 digest, then the
//! store content tag, then the bare object size. The size form is a
//! degraded mode that cannot distinguish same-length revisions; it is kept
//! for objects with neither digest nor tag rather than failing admission.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a document body
#[must_use]
pub fn content_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Resolve the admission fingerprint from what is available
#[must_use]
pub fn resolve_fingerprint(sha256: Option<&str>, etag: &str, content_length: u64) -> String {
    if let Some(digest) = sha256 {
        if !digest.is_empty() {
            return digest.to_string();
        }
    }

    if !etag.is_empty() {
        return etag.to_string();
    }

    format!("size:{}", content_length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        let a = content_sha256(b"chapter one contents");
        let b = content_sha256(b"chapter one contents");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_digest_changes_with_any_byte() {
        let a = content_sha256(b"chapter one contents");
        let b = content_sha256(b"chapter one content5");
        assert_ne!(a, b);
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            content_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_prefers_digest() {
        let fp = resolve_fingerprint(Some("deadbeef"), "etag123", 42);
        assert_eq!(fp, "deadbeef");
    }

    #[test]
    fn test_fingerprint_falls_back_to_etag_then_size() {
        assert_eq!(resolve_fingerprint(None, "etag123", 42), "etag123");
        assert_eq!(resolve_fingerprint(Some(""), "etag123", 42), "etag123");
        assert_eq!(resolve_fingerprint(None, "", 50000), "size:50000");
    }
}
