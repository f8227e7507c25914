// src/hash.rs

//! Content hashing for drift detection
//!
//! Rendered files are compared against what is on the host by the SHA-256
//! of their full byte content. Modification times are never consulted, so
//! an external edit that preserves mtime is still detected.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 of a byte slice as a lowercase hex string
#[inline]
pub fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Shorten a hex digest for log and report output
pub fn short(digest: &str) -> &str {
    &digest[..digest.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_single_byte_change_detected() {
        assert_ne!(sha256(b"topic=demo\n"), sha256(b"topic=demp\n"));
    }

    #[test]
    fn test_short() {
        assert_eq!(short("abcdef0123456789"), "abcdef012345");
        assert_eq!(short("abc"), "abc");
    }
}
