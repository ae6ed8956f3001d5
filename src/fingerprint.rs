//! Content fingerprints used for change detection.
//!
//! Both whole files and individual chunks are fingerprinted with SHA-256 over the full input. The
//! digest is only ever compared for equality, never used as a storage key for deduplication.

use sha2::{Digest, Sha256};

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 64;

/// Hash raw bytes into a lowercase hex SHA-256 digest
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash UTF-8 text
#[inline]
pub fn hash_text(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            hash_text("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn fixed_length_hex() {
        for input in ["", "a", "a much longer piece of text\nwith lines"] {
            let digest = hash_text(input);
            assert_eq!(digest.len(), FINGERPRINT_LEN);
            assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
            assert_eq!(digest, digest.to_lowercase());
        }
    }

    #[test]
    fn deterministic_and_sensitive() {
        assert_eq!(hash_text("same input"), hash_text("same input"));
        assert_ne!(hash_text("same input"), hash_text("same input "));
        assert_eq!(hash_bytes(b"bytes"), hash_text("bytes"));
    }
}
