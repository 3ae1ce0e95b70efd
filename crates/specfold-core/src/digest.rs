//! Content digests for change detection.

use sha2::{Digest, Sha256};

/// SHA-256 of the raw bytes, as 64 lowercase hex characters.
pub fn compute_fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_hex() {
        let a = compute_fingerprint(b"# Rule\n\nAlways test.\n");
        let b = compute_fingerprint(b"# Rule\n\nAlways test.\n");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn fingerprint_differs_on_single_byte() {
        assert_ne!(compute_fingerprint(b"abc"), compute_fingerprint(b"abd"));
    }

    #[test]
    fn fingerprint_of_empty_input() {
        assert_eq!(
            compute_fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
