use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Version hash over both identity components, separated so
/// `(ab, c)` and `(a, bc)` cannot collide.
pub fn version_hash(content_hash: &str, occurrences_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content_hash.as_bytes());
    hasher.update(b":");
    hasher.update(occurrences_hash.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn version_hash_depends_on_both_components() {
        let a = version_hash("one", "two");
        assert_ne!(a, version_hash("one", "three"));
        assert_ne!(a, version_hash("on", "etwo"));
        assert_eq!(a, version_hash("one", "two"));
    }
}
