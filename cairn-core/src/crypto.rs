//! # Integrity Primitives
//!
//! Checksums and content hashing for the content store.
//!
//! - **CRC32** guards every stored frame against bit rot and torn writes
//! - **BLAKE3** names records by their content, which gives deduplication

use crc32fast::Hasher as Crc32Hasher;

/// Fast CRC32 checksum for data integrity
pub fn crc32_checksum(data: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verify CRC32 checksum
pub fn verify_crc32(data: &[u8], expected: u32) -> bool {
    crc32_checksum(data) == expected
}

/// BLAKE3 digest of `data`, hex encoded
pub fn content_hash_hex(data: &[u8]) -> String {
    hex::encode(blake3::hash(data).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksums() {
        let data = b"test data";
        let checksum = crc32_checksum(data);
        assert!(verify_crc32(data, checksum));
        assert!(!verify_crc32(b"tampered", checksum));
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash_hex(b"manifest block");
        let b = content_hash_hex(b"manifest block");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash_hex(b"manifest block!"));
    }
}
