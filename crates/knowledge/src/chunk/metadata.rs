//! Chunk identity and fingerprints.

use sha2::{Digest, Sha256};

/// Hex digits kept from the id digest.
const CHUNK_ID_LEN: usize = 16;

/// Calculate SHA-256 hash of text.
pub fn calculate_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic chunk id derived from the document id and start offset.
///
/// Re-chunking an unchanged document yields the same ids, which is what
/// makes re-ingestion an overwrite instead of a duplicate.
pub fn chunk_id(source_id: &str, start: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b":");
    hasher.update(start.to_string().as_bytes());
    let mut id = format!("{:x}", hasher.finalize());
    id.truncate(CHUNK_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_hash() {
        let hash = calculate_hash("Hello, world!");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, calculate_hash("Hello, world!"));
        assert_ne!(hash, calculate_hash("Different text"));
    }

    #[test]
    fn test_chunk_id_is_stable_and_offset_sensitive() {
        let id = chunk_id("docs/a.md", 120);
        assert_eq!(id.len(), CHUNK_ID_LEN);
        assert_eq!(id, chunk_id("docs/a.md", 120));
        assert_ne!(id, chunk_id("docs/a.md", 121));
        assert_ne!(id, chunk_id("docs/b.md", 120));
        // The separator keeps "a1" + 23 apart from "a" + 123
        assert_ne!(chunk_id("a1", 23), chunk_id("a", 123));
    }
}
