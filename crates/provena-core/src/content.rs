//! # Content Handles
//!
//! The build connector hands the engine a random-access view over an
//! artifact's bytes. `ContentHandle` is that view: cheap to clone,
//! immutable, and content-addressed (its sha256 is the identity used for
//! recursion memoization and for derived artifact ids).
//!
//! Format sniffing helpers live here too; extractor `applies_to`
//! predicates combine them with the declared format.

use sha2::{Digest, Sha256};
use std::sync::Arc;

/// An immutable, random-access view over artifact content.
///
/// Clones share the underlying bytes. The sha256 digest is computed once
/// on construction so identity checks are free afterwards.
#[derive(Debug, Clone)]
pub struct ContentHandle {
    bytes: Arc<[u8]>,
    sha256: String,
}

impl ContentHandle {
    /// Wrap raw artifact bytes.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Arc<[u8]> = bytes.into().into();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let sha256 = format!("{:x}", hasher.finalize());
        Self { bytes, sha256 }
    }

    /// The full content.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Content length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase hex sha256 of the content.
    #[must_use]
    pub fn sha256_hex(&self) -> &str {
        &self.sha256
    }

    /// A read of `len` bytes at `offset`, clamped to the content bounds.
    #[must_use]
    pub fn read_at(&self, offset: usize, len: usize) -> &[u8] {
        let start = offset.min(self.bytes.len());
        let end = start.saturating_add(len).min(self.bytes.len());
        &self.bytes[start..end]
    }

    /// Whether the content parses as a JSON object carrying `key` at the
    /// top level. Used by extractor selection predicates.
    #[must_use]
    pub fn sniff_json_key(&self, key: &str) -> bool {
        // Cheap reject before the full parse: JSON objects start with '{'.
        let first = self.bytes.iter().find(|b| !b.is_ascii_whitespace());
        if first != Some(&b'{') {
            return false;
        }
        match serde_json::from_slice::<serde_json::Value>(&self.bytes) {
            Ok(serde_json::Value::Object(map)) => map.contains_key(key),
            _ => false,
        }
    }
}

impl PartialEq for ContentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.sha256 == other.sha256
    }
}

impl Eq for ContentHandle {}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_stable_and_shared_by_clones() {
        let handle = ContentHandle::from_bytes(b"hello".to_vec());
        assert_eq!(
            handle.sha256_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        let clone = handle.clone();
        assert_eq!(handle, clone);
    }

    #[test]
    fn read_at_is_clamped() {
        let handle = ContentHandle::from_bytes(b"abcdef".to_vec());
        assert_eq!(handle.read_at(2, 3), b"cde");
        assert_eq!(handle.read_at(4, 100), b"ef");
        assert_eq!(handle.read_at(100, 5), b"");
    }

    #[test]
    fn sniff_json_key_matches_top_level_only() {
        let handle = ContentHandle::from_bytes(br#"  {"layers": []}"#.to_vec());
        assert!(handle.sniff_json_key("layers"));
        assert!(!handle.sniff_json_key("entries"));

        let nested = ContentHandle::from_bytes(br#"{"outer": {"layers": []}}"#.to_vec());
        assert!(!nested.sniff_json_key("layers"));

        let not_json = ContentHandle::from_bytes(b"\x7fELF...".to_vec());
        assert!(!not_json.sniff_json_key("layers"));
    }
}
