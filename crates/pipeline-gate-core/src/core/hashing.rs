// crates/pipeline-gate-core/src/core/hashing.rs
// ============================================================================
// Module: Pipeline Gate Canonical Hashing
// Description: RFC 8785 canonical JSON encoding and SHA-256 digests.
// Purpose: Provide one bit-stable hash encoding for plans, artifacts, and seals.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Every content hash in Pipeline Gate is SHA-256 over RFC 8785 canonical
//! JSON: UTF-8, no insignificant whitespace, object keys sorted ascending by
//! Unicode code point, numbers in shortest round-trip form. Plan hashes,
//! artifact content hashes, manifest hashes, and seal hashes all agree on
//! this one encoding so that sealed bundles verify across processes and
//! languages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Canonicalization and hashing errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HashError {
    /// Value could not be canonicalized (for example, a non-finite float).
    #[error("canonicalization failure: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// SHA-256 digest encoded as lowercase hex.
///
/// # Invariants
/// - Always 64 lowercase hexadecimal characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashDigest(String);

impl HashDigest {
    /// Creates a digest from raw SHA-256 output bytes.
    #[must_use]
    pub fn from_digest_bytes(bytes: &[u8]) -> Self {
        let mut encoded = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            encoded.push(hex_nibble(byte >> 4));
            encoded.push(hex_nibble(byte & 0x0f));
        }
        Self(encoded)
    }

    /// Wraps an already hex-encoded digest without re-validation.
    ///
    /// Intended for deserialization boundaries that have their own
    /// integrity checks; compare digests with `==`, never by re-parsing.
    #[must_use]
    pub fn from_hex_unchecked(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Returns the lowercase hex character for a nibble value.
const fn hex_nibble(value: u8) -> char {
    match value {
        0..=9 => (b'0' + value) as char,
        _ => (b'a' + (value - 10)) as char,
    }
}

// ============================================================================
// SECTION: Hash Functions
// ============================================================================

/// Encodes a value as RFC 8785 canonical JSON bytes.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when the value cannot be encoded
/// (for example, non-finite floats).
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes raw bytes with SHA-256.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> HashDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    HashDigest::from_digest_bytes(&hasher.finalize())
}

/// Hashes a value's canonical JSON encoding with SHA-256.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn hash_canonical_json<T: Serialize>(value: &T) -> Result<HashDigest, HashError> {
    Ok(hash_bytes(&canonical_json_bytes(value)?))
}

/// Hashes a UTF-8 string with SHA-256.
///
/// Used for the manifest and seal preimage strings, which are plain
/// `|`-joined text rather than JSON.
#[must_use]
pub fn hash_text(text: &str) -> HashDigest {
    hash_bytes(text.as_bytes())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use serde_json::json;

    use super::*;

    #[test]
    fn canonical_hash_is_order_independent_for_maps() {
        let mut map_a = serde_json::Map::new();
        map_a.insert("b".to_string(), json!(2));
        map_a.insert("a".to_string(), json!(1));

        let mut map_b = serde_json::Map::new();
        map_b.insert("a".to_string(), json!(1));
        map_b.insert("b".to_string(), json!(2));

        let hash_a = hash_canonical_json(&serde_json::Value::Object(map_a)).unwrap();
        let hash_b = hash_canonical_json(&serde_json::Value::Object(map_b)).unwrap();
        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let digest = hash_bytes(b"hello\n");
        assert_eq!(digest.as_str().len(), 64);
        assert!(digest.as_str().chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn hash_text_matches_hash_bytes() {
        assert_eq!(hash_text("abc|def"), hash_bytes(b"abc|def"));
    }

    #[test]
    fn known_sha256_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            hash_bytes(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
