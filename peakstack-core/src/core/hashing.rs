// peakstack-core/src/core/hashing.rs
// ============================================================================
// Module: Peakstack Canonical Hashing
// Description: RFC 8785 JSON canonicalization and config version derivation.
// Purpose: Content-address resolved configuration documents deterministically.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Configuration versions are derived by hashing the resolved configuration
//! document as RFC 8785 (JCS) canonical JSON. The same resolved document
//! always yields the same [`ConfigVersion`] token, which keys the persisted
//! original/resolved artifacts in the object store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use sha2::Digest;
use sha2::Sha256;

use crate::core::identifiers::ConfigVersion;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Derives the configuration version token for a resolved document.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn config_version<T: Serialize + ?Sized>(value: &T) -> Result<ConfigVersion, HashError> {
    let bytes = canonical_json_bytes(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    Ok(ConfigVersion::new(hex_encode(&digest)))
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
