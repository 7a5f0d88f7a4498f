//! Key validation tests for the S3 object store.
// peakstack-store-s3/tests/key_validation.rs
// ============================================================================
// Module: Key Validation Tests
// Description: Object-key grammar enforcement before backend calls.
// Purpose: Ensure traversal and length violations never reach storage.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use peakstack_store_s3::validate_store_key;

#[test]
fn accepts_versioned_artifact_keys() {
    assert!(validate_store_key("clusters/hpc-alpha/versions/abc123/resolved.json").is_ok());
    assert!(validate_store_key("clusters/hpc-alpha/versions/abc123/original.yaml").is_ok());
}

#[test]
fn rejects_empty_and_absolute_keys() {
    assert!(validate_store_key("").is_err());
    assert!(validate_store_key("/clusters/hpc-alpha").is_err());
}

#[test]
fn rejects_traversal_segments() {
    assert!(validate_store_key("clusters/../secrets").is_err());
    assert!(validate_store_key("clusters/./hpc-alpha").is_err());
    assert!(validate_store_key("clusters//hpc-alpha").is_err());
}

#[test]
fn rejects_oversized_keys() {
    let long_segment = "x".repeat(256);
    assert!(validate_store_key(&format!("clusters/{long_segment}")).is_err());
    let long_key = format!("clusters/{}", "a/".repeat(600));
    assert!(validate_store_key(long_key.trim_end_matches('/')).is_err());
}
