//! API service configuration validation tests.
// peakstack-api/tests/config_validation.rs
// ============================================================================
// Module: API Config Validation Tests
// Description: TOML parsing, defaults, and aggregate validation.
// Purpose: Ensure invalid service settings are caught before serving.
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

use peakstack_api::ApiConfig;

#[test]
fn empty_toml_yields_valid_defaults() {
    let config = ApiConfig::from_toml("").expect("defaults are valid");
    assert_eq!(config.bind, "127.0.0.1:8750");
    assert_eq!(config.bucket, "peakstack-artifacts");
    assert!(config.max_body_bytes >= 1024);
}

#[test]
fn explicit_settings_are_honored() {
    let config = ApiConfig::from_toml(
        "bind = \"0.0.0.0:9000\"\nmax_body_bytes = 2048\nbucket = \"my-artifacts\"\n",
    )
    .expect("explicit settings are valid");
    assert_eq!(config.bind, "0.0.0.0:9000");
    assert_eq!(config.max_body_bytes, 2048);
    assert_eq!(config.bucket, "my-artifacts");
}

#[test]
fn invalid_settings_are_aggregated() {
    let err = ApiConfig::from_toml(
        "bind = \"not-an-address\"\nmax_body_bytes = 10\nbucket = \"\"\n",
    )
    .expect_err("invalid settings must fail");
    let message = err.to_string();
    assert!(message.contains("bind"), "bind problem reported: {message}");
    assert!(message.contains("max_body_bytes"), "body cap problem reported: {message}");
    assert!(message.contains("bucket"), "bucket problem reported: {message}");
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = ApiConfig::from_toml("bind = [").expect_err("malformed toml must fail");
    assert!(err.to_string().contains("parse"), "parse error expected: {err}");
}

#[test]
fn bucket_with_slashes_is_rejected() {
    let err = ApiConfig::from_toml("bucket = \"a/b\"").expect_err("slash bucket must fail");
    assert!(err.to_string().contains("must not contain"), "slash problem reported: {err}");
}
