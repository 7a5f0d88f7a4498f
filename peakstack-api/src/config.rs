// peakstack-api/src/config.rs
// ============================================================================
// Module: API Service Configuration
// Description: TOML-backed configuration for the HTTP surface.
// Purpose: Validate service settings before the server starts.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! The API loads its service configuration from TOML with defaults for
//! every field, then validates the whole structure before serving. Errors
//! are aggregated so operators see every problem in one pass.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// API configuration errors.
#[derive(Debug, Error)]
pub enum ApiConfigError {
    /// TOML input could not be parsed.
    #[error("api config parse error: {0}")]
    Parse(String),
    /// One or more settings are invalid.
    #[error("api config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Service configuration for the HTTP surface.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Socket address the server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Object-store bucket holding configuration artifacts.
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            bucket: default_bucket(),
        }
    }
}

impl ApiConfig {
    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ApiConfigError::Parse`] for malformed TOML and
    /// [`ApiConfigError::Invalid`] for invalid settings.
    pub fn from_toml(input: &str) -> Result<Self, ApiConfigError> {
        let config: Self =
            toml::from_str(input).map_err(|err| ApiConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every setting, aggregating all problems.
    ///
    /// # Errors
    ///
    /// Returns [`ApiConfigError::Invalid`] listing each violation.
    pub fn validate(&self) -> Result<(), ApiConfigError> {
        let mut problems = Vec::new();
        if self.bind.parse::<SocketAddr>().is_err() {
            problems.push(format!("bind '{}' is not a socket address", self.bind));
        }
        if self.max_body_bytes < 1024 {
            problems.push(format!(
                "max_body_bytes {} is below the 1024-byte minimum",
                self.max_body_bytes
            ));
        }
        if self.bucket.is_empty() {
            problems.push("bucket must not be empty".to_string());
        }
        if self.bucket.contains('/') {
            problems.push(format!("bucket '{}' must not contain '/'", self.bucket));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ApiConfigError::Invalid(problems.join("; ")))
        }
    }
}

/// Default bind address.
fn default_bind() -> String {
    "127.0.0.1:8750".to_string()
}

/// Default request body cap.
const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Default artifact bucket.
fn default_bucket() -> String {
    "peakstack-artifacts".to_string()
}
