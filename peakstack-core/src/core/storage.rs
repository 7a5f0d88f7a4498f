// peakstack-core/src/core/storage.rs
// ============================================================================
// Module: Peakstack Flat Storage Representation
// Description: Stack-parameter key grammar for persisted configurations.
// Purpose: Encode section paths and fields as flat key/value entries.
// Dependencies: crate::core::error, serde
// ============================================================================

//! ## Overview
//! The flat storage representation mirrors the resolved configuration into
//! stack parameters for systems that can only read stack state. Keys encode
//! the section path (`SlurmQueue[q1].ComputeResource[cr1].MaxCount`); packed
//! sections store one entry per instance whose value encodes the declared
//! parameters positionally.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::ConfigError;

// ============================================================================
// SECTION: Stack Parameter
// ============================================================================

/// One flat key/value entry in the stack-parameter representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackParam {
    /// Encoded section path and field key.
    pub key: String,
    /// Canonical string value (or packed blob for packed sections).
    pub value: String,
}

impl StackParam {
    /// Creates a new stack parameter entry.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Key Grammar
// ============================================================================

/// One `Kind[label]` segment of an encoded section path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PathSegmentKey {
    /// Section kind.
    pub kind: String,
    /// Section label.
    pub label: String,
}

/// Decoded form of one stack-parameter key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    /// Section path segments from the root downwards (root itself omitted).
    pub segments: Vec<PathSegmentKey>,
    /// Terminal field storage key; `None` for packed section entries.
    pub field: Option<String>,
}

/// Renders a section path (optionally with a terminal field) as a key.
#[must_use]
pub fn render_key(segments: &[PathSegmentKey], field: Option<&str>) -> String {
    let mut parts: Vec<String> = segments
        .iter()
        .map(|segment| format!("{}[{}]", segment.kind, segment.label))
        .collect();
    if let Some(field) = field {
        parts.push(field.to_string());
    }
    parts.join(".")
}

/// Parses a stack-parameter key back into path segments and field.
///
/// # Errors
///
/// Returns [`ConfigError::MalformedStorage`] when the key violates the
/// grammar.
pub fn parse_key(key: &str) -> Result<ParsedKey, ConfigError> {
    if key.is_empty() {
        return Err(ConfigError::MalformedStorage("empty storage key".to_string()));
    }
    let mut segments = Vec::new();
    let mut field = None;
    let parts: Vec<&str> = key.split('.').collect();
    for (index, part) in parts.iter().enumerate() {
        if let Some(open) = part.find('[') {
            if !part.ends_with(']') || open == 0 {
                return Err(ConfigError::MalformedStorage(format!(
                    "malformed path segment '{part}' in key '{key}'"
                )));
            }
            if field.is_some() {
                return Err(ConfigError::MalformedStorage(format!(
                    "section segment after field in key '{key}'"
                )));
            }
            let kind = &part[..open];
            let label = &part[open + 1..part.len() - 1];
            segments.push(PathSegmentKey {
                kind: kind.to_string(),
                label: label.to_string(),
            });
        } else {
            if index + 1 != parts.len() {
                return Err(ConfigError::MalformedStorage(format!(
                    "field segment '{part}' is not terminal in key '{key}'"
                )));
            }
            field = Some((*part).to_string());
        }
    }
    Ok(ParsedKey {
        segments,
        field,
    })
}
