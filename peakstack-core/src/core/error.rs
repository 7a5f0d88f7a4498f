// peakstack-core/src/core/error.rs
// ============================================================================
// Module: Peakstack Configuration Errors
// Description: Structural errors raised while building configuration trees.
// Purpose: Name the offending field, section, and constraint in every error.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Structural configuration errors are distinct from validation findings:
//! they describe documents that cannot be represented at all (unknown fields,
//! type mismatches, cap violations), while findings describe representable
//! configurations that violate semantic rules.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Configuration Error
// ============================================================================

/// Errors raised while parsing or assembling a configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Value violates the allowed-values constraint of its parameter.
    #[error("invalid value '{value}' for parameter '{key}': allowed {allowed}")]
    InvalidValue {
        /// Parameter key.
        key: String,
        /// Offending value, canonical string form.
        value: String,
        /// Description of the allowed set or pattern.
        allowed: String,
    },
    /// Document supplies a key the section does not declare.
    #[error("unknown field '{key}' in section '{section}'")]
    UnknownField {
        /// Unknown key.
        key: String,
        /// Owning section key.
        section: String,
    },
    /// Document supplies a private, internally derived parameter.
    #[error("field '{key}' in section '{section}' is not allowed")]
    DisallowedField {
        /// Disallowed key.
        key: String,
        /// Owning section key.
        section: String,
    },
    /// Attaching a section would exceed the per-parent instance cap.
    #[error("section '{key}' allows at most {max} instances under '{parent}'")]
    TooManySections {
        /// Section kind key.
        key: String,
        /// Parent section description.
        parent: String,
        /// Maximum instances per parent.
        max: usize,
    },
    /// Two sibling sections share a kind and label.
    #[error("duplicate label '{label}' for section '{key}'")]
    LabelCollision {
        /// Section kind key.
        key: String,
        /// Colliding label.
        label: String,
    },
    /// Label violates the label grammar.
    #[error("invalid label '{label}': {reason}")]
    InvalidLabel {
        /// Offending label.
        label: String,
        /// Grammar rule that was violated.
        reason: String,
    },
    /// Required parameter has no value and no default.
    #[error("parameter '{key}' in section '{section}' is required")]
    MissingRequired {
        /// Parameter key.
        key: String,
        /// Owning section key.
        section: String,
    },
    /// Document fragment has the wrong shape for its section.
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    /// Flat storage representation cannot be decoded.
    #[error("malformed storage representation: {0}")]
    MalformedStorage(String),
    /// Schema registry rejected its own construction inputs.
    #[error("schema error: {0}")]
    Schema(String),
}

impl ConfigError {
    /// Returns the stable machine-readable kind for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidValue { .. } => "InvalidValueError",
            Self::UnknownField { .. } => "UnknownFieldError",
            Self::DisallowedField { .. } => "DisallowedFieldError",
            Self::TooManySections { .. } => "TooManySectionsError",
            Self::LabelCollision { .. } => "LabelCollisionError",
            Self::InvalidLabel { .. } => "InvalidLabelError",
            Self::MissingRequired { .. } => "MissingRequiredError",
            Self::MalformedDocument(_) => "MalformedDocumentError",
            Self::MalformedStorage(_) => "MalformedStorageError",
            Self::Schema(_) => "SchemaError",
        }
    }
}
