// peakstack-core/src/core/identifiers.rs
// ============================================================================
// Module: Peakstack Identifiers
// Description: Canonical opaque identifiers for clusters, stacks, and configs.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical string-based identifiers used throughout
//! Peakstack. Identifiers are opaque and serialize as strings. Validation is
//! handled at schema or lifecycle boundaries rather than within these simple
//! wrappers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Cluster name as supplied by the operator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterName(String);

impl ClusterName {
    /// Creates a new cluster name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ClusterName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClusterName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Label distinguishing multiple sections of the same kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionLabel(String);

impl SectionLabel {
    /// Creates a new section label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Returns the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SectionLabel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SectionLabel {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Infrastructure stack name backing a cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackName(String);

impl StackName {
    /// Creates a new stack name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the stack name for a cluster.
    #[must_use]
    pub fn for_cluster(cluster: &ClusterName) -> Self {
        Self(format!("peakstack-{cluster}"))
    }
}

impl fmt::Display for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for StackName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StackName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Opaque token identifying one persisted configuration version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigVersion(String);

impl ConfigVersion {
    /// Creates a new configuration version token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ConfigVersion {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ConfigVersion {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Name of an update policy in the policy table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyName(String);

impl PolicyName {
    /// Creates a new policy name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PolicyName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PolicyName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Version identifier assigned by the object store to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobVersionId(String);

impl BlobVersionId {
    /// Creates a new blob version identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for BlobVersionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BlobVersionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
