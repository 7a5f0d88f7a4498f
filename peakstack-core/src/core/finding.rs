// peakstack-core/src/core/finding.rs
// ============================================================================
// Module: Peakstack Validation Findings
// Description: Leveled validation findings and aggregate reports.
// Purpose: Carry every validation result to the caller before any failure.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Validators never fail fast. Each rule produces zero or more findings at a
//! defined level, and a whole validation pass aggregates all of them into a
//! [`ValidationReport`]. Whether the pass fails is decided once, at the end,
//! against a caller-supplied failure threshold.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Finding Level
// ============================================================================

/// Severity of a single validation finding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum FindingLevel {
    /// Informational finding, never blocks an operation.
    Info,
    /// Possible problem worth surfacing; blocks only at a warning threshold.
    Warning,
    /// Hard problem; blocks at the default threshold.
    #[default]
    Error,
}

impl fmt::Display for FindingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("INFO"),
            Self::Warning => f.write_str("WARNING"),
            Self::Error => f.write_str("ERROR"),
        }
    }
}

// ============================================================================
// SECTION: Validation Finding
// ============================================================================

/// One validation result produced by a validator rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    /// Finding severity.
    pub level: FindingLevel,
    /// Stable identifier of the validator rule that produced the finding.
    pub rule: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl ValidationFinding {
    /// Creates a new finding.
    #[must_use]
    pub fn new(level: FindingLevel, rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Creates an error-level finding.
    #[must_use]
    pub fn error(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FindingLevel::Error, rule, message)
    }

    /// Creates a warning-level finding.
    #[must_use]
    pub fn warning(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FindingLevel::Warning, rule, message)
    }

    /// Creates an info-level finding.
    #[must_use]
    pub fn info(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FindingLevel::Info, rule, message)
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.level, self.rule, self.message)
    }
}

// ============================================================================
// SECTION: Validation Report
// ============================================================================

/// Aggregate of every finding produced by one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// All findings in production order.
    pub findings: Vec<ValidationFinding>,
}

impl ValidationReport {
    /// Creates an empty report.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            findings: Vec::new(),
        }
    }

    /// Appends a finding to the report.
    pub fn push(&mut self, finding: ValidationFinding) {
        self.findings.push(finding);
    }

    /// Appends every finding from another collection.
    pub fn extend(&mut self, findings: impl IntoIterator<Item = ValidationFinding>) {
        self.findings.extend(findings);
    }

    /// Returns true when the report holds no findings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Returns the highest level present, if any finding exists.
    #[must_use]
    pub fn max_level(&self) -> Option<FindingLevel> {
        self.findings.iter().map(|finding| finding.level).max()
    }

    /// Returns true when any finding is at or above the threshold.
    #[must_use]
    pub fn fails_at(&self, threshold: FindingLevel) -> bool {
        self.findings.iter().any(|finding| finding.level >= threshold)
    }
}
