// peakstack-core/src/core/param.rs
// ============================================================================
// Module: Peakstack Parameter Model
// Description: Parameter specifications with defaults, constraints, policies.
// Purpose: Define typed configuration leaves and their load/storage behavior.
// Dependencies: crate::core::{error, finding, identifiers, section, value}
// ============================================================================

//! ## Overview
//! A [`ParamSpec`] declares one configuration leaf: its semantic type, its
//! allowed values, how its default resolves, whether the operator may set it,
//! and which update policy governs changes to it. Parameter values live in
//! their owning [`crate::core::section::Section`]; this module defines the
//! pure load, default-resolution, and storage operations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::error::ConfigError;
use crate::core::finding::ValidationFinding;
use crate::core::identifiers::PolicyName;
use crate::core::section::Section;
use crate::core::value::AllowedValues;
use crate::core::value::ParamValue;
use crate::core::value::ValueKind;

// ============================================================================
// SECTION: Visibility
// ============================================================================

/// Whether the operator may supply a parameter in a user document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Settable by the operator.
    Public,
    /// Internal or derived; rejected when present in user input.
    Private,
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Pure default rule computed from the partially resolved owning section.
pub type DerivedDefault = fn(&Section) -> Option<ParamValue>;

/// How a parameter's default value resolves.
#[derive(Debug, Clone)]
pub enum DefaultRule {
    /// No default; an unset optional parameter stays unset.
    None,
    /// Fixed literal default.
    Literal(ParamValue),
    /// Default derived from sibling parameters resolved earlier in
    /// declaration order. `reads` names every sibling key the rule consults;
    /// the schema builder rejects rules that read their own key or an
    /// undeclared sibling.
    Derived {
        /// Sibling parameter keys the rule reads.
        reads: Vec<String>,
        /// The derivation function.
        rule: DerivedDefault,
    },
}

// ============================================================================
// SECTION: Parameter Specification
// ============================================================================

/// Validator attached to a single parameter.
pub type ParamValidator = fn(&str, &ParamValue) -> Vec<ValidationFinding>;

/// Name of the most conservative policy, applied when none is declared.
pub const UNKNOWN_POLICY: &str = "UNKNOWN";

/// Specification of one configuration parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Parameter key, unique within the owning section.
    pub key: String,
    /// Key used in the flat storage representation.
    pub storage_key: String,
    /// Semantic value type.
    pub kind: ValueKind,
    /// Allowed-values constraint.
    pub allowed: AllowedValues,
    /// Default-value rule.
    pub default: DefaultRule,
    /// Whether a value must resolve for the configuration to be valid.
    pub required: bool,
    /// Operator visibility.
    pub visibility: Visibility,
    /// Update policy governing changes to this parameter.
    pub update_policy: PolicyName,
    /// Parameter-level validators.
    pub validators: Vec<ParamValidator>,
}

impl ParamSpec {
    /// Creates a public, optional parameter with no default.
    #[must_use]
    pub fn new(key: &str, kind: ValueKind) -> Self {
        Self {
            key: key.to_string(),
            storage_key: key.to_string(),
            kind,
            allowed: AllowedValues::Any,
            default: DefaultRule::None,
            required: false,
            visibility: Visibility::Public,
            update_policy: PolicyName::new(UNKNOWN_POLICY),
            validators: Vec::new(),
        }
    }

    /// Marks the parameter as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the parameter as private (rejected in user documents).
    #[must_use]
    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    /// Sets a literal default value.
    #[must_use]
    pub fn with_default(mut self, value: ParamValue) -> Self {
        self.default = DefaultRule::Literal(value);
        self
    }

    /// Sets a derived default rule reading the named sibling keys.
    #[must_use]
    pub fn with_derived_default(mut self, reads: &[&str], rule: DerivedDefault) -> Self {
        self.default = DefaultRule::Derived {
            reads: reads.iter().map(ToString::to_string).collect(),
            rule,
        };
        self
    }

    /// Sets the allowed-values constraint.
    #[must_use]
    pub fn with_allowed(mut self, allowed: AllowedValues) -> Self {
        self.allowed = allowed;
        self
    }

    /// Sets the update policy reference.
    #[must_use]
    pub fn with_policy(mut self, name: &str) -> Self {
        self.update_policy = PolicyName::new(name);
        self
    }

    /// Overrides the storage key.
    #[must_use]
    pub fn with_storage_key(mut self, key: &str) -> Self {
        self.storage_key = key.to_string();
        self
    }

    /// Attaches a parameter-level validator.
    #[must_use]
    pub fn with_validator(mut self, validator: ParamValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Resolves the default value against the partially resolved section.
    ///
    /// Derived rules only see siblings resolved earlier in declaration
    /// order; reading this parameter's own key is rejected at schema build
    /// time, so resolution cannot recurse.
    #[must_use]
    pub fn resolve_default(&self, section: &Section) -> Option<ParamValue> {
        match &self.default {
            DefaultRule::None => None,
            DefaultRule::Literal(value) => Some(value.clone()),
            DefaultRule::Derived {
                rule, ..
            } => rule(section),
        }
    }

    /// Loads and constrains a document value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the key, the offending
    /// value, and the allowed set or pattern.
    pub fn load_document(&self, raw: &Value) -> Result<ParamValue, ConfigError> {
        let value = self.kind.parse_document(&self.key, raw)?;
        self.allowed.check(&self.key, &value)?;
        Ok(value)
    }

    /// Loads and constrains a canonical storage string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when parsing or the constraint
    /// fails.
    pub fn load_storage(&self, raw: &str) -> Result<ParamValue, ConfigError> {
        let value = self.kind.parse_storage(&self.key, raw)?;
        self.allowed.check(&self.key, &value)?;
        Ok(value)
    }

    /// Emits the storage entry for a resolved value.
    #[must_use]
    pub fn to_storage(&self, value: &ParamValue) -> (String, String) {
        (self.storage_key.clone(), value.canonical())
    }

    /// Validates a resolved (or absent) value, producing findings.
    ///
    /// A required parameter with no value is always an error finding,
    /// independent of any attached validators.
    #[must_use]
    pub fn validate(&self, section_key: &str, value: Option<&ParamValue>) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        match value {
            None => {
                if self.required {
                    findings.push(ValidationFinding::error(
                        "required_parameter",
                        format!("parameter '{}' in section '{section_key}' is required", self.key),
                    ));
                }
            }
            Some(value) => {
                for validator in &self.validators {
                    findings.extend(validator(&self.key, value));
                }
            }
        }
        findings
    }
}
