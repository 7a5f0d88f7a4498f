// peakstack-core/src/core/section.rs
// ============================================================================
// Module: Peakstack Section Model
// Description: Named, labeled parameter groups forming the section tree.
// Purpose: Define section specifications and per-section population rules.
// Dependencies: crate::core::{error, finding, identifiers, param, value}
// ============================================================================

//! ## Overview
//! A section is a named, labeled collection of parameters. Sections nest
//! through settings references (a parent field naming child sections), and
//! multiple sections of the same kind are distinguished by label. Parameter
//! order is declaration order and is significant: packed storage blobs
//! encode values positionally, and derived defaults may only read siblings
//! declared earlier.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;

use crate::core::config::ClusterConfig;
use crate::core::error::ConfigError;
use crate::core::finding::ValidationFinding;
use crate::core::identifiers::PolicyName;
use crate::core::identifiers::SectionLabel;
use crate::core::param::ParamSpec;
use crate::core::param::Visibility;
use crate::core::value::ParamValue;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Label assigned to sections that exist exactly once under their parent.
pub const DEFAULT_LABEL: &str = "default";

/// Maximum length of a section label.
pub const MAX_LABEL_LENGTH: usize = 30;

/// Validates the section label grammar.
///
/// Labels start with a letter and contain only letters, digits, hyphens,
/// and underscores, up to [`MAX_LABEL_LENGTH`] characters.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidLabel`] naming the violated rule.
pub fn validate_label(label: &str) -> Result<(), ConfigError> {
    if label.is_empty() {
        return Err(ConfigError::InvalidLabel {
            label: label.to_string(),
            reason: "label must not be empty".to_string(),
        });
    }
    if label.len() > MAX_LABEL_LENGTH {
        return Err(ConfigError::InvalidLabel {
            label: label.to_string(),
            reason: format!("label exceeds {MAX_LABEL_LENGTH} characters"),
        });
    }
    if let Some(first) = label.chars().next()
        && !first.is_ascii_alphabetic()
    {
        return Err(ConfigError::InvalidLabel {
            label: label.to_string(),
            reason: "label must start with a letter".to_string(),
        });
    }
    if let Some(bad) = label.chars().find(|ch| {
        !(ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
    }) {
        return Err(ConfigError::InvalidLabel {
            label: label.to_string(),
            reason: format!("character '{bad}' is not allowed"),
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: Settings References
// ============================================================================

/// Declares that a parent field names child sections of another kind.
#[derive(Debug, Clone)]
pub struct SettingsRef {
    /// Field key in the parent section's document fragment.
    pub param_key: String,
    /// Section kind the referenced children belong to.
    pub child_section: String,
    /// Whether the field holds a list of labeled children.
    pub list: bool,
}

// ============================================================================
// SECTION: Section Specification
// ============================================================================

/// Validator attached to a whole section.
pub type SectionValidator = fn(&Section, &ClusterConfig) -> Vec<ValidationFinding>;

/// Specification of one section kind.
#[derive(Debug, Clone)]
pub struct SectionSpec {
    /// Section kind identifier.
    pub key: String,
    /// Cap on sibling instances of this kind under one parent.
    pub max_instances: usize,
    /// Whether the section is instantiated with defaults when absent.
    pub autocreate: bool,
    /// Parameter specifications in declaration order.
    pub params: Vec<ParamSpec>,
    /// Settings references to child section kinds.
    pub settings_refs: Vec<SettingsRef>,
    /// Section-level validators.
    pub validators: Vec<SectionValidator>,
    /// Update policy applied to adding or removing whole instances.
    pub update_policy: Option<PolicyName>,
    /// Whether the section serializes as one packed, ordered storage blob.
    pub storage_packed: bool,
}

impl SectionSpec {
    /// Creates a section spec with a single-instance cap.
    #[must_use]
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            max_instances: 1,
            autocreate: false,
            params: Vec::new(),
            settings_refs: Vec::new(),
            validators: Vec::new(),
            update_policy: None,
            storage_packed: false,
        }
    }

    /// Sets the per-parent instance cap.
    #[must_use]
    pub fn with_max_instances(mut self, max: usize) -> Self {
        self.max_instances = max;
        self
    }

    /// Marks the section for automatic creation with defaults.
    #[must_use]
    pub fn autocreated(mut self) -> Self {
        self.autocreate = true;
        self
    }

    /// Marks the section as packed in flat storage.
    #[must_use]
    pub fn packed(mut self) -> Self {
        self.storage_packed = true;
        self
    }

    /// Appends a parameter specification.
    #[must_use]
    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Appends a settings reference.
    #[must_use]
    pub fn with_settings_ref(mut self, param_key: &str, child_section: &str, list: bool) -> Self {
        self.settings_refs.push(SettingsRef {
            param_key: param_key.to_string(),
            child_section: child_section.to_string(),
            list,
        });
        self
    }

    /// Sets the section-level update policy.
    #[must_use]
    pub fn with_policy(mut self, name: &str) -> Self {
        self.update_policy = Some(PolicyName::new(name));
        self
    }

    /// Attaches a section-level validator.
    #[must_use]
    pub fn with_validator(mut self, validator: SectionValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Looks up a parameter spec by key.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|param| param.key == key)
    }

    /// Looks up a settings reference by field key.
    #[must_use]
    pub fn settings_ref(&self, key: &str) -> Option<&SettingsRef> {
        self.settings_refs.iter().find(|reference| reference.param_key == key)
    }
}

// ============================================================================
// SECTION: Document Source
// ============================================================================

/// Origin of the fragment a section is populated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSource {
    /// Operator-supplied document; private parameters are rejected.
    User,
    /// Previously persisted representation; private parameters are allowed.
    Storage,
}

// ============================================================================
// SECTION: Section Instance
// ============================================================================

/// Non-owning locator of a section's parent within the configuration root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    /// Parent section kind.
    pub key: String,
    /// Parent section label.
    pub label: SectionLabel,
}

/// One populated section instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Section kind identifier.
    pub key: String,
    /// Instance label.
    pub label: SectionLabel,
    /// Parent locator; `None` only for the cluster-wide root.
    pub parent: Option<ParentRef>,
    /// Resolved parameter values in declaration order.
    values: Vec<(String, ParamValue)>,
}

impl Section {
    /// Creates an empty section instance.
    #[must_use]
    pub fn new(key: &str, label: SectionLabel, parent: Option<ParentRef>) -> Self {
        Self {
            key: key.to_string(),
            label,
            parent,
            values: Vec::new(),
        }
    }

    /// Returns the resolved value for a parameter key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.iter().find(|(existing, _)| existing == key).map(|(_, value)| value)
    }

    /// Sets or replaces a parameter value, preserving declaration order.
    pub fn set(&mut self, key: &str, value: ParamValue) {
        if let Some(slot) = self.values.iter_mut().find(|(existing, _)| existing == key) {
            slot.1 = value;
        } else {
            self.values.push((key.to_string(), value));
        }
    }

    /// Removes a parameter value.
    pub fn unset(&mut self, key: &str) {
        self.values.retain(|(existing, _)| existing != key);
    }

    /// Returns the resolved values in declaration order.
    #[must_use]
    pub fn values(&self) -> &[(String, ParamValue)] {
        &self.values
    }

    /// Populates the section's own parameters from a document fragment.
    ///
    /// Settings-reference fields are left to the configuration root, which
    /// drives recursion; any other undeclared key is an error. Parameters
    /// absent from the fragment resolve their defaults in declaration order,
    /// so derived defaults see every earlier sibling.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DisallowedField`] for private parameters in
    /// user documents, [`ConfigError::UnknownField`] for undeclared keys,
    /// and [`ConfigError::InvalidValue`] for constraint violations.
    pub fn populate_from(
        &mut self,
        spec: &SectionSpec,
        fragment: &Map<String, Value>,
        source: DocumentSource,
    ) -> Result<(), ConfigError> {
        for key in fragment.keys() {
            if spec.param(key).is_none() && spec.settings_ref(key).is_none() {
                return Err(ConfigError::UnknownField {
                    key: key.clone(),
                    section: spec.key.clone(),
                });
            }
        }
        for param in &spec.params {
            match fragment.get(&param.key) {
                Some(raw) => {
                    if param.visibility == Visibility::Private && source == DocumentSource::User {
                        return Err(ConfigError::DisallowedField {
                            key: param.key.clone(),
                            section: spec.key.clone(),
                        });
                    }
                    let value = param.load_document(raw)?;
                    self.set(&param.key, value);
                }
                None => {
                    if let Some(value) = param.resolve_default(self) {
                        self.set(&param.key, value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Populates the section from per-parameter flat storage entries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when an entry cannot be parsed.
    pub fn populate_from_storage(
        &mut self,
        spec: &SectionSpec,
        entries: &[(String, String)],
    ) -> Result<(), ConfigError> {
        for param in &spec.params {
            let entry = entries
                .iter()
                .find(|(key, _)| key == &param.storage_key)
                .map(|(_, value)| value.as_str());
            match entry {
                Some(raw) => {
                    let value = param.load_storage(raw)?;
                    self.set(&param.key, value);
                }
                None => {
                    if let Some(value) = param.resolve_default(self) {
                        self.set(&param.key, value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Populates the section from one packed, ordered storage blob.
    ///
    /// The blob carries no field names; values are decoded positionally in
    /// declared parameter order, with empty fields falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedStorage`] when the blob has more
    /// fields than the section declares, and [`ConfigError::InvalidValue`]
    /// when a field cannot be parsed.
    pub fn populate_from_packed(
        &mut self,
        spec: &SectionSpec,
        blob: &str,
    ) -> Result<(), ConfigError> {
        let fields: Vec<&str> = if blob.is_empty() {
            Vec::new()
        } else {
            blob.split(',').collect()
        };
        if fields.len() > spec.params.len() {
            return Err(ConfigError::MalformedStorage(format!(
                "packed section '{}' holds {} fields but declares {}",
                spec.key,
                fields.len(),
                spec.params.len()
            )));
        }
        for (index, param) in spec.params.iter().enumerate() {
            match fields.get(index) {
                Some(raw) if !raw.is_empty() => {
                    let value = param.load_storage(raw)?;
                    self.set(&param.key, value);
                }
                _ => {
                    if let Some(value) = param.resolve_default(self) {
                        self.set(&param.key, value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Emits the packed storage blob in declared parameter order.
    #[must_use]
    pub fn to_packed(&self, spec: &SectionSpec) -> String {
        spec.params
            .iter()
            .map(|param| self.get(&param.key).map(ParamValue::canonical).unwrap_or_default())
            .collect::<Vec<String>>()
            .join(",")
    }

    /// Runs section-level validators, then every parameter validator.
    ///
    /// All findings are aggregated; nothing short-circuits.
    #[must_use]
    pub fn validate(&self, spec: &SectionSpec, config: &ClusterConfig) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        for validator in &spec.validators {
            findings.extend(validator(self, config));
        }
        for param in &spec.params {
            findings.extend(param.validate(&spec.key, self.get(&param.key)));
        }
        findings
    }
}
