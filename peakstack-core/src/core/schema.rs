// peakstack-core/src/core/schema.rs
// ============================================================================
// Module: Peakstack Schema Registry
// Description: Explicit, immutable registry of section specifications.
// Purpose: Validate the configuration schema once, at construction time.
// Dependencies: crate::core::{error, param, section, value}
// ============================================================================

//! ## Overview
//! The schema registry owns every section specification for one cluster
//! model. It is constructed explicitly through [`SchemaBuilder`] and is
//! immutable afterwards; there is no process-global schema state. The
//! builder enforces structural invariants that would otherwise surface as
//! runtime faults: unresolvable settings references, duplicate keys, and
//! derived defaults that read their own key or an undeclared sibling.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::core::error::ConfigError;
use crate::core::param::DefaultRule;
use crate::core::section::SectionSpec;
use crate::core::value::ValueKind;

// ============================================================================
// SECTION: Schema Registry
// ============================================================================

/// Immutable registry of section specifications for one cluster model.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    /// Key of the cluster-wide root section.
    root_key: String,
    /// Section specifications by kind key.
    sections: BTreeMap<String, SectionSpec>,
}

impl SchemaRegistry {
    /// Returns the root section key.
    #[must_use]
    pub fn root_key(&self) -> &str {
        &self.root_key
    }

    /// Looks up a section specification by kind key.
    #[must_use]
    pub fn section(&self, key: &str) -> Option<&SectionSpec> {
        self.sections.get(key)
    }

    /// Returns the root section specification.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schema`] when the registry is inconsistent;
    /// the builder guarantees this cannot happen for built registries.
    pub fn root(&self) -> Result<&SectionSpec, ConfigError> {
        self.sections
            .get(&self.root_key)
            .ok_or_else(|| ConfigError::Schema(format!("missing root section '{}'", self.root_key)))
    }

    /// Returns every registered section specification.
    pub fn sections(&self) -> impl Iterator<Item = &SectionSpec> {
        self.sections.values()
    }

    /// Returns the field names that hold labeled child-section lists.
    ///
    /// The diff engine matches elements of these lists by their `Name`
    /// member instead of by position.
    #[must_use]
    pub fn named_list_fields(&self) -> BTreeSet<String> {
        self.sections
            .values()
            .flat_map(|spec| &spec.settings_refs)
            .filter(|reference| reference.list)
            .map(|reference| reference.param_key.clone())
            .collect()
    }
}

// ============================================================================
// SECTION: Schema Builder
// ============================================================================

/// Builder for [`SchemaRegistry`] with construction-time validation.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    /// Root section key, set by [`SchemaBuilder::root`].
    root_key: Option<String>,
    /// Collected section specifications.
    sections: Vec<SectionSpec>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the cluster-wide root section.
    #[must_use]
    pub fn root(mut self, spec: SectionSpec) -> Self {
        self.root_key = Some(spec.key.clone());
        self.sections.push(spec);
        self
    }

    /// Registers a non-root section.
    #[must_use]
    pub fn section(mut self, spec: SectionSpec) -> Self {
        self.sections.push(spec);
        self
    }

    /// Validates the collected specifications and builds the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schema`] naming the first violated invariant.
    pub fn build(self) -> Result<SchemaRegistry, ConfigError> {
        let root_key = self
            .root_key
            .ok_or_else(|| ConfigError::Schema("no root section registered".to_string()))?;

        ensure_unique_section_keys(&self.sections)?;
        for spec in &self.sections {
            ensure_unique_param_keys(spec)?;
            ensure_settings_refs_resolve(spec, &self.sections)?;
            ensure_derived_defaults_well_formed(spec)?;
            ensure_packed_sections_scalar(spec)?;
        }

        let sections =
            self.sections.into_iter().map(|spec| (spec.key.clone(), spec)).collect::<BTreeMap<_, _>>();
        Ok(SchemaRegistry {
            root_key,
            sections,
        })
    }
}

// ============================================================================
// SECTION: Build-Time Checks
// ============================================================================

/// Ensures section kind keys are unique.
fn ensure_unique_section_keys(sections: &[SectionSpec]) -> Result<(), ConfigError> {
    for (index, spec) in sections.iter().enumerate() {
        if sections.iter().skip(index + 1).any(|other| other.key == spec.key) {
            return Err(ConfigError::Schema(format!("duplicate section key '{}'", spec.key)));
        }
    }
    Ok(())
}

/// Ensures parameter and settings-reference keys are unique within a section.
fn ensure_unique_param_keys(spec: &SectionSpec) -> Result<(), ConfigError> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for param in &spec.params {
        if !seen.insert(&param.key) {
            return Err(ConfigError::Schema(format!(
                "duplicate parameter key '{}' in section '{}'",
                param.key, spec.key
            )));
        }
    }
    for reference in &spec.settings_refs {
        if !seen.insert(&reference.param_key) {
            return Err(ConfigError::Schema(format!(
                "settings reference '{}' collides with a parameter in section '{}'",
                reference.param_key, spec.key
            )));
        }
    }
    Ok(())
}

/// Ensures every settings reference targets a registered section.
fn ensure_settings_refs_resolve(
    spec: &SectionSpec,
    sections: &[SectionSpec],
) -> Result<(), ConfigError> {
    for reference in &spec.settings_refs {
        if !sections.iter().any(|candidate| candidate.key == reference.child_section) {
            return Err(ConfigError::Schema(format!(
                "settings reference '{}' in section '{}' targets unknown section '{}'",
                reference.param_key, spec.key, reference.child_section
            )));
        }
    }
    Ok(())
}

/// Ensures derived defaults only read earlier-declared sibling parameters.
fn ensure_derived_defaults_well_formed(spec: &SectionSpec) -> Result<(), ConfigError> {
    let mut earlier: BTreeSet<&str> = BTreeSet::new();
    for param in &spec.params {
        if let DefaultRule::Derived {
            reads, ..
        } = &param.default
        {
            for read in reads {
                if read == &param.key {
                    return Err(ConfigError::Schema(format!(
                        "derived default for '{}' in section '{}' reads its own key",
                        param.key, spec.key
                    )));
                }
                if !earlier.contains(read.as_str()) {
                    return Err(ConfigError::Schema(format!(
                        "derived default for '{}' in section '{}' reads '{read}', which is not \
                         declared earlier in the section",
                        param.key, spec.key
                    )));
                }
            }
        }
        earlier.insert(&param.key);
    }
    Ok(())
}

/// Ensures packed sections only hold scalar parameters.
fn ensure_packed_sections_scalar(spec: &SectionSpec) -> Result<(), ConfigError> {
    if !spec.storage_packed {
        return Ok(());
    }
    if !spec.settings_refs.is_empty() {
        return Err(ConfigError::Schema(format!(
            "packed section '{}' must not declare settings references",
            spec.key
        )));
    }
    for param in &spec.params {
        if matches!(param.kind, ValueKind::StrList | ValueKind::Json) {
            return Err(ConfigError::Schema(format!(
                "packed section '{}' holds non-scalar parameter '{}'",
                spec.key, param.key
            )));
        }
    }
    Ok(())
}
