// peakstack-core/src/core/config.rs
// ============================================================================
// Module: Peakstack Configuration Root
// Description: The full section tree for exactly one cluster version.
// Purpose: Build, validate, and serialize cluster configuration trees.
// Dependencies: crate::core::{error, finding, hashing, schema, section}
// ============================================================================

//! ## Overview
//! [`ClusterConfig`] owns every section instance of one cluster
//! configuration. It is built top-down from a declarative document (or
//! reconstructed from a persisted representation), resolves defaults during
//! population, and serializes back to both the document and the flat
//! storage form. Diffing always operates on two fully resolved documents,
//! so an update compares defaulted fields exactly like user-set fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;

use crate::core::error::ConfigError;
use crate::core::finding::ValidationReport;
use crate::core::hashing;
use crate::core::hashing::HashError;
use crate::core::identifiers::ConfigVersion;
use crate::core::identifiers::SectionLabel;
use crate::core::param::Visibility;
use crate::core::schema::SchemaRegistry;
use crate::core::section::DEFAULT_LABEL;
use crate::core::section::DocumentSource;
use crate::core::section::ParentRef;
use crate::core::section::Section;
use crate::core::section::SectionSpec;
use crate::core::section::validate_label;
use crate::core::storage::ParsedKey;
use crate::core::storage::PathSegmentKey;
use crate::core::storage::StackParam;
use crate::core::storage::parse_key;
use crate::core::storage::render_key;

// ============================================================================
// SECTION: Document Mode
// ============================================================================

/// Which parameters a serialized document includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentMode {
    /// Only operator-settable parameters; loss-free for user input.
    User,
    /// Every parameter, including private derived linkage fields.
    Full,
}

// ============================================================================
// SECTION: Configuration Root
// ============================================================================

/// The full section tree for one cluster configuration version.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Shared schema registry the tree was built against.
    schema: Arc<SchemaRegistry>,
    /// Section instances by kind, in attachment order.
    sections: BTreeMap<String, Vec<Section>>,
    /// Original declarative input, retained verbatim.
    source_document: Value,
    /// Version token assigned when the configuration was persisted.
    config_version: Option<ConfigVersion>,
}

impl ClusterConfig {
    /// Builds a configuration tree from an operator document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document shape, a field constraint,
    /// or a section cap is violated.
    pub fn from_document(schema: Arc<SchemaRegistry>, doc: &Value) -> Result<Self, ConfigError> {
        Self::build(schema, doc, DocumentSource::User)
    }

    /// Rebuilds a configuration tree from a persisted resolved document.
    ///
    /// Private parameters are accepted; the blob was produced by
    /// [`ClusterConfig::to_document`] in [`DocumentMode::Full`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the blob cannot be decoded.
    pub fn from_stored_document(
        schema: Arc<SchemaRegistry>,
        doc: &Value,
    ) -> Result<Self, ConfigError> {
        Self::build(schema, doc, DocumentSource::Storage)
    }

    /// Shared build path for both document sources.
    fn build(
        schema: Arc<SchemaRegistry>,
        doc: &Value,
        source: DocumentSource,
    ) -> Result<Self, ConfigError> {
        let fragment = doc
            .as_object()
            .ok_or_else(|| ConfigError::MalformedDocument("document must be a mapping".to_string()))?;

        let mut config = Self {
            schema: Arc::clone(&schema),
            sections: BTreeMap::new(),
            source_document: doc.clone(),
            config_version: None,
        };

        let root = schema.root()?.clone();
        config.build_section(
            &schema,
            &root,
            SectionLabel::new(DEFAULT_LABEL),
            None,
            fragment,
            source,
        )?;
        Ok(config)
    }

    /// Builds one section instance and recurses through its settings refs.
    fn build_section(
        &mut self,
        schema: &SchemaRegistry,
        spec: &SectionSpec,
        label: SectionLabel,
        parent: Option<ParentRef>,
        fragment: &Map<String, Value>,
        source: DocumentSource,
    ) -> Result<(), ConfigError> {
        validate_label(label.as_str())?;
        let mut section = Section::new(&spec.key, label.clone(), parent);
        section.populate_from(spec, fragment, source)?;
        self.attach_section(section)?;

        let parent_ref = ParentRef {
            key: spec.key.clone(),
            label,
        };
        for reference in &spec.settings_refs {
            let child_spec = schema.section(&reference.child_section).ok_or_else(|| {
                ConfigError::Schema(format!("unknown section '{}'", reference.child_section))
            })?;
            match fragment.get(&reference.param_key) {
                Some(raw) if reference.list => {
                    let items = raw.as_array().ok_or_else(|| {
                        ConfigError::MalformedDocument(format!(
                            "field '{}' must be a list",
                            reference.param_key
                        ))
                    })?;
                    for item in items {
                        let child_fragment = item.as_object().ok_or_else(|| {
                            ConfigError::MalformedDocument(format!(
                                "entries of '{}' must be mappings",
                                reference.param_key
                            ))
                        })?;
                        let name = child_fragment
                            .get("Name")
                            .and_then(Value::as_str)
                            .ok_or_else(|| {
                                ConfigError::MalformedDocument(format!(
                                    "entries of '{}' must carry a Name",
                                    reference.param_key
                                ))
                            })?;
                        self.build_section(
                            schema,
                            child_spec,
                            SectionLabel::new(name),
                            Some(parent_ref.clone()),
                            child_fragment,
                            source,
                        )?;
                    }
                }
                Some(raw) => {
                    let child_fragment = raw.as_object().ok_or_else(|| {
                        ConfigError::MalformedDocument(format!(
                            "field '{}' must be a mapping",
                            reference.param_key
                        ))
                    })?;
                    self.build_section(
                        schema,
                        child_spec,
                        SectionLabel::new(DEFAULT_LABEL),
                        Some(parent_ref.clone()),
                        child_fragment,
                        source,
                    )?;
                }
                None => {
                    if child_spec.autocreate && !reference.list {
                        self.build_section(
                            schema,
                            child_spec,
                            SectionLabel::new(DEFAULT_LABEL),
                            Some(parent_ref.clone()),
                            &Map::new(),
                            source,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns the shared schema registry.
    #[must_use]
    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    /// Returns the retained source document.
    #[must_use]
    pub const fn source_document(&self) -> &Value {
        &self.source_document
    }

    /// Returns the persisted version token, when assigned.
    #[must_use]
    pub const fn config_version(&self) -> Option<&ConfigVersion> {
        self.config_version.as_ref()
    }

    /// Records the version token assigned at persistence time.
    pub fn set_config_version(&mut self, version: ConfigVersion) {
        self.config_version = Some(version);
    }

    /// Derives the content-addressed version token of the resolved tree.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn version_token(&self) -> Result<ConfigVersion, HashError> {
        hashing::config_version(&self.to_document(DocumentMode::User))
    }

    /// Attaches a section, enforcing label and per-parent instance caps.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LabelCollision`] or
    /// [`ConfigError::TooManySections`].
    pub fn attach_section(&mut self, section: Section) -> Result<(), ConfigError> {
        let spec = self
            .schema
            .section(&section.key)
            .ok_or_else(|| ConfigError::Schema(format!("unknown section '{}'", section.key)))?;
        let max = spec.max_instances;
        let siblings = self
            .sections
            .get(&section.key)
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .filter(|existing| existing.parent == section.parent)
            .count();
        if self
            .sections
            .get(&section.key)
            .is_some_and(|existing| {
                existing.iter().any(|candidate| {
                    candidate.label == section.label && candidate.parent == section.parent
                })
            })
        {
            return Err(ConfigError::LabelCollision {
                key: section.key.clone(),
                label: section.label.to_string(),
            });
        }
        if siblings >= max {
            return Err(ConfigError::TooManySections {
                key: section.key.clone(),
                parent: section
                    .parent
                    .as_ref()
                    .map_or_else(|| "root".to_string(), |parent| {
                        format!("{}[{}]", parent.key, parent.label)
                    }),
                max,
            });
        }
        self.sections.entry(section.key.clone()).or_default().push(section);
        Ok(())
    }

    /// Detaches a section and every descendant reachable from it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedDocument`] when no such section
    /// exists.
    pub fn detach_section(&mut self, key: &str, label: &SectionLabel) -> Result<Section, ConfigError> {
        let position = self
            .sections
            .get(key)
            .and_then(|instances| {
                instances.iter().position(|candidate| &candidate.label == label)
            })
            .ok_or_else(|| {
                ConfigError::MalformedDocument(format!("no section '{key}' labeled '{label}'"))
            })?;
        let removed = self
            .sections
            .get_mut(key)
            .map(|instances| instances.remove(position))
            .ok_or_else(|| {
                ConfigError::MalformedDocument(format!("no section '{key}' labeled '{label}'"))
            })?;

        let parent = ParentRef {
            key: removed.key.clone(),
            label: removed.label.clone(),
        };
        let descendants: Vec<(String, SectionLabel)> = self
            .sections
            .values()
            .flatten()
            .filter(|candidate| candidate.parent.as_ref() == Some(&parent))
            .map(|candidate| (candidate.key.clone(), candidate.label.clone()))
            .collect();
        for (child_key, child_label) in descendants {
            let _ = self.detach_section(&child_key, &child_label)?;
        }
        Ok(removed)
    }

    /// Returns one section instance by kind and label.
    #[must_use]
    pub fn section(&self, key: &str, label: &str) -> Option<&Section> {
        self.sections
            .get(key)
            .and_then(|instances| instances.iter().find(|candidate| candidate.label.as_str() == label))
    }

    /// Returns every instance of a section kind in attachment order.
    #[must_use]
    pub fn sections_of(&self, key: &str) -> &[Section] {
        self.sections.get(key).map_or(&[][..], Vec::as_slice)
    }

    /// Returns the cluster-wide root section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schema`] when the tree has no root; building
    /// through the public constructors guarantees one exists.
    pub fn root_section(&self) -> Result<&Section, ConfigError> {
        self.section(self.schema.root_key(), DEFAULT_LABEL).ok_or_else(|| {
            ConfigError::Schema(format!("missing root section '{}'", self.schema.root_key()))
        })
    }

    /// Returns the children of a parent section under one settings ref.
    #[must_use]
    pub fn children_of(&self, parent: &ParentRef, child_key: &str) -> Vec<&Section> {
        self.sections_of(child_key)
            .iter()
            .filter(|candidate| candidate.parent.as_ref() == Some(parent))
            .collect()
    }

    /// Serializes the tree back into a nested document.
    #[must_use]
    pub fn to_document(&self, mode: DocumentMode) -> Value {
        self.root_section()
            .ok()
            .map_or(Value::Null, |root| self.render_section(root, mode))
    }

    /// Renders one section (and its subtree) as a document fragment.
    fn render_section(&self, section: &Section, mode: DocumentMode) -> Value {
        let mut out = Map::new();
        if let Some(spec) = self.schema.section(&section.key) {
            for param in &spec.params {
                if mode == DocumentMode::User && param.visibility == Visibility::Private {
                    continue;
                }
                if let Some(value) = section.get(&param.key) {
                    out.insert(param.key.clone(), value.to_json());
                }
            }
            let parent_ref = ParentRef {
                key: section.key.clone(),
                label: section.label.clone(),
            };
            for reference in &spec.settings_refs {
                let children = self.children_of(&parent_ref, &reference.child_section);
                if reference.list {
                    if !children.is_empty() {
                        let items = children
                            .into_iter()
                            .map(|child| self.render_section(child, mode))
                            .collect();
                        out.insert(reference.param_key.clone(), Value::Array(items));
                    }
                } else if let Some(child) = children.first() {
                    out.insert(reference.param_key.clone(), self.render_section(child, mode));
                }
            }
        }
        Value::Object(out)
    }

    /// Validates every section depth-first, aggregating all findings.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        for instances in self.sections.values() {
            for section in instances {
                if let Some(spec) = self.schema.section(&section.key) {
                    report.extend(section.validate(spec, self));
                }
            }
        }
        report
    }

    /// Takes a deep copy for diffing against a mutated target.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}

// ============================================================================
// SECTION: Flat Storage Conversion
// ============================================================================

/// Partially decoded flat entries for one section instance.
struct StorageGroup {
    /// Section path segments from the root downwards.
    segments: Vec<PathSegmentKey>,
    /// Per-field entries keyed by storage key.
    fields: Vec<(String, String)>,
    /// Packed blob for packed sections.
    packed: Option<String>,
}

impl ClusterConfig {
    /// Mirrors the resolved tree into the flat stack-parameter form.
    ///
    /// Private derived parameters are included so state can be
    /// reconstructed later.
    #[must_use]
    pub fn to_storage(&self) -> Vec<StackParam> {
        let mut out = Vec::new();
        if let Ok(root) = self.root_section() {
            self.collect_storage(root, &[], &mut out);
        }
        out
    }

    /// Appends the storage entries of one section and its subtree.
    fn collect_storage(
        &self,
        section: &Section,
        path: &[PathSegmentKey],
        out: &mut Vec<StackParam>,
    ) {
        let Some(spec) = self.schema.section(&section.key) else {
            return;
        };
        if spec.storage_packed {
            out.push(StackParam::new(render_key(path, None), section.to_packed(spec)));
        } else {
            for param in &spec.params {
                if let Some(value) = section.get(&param.key) {
                    let (storage_key, canonical) = param.to_storage(value);
                    out.push(StackParam::new(render_key(path, Some(&storage_key)), canonical));
                }
            }
        }
        let parent_ref = ParentRef {
            key: section.key.clone(),
            label: section.label.clone(),
        };
        for reference in &spec.settings_refs {
            for child in self.children_of(&parent_ref, &reference.child_section) {
                let mut child_path = path.to_vec();
                child_path.push(PathSegmentKey {
                    kind: child.key.clone(),
                    label: child.label.to_string(),
                });
                self.collect_storage(child, &child_path, out);
            }
        }
    }

    /// Reconstructs a configuration from the persisted representation.
    ///
    /// When the auxiliary resolved-document blob is available it is
    /// authoritative; otherwise the tree is rebuilt from the flat entries,
    /// decoding packed sections positionally in declared parameter order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when either representation cannot be
    /// decoded against the schema.
    pub fn from_storage(
        schema: Arc<SchemaRegistry>,
        params: &[StackParam],
        blob: Option<&Value>,
    ) -> Result<Self, ConfigError> {
        if let Some(doc) = blob {
            return Self::from_stored_document(schema, doc);
        }

        let mut groups: BTreeMap<String, StorageGroup> = BTreeMap::new();
        groups.insert(
            String::new(),
            StorageGroup {
                segments: Vec::new(),
                fields: Vec::new(),
                packed: None,
            },
        );
        for entry in params {
            let ParsedKey {
                segments,
                field,
            } = parse_key(&entry.key)?;
            let path_id = render_key(&segments, None);
            let group = groups.entry(path_id).or_insert_with(|| StorageGroup {
                segments,
                fields: Vec::new(),
                packed: None,
            });
            match field {
                Some(field) => group.fields.push((field, entry.value.clone())),
                None => group.packed = Some(entry.value.clone()),
            }
        }

        let mut ordered: Vec<StorageGroup> = groups.into_values().collect();
        ordered.sort_by_key(|group| group.segments.len());

        let mut config = Self {
            schema: Arc::clone(&schema),
            sections: BTreeMap::new(),
            source_document: Value::Null,
            config_version: None,
        };
        for group in &ordered {
            let (kind, label, parent) = match group.segments.split_last() {
                None => (schema.root_key().to_string(), SectionLabel::new(DEFAULT_LABEL), None),
                Some((last, ancestors)) => {
                    let parent = ancestors.last().map_or_else(
                        || ParentRef {
                            key: schema.root_key().to_string(),
                            label: SectionLabel::new(DEFAULT_LABEL),
                        },
                        |previous| ParentRef {
                            key: previous.kind.clone(),
                            label: SectionLabel::new(previous.label.as_str()),
                        },
                    );
                    (last.kind.clone(), SectionLabel::new(last.label.as_str()), Some(parent))
                }
            };
            let spec = schema.section(&kind).ok_or_else(|| {
                ConfigError::MalformedStorage(format!("unknown section '{kind}' in storage key"))
            })?;
            validate_label(label.as_str())?;
            let mut section = Section::new(&kind, label, parent);
            if let Some(blob) = &group.packed {
                section.populate_from_packed(spec, blob)?;
            } else {
                section.populate_from_storage(spec, &group.fields)?;
            }
            config.attach_section(section)?;
        }
        config.source_document = config.to_document(DocumentMode::User);
        Ok(config)
    }
}
