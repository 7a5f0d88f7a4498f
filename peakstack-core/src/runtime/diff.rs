// peakstack-core/src/runtime/diff.rs
// ============================================================================
// Module: Peakstack Configuration Diff
// Description: Structural diff between two resolved configuration documents.
// Purpose: Produce the change set consumed by the update-policy engine.
// Dependencies: crate::interfaces, serde_json
// ============================================================================

//! ## Overview
//! The diff engine walks a base and a target resolved document in lock-step
//! and emits one [`Change`] per differing field or list element. Named lists
//! (queues, compute resources, storage mounts) match elements by their
//! `Name` member, so element addition, removal, and in-place modification
//! are distinguished from scalar replacement. Because both inputs are fully
//! resolved, defaulted fields are compared exactly like user-set fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::interfaces::FleetStatus;
use crate::interfaces::InstanceState;

// ============================================================================
// SECTION: Change Paths
// ============================================================================

/// One segment of a change path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Plain object field.
    Field(String),
    /// Element of a named list, e.g. `SlurmQueues[q1]`.
    Indexed {
        /// List field name.
        list: String,
        /// Element name.
        name: String,
    },
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Indexed {
                list,
                name,
            } => write!(f, "{list}[{name}]"),
        }
    }
}

// ============================================================================
// SECTION: Change
// ============================================================================

/// One differing field or list element between base and target.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Path to the object containing the changed field.
    pub path: Vec<PathSegment>,
    /// Changed field key (the list name for element additions/removals).
    pub key: String,
    /// Base value; `None` for additions.
    pub old_value: Option<Value>,
    /// Target value; `None` for removals.
    pub new_value: Option<Value>,
    /// Whether the change concerns a list-typed field.
    pub is_list: bool,
}

impl Change {
    /// Returns true when the change adds a value absent from the base.
    #[must_use]
    pub const fn is_addition(&self) -> bool {
        self.old_value.is_none() && self.new_value.is_some()
    }

    /// Returns true when the change removes a value present in the base.
    #[must_use]
    pub const fn is_removal(&self) -> bool {
        self.old_value.is_some() && self.new_value.is_none()
    }

    /// Renders the full change location, e.g.
    /// `Scheduling/SlurmQueues[q1]/ComputeResources[cr1]/MaxCount`.
    #[must_use]
    pub fn location(&self) -> String {
        let mut parts: Vec<String> =
            self.path.iter().map(ToString::to_string).collect();
        parts.push(self.key.clone());
        parts.join("/")
    }
}

// ============================================================================
// SECTION: Diff Engine
// ============================================================================

/// Computes the change set between two resolved documents.
#[must_use]
pub fn diff_documents(
    base: &Value,
    target: &Value,
    named_lists: &BTreeSet<String>,
) -> Vec<Change> {
    let mut changes = Vec::new();
    diff_objects(&mut Vec::new(), base, target, named_lists, &mut changes);
    changes
}

/// Diffs two objects field by field.
fn diff_objects(
    path: &mut Vec<PathSegment>,
    base: &Value,
    target: &Value,
    named_lists: &BTreeSet<String>,
    out: &mut Vec<Change>,
) {
    let empty = serde_json::Map::new();
    let base_map = base.as_object().unwrap_or(&empty);
    let target_map = target.as_object().unwrap_or(&empty);

    let mut keys: Vec<&String> = base_map.keys().collect();
    for key in target_map.keys() {
        if !base_map.contains_key(key) {
            keys.push(key);
        }
    }

    for key in keys {
        let old = base_map.get(key);
        let new = target_map.get(key);
        match (old, new) {
            (Some(old), Some(new)) => {
                if named_lists.contains(key) && old.is_array() && new.is_array() {
                    diff_named_list(path, key, old, new, named_lists, out);
                } else if old.is_object() && new.is_object() {
                    path.push(PathSegment::Field(key.clone()));
                    diff_objects(path, old, new, named_lists, out);
                    path.pop();
                } else if old != new {
                    out.push(Change {
                        path: path.clone(),
                        key: key.clone(),
                        old_value: Some(old.clone()),
                        new_value: Some(new.clone()),
                        is_list: old.is_array() || new.is_array(),
                    });
                }
            }
            (Some(old), None) => out.push(Change {
                path: path.clone(),
                key: key.clone(),
                old_value: Some(old.clone()),
                new_value: None,
                is_list: old.is_array(),
            }),
            (None, Some(new)) => out.push(Change {
                path: path.clone(),
                key: key.clone(),
                old_value: None,
                new_value: Some(new.clone()),
                is_list: new.is_array(),
            }),
            (None, None) => {}
        }
    }
}

/// Diffs a named list by matching elements on their `Name` member.
fn diff_named_list(
    path: &mut Vec<PathSegment>,
    key: &str,
    old: &Value,
    new: &Value,
    named_lists: &BTreeSet<String>,
    out: &mut Vec<Change>,
) {
    let old_items = old.as_array().map_or(&[][..], Vec::as_slice);
    let new_items = new.as_array().map_or(&[][..], Vec::as_slice);

    for old_item in old_items {
        let name = element_name(old_item);
        match find_named(new_items, name) {
            Some(new_item) => {
                path.push(PathSegment::Indexed {
                    list: key.to_string(),
                    name: name.unwrap_or_default().to_string(),
                });
                diff_objects(path, old_item, new_item, named_lists, out);
                path.pop();
            }
            None => out.push(Change {
                path: path.clone(),
                key: key.to_string(),
                old_value: Some(old_item.clone()),
                new_value: None,
                is_list: true,
            }),
        }
    }
    for new_item in new_items {
        if find_named(old_items, element_name(new_item)).is_none() {
            out.push(Change {
                path: path.clone(),
                key: key.to_string(),
                old_value: None,
                new_value: Some(new_item.clone()),
                is_list: true,
            });
        }
    }
}

/// Returns the `Name` member of a list element.
fn element_name(item: &Value) -> Option<&str> {
    item.get("Name").and_then(Value::as_str)
}

/// Finds a list element by name.
fn find_named<'a>(items: &'a [Value], name: Option<&str>) -> Option<&'a Value> {
    name.and_then(|name| items.iter().find(|item| element_name(item) == Some(name)))
}

/// Resolves the value a change path points at inside a document.
#[must_use]
pub fn value_at<'doc>(doc: &'doc Value, path: &[PathSegment]) -> Option<&'doc Value> {
    let mut current = doc;
    for segment in path {
        current = match segment {
            PathSegment::Field(name) => current.get(name)?,
            PathSegment::Indexed {
                list,
                name,
            } => current
                .get(list)?
                .as_array()?
                .iter()
                .find(|item| element_name(item) == Some(name))?,
        };
    }
    Some(current)
}

// ============================================================================
// SECTION: Update Context
// ============================================================================

/// Errors raised when live cluster context cannot be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The live state collaborator failed.
    #[error("cluster context unavailable: {0}")]
    Unavailable(String),
}

/// Live cluster state consumed by policy condition checkers.
pub trait UpdateContext {
    /// Returns the current compute fleet status.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the status cannot be read.
    fn fleet_status(&self) -> Result<FleetStatus, ContextError>;

    /// Returns the recorded head node instance state.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the state cannot be read.
    fn head_node_state(&self) -> Result<InstanceState, ContextError>;
}

// ============================================================================
// SECTION: Patch
// ============================================================================

/// The computed change set between two configurations, plus live context.
pub struct Patch<'ctx> {
    /// Fully resolved base document.
    pub base: Value,
    /// Fully resolved target document.
    pub target: Value,
    /// Live cluster state handle.
    pub cluster: &'ctx dyn UpdateContext,
    /// Ordered changes derived from structural comparison.
    pub changes: Vec<Change>,
}

impl<'ctx> Patch<'ctx> {
    /// Diffs two resolved documents into a patch.
    #[must_use]
    pub fn new(
        base: Value,
        target: Value,
        cluster: &'ctx dyn UpdateContext,
        named_lists: &BTreeSet<String>,
    ) -> Self {
        let changes = diff_documents(&base, &target, named_lists);
        Self {
            base,
            target,
            cluster,
            changes,
        }
    }

    /// Returns the queue replacement strategy declared by the target.
    #[must_use]
    pub fn target_queue_update_strategy(&self) -> Option<&str> {
        self.target
            .get("Scheduling")
            .and_then(|scheduling| scheduling.get("QueueUpdateStrategy"))
            .and_then(Value::as_str)
    }

    /// Returns true when every named element of the base list a change
    /// belongs to still appears in the target list.
    #[must_use]
    pub fn old_values_preserved(&self, change: &Change) -> bool {
        let base_items = value_at(&self.base, &change.path)
            .and_then(|container| container.get(&change.key))
            .and_then(Value::as_array);
        let target_items = value_at(&self.target, &change.path)
            .and_then(|container| container.get(&change.key))
            .and_then(Value::as_array);
        match (base_items, target_items) {
            (Some(base_items), Some(target_items)) => base_items.iter().all(|item| {
                find_named(target_items, element_name(item)).is_some()
            }),
            (None, _) => true,
            (Some(_), None) => false,
        }
    }
}
