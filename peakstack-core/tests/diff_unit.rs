//! Diff engine tests over resolved configuration documents.
// peakstack-core/tests/diff_unit.rs
// ============================================================================
// Module: Diff Engine Tests
// Description: Structural diffing with named-list element matching.
// Purpose: Ensure changes carry exact paths, values, and list semantics.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;

use peakstack_core::ClusterConfig;
use peakstack_core::DocumentMode;
use peakstack_core::runtime::diff_documents;
use serde_json::Value;
use serde_json::json;

use common::base_doc;
use common::schema;

/// Resolves a document through the configuration model.
fn resolved(doc: &Value) -> Value {
    let registry = schema().expect("schema builds");
    ClusterConfig::from_document(Arc::clone(&registry), doc)
        .expect("document loads")
        .to_document(DocumentMode::User)
}

#[test]
fn self_diff_is_empty() {
    let registry = schema().expect("schema builds");
    let doc = resolved(&base_doc());
    let changes = diff_documents(&doc, &doc, &registry.named_list_fields());
    assert!(changes.is_empty(), "diffing a document against itself: {changes:?}");
}

#[test]
fn scalar_change_carries_full_path_and_values() {
    let registry = schema().expect("schema builds");
    let base = resolved(&base_doc());
    let mut target_doc = base_doc();
    target_doc["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0]["MaxCount"] = json!(5);
    let target = resolved(&target_doc);

    let changes = diff_documents(&base, &target, &registry.named_list_fields());
    assert_eq!(changes.len(), 1, "exactly one change expected: {changes:?}");
    let change = &changes[0];
    assert_eq!(
        change.location(),
        "Scheduling/SlurmQueues[q1]/ComputeResources[cr1]/MaxCount"
    );
    assert_eq!(change.old_value, Some(json!(10)));
    assert_eq!(change.new_value, Some(json!(5)));
    assert!(!change.is_list);
}

#[test]
fn queue_addition_is_one_list_change() {
    let registry = schema().expect("schema builds");
    let base = resolved(&base_doc());
    let mut target_doc = base_doc();
    target_doc["Scheduling"]["SlurmQueues"]
        .as_array_mut()
        .expect("queues array")
        .push(json!({
            "Name": "q2",
            "SubnetIds": ["subnet-compute"],
            "ComputeResources": [{"Name": "cr1", "InstanceType": "c5.xlarge"}]
        }));
    let target = resolved(&target_doc);

    let changes = diff_documents(&base, &target, &registry.named_list_fields());
    assert_eq!(changes.len(), 1, "one addition expected: {changes:?}");
    let change = &changes[0];
    assert!(change.is_addition());
    assert!(change.is_list);
    assert_eq!(change.key, "SlurmQueues");
    assert_eq!(change.new_value.as_ref().and_then(|v| v.get("Name")), Some(&json!("q2")));
}

#[test]
fn queue_removal_is_one_list_change() {
    let registry = schema().expect("schema builds");
    let mut two_queues = base_doc();
    two_queues["Scheduling"]["SlurmQueues"]
        .as_array_mut()
        .expect("queues array")
        .push(json!({
            "Name": "q2",
            "SubnetIds": ["subnet-compute"],
            "ComputeResources": [{"Name": "cr1", "InstanceType": "c5.xlarge"}]
        }));
    let base = resolved(&two_queues);
    let target = resolved(&base_doc());

    let changes = diff_documents(&base, &target, &registry.named_list_fields());
    assert_eq!(changes.len(), 1, "one removal expected: {changes:?}");
    let change = &changes[0];
    assert!(change.is_removal());
    assert_eq!(change.key, "SlurmQueues");
    assert_eq!(change.old_value.as_ref().and_then(|v| v.get("Name")), Some(&json!("q2")));
}

#[test]
fn renamed_element_is_removal_plus_addition() {
    let registry = schema().expect("schema builds");
    let base = resolved(&base_doc());
    let mut target_doc = base_doc();
    target_doc["Scheduling"]["SlurmQueues"][0]["Name"] = json!("renamed");
    let target = resolved(&target_doc);

    let changes = diff_documents(&base, &target, &registry.named_list_fields());
    assert_eq!(changes.len(), 2, "rename decomposes into remove + add: {changes:?}");
    assert!(changes.iter().any(peakstack_core::Change::is_removal));
    assert!(changes.iter().any(peakstack_core::Change::is_addition));
}

#[test]
fn defaulted_fields_are_compared_like_user_fields() {
    let registry = schema().expect("schema builds");
    let base = resolved(&base_doc());
    let mut target_doc = base_doc();
    target_doc["Scheduling"]["SlurmQueues"][0]["CapacityType"] = json!("SPOT");
    let target = resolved(&target_doc);

    let changes = diff_documents(&base, &target, &registry.named_list_fields());
    assert_eq!(changes.len(), 1, "default-to-explicit difference must diff: {changes:?}");
    assert_eq!(changes[0].location(), "Scheduling/SlurmQueues[q1]/CapacityType");
    assert_eq!(changes[0].old_value, Some(json!("ONDEMAND")));
}

#[test]
fn plain_list_change_is_marked_as_list() {
    let registry = schema().expect("schema builds");
    let base = resolved(&base_doc());
    let mut target_doc = base_doc();
    target_doc["Scheduling"]["SlurmQueues"][0]["SubnetIds"] =
        json!(["subnet-compute", "subnet-head"]);
    let target = resolved(&target_doc);

    let changes = diff_documents(&base, &target, &registry.named_list_fields());
    assert_eq!(changes.len(), 1);
    assert!(changes[0].is_list);
    assert_eq!(changes[0].key, "SubnetIds");
}
