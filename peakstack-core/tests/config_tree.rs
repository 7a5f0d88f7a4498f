//! Configuration root tests: building, serializing, and validating trees.
// peakstack-core/tests/config_tree.rs
// ============================================================================
// Module: Configuration Tree Tests
// Description: Document and storage round-trips plus validation aggregation.
// Purpose: Ensure the configuration root honors its serialization laws.
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
use peakstack_core::FindingLevel;
use peakstack_core::core::catalog::NETWORK_SECTION;
use peakstack_core::runtime::ensure_passes;
use serde_json::json;

use common::base_doc;
use common::schema;

#[test]
fn autocreated_sections_exist_without_user_input() {
    let registry = schema().expect("schema builds");
    let config = ClusterConfig::from_document(Arc::clone(&registry), &base_doc())
        .expect("document loads");
    assert!(config.section(NETWORK_SECTION, "default").is_some());
    let doc = config.to_document(DocumentMode::User);
    assert!(doc.get("Network").is_some(), "autocreated section must serialize");
}

#[test]
fn user_document_round_trip_preserves_user_fields() {
    let registry = schema().expect("schema builds");
    let config = ClusterConfig::from_document(Arc::clone(&registry), &base_doc())
        .expect("document loads");
    let rendered = config.to_document(DocumentMode::User);

    assert_eq!(rendered["Region"], json!("us-east-1"));
    assert_eq!(rendered["HeadNode"]["InstanceType"], json!("c5.xlarge"));
    assert_eq!(rendered["Scheduling"]["SlurmQueues"][0]["Name"], json!("q1"));
    assert_eq!(
        rendered["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0]["MaxCount"],
        json!(10)
    );
    assert!(
        rendered.get("InternalArtifactPrefix").is_none(),
        "private fields must not leak into user documents"
    );

    let reparsed = ClusterConfig::from_document(Arc::clone(&registry), &rendered)
        .expect("rendered document loads again");
    assert_eq!(reparsed.to_document(DocumentMode::User), rendered);
}

#[test]
fn full_document_round_trips_private_fields() {
    let registry = schema().expect("schema builds");
    let config = ClusterConfig::from_document(Arc::clone(&registry), &base_doc())
        .expect("document loads");
    let full = config.to_document(DocumentMode::Full);
    assert_eq!(full["InternalArtifactPrefix"], json!("peakstack"));

    let restored = ClusterConfig::from_stored_document(Arc::clone(&registry), &full)
        .expect("stored document loads");
    assert_eq!(restored.to_document(DocumentMode::Full), full);
}

#[test]
fn storage_round_trip_matches_document_round_trip() {
    let registry = schema().expect("schema builds");
    let config = ClusterConfig::from_document(Arc::clone(&registry), &base_doc())
        .expect("document loads");
    let params = config.to_storage();
    let rebuilt = ClusterConfig::from_storage(Arc::clone(&registry), &params, None)
        .expect("storage decodes");
    assert_eq!(
        rebuilt.to_document(DocumentMode::Full),
        config.to_document(DocumentMode::Full)
    );
}

#[test]
fn version_token_is_content_addressed() {
    let registry = schema().expect("schema builds");
    let first = ClusterConfig::from_document(Arc::clone(&registry), &base_doc())
        .expect("document loads");
    let second = ClusterConfig::from_document(Arc::clone(&registry), &base_doc())
        .expect("document loads");
    assert_eq!(
        first.version_token().expect("token"),
        second.version_token().expect("token")
    );

    let mut changed = base_doc();
    changed["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0]["MaxCount"] = json!(5);
    let third = ClusterConfig::from_document(Arc::clone(&registry), &changed)
        .expect("document loads");
    assert_ne!(
        first.version_token().expect("token"),
        third.version_token().expect("token")
    );
}

#[test]
fn missing_required_parameters_are_reported_together() {
    let registry = schema().expect("schema builds");
    let mut doc = base_doc();
    let head = doc["HeadNode"].as_object_mut().expect("head node object");
    head.remove("InstanceType");
    head.remove("SubnetId");
    let config =
        ClusterConfig::from_document(Arc::clone(&registry), &doc).expect("document loads");
    let report = config.validate();

    let required: Vec<_> = report
        .findings
        .iter()
        .filter(|finding| finding.rule == "required_parameter")
        .collect();
    assert_eq!(required.len(), 2, "both missing parameters must be reported: {report:?}");
    assert!(required.iter().any(|finding| finding.message.contains("InstanceType")));
    assert!(required.iter().any(|finding| finding.message.contains("SubnetId")));

    let err = ensure_passes(report, FindingLevel::Error).expect_err("must fail at error level");
    assert!(err.findings.len() >= 2, "error must carry the full finding list");
}

#[test]
fn warning_threshold_blocks_warnings() {
    let registry = schema().expect("schema builds");
    let mut doc = base_doc();
    doc["Scheduling"]["SlurmQueues"][0]["ComputeResources"] = json!([
        {"Name": "cr1", "InstanceType": "c5.xlarge", "MaxCount": 300},
        {"Name": "cr2", "InstanceType": "c5.xlarge", "MaxCount": 300}
    ]);
    let config =
        ClusterConfig::from_document(Arc::clone(&registry), &doc).expect("document loads");
    let report = config.validate();
    assert!(
        report.findings.iter().any(|finding| finding.level == FindingLevel::Warning),
        "capacity cap warning expected: {report:?}"
    );
    assert!(ensure_passes(report.clone(), FindingLevel::Error).is_ok());
    assert!(ensure_passes(report, FindingLevel::Warning).is_err());
}

#[test]
fn snapshot_is_independent_of_the_original() {
    let registry = schema().expect("schema builds");
    let config = ClusterConfig::from_document(Arc::clone(&registry), &base_doc())
        .expect("document loads");
    let snapshot = config.snapshot();
    assert_eq!(
        snapshot.to_document(DocumentMode::Full),
        config.to_document(DocumentMode::Full)
    );
}
