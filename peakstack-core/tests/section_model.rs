//! Section model tests: labels, population, caps, and packed storage.
// peakstack-core/tests/section_model.rs
// ============================================================================
// Module: Section Model Tests
// Description: Section population, label grammar, and per-parent caps.
// Purpose: Ensure sections enforce the contract of the configuration model.
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
use peakstack_core::ConfigError;
use peakstack_core::ParamValue;
use peakstack_core::core::catalog::COMPUTE_RESOURCE_SECTION;
use peakstack_core::core::catalog::MAX_COMPUTE_RESOURCES;
use peakstack_core::core::catalog::MONITORING_SECTION;
use peakstack_core::core::catalog::SLURM_QUEUE_SECTION;
use peakstack_core::core::section::validate_label;
use serde_json::json;

use common::base_doc;
use common::schema;

#[test]
fn label_grammar_accepts_names_and_rejects_violations() {
    assert!(validate_label("q1").is_ok());
    assert!(validate_label("compute_pool-2").is_ok());
    assert!(validate_label("").is_err());
    assert!(validate_label("1queue").is_err());
    assert!(validate_label("bad.name").is_err());
    assert!(validate_label(&"x".repeat(31)).is_err());
}

#[test]
fn unknown_field_names_key_and_section() {
    let registry = schema().expect("schema builds");
    let mut doc = base_doc();
    doc["HeadNode"]["Flavour"] = json!("large");
    let err = ClusterConfig::from_document(Arc::clone(&registry), &doc)
        .expect_err("unknown field must be rejected");
    match err {
        ConfigError::UnknownField {
            key,
            section,
        } => {
            assert_eq!(key, "Flavour");
            assert_eq!(section, "HeadNode");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn private_field_is_rejected_in_user_documents() {
    let registry = schema().expect("schema builds");
    let mut doc = base_doc();
    doc["InternalArtifactPrefix"] = json!("custom");
    let err = ClusterConfig::from_document(Arc::clone(&registry), &doc)
        .expect_err("private field must be rejected");
    assert!(matches!(err, ConfigError::DisallowedField { .. }));
    assert_eq!(err.kind(), "DisallowedFieldError");
}

#[test]
fn defaults_resolve_for_unset_public_parameters() {
    let registry = schema().expect("schema builds");
    let config = ClusterConfig::from_document(Arc::clone(&registry), &base_doc())
        .expect("document loads");
    let queue = config.section(SLURM_QUEUE_SECTION, "q1").expect("queue exists");
    assert_eq!(queue.get("CapacityType"), Some(&ParamValue::Str("ONDEMAND".to_string())));
    let monitoring = config.section(MONITORING_SECTION, "default").expect("autocreated");
    assert_eq!(monitoring.get("LogRetentionDays"), Some(&ParamValue::Int(14)));
}

#[test]
fn derived_default_tracks_min_count() {
    let registry = schema().expect("schema builds");
    let mut doc = base_doc();
    doc["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0] = json!({
        "Name": "cr1",
        "InstanceType": "c5.xlarge",
        "MinCount": 25
    });
    let config = ClusterConfig::from_document(Arc::clone(&registry), &doc)
        .expect("document loads");
    let resource = config.section(COMPUTE_RESOURCE_SECTION, "cr1").expect("resource exists");
    assert_eq!(resource.get("MaxCount"), Some(&ParamValue::Int(25)));
}

#[test]
fn default_resolution_is_deterministic() {
    let registry = schema().expect("schema builds");
    let first = ClusterConfig::from_document(Arc::clone(&registry), &base_doc())
        .expect("document loads");
    let second = ClusterConfig::from_document(Arc::clone(&registry), &base_doc())
        .expect("document loads");
    assert_eq!(
        first.to_document(peakstack_core::DocumentMode::Full),
        second.to_document(peakstack_core::DocumentMode::Full)
    );
}

#[test]
fn per_parent_cap_is_independent_between_parents() {
    let registry = schema().expect("schema builds");
    let resources: Vec<_> = (0..MAX_COMPUTE_RESOURCES)
        .map(|index| {
            json!({
                "Name": format!("cr{index}"),
                "InstanceType": "c5.xlarge"
            })
        })
        .collect();
    let mut doc = base_doc();
    doc["Scheduling"]["SlurmQueues"] = json!([
        {
            "Name": "q1",
            "SubnetIds": ["subnet-compute"],
            "ComputeResources": resources.clone()
        },
        {
            "Name": "q2",
            "SubnetIds": ["subnet-compute"],
            "ComputeResources": resources.clone()
        }
    ]);
    assert!(ClusterConfig::from_document(Arc::clone(&registry), &doc).is_ok());

    let mut overfull = resources;
    overfull.push(json!({"Name": "extra", "InstanceType": "c5.xlarge"}));
    doc["Scheduling"]["SlurmQueues"][0]["ComputeResources"] = json!(overfull);
    let err = ClusterConfig::from_document(Arc::clone(&registry), &doc)
        .expect_err("cap must apply per parent");
    match err {
        ConfigError::TooManySections {
            key,
            max,
            ..
        } => {
            assert_eq!(key, COMPUTE_RESOURCE_SECTION);
            assert_eq!(max, MAX_COMPUTE_RESOURCES);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn duplicate_labels_under_one_parent_collide() {
    let registry = schema().expect("schema builds");
    let mut doc = base_doc();
    doc["Scheduling"]["SlurmQueues"] = json!([
        {
            "Name": "q1",
            "SubnetIds": ["subnet-compute"],
            "ComputeResources": [{"Name": "cr1", "InstanceType": "c5.xlarge"}]
        },
        {
            "Name": "q1",
            "SubnetIds": ["subnet-compute"],
            "ComputeResources": [{"Name": "cr1", "InstanceType": "c5.xlarge"}]
        }
    ]);
    let err = ClusterConfig::from_document(Arc::clone(&registry), &doc)
        .expect_err("duplicate labels must collide");
    assert!(matches!(err, ConfigError::LabelCollision { .. }));
}

#[test]
fn packed_section_round_trips_positionally() {
    let registry = schema().expect("schema builds");
    let mut doc = base_doc();
    doc["Monitoring"] = json!({
        "DetailedMonitoring": true,
        "LogRetentionDays": 30,
        "DashboardEnabled": false
    });
    let config = ClusterConfig::from_document(Arc::clone(&registry), &doc)
        .expect("document loads");
    let params = config.to_storage();
    let packed = params
        .iter()
        .find(|param| param.key == "Monitoring[default]")
        .expect("packed entry present");
    assert_eq!(packed.value, "true,30,false");

    let rebuilt = ClusterConfig::from_storage(Arc::clone(&registry), &params, None)
        .expect("storage decodes");
    let monitoring = rebuilt.section(MONITORING_SECTION, "default").expect("section exists");
    assert_eq!(monitoring.get("DetailedMonitoring"), Some(&ParamValue::Bool(true)));
    assert_eq!(monitoring.get("LogRetentionDays"), Some(&ParamValue::Int(30)));
    assert_eq!(monitoring.get("DashboardEnabled"), Some(&ParamValue::Bool(false)));
}

#[test]
fn invalid_enum_value_is_a_hard_failure() {
    let registry = schema().expect("schema builds");
    let mut doc = base_doc();
    doc["Scheduling"]["SlurmQueues"][0]["CapacityType"] = json!("RESERVED");
    let err = ClusterConfig::from_document(Arc::clone(&registry), &doc)
        .expect_err("enum violation must fail");
    assert_eq!(err.kind(), "InvalidValueError");
}
