//! Validator engine tests over cloud-state facts.
// peakstack-core/tests/validator_rules.rs
// ============================================================================
// Module: Validator Rule Tests
// Description: Fact-based validation rules and error downgrading.
// Purpose: Ensure validators aggregate findings and tolerate fact outages.
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
use peakstack_core::ClusterName;
use peakstack_core::ComputeFacts;
use peakstack_core::FactsError;
use peakstack_core::FindingLevel;
use peakstack_core::InstanceState;
use peakstack_core::InstanceTypeInfo;
use peakstack_core::SecurityGroupRule;
use peakstack_core::StackClient;
use peakstack_core::SubnetInfo;
use peakstack_core::runtime::InMemoryStackClient;
use peakstack_core::runtime::StaticComputeFacts;
use peakstack_core::runtime::run_dry_run_validators;
use peakstack_core::runtime::run_fact_validators;
use serde_json::json;

use common::base_doc;
use common::schema;

/// Facts provider whose every lookup fails.
struct UnreachableFacts;

impl ComputeFacts for UnreachableFacts {
    fn instance_type(&self, _name: &str) -> Result<Option<InstanceTypeInfo>, FactsError> {
        Err(FactsError::Provider("endpoint unreachable".to_string()))
    }

    fn subnet(&self, _id: &str) -> Result<Option<SubnetInfo>, FactsError> {
        Err(FactsError::Provider("endpoint unreachable".to_string()))
    }

    fn security_group_rules(&self, _id: &str) -> Result<Vec<SecurityGroupRule>, FactsError> {
        Err(FactsError::Provider("endpoint unreachable".to_string()))
    }

    fn head_node_state(&self, _cluster: &ClusterName) -> Result<InstanceState, FactsError> {
        Err(FactsError::Provider("endpoint unreachable".to_string()))
    }
}

#[test]
fn efa_requires_a_supporting_instance_type() {
    let registry = schema().expect("schema builds");
    let mut doc = base_doc();
    doc["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0]["EfaEnabled"] = json!(true);
    let config =
        ClusterConfig::from_document(Arc::clone(&registry), &doc).expect("document loads");

    let report = run_fact_validators(&config, &StaticComputeFacts::with_defaults());
    assert!(
        report
            .findings
            .iter()
            .any(|finding| finding.rule == "efa_capability"
                && finding.level == FindingLevel::Error),
        "c5.xlarge does not support the fabric adapter: {report:?}"
    );
}

#[test]
fn efa_passes_on_a_supporting_instance_type() {
    let registry = schema().expect("schema builds");
    let mut doc = base_doc();
    doc["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0]["InstanceType"] =
        json!("c5n.18xlarge");
    doc["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0]["EfaEnabled"] = json!(true);
    let config =
        ClusterConfig::from_document(Arc::clone(&registry), &doc).expect("document loads");

    let report = run_fact_validators(&config, &StaticComputeFacts::with_defaults());
    assert!(
        !report.findings.iter().any(|finding| finding.rule == "efa_capability"),
        "supported adapter must not be flagged: {report:?}"
    );
}

#[test]
fn architecture_mismatch_is_flagged() {
    let registry = schema().expect("schema builds");
    let facts = StaticComputeFacts::with_defaults().with_instance_type(InstanceTypeInfo {
        name: "arm.large".to_string(),
        vcpus: 2,
        architecture: "arm64".to_string(),
        efa_supported: false,
        gpu_count: 0,
    });
    let mut doc = base_doc();
    doc["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0]["InstanceType"] =
        json!("arm.large");
    let config =
        ClusterConfig::from_document(Arc::clone(&registry), &doc).expect("document loads");

    let report = run_fact_validators(&config, &facts);
    assert!(
        report.findings.iter().any(|finding| finding.rule == "architecture_consistency"),
        "mixed architectures must be flagged: {report:?}"
    );
}

#[test]
fn subnet_zone_mismatch_is_flagged() {
    let registry = schema().expect("schema builds");
    let facts = StaticComputeFacts::with_defaults().with_subnet(SubnetInfo {
        subnet_id: "subnet-far".to_string(),
        availability_zone: "zone-b".to_string(),
        vpc_id: "vpc-1".to_string(),
    });
    let mut doc = base_doc();
    doc["Scheduling"]["SlurmQueues"][0]["SubnetIds"] = json!(["subnet-far"]);
    let config =
        ClusterConfig::from_document(Arc::clone(&registry), &doc).expect("document loads");

    let report = run_fact_validators(&config, &facts);
    assert!(
        report.findings.iter().any(|finding| finding.rule == "subnet_zone"),
        "cross-zone queues must be flagged: {report:?}"
    );
}

#[test]
fn duplicate_mount_dirs_are_flagged() {
    let registry = schema().expect("schema builds");
    let mut doc = base_doc();
    doc["SharedStorage"] = json!([
        {"Name": "scratch", "StorageType": "Ebs", "MountDir": "/shared"},
        {"Name": "home", "StorageType": "Efs", "MountDir": "/shared"}
    ]);
    let config =
        ClusterConfig::from_document(Arc::clone(&registry), &doc).expect("document loads");

    let report = run_fact_validators(&config, &StaticComputeFacts::with_defaults());
    assert!(
        report.findings.iter().any(|finding| finding.rule == "mount_dir_unique"),
        "duplicate mount points must be flagged: {report:?}"
    );
}

#[test]
fn explicit_security_groups_must_keep_ssh_reachable() {
    let registry = schema().expect("schema builds");
    let facts = StaticComputeFacts::with_defaults()
        .with_group_rules(
            "sg-open",
            vec![SecurityGroupRule {
                protocol: "tcp".to_string(),
                from_port: 22,
                to_port: 22,
            }],
        )
        .with_group_rules(
            "sg-closed",
            vec![SecurityGroupRule {
                protocol: "tcp".to_string(),
                from_port: 443,
                to_port: 443,
            }],
        );

    let mut doc = base_doc();
    doc["Network"] = json!({"SecurityGroups": ["sg-closed"]});
    let config =
        ClusterConfig::from_document(Arc::clone(&registry), &doc).expect("document loads");
    let report = run_fact_validators(&config, &facts);
    assert!(
        report.findings.iter().any(|finding| finding.rule == "security_group_ssh"),
        "closed groups must be flagged: {report:?}"
    );

    doc["Network"] = json!({"SecurityGroups": ["sg-open"]});
    let config =
        ClusterConfig::from_document(Arc::clone(&registry), &doc).expect("document loads");
    let report = run_fact_validators(&config, &facts);
    assert!(
        !report.findings.iter().any(|finding| finding.rule == "security_group_ssh"),
        "open groups must pass: {report:?}"
    );
}

#[test]
fn fact_outages_downgrade_to_warnings() {
    let registry = schema().expect("schema builds");
    let config = ClusterConfig::from_document(Arc::clone(&registry), &base_doc())
        .expect("document loads");

    let report = run_fact_validators(&config, &UnreachableFacts);
    assert!(!report.findings.is_empty(), "outages must still be surfaced");
    assert!(
        report.findings.iter().all(|finding| finding.level == FindingLevel::Warning),
        "a fact outage is a warning, not an error: {report:?}"
    );
}

#[test]
fn dry_run_flags_stack_name_collisions() {
    let stack = InMemoryStackClient::new();
    let name = ClusterName::new("hpc-alpha");
    let report = run_dry_run_validators(&name, &stack);
    assert!(report.is_empty(), "no collision expected: {report:?}");

    stack
        .create_stack(&peakstack_core::CreateStackRequest {
            name: peakstack_core::StackName::for_cluster(&name),
            template: json!({}),
            parameters: Vec::new(),
            tags: Vec::new(),
            disable_rollback: false,
        })
        .expect("seed stack");
    let report = run_dry_run_validators(&name, &stack);
    assert!(
        report.findings.iter().any(|finding| finding.rule == "stack_name_collision"),
        "collision must be flagged: {report:?}"
    );
}
