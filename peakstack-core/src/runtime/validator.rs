// peakstack-core/src/runtime/validator.rs
// ============================================================================
// Module: Peakstack Validator Engine
// Description: Fact-based and dry-run validators over resolved configs.
// Purpose: Catch cloud-state inconsistencies before any stack operation.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The validator engine complements the structural checks performed by the
//! configuration root with rules that consume cloud-state facts: instance
//! type capabilities, subnet topology, and a final dry-run class of probes
//! against the target account. Every rule aggregates findings; a transient
//! collaborator error downgrades the affected rule to a warning instead of
//! aborting the pass.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::catalog::COMPUTE_RESOURCE_SECTION;
use crate::core::catalog::HEAD_NODE_SECTION;
use crate::core::catalog::NETWORK_SECTION;
use crate::core::catalog::SHARED_STORAGE_SECTION;
use crate::core::catalog::SLURM_QUEUE_SECTION;
use crate::core::config::ClusterConfig;
use crate::core::finding::FindingLevel;
use crate::core::finding::ValidationFinding;
use crate::core::finding::ValidationReport;
use crate::core::identifiers::ClusterName;
use crate::core::identifiers::StackName;
use crate::core::section::DEFAULT_LABEL;
use crate::core::value::ParamValue;
use crate::interfaces::ComputeFacts;
use crate::interfaces::StackClient;

// ============================================================================
// SECTION: Options and Errors
// ============================================================================

/// Caller-supplied validation controls.
///
/// The default threshold is [`FindingLevel::Error`] with no suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidateOptions {
    /// Findings at or above this level fail the pass.
    pub failure_level: FindingLevel,
    /// Skips fact-based and dry-run validators entirely.
    pub suppress_validators: bool,
}

/// Aggregate validation failure carrying the complete finding list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration validation failed with {} finding(s) at or above {failure_level}", .findings.len())]
pub struct ConfigValidationError {
    /// Every finding from the pass, not only the blocking ones.
    pub findings: Vec<ValidationFinding>,
    /// Threshold the pass was evaluated against.
    pub failure_level: FindingLevel,
}

/// Fails the pass when any finding reaches the threshold.
///
/// The full report is returned either way so callers can display
/// sub-threshold findings.
///
/// # Errors
///
/// Returns [`ConfigValidationError`] carrying every finding when the
/// report fails at the threshold.
pub fn ensure_passes(
    report: ValidationReport,
    failure_level: FindingLevel,
) -> Result<ValidationReport, ConfigValidationError> {
    if report.fails_at(failure_level) {
        return Err(ConfigValidationError {
            findings: report.findings,
            failure_level,
        });
    }
    Ok(report)
}

// ============================================================================
// SECTION: Fact-Based Validators
// ============================================================================

/// Runs every fact-based validator over a resolved configuration.
#[must_use]
pub fn run_fact_validators(config: &ClusterConfig, facts: &dyn ComputeFacts) -> ValidationReport {
    let mut report = ValidationReport::new();
    report.extend(instance_types_exist(config, facts));
    report.extend(efa_capability(config, facts));
    report.extend(architecture_consistency(config, facts));
    report.extend(subnet_zone_consistency(config, facts));
    report.extend(security_group_reachability(config, facts));
    report.extend(mount_dir_uniqueness(config));
    report
}

/// Explicit security groups must leave SSH reachable on the head node.
fn security_group_reachability(
    config: &ClusterConfig,
    facts: &dyn ComputeFacts,
) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    let Some(groups) = config
        .section(NETWORK_SECTION, DEFAULT_LABEL)
        .and_then(|network| network.get("SecurityGroups"))
        .and_then(ParamValue::as_str_list)
    else {
        return findings;
    };
    if groups.is_empty() {
        return findings;
    }
    let mut ssh_open = false;
    for group in groups {
        match facts.security_group_rules(group) {
            Ok(rules) => {
                if rules.iter().any(|rule| {
                    (rule.protocol == "tcp" || rule.protocol == "-1")
                        && rule.from_port <= 22
                        && rule.to_port >= 22
                }) {
                    ssh_open = true;
                }
            }
            Err(err) => {
                findings.push(ValidationFinding::warning(
                    "security_group_ssh",
                    format!("could not inspect security group '{group}': {err}"),
                ));
                ssh_open = true;
            }
        }
    }
    if !ssh_open {
        findings.push(ValidationFinding::warning(
            "security_group_ssh",
            "no configured security group allows inbound SSH to the head node",
        ));
    }
    findings
}

/// Every referenced instance type must exist.
fn instance_types_exist(
    config: &ClusterConfig,
    facts: &dyn ComputeFacts,
) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    for (section, key) in instance_type_refs(config) {
        match facts.instance_type(&key) {
            Ok(Some(_)) => {}
            Ok(None) => findings.push(ValidationFinding::error(
                "instance_type_exists",
                format!("instance type '{key}' referenced by '{section}' does not exist"),
            )),
            Err(err) => findings.push(ValidationFinding::warning(
                "instance_type_exists",
                format!("could not verify instance type '{key}': {err}"),
            )),
        }
    }
    findings
}

/// Fabric-adapter-enabled resources need a supporting instance type.
fn efa_capability(config: &ClusterConfig, facts: &dyn ComputeFacts) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    for resource in config.sections_of(COMPUTE_RESOURCE_SECTION) {
        let enabled =
            resource.get("EfaEnabled").and_then(ParamValue::as_bool).unwrap_or(false);
        if !enabled {
            continue;
        }
        let Some(instance_type) =
            resource.get("InstanceType").and_then(ParamValue::as_str).map(ToString::to_string)
        else {
            continue;
        };
        match facts.instance_type(&instance_type) {
            Ok(Some(info)) if !info.efa_supported => findings.push(ValidationFinding::error(
                "efa_capability",
                format!(
                    "compute resource '{}' enables the fabric adapter but '{instance_type}' does \
                     not support it",
                    resource.label
                ),
            )),
            Ok(_) => {}
            Err(err) => findings.push(ValidationFinding::warning(
                "efa_capability",
                format!("could not verify fabric support for '{instance_type}': {err}"),
            )),
        }
    }
    findings
}

/// Head node and compute resources must share a CPU architecture.
fn architecture_consistency(
    config: &ClusterConfig,
    facts: &dyn ComputeFacts,
) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    let head_arch = config
        .section(HEAD_NODE_SECTION, DEFAULT_LABEL)
        .and_then(|head| head.get("InstanceType"))
        .and_then(ParamValue::as_str)
        .and_then(|name| facts.instance_type(name).ok().flatten())
        .map(|info| info.architecture);
    let Some(head_arch) = head_arch else {
        return findings;
    };
    for resource in config.sections_of(COMPUTE_RESOURCE_SECTION) {
        let Some(name) = resource.get("InstanceType").and_then(ParamValue::as_str) else {
            continue;
        };
        if let Ok(Some(info)) = facts.instance_type(name)
            && info.architecture != head_arch
        {
            findings.push(ValidationFinding::error(
                "architecture_consistency",
                format!(
                    "compute resource '{}' uses architecture '{}' but the head node uses '{}'",
                    resource.label, info.architecture, head_arch
                ),
            ));
        }
    }
    findings
}

/// Queue subnets should live in the head node's availability zone.
fn subnet_zone_consistency(
    config: &ClusterConfig,
    facts: &dyn ComputeFacts,
) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    let head_zone = config
        .section(HEAD_NODE_SECTION, DEFAULT_LABEL)
        .and_then(|head| head.get("SubnetId"))
        .and_then(ParamValue::as_str)
        .and_then(|id| facts.subnet(id).ok().flatten())
        .map(|info| info.availability_zone);
    let Some(head_zone) = head_zone else {
        return findings;
    };
    for queue in config.sections_of(SLURM_QUEUE_SECTION) {
        let Some(subnets) = queue.get("SubnetIds").and_then(ParamValue::as_str_list) else {
            continue;
        };
        for subnet_id in subnets {
            match facts.subnet(subnet_id) {
                Ok(Some(info)) if info.availability_zone != head_zone => {
                    findings.push(ValidationFinding::error(
                        "subnet_zone",
                        format!(
                            "queue '{}' subnet '{subnet_id}' is in zone '{}' but the head node is \
                             in '{head_zone}'",
                            queue.label, info.availability_zone
                        ),
                    ));
                }
                Ok(Some(_)) => {}
                Ok(None) => findings.push(ValidationFinding::error(
                    "subnet_exists",
                    format!("queue '{}' references unknown subnet '{subnet_id}'", queue.label),
                )),
                Err(err) => findings.push(ValidationFinding::warning(
                    "subnet_exists",
                    format!("could not verify subnet '{subnet_id}': {err}"),
                )),
            }
        }
    }
    findings
}

/// Shared storage mount points must be unique.
fn mount_dir_uniqueness(config: &ClusterConfig) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for storage in config.sections_of(SHARED_STORAGE_SECTION) {
        if let Some(mount_dir) = storage.get("MountDir").and_then(ParamValue::as_str)
            && !seen.insert(mount_dir)
        {
            findings.push(ValidationFinding::error(
                "mount_dir_unique",
                format!("mount point '{mount_dir}' is declared more than once"),
            ));
        }
    }
    findings
}

/// Collects every (section, instance type) reference in the configuration.
fn instance_type_refs(config: &ClusterConfig) -> Vec<(String, String)> {
    let mut refs = Vec::new();
    if let Some(head) = config.section(HEAD_NODE_SECTION, DEFAULT_LABEL)
        && let Some(name) = head.get("InstanceType").and_then(ParamValue::as_str)
    {
        refs.push((HEAD_NODE_SECTION.to_string(), name.to_string()));
    }
    for resource in config.sections_of(COMPUTE_RESOURCE_SECTION) {
        if let Some(name) = resource.get("InstanceType").and_then(ParamValue::as_str) {
            refs.push((format!("{COMPUTE_RESOURCE_SECTION}[{}]", resource.label), name.to_string()));
        }
    }
    refs
}

// ============================================================================
// SECTION: Dry-Run Validators
// ============================================================================

/// Runs the live dry-run probes against the target account.
///
/// Probes are single-attempt; a collaborator error is reported as a
/// warning finding rather than retried.
#[must_use]
pub fn run_dry_run_validators(
    cluster: &ClusterName,
    stack: &dyn StackClient,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    let stack_name = StackName::for_cluster(cluster);
    match stack.stack_exists(&stack_name) {
        Ok(true) => report.push(ValidationFinding::error(
            "stack_name_collision",
            format!("a stack named '{stack_name}' already exists"),
        )),
        Ok(false) => {}
        Err(err) => report.push(ValidationFinding::warning(
            "stack_name_collision",
            format!("could not probe stack '{stack_name}': {err}"),
        )),
    }
    report
}
