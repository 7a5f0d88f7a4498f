// peakstack-core/src/core/catalog.rs
// ============================================================================
// Module: Peakstack Cluster Schema Catalog
// Description: Built-in section and parameter catalog for HPC clusters.
// Purpose: Declare the cluster configuration model with update policies.
// Dependencies: crate::core::{finding, param, schema, section, value}
// ============================================================================

//! ## Overview
//! The catalog declares every section kind of the cluster model: the
//! cluster-wide root, head node, networking, scheduling with its scheduler
//! variants, Slurm queues and compute resources, shared storage, and
//! monitoring. Each parameter carries the update policy that governs
//! changes to it; anything left unspecified falls back to the most
//! conservative policy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::config::ClusterConfig;
use crate::core::error::ConfigError;
use crate::core::finding::ValidationFinding;
use crate::core::param::ParamSpec;
use crate::core::schema::SchemaBuilder;
use crate::core::schema::SchemaRegistry;
use crate::core::section::ParentRef;
use crate::core::section::Section;
use crate::core::section::SectionSpec;
use crate::core::value::AllowedValues;
use crate::core::value::ParamValue;
use crate::core::value::ValueKind;

// ============================================================================
// SECTION: Policy Names
// ============================================================================

/// Change is applied silently and never surfaced.
pub const IGNORED_POLICY: &str = "IGNORED";
/// Change is applied live and surfaced to the operator.
pub const SUPPORTED_POLICY: &str = "SUPPORTED";
/// Change requires the compute fleet to be stopped (additions exempt).
pub const COMPUTE_FLEET_STOP_POLICY: &str = "COMPUTE_FLEET_STOP";
/// Change allowed under a fleet stop or a queue replacement strategy.
pub const QUEUE_UPDATE_STRATEGY_POLICY: &str = "QUEUE_UPDATE_STRATEGY";
/// Managed placement-group teardown; fleet stop is never relaxed.
pub const MANAGED_PLACEMENT_GROUP_POLICY: &str = "MANAGED_PLACEMENT_GROUP";
/// Field is fixed at creation time.
pub const READ_ONLY_POLICY: &str = "READ_ONLY";
/// Change requires the head node to be stopped.
pub const HEAD_NODE_STOP_POLICY: &str = "HEAD_NODE_STOP";
/// Change is not supported by any procedure.
pub const UNSUPPORTED_POLICY: &str = "UNSUPPORTED";
/// Shrinking a maximum count requires a stopped fleet; growth is free.
pub const MAX_COUNT_SHRINK_POLICY: &str = "MAX_COUNT_SHRINK";

// ============================================================================
// SECTION: Section Keys
// ============================================================================

/// Cluster-wide root section kind.
pub const CLUSTER_SECTION: &str = "Cluster";
/// Head node section kind.
pub const HEAD_NODE_SECTION: &str = "HeadNode";
/// Networking section kind.
pub const NETWORK_SECTION: &str = "Network";
/// Scheduling section kind.
pub const SCHEDULING_SECTION: &str = "Scheduling";
/// Slurm queue section kind.
pub const SLURM_QUEUE_SECTION: &str = "SlurmQueue";
/// Compute resource section kind.
pub const COMPUTE_RESOURCE_SECTION: &str = "ComputeResource";
/// Shared storage section kind.
pub const SHARED_STORAGE_SECTION: &str = "SharedStorage";
/// Monitoring section kind.
pub const MONITORING_SECTION: &str = "Monitoring";

/// Maximum queues per cluster.
pub const MAX_QUEUES: usize = 10;
/// Maximum compute resources per queue.
pub const MAX_COMPUTE_RESOURCES: usize = 5;
/// Maximum shared storage mounts per cluster.
pub const MAX_SHARED_STORAGE: usize = 5;
/// Soft cap on the summed maximum compute capacity of a cluster.
pub const MAX_CLUSTER_CAPACITY: i64 = 500;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Builds the built-in cluster schema registry.
///
/// # Errors
///
/// Returns [`ConfigError::Schema`] when the catalog itself is inconsistent;
/// this indicates a programming error in the catalog.
pub fn cluster_schema() -> Result<SchemaRegistry, ConfigError> {
    SchemaBuilder::new()
        .root(cluster_section()?)
        .section(head_node_section())
        .section(network_section())
        .section(scheduling_section())
        .section(slurm_queue_section())
        .section(compute_resource_section())
        .section(shared_storage_section()?)
        .section(monitoring_section())
        .build()
}

/// Cluster-wide root section.
fn cluster_section() -> Result<SectionSpec, ConfigError> {
    Ok(SectionSpec::new(CLUSTER_SECTION)
        .with_param(
            ParamSpec::new("Region", ValueKind::Str)
                .required()
                .with_allowed(AllowedValues::pattern(r"[a-z]{2}(-[a-z]+)+-\d")?)
                .with_policy(READ_ONLY_POLICY),
        )
        .with_param(
            ParamSpec::new("CustomBucket", ValueKind::Str).with_policy(READ_ONLY_POLICY),
        )
        .with_param(ParamSpec::new("Tags", ValueKind::Json).with_policy(SUPPORTED_POLICY))
        .with_param(
            ParamSpec::new("InternalArtifactPrefix", ValueKind::Str)
                .private()
                .with_default(ParamValue::Str("peakstack".to_string()))
                .with_policy(IGNORED_POLICY),
        )
        .with_settings_ref("HeadNode", HEAD_NODE_SECTION, false)
        .with_settings_ref("Scheduling", SCHEDULING_SECTION, false)
        .with_settings_ref("SharedStorage", SHARED_STORAGE_SECTION, true)
        .with_settings_ref("Network", NETWORK_SECTION, false)
        .with_settings_ref("Monitoring", MONITORING_SECTION, false)
        .with_validator(cluster_capacity_cap))
}

/// Head node section.
fn head_node_section() -> SectionSpec {
    SectionSpec::new(HEAD_NODE_SECTION)
        .with_param(
            ParamSpec::new("InstanceType", ValueKind::Str)
                .required()
                .with_policy(HEAD_NODE_STOP_POLICY),
        )
        .with_param(
            ParamSpec::new("SubnetId", ValueKind::Str).required().with_policy(UNSUPPORTED_POLICY),
        )
        .with_param(ParamSpec::new("KeyName", ValueKind::Str).with_policy(HEAD_NODE_STOP_POLICY))
        .with_param(
            ParamSpec::new("RootVolumeSize", ValueKind::Int)
                .with_default(ParamValue::Int(40))
                .with_policy(HEAD_NODE_STOP_POLICY)
                .with_validator(root_volume_size_range),
        )
}

/// Networking section, autocreated with defaults when absent.
fn network_section() -> SectionSpec {
    SectionSpec::new(NETWORK_SECTION)
        .autocreated()
        .with_param(
            ParamSpec::new("SecurityGroups", ValueKind::StrList)
                .with_default(ParamValue::StrList(Vec::new()))
                .with_policy(SUPPORTED_POLICY),
        )
        .with_param(
            ParamSpec::new("AdditionalSecurityGroups", ValueKind::StrList)
                .with_policy(SUPPORTED_POLICY),
        )
        .with_param(
            ParamSpec::new("UsePublicIps", ValueKind::Bool)
                .with_default(ParamValue::Bool(true))
                .with_policy(COMPUTE_FLEET_STOP_POLICY),
        )
}

/// Scheduling section covering the scheduler variants.
fn scheduling_section() -> SectionSpec {
    SectionSpec::new(SCHEDULING_SECTION)
        .with_param(
            ParamSpec::new("Scheduler", ValueKind::Str)
                .required()
                .with_allowed(AllowedValues::one_of(["slurm", "elasticfleet", "plugin"]))
                .with_policy(UNSUPPORTED_POLICY),
        )
        .with_param(
            ParamSpec::new("QueueUpdateStrategy", ValueKind::Str)
                .with_allowed(AllowedValues::one_of(["COMPUTE_FLEET_STOP", "DRAIN", "TERMINATE"]))
                .with_default(ParamValue::Str("COMPUTE_FLEET_STOP".to_string()))
                .with_policy(IGNORED_POLICY),
        )
        .with_param(
            ParamSpec::new("ScaledownIdleTime", ValueKind::Int)
                .with_default(ParamValue::Int(10))
                .with_policy(SUPPORTED_POLICY),
        )
        .with_param(
            ParamSpec::new("FleetMaxVcpus", ValueKind::Int)
                .with_default(ParamValue::Int(256))
                .with_policy(MAX_COUNT_SHRINK_POLICY),
        )
        .with_param(
            ParamSpec::new("PluginDefinition", ValueKind::Json)
                .with_policy(COMPUTE_FLEET_STOP_POLICY),
        )
        .with_settings_ref("SlurmQueues", SLURM_QUEUE_SECTION, true)
        .with_validator(scheduler_variant_consistency)
}

/// Slurm queue section.
fn slurm_queue_section() -> SectionSpec {
    SectionSpec::new(SLURM_QUEUE_SECTION)
        .with_max_instances(MAX_QUEUES)
        .with_policy(QUEUE_UPDATE_STRATEGY_POLICY)
        .with_param(ParamSpec::new("Name", ValueKind::Str).required().with_policy(READ_ONLY_POLICY))
        .with_param(
            ParamSpec::new("CapacityType", ValueKind::Str)
                .with_allowed(AllowedValues::one_of(["ONDEMAND", "SPOT"]))
                .with_default(ParamValue::Str("ONDEMAND".to_string()))
                .with_policy(QUEUE_UPDATE_STRATEGY_POLICY),
        )
        .with_param(
            ParamSpec::new("SubnetIds", ValueKind::StrList)
                .required()
                .with_policy(COMPUTE_FLEET_STOP_POLICY),
        )
        .with_param(
            ParamSpec::new("PlacementGroupEnabled", ValueKind::Bool)
                .with_default(ParamValue::Bool(false))
                .with_policy(MANAGED_PLACEMENT_GROUP_POLICY),
        )
        .with_param(
            ParamSpec::new("PlacementGroupName", ValueKind::Str)
                .with_policy(MANAGED_PLACEMENT_GROUP_POLICY),
        )
        .with_settings_ref("ComputeResources", COMPUTE_RESOURCE_SECTION, true)
        .with_validator(queue_requires_compute_resources)
}

/// Compute resource section.
fn compute_resource_section() -> SectionSpec {
    SectionSpec::new(COMPUTE_RESOURCE_SECTION)
        .with_max_instances(MAX_COMPUTE_RESOURCES)
        .with_policy(COMPUTE_FLEET_STOP_POLICY)
        .with_param(ParamSpec::new("Name", ValueKind::Str).required().with_policy(READ_ONLY_POLICY))
        .with_param(
            ParamSpec::new("InstanceType", ValueKind::Str)
                .required()
                .with_policy(COMPUTE_FLEET_STOP_POLICY),
        )
        .with_param(
            ParamSpec::new("MinCount", ValueKind::Int)
                .with_default(ParamValue::Int(0))
                .with_policy(COMPUTE_FLEET_STOP_POLICY)
                .with_validator(non_negative_count),
        )
        .with_param(
            ParamSpec::new("MaxCount", ValueKind::Int)
                .with_derived_default(&["MinCount"], default_max_count)
                .with_policy(MAX_COUNT_SHRINK_POLICY)
                .with_validator(positive_count),
        )
        .with_param(
            ParamSpec::new("SpotPrice", ValueKind::Float).with_policy(COMPUTE_FLEET_STOP_POLICY),
        )
        .with_param(
            ParamSpec::new("DisableSimultaneousMultithreading", ValueKind::Bool)
                .with_default(ParamValue::Bool(false))
                .with_policy(COMPUTE_FLEET_STOP_POLICY),
        )
        .with_param(
            ParamSpec::new("EfaEnabled", ValueKind::Bool)
                .with_default(ParamValue::Bool(false))
                .with_policy(COMPUTE_FLEET_STOP_POLICY),
        )
        .with_validator(compute_resource_counts)
}

/// Shared storage section.
fn shared_storage_section() -> Result<SectionSpec, ConfigError> {
    Ok(SectionSpec::new(SHARED_STORAGE_SECTION)
        .with_max_instances(MAX_SHARED_STORAGE)
        .with_policy(UNSUPPORTED_POLICY)
        .with_param(ParamSpec::new("Name", ValueKind::Str).required().with_policy(READ_ONLY_POLICY))
        .with_param(
            ParamSpec::new("StorageType", ValueKind::Str)
                .required()
                .with_allowed(AllowedValues::one_of(["Ebs", "Efs", "Lustre"]))
                .with_policy(UNSUPPORTED_POLICY),
        )
        .with_param(
            ParamSpec::new("MountDir", ValueKind::Str)
                .required()
                .with_allowed(AllowedValues::pattern(r"/[a-zA-Z0-9_/-]+")?)
                .with_policy(UNSUPPORTED_POLICY),
        )
        .with_param(
            ParamSpec::new("Size", ValueKind::Int)
                .with_default(ParamValue::Int(100))
                .with_policy(SUPPORTED_POLICY)
                .with_validator(storage_size_min),
        )
        .with_param(
            ParamSpec::new("DeletionPolicy", ValueKind::Str)
                .with_allowed(AllowedValues::one_of(["Delete", "Retain"]))
                .with_default(ParamValue::Str("Delete".to_string()))
                .with_policy(SUPPORTED_POLICY),
        ))
}

/// Monitoring section, packed into one storage entry.
fn monitoring_section() -> SectionSpec {
    SectionSpec::new(MONITORING_SECTION)
        .autocreated()
        .packed()
        .with_param(
            ParamSpec::new("DetailedMonitoring", ValueKind::Bool)
                .with_default(ParamValue::Bool(false))
                .with_policy(SUPPORTED_POLICY),
        )
        .with_param(
            ParamSpec::new("LogRetentionDays", ValueKind::Int)
                .with_allowed(AllowedValues::one_of([
                    "1", "3", "5", "7", "14", "30", "60", "90", "180", "365",
                ]))
                .with_default(ParamValue::Int(14))
                .with_policy(SUPPORTED_POLICY),
        )
        .with_param(
            ParamSpec::new("DashboardEnabled", ValueKind::Bool)
                .with_default(ParamValue::Bool(true))
                .with_policy(SUPPORTED_POLICY),
        )
}

// ============================================================================
// SECTION: Derived Defaults
// ============================================================================

/// Default maximum count: at least ten, never below the minimum count.
fn default_max_count(section: &Section) -> Option<ParamValue> {
    let min = section.get("MinCount").and_then(ParamValue::as_int).unwrap_or(0);
    Some(ParamValue::Int(min.max(10)))
}

// ============================================================================
// SECTION: Parameter Validators
// ============================================================================

/// Root volume must be between 25 and 1000 GiB.
fn root_volume_size_range(key: &str, value: &ParamValue) -> Vec<ValidationFinding> {
    match value.as_int() {
        Some(size) if (25..=1000).contains(&size) => Vec::new(),
        Some(size) => vec![ValidationFinding::error(
            "root_volume_size",
            format!("'{key}' must be between 25 and 1000 GiB, got {size}"),
        )],
        None => Vec::new(),
    }
}

/// Counts must not be negative.
fn non_negative_count(key: &str, value: &ParamValue) -> Vec<ValidationFinding> {
    match value.as_int() {
        Some(count) if count < 0 => vec![ValidationFinding::error(
            "negative_count",
            format!("'{key}' must not be negative, got {count}"),
        )],
        _ => Vec::new(),
    }
}

/// Counts must be strictly positive.
fn positive_count(key: &str, value: &ParamValue) -> Vec<ValidationFinding> {
    match value.as_int() {
        Some(count) if count < 1 => vec![ValidationFinding::error(
            "positive_count",
            format!("'{key}' must be at least 1, got {count}"),
        )],
        _ => Vec::new(),
    }
}

/// Storage volumes must be at least 10 GiB.
fn storage_size_min(key: &str, value: &ParamValue) -> Vec<ValidationFinding> {
    match value.as_int() {
        Some(size) if size < 10 => vec![ValidationFinding::error(
            "storage_size",
            format!("'{key}' must be at least 10 GiB, got {size}"),
        )],
        _ => Vec::new(),
    }
}

// ============================================================================
// SECTION: Section Validators
// ============================================================================

/// Scheduler variants require their matching sections and definitions.
fn scheduler_variant_consistency(
    section: &Section,
    config: &ClusterConfig,
) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    let scheduler = section.get("Scheduler").and_then(ParamValue::as_str).unwrap_or_default();
    match scheduler {
        "slurm" => {
            if config.sections_of(SLURM_QUEUE_SECTION).is_empty() {
                findings.push(ValidationFinding::error(
                    "scheduler_queues",
                    "scheduler 'slurm' requires at least one entry in SlurmQueues",
                ));
            }
        }
        "plugin" => {
            if section.get("PluginDefinition").is_none() {
                findings.push(ValidationFinding::error(
                    "scheduler_plugin",
                    "scheduler 'plugin' requires PluginDefinition",
                ));
            }
        }
        "elasticfleet" => {
            if !config.sections_of(SLURM_QUEUE_SECTION).is_empty() {
                findings.push(ValidationFinding::error(
                    "scheduler_queues",
                    "scheduler 'elasticfleet' does not accept SlurmQueues",
                ));
            }
        }
        _ => {}
    }
    findings
}

/// Every queue needs at least one compute resource.
fn queue_requires_compute_resources(
    section: &Section,
    config: &ClusterConfig,
) -> Vec<ValidationFinding> {
    let parent = ParentRef {
        key: section.key.clone(),
        label: section.label.clone(),
    };
    if config.children_of(&parent, COMPUTE_RESOURCE_SECTION).is_empty() {
        vec![ValidationFinding::error(
            "queue_compute_resources",
            format!("queue '{}' declares no compute resources", section.label),
        )]
    } else {
        Vec::new()
    }
}

/// Minimum count must not exceed maximum count.
fn compute_resource_counts(section: &Section, _config: &ClusterConfig) -> Vec<ValidationFinding> {
    let min = section.get("MinCount").and_then(ParamValue::as_int).unwrap_or(0);
    let max = section.get("MaxCount").and_then(ParamValue::as_int).unwrap_or(0);
    if min > max {
        vec![ValidationFinding::error(
            "count_ordering",
            format!(
                "compute resource '{}' has MinCount {min} greater than MaxCount {max}",
                section.label
            ),
        )]
    } else {
        Vec::new()
    }
}

/// Summed maximum capacity above the soft cap is surfaced as a warning.
fn cluster_capacity_cap(_section: &Section, config: &ClusterConfig) -> Vec<ValidationFinding> {
    let total: i64 = config
        .sections_of(COMPUTE_RESOURCE_SECTION)
        .iter()
        .filter_map(|resource| resource.get("MaxCount").and_then(ParamValue::as_int))
        .sum();
    if total > MAX_CLUSTER_CAPACITY {
        vec![ValidationFinding::warning(
            "cluster_capacity",
            format!(
                "summed MaxCount {total} exceeds the recommended cluster capacity \
                 {MAX_CLUSTER_CAPACITY}"
            ),
        )]
    } else {
        Vec::new()
    }
}
