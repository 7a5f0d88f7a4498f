//! Error-kind to HTTP status mapping tests.
// peakstack-api/tests/error_mapping.rs
// ============================================================================
// Module: Error Mapping Tests
// Description: Lifecycle error kinds onto status codes and error bodies.
// Purpose: Ensure the API surfaces findings, verdicts, and retryability.
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

use axum::http::StatusCode;
use peakstack_api::error_response;
use peakstack_core::ChangeResult;
use peakstack_core::ChangeVerdict;
use peakstack_core::ClusterName;
use peakstack_core::ConcurrentUpdateError;
use peakstack_core::ClusterActionError;
use peakstack_core::ClusterUpdateError;
use peakstack_core::ConfigValidationError;
use peakstack_core::FindingLevel;
use peakstack_core::FleetStatus;
use peakstack_core::LifecycleError;
use peakstack_core::PolicyName;
use peakstack_core::UpdateVerdict;
use peakstack_core::ValidationFinding;

#[test]
fn validation_failures_map_to_400_with_findings() {
    let err = LifecycleError::Validation(ConfigValidationError {
        findings: vec![
            ValidationFinding::error("required_parameter", "parameter 'InstanceType' is required"),
            ValidationFinding::warning("cluster_capacity", "capacity above recommendation"),
        ],
        failure_level: FindingLevel::Error,
    });
    let (status, body) = error_response(&err);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.kind, "ConfigValidationError");
    let findings = body.findings.expect("full finding list attached");
    assert_eq!(findings.len(), 2, "warnings travel with errors");
    assert!(body.changes.is_none());
    assert!(!body.retryable);
}

#[test]
fn denied_updates_map_to_409_with_verdicts() {
    let err = LifecycleError::Update(ClusterUpdateError {
        verdict: UpdateVerdict {
            changes: vec![ChangeVerdict {
                location: "Scheduling/SlurmQueues[q1]/ComputeResources[cr1]/MaxCount".to_string(),
                old_value: Some(serde_json::json!(10)),
                new_value: Some(serde_json::json!(5)),
                policy: PolicyName::new("MAX_COUNT_SHRINK"),
                result: ChangeResult::ActionNeeded,
                fail_reason: Some("All compute nodes must be stopped".to_string()),
                action_needed: Some("Stop the compute fleet and retry the update".to_string()),
                should_display: true,
            }],
            allowed: false,
        },
    });
    let (status, body) = error_response(&err);
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.kind, "ClusterUpdateError");
    let changes = body.changes.expect("verdicts attached");
    assert_eq!(changes.len(), 1);
    assert!(changes[0].location.ends_with("MaxCount"));
}

#[test]
fn contention_maps_to_409_retryable() {
    let err = LifecycleError::Concurrent(ConcurrentUpdateError {
        cluster: ClusterName::new("hpc-alpha"),
        expected: FleetStatus::Running,
        actual: FleetStatus::Stopped,
    });
    let (status, body) = error_response(&err);
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.kind, "ConcurrentUpdateError");
    assert!(body.retryable, "contention must be marked retryable");
}

#[test]
fn missing_clusters_map_to_404() {
    let err = LifecycleError::NotFound(ClusterName::new("ghost"));
    let (status, body) = error_response(&err);
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.kind, "ClusterNotFoundError");
}

#[test]
fn collaborator_failures_map_to_502() {
    let err = LifecycleError::Action(ClusterActionError::new("create", "stack service exploded"));
    let (status, body) = error_response(&err);
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body.kind, "ClusterActionError");
    assert!(body.message.contains("stack service exploded"));
}

#[test]
fn error_bodies_serialize_without_empty_fields() {
    let err = LifecycleError::NotFound(ClusterName::new("ghost"));
    let (_, body) = error_response(&err);
    let json = serde_json::to_value(&body).expect("body serializes");
    assert!(json.get("findings").is_none(), "empty findings omitted: {json}");
    assert!(json.get("changes").is_none(), "empty changes omitted: {json}");
}
