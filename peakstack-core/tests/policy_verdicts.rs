//! Update-policy engine tests: conditions, verdicts, and dominance.
// peakstack-core/tests/policy_verdicts.rs
// ============================================================================
// Module: Policy Verdict Tests
// Description: Per-change verdicts under fleet state and strategy overrides.
// Purpose: Ensure the policy engine classifies changes exactly as specified.
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

use peakstack_core::ChangeResult;
use peakstack_core::ClusterConfig;
use peakstack_core::DocumentMode;
use peakstack_core::Patch;
use peakstack_core::PolicyName;
use peakstack_core::UpdatePolicyEngine;
use peakstack_core::UpdateVerdict;
use peakstack_core::core::catalog::COMPUTE_FLEET_STOP_POLICY;
use peakstack_core::core::catalog::MAX_COUNT_SHRINK_POLICY;
use peakstack_core::core::catalog::READ_ONLY_POLICY;
use peakstack_core::core::catalog::SUPPORTED_POLICY;
use serde_json::Value;
use serde_json::json;

use common::StubContext;
use common::base_doc;
use common::schema;

/// Resolves a document through the configuration model.
fn resolved(doc: &Value) -> Value {
    let registry = schema().expect("schema builds");
    ClusterConfig::from_document(Arc::clone(&registry), doc)
        .expect("document loads")
        .to_document(DocumentMode::User)
}

/// Evaluates base → target under the given live context.
fn evaluate(base: &Value, target: &Value, context: &StubContext) -> UpdateVerdict {
    let registry = schema().expect("schema builds");
    let engine = UpdatePolicyEngine::new(Arc::clone(&registry));
    let patch =
        Patch::new(resolved(base), resolved(target), context, &registry.named_list_fields());
    engine.evaluate(&patch).expect("evaluation succeeds")
}

/// Returns the single displayed verdict of an evaluation.
fn single_verdict(verdict: &UpdateVerdict) -> &peakstack_core::ChangeVerdict {
    assert_eq!(verdict.changes.len(), 1, "expected one change: {:?}", verdict.changes);
    &verdict.changes[0]
}

#[test]
fn max_count_shrink_while_running_needs_action() {
    let base = base_doc();
    let mut target = base_doc();
    target["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0]["MaxCount"] = json!(5);

    let verdict = evaluate(&base, &target, &StubContext::running());
    let change = single_verdict(&verdict);
    assert_eq!(change.result, ChangeResult::ActionNeeded);
    assert!(!verdict.allowed);
    let reason = change.fail_reason.as_deref().expect("fail reason present");
    assert!(
        reason.contains("compute nodes must be stopped"),
        "reason must reference the fleet stop: {reason}"
    );
    assert_eq!(change.policy, PolicyName::new(MAX_COUNT_SHRINK_POLICY));
}

#[test]
fn max_count_shrink_with_stopped_fleet_succeeds() {
    let base = base_doc();
    let mut target = base_doc();
    target["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0]["MaxCount"] = json!(5);

    let verdict = evaluate(&base, &target, &StubContext::stopped());
    let change = single_verdict(&verdict);
    assert_eq!(change.result, ChangeResult::Succeeded);
    assert!(verdict.allowed);
    assert!(change.fail_reason.is_none());
}

#[test]
fn max_count_growth_never_needs_a_stop() {
    let base = base_doc();
    let mut target = base_doc();
    target["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0]["MaxCount"] = json!(50);

    let verdict = evaluate(&base, &target, &StubContext::running());
    assert!(verdict.allowed, "growth must not require a stop: {:?}", verdict.changes);
}

#[test]
fn queue_addition_while_running_succeeds() {
    let base = base_doc();
    let mut target = base_doc();
    target["Scheduling"]["SlurmQueues"]
        .as_array_mut()
        .expect("queues array")
        .push(json!({
            "Name": "q2",
            "SubnetIds": ["subnet-compute"],
            "ComputeResources": [{"Name": "cr1", "InstanceType": "c5.xlarge"}]
        }));

    let verdict = evaluate(&base, &target, &StubContext::running());
    assert!(verdict.allowed, "additions never require a stop: {:?}", verdict.changes);
}

#[test]
fn queue_removal_while_running_needs_action() {
    let mut base = base_doc();
    base["Scheduling"]["SlurmQueues"]
        .as_array_mut()
        .expect("queues array")
        .push(json!({
            "Name": "q2",
            "SubnetIds": ["subnet-compute"],
            "ComputeResources": [{"Name": "cr1", "InstanceType": "c5.xlarge"}]
        }));
    let target = base_doc();

    let verdict = evaluate(&base, &target, &StubContext::running());
    let change = single_verdict(&verdict);
    assert_eq!(change.result, ChangeResult::ActionNeeded);
}

#[test]
fn queue_removal_is_not_relaxed_by_the_strategy_override() {
    let mut base = base_doc();
    base["Scheduling"]["SlurmQueues"]
        .as_array_mut()
        .expect("queues array")
        .push(json!({
            "Name": "q2",
            "SubnetIds": ["subnet-compute"],
            "ComputeResources": [{"Name": "cr1", "InstanceType": "c5.xlarge"}]
        }));
    let mut target = base_doc();
    target["Scheduling"]["QueueUpdateStrategy"] = json!("DRAIN");

    let verdict = evaluate(&base, &target, &StubContext::running());
    let denied: Vec<_> = verdict
        .changes
        .iter()
        .filter(|change| change.result != ChangeResult::Succeeded)
        .collect();
    assert_eq!(denied.len(), 1, "the removal must stay denied: {:?}", verdict.changes);
    assert!(denied[0].location.contains("SlurmQueues"));
}

#[test]
fn value_change_is_relaxed_by_the_strategy_override() {
    let base = base_doc();
    let mut target = base_doc();
    target["Scheduling"]["QueueUpdateStrategy"] = json!("DRAIN");
    target["Scheduling"]["SlurmQueues"][0]["CapacityType"] = json!("SPOT");

    let running = evaluate(&base, &target, &StubContext::running());
    assert!(running.allowed, "strategy override must relax value changes: {:?}", running.changes);

    let mut no_override = base_doc();
    no_override["Scheduling"]["SlurmQueues"][0]["CapacityType"] = json!("SPOT");
    let denied = evaluate(&base, &no_override, &StubContext::running());
    assert!(!denied.allowed, "without the override the change needs a stop");
}

#[test]
fn read_only_field_fails_regardless_of_fleet_state() {
    let mut base = base_doc();
    base["CustomBucket"] = json!("bucket-a");
    let mut target = base_doc();
    target["CustomBucket"] = json!("bucket-b");

    for context in [StubContext::running(), StubContext::stopped()] {
        let verdict = evaluate(&base, &target, &context);
        let change = single_verdict(&verdict);
        assert_eq!(change.result, ChangeResult::Failed);
        assert_eq!(change.policy, PolicyName::new(READ_ONLY_POLICY));
        let action = change.action_needed.as_deref().expect("remediation present");
        assert!(
            action.contains("Restore") && action.contains("original value"),
            "remediation must say to restore the original value: {action}"
        );
    }
}

#[test]
fn managed_placement_group_teardown_ignores_the_override() {
    let mut base = base_doc();
    base["Scheduling"]["SlurmQueues"][0]["PlacementGroupEnabled"] = json!(true);
    let mut target = base_doc();
    target["Scheduling"]["SlurmQueues"][0]["PlacementGroupEnabled"] = json!(false);
    target["Scheduling"]["QueueUpdateStrategy"] = json!("TERMINATE");

    let running = evaluate(&base, &target, &StubContext::running());
    assert!(!running.allowed, "managed teardown must require a stop: {:?}", running.changes);

    let stopped = evaluate(&base, &target, &StubContext::stopped());
    assert!(stopped.allowed, "a stopped fleet satisfies the strict requirement");
}

#[test]
fn named_placement_group_change_honors_the_override() {
    let mut base = base_doc();
    base["Scheduling"]["SlurmQueues"][0]["PlacementGroupEnabled"] = json!(true);
    base["Scheduling"]["SlurmQueues"][0]["PlacementGroupName"] = json!("external-group");
    let mut target = base_doc();
    target["Scheduling"]["SlurmQueues"][0]["PlacementGroupEnabled"] = json!(false);
    target["Scheduling"]["SlurmQueues"][0]["PlacementGroupName"] = json!("external-group");
    target["Scheduling"]["QueueUpdateStrategy"] = json!("DRAIN");

    let verdict = evaluate(&base, &target, &StubContext::running());
    assert!(
        verdict.allowed,
        "an externally named group is not a managed teardown: {:?}",
        verdict.changes
    );
}

#[test]
fn head_node_changes_require_a_stopped_head_node() {
    let base = base_doc();
    let mut target = base_doc();
    target["HeadNode"]["InstanceType"] = json!("c5n.18xlarge");

    let running = evaluate(&base, &target, &StubContext::running());
    let change = single_verdict(&running);
    assert_eq!(change.result, ChangeResult::ActionNeeded);
    assert!(
        change.fail_reason.as_deref().expect("reason").contains("head node"),
        "reason must name the head node"
    );

    let stopped_head = StubContext {
        fleet: peakstack_core::FleetStatus::Running,
        head: peakstack_core::InstanceState::Stopped,
    };
    let verdict = evaluate(&base, &target, &stopped_head);
    assert!(verdict.allowed);
}

#[test]
fn supported_changes_apply_live_and_are_displayed() {
    let base = base_doc();
    let mut target = base_doc();
    target["Tags"] = json!({"team": "hpc"});

    let verdict = evaluate(&base, &target, &StubContext::running());
    let change = single_verdict(&verdict);
    assert_eq!(change.result, ChangeResult::Succeeded);
    assert!(change.should_display, "supported changes are surfaced");
    assert_eq!(change.policy, PolicyName::new(SUPPORTED_POLICY));
}

#[test]
fn ignored_changes_are_not_displayed() {
    let base = base_doc();
    let mut target = base_doc();
    target["Scheduling"]["QueueUpdateStrategy"] = json!("DRAIN");

    let verdict = evaluate(&base, &target, &StubContext::running());
    let change = single_verdict(&verdict);
    assert_eq!(change.result, ChangeResult::Succeeded);
    assert!(!change.should_display, "ignored changes stay silent");
    assert!(verdict.displayable().is_empty());
}

#[test]
fn higher_severity_policy_dominates() {
    let registry = schema().expect("schema builds");
    let engine = UpdatePolicyEngine::new(Arc::clone(&registry));
    let candidates =
        [PolicyName::new(SUPPORTED_POLICY), PolicyName::new(COMPUTE_FLEET_STOP_POLICY)];
    let selected = engine.select_policy(&candidates).expect("policy resolves");
    assert_eq!(selected.name, PolicyName::new(COMPUTE_FLEET_STOP_POLICY));

    let reversed =
        [PolicyName::new(COMPUTE_FLEET_STOP_POLICY), PolicyName::new(SUPPORTED_POLICY)];
    let selected = engine.select_policy(&reversed).expect("policy resolves");
    assert_eq!(selected.name, PolicyName::new(COMPUTE_FLEET_STOP_POLICY));
}

#[test]
fn fleet_stop_gating_flips_with_identical_change_content() {
    let base = base_doc();
    let mut target = base_doc();
    target["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0]["InstanceType"] =
        json!("c5n.18xlarge");

    let running = evaluate(&base, &target, &StubContext::running());
    assert!(!running.allowed);
    assert_eq!(
        single_verdict(&running).policy,
        PolicyName::new(COMPUTE_FLEET_STOP_POLICY)
    );

    let stopped = evaluate(&base, &target, &StubContext::stopped());
    assert!(stopped.allowed);
}

#[test]
fn remediation_never_mixes_stop_and_override_instructions() {
    let base = base_doc();
    let mut shrink = base_doc();
    shrink["Scheduling"]["SlurmQueues"][0]["ComputeResources"][0]["MaxCount"] = json!(5);
    let verdict = evaluate(&base, &shrink, &StubContext::running());
    let action = single_verdict(&verdict).action_needed.as_deref().expect("action present");
    assert!(action.contains("Stop the compute fleet"));
    assert!(!action.contains("QueueUpdateStrategy"), "no override exists for this policy");

    let mut capacity = base_doc();
    capacity["Scheduling"]["SlurmQueues"][0]["CapacityType"] = json!("SPOT");
    let verdict = evaluate(&base, &capacity, &StubContext::running());
    let action = single_verdict(&verdict).action_needed.as_deref().expect("action present");
    assert!(
        action.contains("QueueUpdateStrategy"),
        "the override instruction must name the strategy: {action}"
    );
    assert!(!action.contains("retry the update"), "must not mix in the generic instruction");
}
