// peakstack-core/src/runtime/policy.rs
// ============================================================================
// Module: Peakstack Update Policy Engine
// Description: Per-change update policies, condition checkers, and verdicts.
// Purpose: Decide whether each configuration change is safe to apply live.
// Dependencies: crate::core, crate::runtime::diff
// ============================================================================

//! ## Overview
//! Every configuration field maps to exactly one update policy. The engine
//! resolves the policy for each [`Change`] through the schema registry,
//! evaluates the policy's condition against the patch and live cluster
//! context, and aggregates per-change verdicts into an overall verdict.
//! When a change matches more than one candidate policy, the policy with
//! the higher severity level wins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::catalog::COMPUTE_FLEET_STOP_POLICY;
use crate::core::catalog::HEAD_NODE_STOP_POLICY;
use crate::core::catalog::IGNORED_POLICY;
use crate::core::catalog::MANAGED_PLACEMENT_GROUP_POLICY;
use crate::core::catalog::MAX_COUNT_SHRINK_POLICY;
use crate::core::catalog::QUEUE_UPDATE_STRATEGY_POLICY;
use crate::core::catalog::READ_ONLY_POLICY;
use crate::core::catalog::SUPPORTED_POLICY;
use crate::core::catalog::UNSUPPORTED_POLICY;
use crate::core::identifiers::PolicyName;
use crate::core::param::UNKNOWN_POLICY;
use crate::core::schema::SchemaRegistry;
use crate::interfaces::FleetStatus;
use crate::interfaces::InstanceState;
use crate::runtime::diff::Change;
use crate::runtime::diff::ContextError;
use crate::runtime::diff::Patch;
use crate::runtime::diff::PathSegment;
use crate::runtime::diff::value_at;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// The conservative default queue replacement strategy.
pub const DEFAULT_QUEUE_UPDATE_STRATEGY: &str = "COMPUTE_FLEET_STOP";

// ============================================================================
// SECTION: Change Results
// ============================================================================

/// Terminal result of evaluating one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeResult {
    /// The change may be applied live.
    Succeeded,
    /// The change needs an operator action (stop the fleet, set a strategy).
    ActionNeeded,
    /// The change is rejected outright.
    Failed,
}

/// Verdict for one change, with remediation text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeVerdict {
    /// Full change location, e.g.
    /// `Scheduling/SlurmQueues[q1]/ComputeResources[cr1]/MaxCount`.
    pub location: String,
    /// Base value; `None` for additions.
    pub old_value: Option<Value>,
    /// Target value; `None` for removals.
    pub new_value: Option<Value>,
    /// Policy that governed the change.
    pub policy: PolicyName,
    /// Evaluation result.
    pub result: ChangeResult,
    /// Why the change was denied, when it was.
    pub fail_reason: Option<String>,
    /// What the operator must do before retrying, when denied.
    pub action_needed: Option<String>,
    /// Whether the verdict is surfaced to the operator.
    pub should_display: bool,
}

/// Aggregate verdict for a whole update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateVerdict {
    /// Per-change verdicts in diff order.
    pub changes: Vec<ChangeVerdict>,
    /// True when every change succeeded.
    pub allowed: bool,
}

impl UpdateVerdict {
    /// Returns the verdicts that should be shown to the operator.
    #[must_use]
    pub fn displayable(&self) -> Vec<&ChangeVerdict> {
        self.changes.iter().filter(|verdict| verdict.should_display).collect()
    }
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

/// Condition families shared across the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Always succeeds.
    AllowAlways,
    /// Always fails.
    Deny,
    /// Succeeds iff the compute fleet is stopped; additions are exempt.
    FleetStopped,
    /// Succeeds under a fleet stop, or when the target declares a
    /// non-default queue replacement strategy. Removals additionally require
    /// every old list element to remain present in the target list.
    QueueUpdateStrategy,
    /// Managed placement-group teardown forces the strict fleet-stop
    /// requirement even when a relaxing strategy is declared.
    ManagedPlacementGroup,
    /// Succeeds only when both sides are effectively unset.
    ReadOnly,
    /// Succeeds iff the head node instance is stopped.
    HeadNodeStopped,
    /// Succeeds when the fleet is stopped or the maximum did not shrink.
    MaxCountShrink,
}

impl Condition {
    /// Evaluates the condition for one change.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when live cluster state cannot be read.
    pub fn check(self, change: &Change, patch: &Patch<'_>) -> Result<bool, ContextError> {
        match self {
            Self::AllowAlways => Ok(true),
            Self::Deny => Ok(false),
            Self::FleetStopped => {
                if change.is_addition() {
                    return Ok(true);
                }
                Ok(fleet_stopped(patch)?)
            }
            Self::QueueUpdateStrategy => {
                if change.is_addition() {
                    return Ok(true);
                }
                let stopped = fleet_stopped(patch)?;
                let overridden = strategy_overridden(patch);
                if change.is_removal() {
                    Ok(stopped || (overridden && patch.old_values_preserved(change)))
                } else {
                    Ok(stopped || overridden)
                }
            }
            Self::ManagedPlacementGroup => {
                if change.is_addition() {
                    return Ok(true);
                }
                let stopped = fleet_stopped(patch)?;
                if is_managed_group_teardown(change, patch) {
                    Ok(stopped)
                } else {
                    Ok(stopped || strategy_overridden(patch))
                }
            }
            Self::ReadOnly => {
                Ok(effectively_unset(change.old_value.as_ref())
                    && effectively_unset(change.new_value.as_ref()))
            }
            Self::HeadNodeStopped => {
                Ok(matches!(patch.cluster.head_node_state()?, InstanceState::Stopped))
            }
            Self::MaxCountShrink => {
                let stopped = fleet_stopped(patch)?;
                let old = change.old_value.as_ref().and_then(Value::as_i64).unwrap_or(0);
                let new = change.new_value.as_ref().and_then(Value::as_i64).unwrap_or(0);
                Ok(stopped || new >= old)
            }
        }
    }
}

/// Returns true when the live fleet reports no running capacity.
fn fleet_stopped(patch: &Patch<'_>) -> Result<bool, ContextError> {
    Ok(matches!(patch.cluster.fleet_status()?, FleetStatus::Stopped))
}

/// Returns true when the target declares a non-default replacement strategy.
fn strategy_overridden(patch: &Patch<'_>) -> bool {
    patch
        .target_queue_update_strategy()
        .is_some_and(|strategy| strategy != DEFAULT_QUEUE_UPDATE_STRATEGY)
}

/// Returns true for a value that is absent, null, or empty.
fn effectively_unset(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Detects teardown of a cloud-managed (unnamed) placement group.
fn is_managed_group_teardown(change: &Change, patch: &Patch<'_>) -> bool {
    if change.key != "PlacementGroupEnabled" {
        return false;
    }
    let was_enabled = change.old_value.as_ref().and_then(Value::as_bool) == Some(true);
    let now_enabled = change.new_value.as_ref().and_then(Value::as_bool) == Some(true);
    if !was_enabled || now_enabled {
        return false;
    }
    let named = value_at(&patch.base, &change.path)
        .and_then(|container| container.get("PlacementGroupName"))
        .and_then(Value::as_str)
        .is_some_and(|name| !name.is_empty());
    !named
}

// ============================================================================
// SECTION: Update Policy
// ============================================================================

/// Text computed from the change and surrounding patch context.
pub type ReasonFn = fn(&Change, &Patch<'_>) -> String;

/// One named update policy: a plain data record of pure functions.
#[derive(Debug, Clone)]
pub struct UpdatePolicy {
    /// Policy name.
    pub name: PolicyName,
    /// Severity level; the higher level wins among candidates.
    pub level: i32,
    /// Condition deciding whether the change may proceed.
    pub condition: Condition,
    /// Result reported when the condition denies the change.
    pub on_deny: ChangeResult,
    /// Why a denied change was denied.
    pub fail_reason: ReasonFn,
    /// What the operator must do before retrying.
    pub action_needed: ReasonFn,
    /// Whether a successful change is still surfaced to the operator.
    pub print_even_if_succeeded: bool,
}

/// Builds the built-in policy table.
#[must_use]
pub fn builtin_policies() -> Vec<UpdatePolicy> {
    vec![
        UpdatePolicy {
            name: PolicyName::new(IGNORED_POLICY),
            level: -10,
            condition: Condition::AllowAlways,
            on_deny: ChangeResult::Failed,
            fail_reason: no_reason,
            action_needed: no_reason,
            print_even_if_succeeded: false,
        },
        UpdatePolicy {
            name: PolicyName::new(SUPPORTED_POLICY),
            level: 0,
            condition: Condition::AllowAlways,
            on_deny: ChangeResult::Failed,
            fail_reason: no_reason,
            action_needed: no_reason,
            print_even_if_succeeded: true,
        },
        UpdatePolicy {
            name: PolicyName::new(QUEUE_UPDATE_STRATEGY_POLICY),
            level: 40,
            condition: Condition::QueueUpdateStrategy,
            on_deny: ChangeResult::ActionNeeded,
            fail_reason: queue_strategy_reason,
            action_needed: queue_strategy_action,
            print_even_if_succeeded: true,
        },
        UpdatePolicy {
            name: PolicyName::new(MAX_COUNT_SHRINK_POLICY),
            level: 45,
            condition: Condition::MaxCountShrink,
            on_deny: ChangeResult::ActionNeeded,
            fail_reason: max_count_reason,
            action_needed: fleet_stop_action,
            print_even_if_succeeded: true,
        },
        UpdatePolicy {
            name: PolicyName::new(COMPUTE_FLEET_STOP_POLICY),
            level: 50,
            condition: Condition::FleetStopped,
            on_deny: ChangeResult::ActionNeeded,
            fail_reason: fleet_stop_reason,
            action_needed: fleet_stop_action,
            print_even_if_succeeded: true,
        },
        UpdatePolicy {
            name: PolicyName::new(MANAGED_PLACEMENT_GROUP_POLICY),
            level: 55,
            condition: Condition::ManagedPlacementGroup,
            on_deny: ChangeResult::ActionNeeded,
            fail_reason: managed_group_reason,
            action_needed: fleet_stop_action,
            print_even_if_succeeded: true,
        },
        UpdatePolicy {
            name: PolicyName::new(HEAD_NODE_STOP_POLICY),
            level: 60,
            condition: Condition::HeadNodeStopped,
            on_deny: ChangeResult::ActionNeeded,
            fail_reason: head_node_reason,
            action_needed: head_node_action,
            print_even_if_succeeded: true,
        },
        UpdatePolicy {
            name: PolicyName::new(READ_ONLY_POLICY),
            level: 90,
            condition: Condition::ReadOnly,
            on_deny: ChangeResult::Failed,
            fail_reason: read_only_reason,
            action_needed: restore_action,
            print_even_if_succeeded: true,
        },
        UpdatePolicy {
            name: PolicyName::new(UNSUPPORTED_POLICY),
            level: 95,
            condition: Condition::Deny,
            on_deny: ChangeResult::Failed,
            fail_reason: unsupported_reason,
            action_needed: restore_action,
            print_even_if_succeeded: true,
        },
        UpdatePolicy {
            name: PolicyName::new(UNKNOWN_POLICY),
            level: 100,
            condition: Condition::Deny,
            on_deny: ChangeResult::Failed,
            fail_reason: unknown_reason,
            action_needed: restore_action,
            print_even_if_succeeded: true,
        },
    ]
}

// ============================================================================
// SECTION: Reason Functions
// ============================================================================

/// Empty reason for policies that never deny.
fn no_reason(_change: &Change, _patch: &Patch<'_>) -> String {
    String::new()
}

/// Generic fleet-stop failure reason.
fn fleet_stop_reason(_change: &Change, _patch: &Patch<'_>) -> String {
    "All compute nodes must be stopped".to_string()
}

/// Generic fleet-stop remediation.
fn fleet_stop_action(_change: &Change, _patch: &Patch<'_>) -> String {
    "Stop the compute fleet and retry the update".to_string()
}

/// Failure reason for changes relaxable by a replacement strategy.
fn queue_strategy_reason(change: &Change, _patch: &Patch<'_>) -> String {
    if change.is_removal() {
        format!("Removing '{}' requires all compute nodes to be stopped", change.location())
    } else {
        "All compute nodes must be stopped or QueueUpdateStrategy must be set".to_string()
    }
}

/// Override remediation for strategy-relaxable changes.
fn queue_strategy_action(_change: &Change, _patch: &Patch<'_>) -> String {
    "Set Scheduling/QueueUpdateStrategy to DRAIN or TERMINATE, or stop the compute fleet"
        .to_string()
}

/// Failure reason for maximum-count shrink, embedding both counts.
fn max_count_reason(change: &Change, _patch: &Patch<'_>) -> String {
    let old = change.old_value.as_ref().and_then(Value::as_i64).unwrap_or(0);
    let new = change.new_value.as_ref().and_then(Value::as_i64).unwrap_or(0);
    format!("All compute nodes must be stopped to shrink '{}' from {old} to {new}", change.key)
}

/// Failure reason for managed placement-group teardown.
fn managed_group_reason(_change: &Change, _patch: &Patch<'_>) -> String {
    "All compute nodes must be stopped to delete a managed placement group".to_string()
}

/// Failure reason for head-node-bound changes.
fn head_node_reason(_change: &Change, _patch: &Patch<'_>) -> String {
    "The head node must be stopped".to_string()
}

/// Remediation for head-node-bound changes.
fn head_node_action(_change: &Change, _patch: &Patch<'_>) -> String {
    "Stop the head node and retry the update".to_string()
}

/// Failure reason for read-only fields.
fn read_only_reason(change: &Change, _patch: &Patch<'_>) -> String {
    format!("'{}' cannot be changed after cluster creation", change.location())
}

/// Remediation restoring the original value.
fn restore_action(change: &Change, _patch: &Patch<'_>) -> String {
    format!("Restore '{}' to its original value", change.location())
}

/// Failure reason for unsupported changes.
fn unsupported_reason(change: &Change, _patch: &Patch<'_>) -> String {
    format!("Updating '{}' is not supported", change.location())
}

/// Failure reason for unmapped fields.
fn unknown_reason(change: &Change, _patch: &Patch<'_>) -> String {
    format!("The effects of changing '{}' are unknown", change.location())
}

// ============================================================================
// SECTION: Policy Engine
// ============================================================================

/// Errors raised by the policy engine.
#[derive(Debug, Error)]
pub enum PolicyEngineError {
    /// A field references a policy absent from the table.
    #[error("unknown update policy '{0}'")]
    UnknownPolicy(String),
    /// Live cluster context could not be read.
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Evaluates patches against the policy table and schema registry.
pub struct UpdatePolicyEngine {
    /// Schema registry used to resolve field policies.
    registry: Arc<SchemaRegistry>,
    /// Policy table by name.
    table: BTreeMap<String, UpdatePolicy>,
}

impl UpdatePolicyEngine {
    /// Creates an engine over the built-in policy table.
    #[must_use]
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self::with_policies(registry, builtin_policies())
    }

    /// Creates an engine over an explicit policy table.
    #[must_use]
    pub fn with_policies(registry: Arc<SchemaRegistry>, policies: Vec<UpdatePolicy>) -> Self {
        let table = policies
            .into_iter()
            .map(|policy| (policy.name.as_str().to_string(), policy))
            .collect();
        Self {
            registry,
            table,
        }
    }

    /// Evaluates every change of a patch into an aggregate verdict.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyEngineError`] when a policy is missing from the table
    /// or live context cannot be read.
    pub fn evaluate(&self, patch: &Patch<'_>) -> Result<UpdateVerdict, PolicyEngineError> {
        let mut verdicts = Vec::with_capacity(patch.changes.len());
        for change in &patch.changes {
            let candidates = self.candidate_policies(change);
            let policy = self.select_policy(&candidates)?;
            let succeeded = policy.condition.check(change, patch)?;
            let verdict = if succeeded {
                ChangeVerdict {
                    location: change.location(),
                    old_value: change.old_value.clone(),
                    new_value: change.new_value.clone(),
                    policy: policy.name.clone(),
                    result: ChangeResult::Succeeded,
                    fail_reason: None,
                    action_needed: None,
                    should_display: policy.print_even_if_succeeded,
                }
            } else {
                ChangeVerdict {
                    location: change.location(),
                    old_value: change.old_value.clone(),
                    new_value: change.new_value.clone(),
                    policy: policy.name.clone(),
                    result: policy.on_deny,
                    fail_reason: Some((policy.fail_reason)(change, patch)),
                    action_needed: Some((policy.action_needed)(change, patch)),
                    should_display: true,
                }
            };
            verdicts.push(verdict);
        }
        let allowed =
            verdicts.iter().all(|verdict| verdict.result == ChangeResult::Succeeded);
        Ok(UpdateVerdict {
            changes: verdicts,
            allowed,
        })
    }

    /// Collects the candidate policies governing one change.
    ///
    /// The terminal field's parameter policy applies; a change that adds or
    /// removes a whole child section carries that section's policy. A field
    /// the schema cannot resolve falls back to the most conservative policy.
    #[must_use]
    pub fn candidate_policies(&self, change: &Change) -> Vec<PolicyName> {
        let mut names = Vec::new();
        let Ok(mut spec) = self.registry.root() else {
            return vec![PolicyName::new(UNKNOWN_POLICY)];
        };
        for segment in &change.path {
            let field = match segment {
                PathSegment::Field(name) => name,
                PathSegment::Indexed {
                    list, ..
                } => list,
            };
            let child = spec
                .settings_ref(field)
                .and_then(|reference| self.registry.section(&reference.child_section));
            match child {
                Some(child) => spec = child,
                None => return vec![PolicyName::new(UNKNOWN_POLICY)],
            }
        }
        if let Some(param) = spec.param(&change.key) {
            names.push(param.update_policy.clone());
        }
        if let Some(reference) = spec.settings_ref(&change.key)
            && let Some(child) = self.registry.section(&reference.child_section)
        {
            names.push(
                child
                    .update_policy
                    .clone()
                    .unwrap_or_else(|| PolicyName::new(UNKNOWN_POLICY)),
            );
        }
        if names.is_empty() {
            names.push(PolicyName::new(UNKNOWN_POLICY));
        }
        names
    }

    /// Selects the strictest (highest-level) policy among candidates.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyEngineError::UnknownPolicy`] when a candidate is not
    /// in the table, or when the candidate list is empty.
    pub fn select_policy(&self, candidates: &[PolicyName]) -> Result<&UpdatePolicy, PolicyEngineError> {
        let mut selected: Option<&UpdatePolicy> = None;
        for name in candidates {
            let policy = self
                .table
                .get(name.as_str())
                .ok_or_else(|| PolicyEngineError::UnknownPolicy(name.to_string()))?;
            selected = match selected {
                Some(current) if current.level >= policy.level => Some(current),
                _ => Some(policy),
            };
        }
        selected.ok_or_else(|| PolicyEngineError::UnknownPolicy("<none>".to_string()))
    }
}
