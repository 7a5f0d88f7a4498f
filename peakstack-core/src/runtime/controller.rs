// peakstack-core/src/runtime/controller.rs
// ============================================================================
// Module: Peakstack Cluster Lifecycle Controller
// Description: Create, update, delete, start, and stop cluster operations.
// Purpose: Orchestrate configuration, policy, and collaborator calls.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! The lifecycle controller is the single canonical execution path for
//! cluster operations. Every surface (CLI, HTTP) calls into these methods.
//! The controller validates configurations, persists versioned artifacts,
//! evaluates update policies over snapshot pairs, and drives the stack and
//! fleet collaborators; it performs compensating artifact cleanup when a
//! stack call fails mid-create.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::config::ClusterConfig;
use crate::core::config::DocumentMode;
use crate::core::error::ConfigError;
use crate::core::hashing::HashError;
use crate::core::identifiers::ClusterName;
use crate::core::identifiers::ConfigVersion;
use crate::core::identifiers::StackName;
use crate::core::schema::SchemaRegistry;
use crate::core::section::validate_label;
use crate::core::storage::StackParam;
use crate::interfaces::BlobContent;
use crate::interfaces::ComputeFacts;
use crate::interfaces::CreateStackRequest;
use crate::interfaces::FleetStatus;
use crate::interfaces::FleetStatusStore;
use crate::interfaces::FleetStoreError;
use crate::interfaces::InstanceState;
use crate::interfaces::ObjectStore;
use crate::interfaces::StackClient;
use crate::interfaces::StackError;
use crate::interfaces::StackStatus;
use crate::interfaces::StackTag;
use crate::runtime::diff::ContextError;
use crate::runtime::diff::Patch;
use crate::runtime::diff::UpdateContext;
use crate::runtime::policy::ChangeResult;
use crate::runtime::policy::PolicyEngineError;
use crate::runtime::policy::UpdatePolicyEngine;
use crate::runtime::policy::UpdateVerdict;
use crate::runtime::validator::ConfigValidationError;
use crate::runtime::validator::ValidateOptions;
use crate::runtime::validator::ensure_passes;
use crate::runtime::validator::run_dry_run_validators;
use crate::runtime::validator::run_fact_validators;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Stack parameter recording the persisted configuration version.
pub const CONFIG_VERSION_PARAM: &str = "PeakstackConfigVersion";
/// Stack parameter path of the scheduler kind.
pub const SCHEDULER_PARAM: &str = "Scheduling[default].Scheduler";
/// Stack parameter path of the managed fleet capacity.
pub const FLEET_CAPACITY_PARAM: &str = "Scheduling[default].FleetMaxVcpus";
/// Scheduler kind whose fleet is managed through target capacity.
pub const ELASTIC_FLEET_SCHEDULER: &str = "elasticfleet";
/// Default managed fleet capacity when none is recorded.
pub const DEFAULT_FLEET_CAPACITY: u64 = 256;

// ============================================================================
// SECTION: Artifact Layout
// ============================================================================

/// Object-store prefix holding every artifact of one cluster.
#[must_use]
pub fn cluster_prefix(cluster: &ClusterName) -> String {
    format!("clusters/{cluster}/")
}

/// Object-store prefix holding one configuration version.
#[must_use]
pub fn version_prefix(cluster: &ClusterName, version: &ConfigVersion) -> String {
    format!("clusters/{cluster}/versions/{version}/")
}

/// Key of the operator-supplied original document.
#[must_use]
pub fn original_key(cluster: &ClusterName, version: &ConfigVersion) -> String {
    format!("clusters/{cluster}/versions/{version}/original.yaml")
}

/// Key of the fully resolved document.
#[must_use]
pub fn resolved_key(cluster: &ClusterName, version: &ConfigVersion) -> String {
    format!("clusters/{cluster}/versions/{version}/resolved.json")
}

/// Key of the rendered infrastructure template.
#[must_use]
pub fn template_key(cluster: &ClusterName, version: &ConfigVersion) -> String {
    format!("clusters/{cluster}/versions/{version}/template.json")
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// External-collaborator failure during a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cluster {operation} failed: {message}")]
pub struct ClusterActionError {
    /// Operation that failed.
    pub operation: String,
    /// Collaborator failure description.
    pub message: String,
}

impl ClusterActionError {
    /// Creates a new action error.
    #[must_use]
    pub fn new(operation: &str, message: impl Into<String>) -> Self {
        Self {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

/// Update denied by the policy engine.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("update is not allowed: {} change(s) were denied", denied_count(verdict))]
pub struct ClusterUpdateError {
    /// Per-change verdicts with fail reasons and remediation.
    pub verdict: UpdateVerdict,
}

/// Counts denied changes for the error display.
fn denied_count(verdict: &UpdateVerdict) -> usize {
    verdict
        .changes
        .iter()
        .filter(|change| change.result != ChangeResult::Succeeded)
        .count()
}

/// Fleet status compare-and-swap lost a race; callers should retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "concurrent update on cluster '{cluster}': expected fleet status {expected:?}, found {actual:?}"
)]
pub struct ConcurrentUpdateError {
    /// Contended cluster.
    pub cluster: ClusterName,
    /// Status this operation expected.
    pub expected: FleetStatus,
    /// Status actually recorded.
    pub actual: FleetStatus,
}

/// Errors raised by lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Configuration validation failed at the requested threshold.
    #[error(transparent)]
    Validation(#[from] ConfigValidationError),
    /// The update-policy engine denied the update.
    #[error(transparent)]
    Update(#[from] ClusterUpdateError),
    /// A concurrent operation won the fleet-status race.
    #[error(transparent)]
    Concurrent(#[from] ConcurrentUpdateError),
    /// An external collaborator failed.
    #[error(transparent)]
    Action(#[from] ClusterActionError),
    /// The configuration document could not be represented.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The policy engine itself failed.
    #[error(transparent)]
    Policy(#[from] PolicyEngineError),
    /// Canonicalization of the resolved document failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// No cluster with this name exists.
    #[error("cluster '{0}' does not exist")]
    NotFound(ClusterName),
    /// A cluster with this name already exists.
    #[error("cluster '{0}' already exists")]
    AlreadyExists(ClusterName),
    /// The cluster is mid-transition and cannot accept the operation.
    #[error("cluster '{cluster}' is busy: stack status {status:?}")]
    Busy {
        /// Busy cluster.
        cluster: ClusterName,
        /// Transitional stack status.
        status: StackStatus,
    },
    /// The caller cancelled a bounded wait.
    #[error("operation cancelled")]
    Cancelled,
}

impl LifecycleError {
    /// Returns the stable machine-readable kind for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ConfigValidationError",
            Self::Update(_) => "ClusterUpdateError",
            Self::Concurrent(_) => "ConcurrentUpdateError",
            Self::Action(_) => "ClusterActionError",
            Self::Config(error) => error.kind(),
            Self::Policy(_) => "PolicyEngineError",
            Self::Hash(_) => "CanonicalizationError",
            Self::NotFound(_) => "ClusterNotFoundError",
            Self::AlreadyExists(_) => "ClusterExistsError",
            Self::Busy { .. } => "ClusterBusyError",
            Self::Cancelled => "CancelledError",
        }
    }
}

// ============================================================================
// SECTION: Cluster State
// ============================================================================

/// Lifecycle state of a cluster, derived from its stack status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterState {
    /// No stack exists.
    Absent,
    /// Stack creation in progress.
    Creating,
    /// Stack is stable and usable.
    Active,
    /// Stack update in progress.
    Updating,
    /// Stack deletion in progress.
    Deleting,
    /// The last stack operation failed.
    Failed,
}

impl From<StackStatus> for ClusterState {
    fn from(status: StackStatus) -> Self {
        match status {
            StackStatus::CreateInProgress => Self::Creating,
            StackStatus::CreateComplete | StackStatus::UpdateComplete => Self::Active,
            StackStatus::UpdateInProgress => Self::Updating,
            StackStatus::DeleteInProgress => Self::Deleting,
            StackStatus::CreateFailed | StackStatus::UpdateFailed | StackStatus::DeleteFailed => {
                Self::Failed
            }
        }
    }
}

/// Description of one cluster returned by read operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescription {
    /// Cluster name.
    pub name: ClusterName,
    /// Lifecycle state.
    pub state: ClusterState,
    /// Raw stack status.
    pub stack_status: StackStatus,
    /// Persisted configuration version, when recorded.
    pub config_version: Option<ConfigVersion>,
    /// Scheduler kind, when recorded.
    pub scheduler: Option<String>,
    /// Recorded fleet status.
    pub fleet_status: FleetStatus,
}

// ============================================================================
// SECTION: Options
// ============================================================================

/// Options for cluster creation.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Validation controls.
    pub validate: ValidateOptions,
    /// Disables automatic stack rollback on failure.
    pub disable_rollback: bool,
    /// Operator-supplied original document text, stored verbatim.
    pub original_text: Option<String>,
}

/// Options for cluster update.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Validation controls.
    pub validate: ValidateOptions,
    /// Applies the update even when the policy verdict denies it.
    pub force: bool,
    /// Operator-supplied original document text, stored verbatim.
    pub original_text: Option<String>,
}

/// Controller tuning knobs.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Object-store bucket holding configuration artifacts.
    pub bucket: String,
    /// Delay between stack status polls.
    pub poll_delay: Duration,
    /// Maximum number of stack status polls per wait.
    pub poll_limit: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            bucket: "peakstack-artifacts".to_string(),
            poll_delay: Duration::from_secs(5),
            poll_limit: 120,
        }
    }
}

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// Cancellation signal checked between polling iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    /// Shared cancellation flag.
    cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
    /// Creates a new, uncancelled signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true when cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Live Cluster Context
// ============================================================================

/// Live cluster state adapter over the fleet and facts collaborators.
struct LiveContext<'ctx> {
    /// Fleet status store.
    fleet: &'ctx dyn FleetStatusStore,
    /// Compute facts provider.
    facts: &'ctx dyn ComputeFacts,
    /// Cluster under update.
    cluster: &'ctx ClusterName,
}

impl UpdateContext for LiveContext<'_> {
    fn fleet_status(&self) -> Result<FleetStatus, ContextError> {
        self.fleet
            .get_status(self.cluster)
            .map_err(|err| ContextError::Unavailable(err.to_string()))
    }

    fn head_node_state(&self) -> Result<InstanceState, ContextError> {
        self.facts
            .head_node_state(self.cluster)
            .map_err(|err| ContextError::Unavailable(err.to_string()))
    }
}

// ============================================================================
// SECTION: Cluster Controller
// ============================================================================

/// Cluster lifecycle controller over the four collaborator interfaces.
pub struct ClusterController<S, O, F, C> {
    /// Stack lifecycle collaborator.
    stack: S,
    /// Object store collaborator.
    store: O,
    /// Fleet status store collaborator.
    fleet: F,
    /// Compute facts collaborator.
    facts: C,
    /// Schema registry.
    registry: Arc<SchemaRegistry>,
    /// Update-policy engine.
    policies: UpdatePolicyEngine,
    /// Controller settings.
    settings: ControllerSettings,
}

impl<S, O, F, C> ClusterController<S, O, F, C>
where
    S: StackClient,
    O: ObjectStore,
    F: FleetStatusStore,
    C: ComputeFacts,
{
    /// Creates a new controller.
    #[must_use]
    pub fn new(
        stack: S,
        store: O,
        fleet: F,
        facts: C,
        registry: Arc<SchemaRegistry>,
        settings: ControllerSettings,
    ) -> Self {
        let policies = UpdatePolicyEngine::new(Arc::clone(&registry));
        Self {
            stack,
            store,
            fleet,
            facts,
            registry,
            policies,
            settings,
        }
    }

    /// Creates a cluster from a declarative document.
    ///
    /// Persists the original and resolved documents keyed by the
    /// configuration version, then creates the stack. When the stack call
    /// fails, already-uploaded artifacts are deleted before the error
    /// propagates.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] for validation failures, name
    /// collisions, and collaborator faults.
    pub fn create(
        &self,
        name: &ClusterName,
        doc: &Value,
        options: &CreateOptions,
    ) -> Result<ClusterDescription, LifecycleError> {
        validate_label(name.as_str())?;
        let stack_name = StackName::for_cluster(name);
        if self
            .stack
            .stack_exists(&stack_name)
            .map_err(|err| ClusterActionError::new("create", err.to_string()))?
        {
            return Err(LifecycleError::AlreadyExists(name.clone()));
        }

        let mut config = ClusterConfig::from_document(Arc::clone(&self.registry), doc)?;
        let mut report = config.validate();
        if !options.validate.suppress_validators {
            report.extend(run_fact_validators(&config, &self.facts).findings);
            report.extend(run_dry_run_validators(name, &self.stack).findings);
        }
        let _report = ensure_passes(report, options.validate.failure_level)?;

        let version = config.version_token()?;
        config.set_config_version(version.clone());
        let template = render_template(&config);
        self.persist_version(name, &version, &config, &template, options.original_text.as_deref())?;

        let mut parameters = config.to_storage();
        parameters.push(StackParam::new(CONFIG_VERSION_PARAM, version.as_str()));
        let request = CreateStackRequest {
            name: stack_name,
            template,
            parameters,
            tags: cluster_tags(name, &version),
            disable_rollback: options.disable_rollback,
        };
        if let Err(err) = self.stack.create_stack(&request) {
            let _cleanup = self.store.delete_prefix(&self.settings.bucket, &version_prefix(name, &version));
            return Err(ClusterActionError::new("create", err.to_string()).into());
        }

        match self.fleet.compare_and_swap(
            name,
            FleetStatus::Unknown,
            FleetStatus::Starting,
            FleetStatus::Running,
        ) {
            Ok(()) | Err(FleetStoreError::Contention { .. }) => {}
            Err(err) => return Err(ClusterActionError::new("create", err.to_string()).into()),
        }

        self.describe(name)
    }

    /// Updates a cluster towards a target document.
    ///
    /// Runs the update-policy engine over a fresh snapshot pair; a denied
    /// verdict fails with [`ClusterUpdateError`] unless `force` is set.
    /// Structural validation is never bypassed.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] for missing or busy clusters, validation
    /// failures, denied verdicts, and collaborator faults.
    pub fn update(
        &self,
        name: &ClusterName,
        target_doc: &Value,
        options: &UpdateOptions,
    ) -> Result<ClusterDescription, LifecycleError> {
        let description = self.describe(name)?;
        if description.stack_status.in_transition() {
            return Err(LifecycleError::Busy {
                cluster: name.clone(),
                status: description.stack_status,
            });
        }

        let base = self.load_recorded_config(name, &description)?;
        let mut target = ClusterConfig::from_document(Arc::clone(&self.registry), target_doc)?;
        let mut report = target.validate();
        if !options.validate.suppress_validators {
            report.extend(run_fact_validators(&target, &self.facts).findings);
        }
        let _report = ensure_passes(report, options.validate.failure_level)?;

        let context = LiveContext {
            fleet: &self.fleet,
            facts: &self.facts,
            cluster: name,
        };
        let patch = Patch::new(
            base.snapshot().to_document(DocumentMode::User),
            target.snapshot().to_document(DocumentMode::User),
            &context,
            &self.registry.named_list_fields(),
        );
        let verdict = self.policies.evaluate(&patch)?;
        if !verdict.allowed && !options.force {
            return Err(ClusterUpdateError {
                verdict,
            }
            .into());
        }

        let version = target.version_token()?;
        target.set_config_version(version.clone());
        let template = render_template(&target);
        self.persist_version(name, &version, &target, &template, options.original_text.as_deref())?;

        let mut parameters = target.to_storage();
        parameters.push(StackParam::new(CONFIG_VERSION_PARAM, version.as_str()));
        let stack_name = StackName::for_cluster(name);
        if let Err(err) =
            self.stack.update_stack(&stack_name, &template, &parameters, &cluster_tags(name, &version))
        {
            let _cleanup = self.store.delete_prefix(&self.settings.bucket, &version_prefix(name, &version));
            return Err(ClusterActionError::new("update", err.to_string()).into());
        }
        self.describe(name)
    }

    /// Deletes a cluster.
    ///
    /// A stack the collaborator reports as already gone is treated as
    /// successful completion. With `keep_logs`, log resources are marked to
    /// outlive the stack before deletion starts.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Action`] for collaborator faults.
    pub fn delete(&self, name: &ClusterName, keep_logs: bool) -> Result<(), LifecycleError> {
        let stack_name = StackName::for_cluster(name);

        if keep_logs {
            match self.stack.get_stack_template(&stack_name) {
                Ok(mut template) => {
                    if retain_log_resources(&mut template)
                        && let Err(err) = self.stack.update_stack_template(&stack_name, &template)
                    {
                        match err {
                            StackError::NotFound(_) => {}
                            other => {
                                return Err(
                                    ClusterActionError::new("delete", other.to_string()).into()
                                );
                            }
                        }
                    }
                }
                Err(StackError::NotFound(_)) => {}
                Err(err) => return Err(ClusterActionError::new("delete", err.to_string()).into()),
            }
        }

        match self.stack.delete_stack(&stack_name) {
            Ok(()) | Err(StackError::NotFound(_)) => {}
            Err(err) => return Err(ClusterActionError::new("delete", err.to_string()).into()),
        }

        self.store
            .delete_prefix(&self.settings.bucket, &cluster_prefix(name))
            .map_err(|err| ClusterActionError::new("delete", err.to_string()))?;
        Ok(())
    }

    /// Starts the compute fleet.
    ///
    /// Managed elastic fleets are resized to their recorded capacity;
    /// self-managed schedulers flip the stored fleet-status flag. The
    /// status transition uses compare-and-swap and surfaces contention as
    /// [`ConcurrentUpdateError`].
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] for missing clusters, contention, and
    /// collaborator faults.
    pub fn start(&self, name: &ClusterName) -> Result<(), LifecycleError> {
        let description = self.describe(name)?;
        let status = description.fleet_status;
        if matches!(status, FleetStatus::Running | FleetStatus::Starting) {
            return Ok(());
        }
        if description.scheduler.as_deref() == Some(ELASTIC_FLEET_SCHEDULER) {
            let capacity = self.recorded_fleet_capacity(name)?;
            self.fleet
                .set_target_capacity(name, capacity)
                .map_err(|err| ClusterActionError::new("start", err.to_string()))?;
        }
        self.swap_fleet_status(name, status, FleetStatus::Starting, FleetStatus::Running)
    }

    /// Stops the compute fleet.
    ///
    /// Idempotent: a fleet already stopped (or stopping) is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] for missing clusters, contention, and
    /// collaborator faults.
    pub fn stop(&self, name: &ClusterName) -> Result<(), LifecycleError> {
        let description = self.describe(name)?;
        let status = description.fleet_status;
        if matches!(status, FleetStatus::Stopped | FleetStatus::Stopping) {
            return Ok(());
        }
        if description.scheduler.as_deref() == Some(ELASTIC_FLEET_SCHEDULER) {
            self.fleet
                .set_target_capacity(name, 0)
                .map_err(|err| ClusterActionError::new("stop", err.to_string()))?;
        }
        self.swap_fleet_status(name, status, FleetStatus::Stopping, FleetStatus::Stopped)
    }

    /// Returns the description of one cluster.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] when no stack exists.
    pub fn describe(&self, name: &ClusterName) -> Result<ClusterDescription, LifecycleError> {
        let stack_name = StackName::for_cluster(name);
        let stack = match self.stack.describe_stack(&stack_name) {
            Ok(description) => description,
            Err(StackError::NotFound(_)) => return Err(LifecycleError::NotFound(name.clone())),
            Err(err) => {
                return Err(ClusterActionError::new("describe", err.to_string()).into());
            }
        };
        let fleet_status = self.fleet.get_status(name).unwrap_or(FleetStatus::Unknown);
        Ok(ClusterDescription {
            name: name.clone(),
            state: ClusterState::from(stack.status),
            stack_status: stack.status,
            config_version: stack.parameter(CONFIG_VERSION_PARAM).map(ConfigVersion::from),
            scheduler: stack.parameter(SCHEDULER_PARAM).map(ToString::to_string),
            fleet_status,
        })
    }

    /// Lists every cluster known to the stack service.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Action`] when the service cannot be
    /// queried.
    pub fn list(&self) -> Result<Vec<ClusterDescription>, LifecycleError> {
        let stacks = self
            .stack
            .list_stacks()
            .map_err(|err| ClusterActionError::new("list", err.to_string()))?;
        let mut descriptions = Vec::with_capacity(stacks.len());
        for stack in stacks {
            let name = cluster_name_of(&stack.name);
            let fleet_status = self.fleet.get_status(&name).unwrap_or(FleetStatus::Unknown);
            descriptions.push(ClusterDescription {
                name,
                state: ClusterState::from(stack.status),
                stack_status: stack.status,
                config_version: stack.parameter(CONFIG_VERSION_PARAM).map(ConfigVersion::from),
                scheduler: stack.parameter(SCHEDULER_PARAM).map(ToString::to_string),
                fleet_status,
            });
        }
        Ok(descriptions)
    }

    /// Returns the persisted resolved document for one cluster version.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Action`] when the blob cannot be read.
    pub fn export_config(
        &self,
        name: &ClusterName,
        version: &ConfigVersion,
    ) -> Result<Value, LifecycleError> {
        match self.store.get_blob(&self.settings.bucket, &resolved_key(name, version), None) {
            Ok(BlobContent::Json(doc)) => Ok(doc),
            Ok(BlobContent::Text(text)) => serde_json::from_str(&text)
                .map_err(|err| ClusterActionError::new("export", err.to_string()).into()),
            Err(err) => Err(ClusterActionError::new("export", err.to_string()).into()),
        }
    }

    /// Waits until the stack leaves its transitional status.
    ///
    /// Bounded polling with a fixed delay; the cancellation signal is
    /// checked between iterations.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Cancelled`] on cancellation and
    /// [`LifecycleError::Action`] when the poll limit is exhausted.
    pub fn wait_for_stack(
        &self,
        name: &ClusterName,
        cancel: &CancelSignal,
    ) -> Result<ClusterDescription, LifecycleError> {
        for _ in 0..self.settings.poll_limit {
            if cancel.is_cancelled() {
                return Err(LifecycleError::Cancelled);
            }
            let description = self.describe(name)?;
            if !description.stack_status.in_transition() {
                return Ok(description);
            }
            std::thread::sleep(self.settings.poll_delay);
        }
        Err(ClusterActionError::new(
            "wait",
            format!("stack did not stabilize within {} polls", self.settings.poll_limit),
        )
        .into())
    }

    /// Loads the configuration recorded for a running cluster.
    ///
    /// The persisted resolved document is authoritative; when it is not
    /// available the tree is reconstructed from the stack parameters.
    fn load_recorded_config(
        &self,
        name: &ClusterName,
        description: &ClusterDescription,
    ) -> Result<ClusterConfig, LifecycleError> {
        let blob = description.config_version.as_ref().and_then(|version| {
            match self.store.get_blob(&self.settings.bucket, &resolved_key(name, version), None) {
                Ok(BlobContent::Json(doc)) => Some(doc),
                Ok(BlobContent::Text(text)) => serde_json::from_str(&text).ok(),
                Err(_) => None,
            }
        });
        let stack_name = StackName::for_cluster(name);
        let stack = self
            .stack
            .describe_stack(&stack_name)
            .map_err(|err| ClusterActionError::new("update", err.to_string()))?;
        Ok(ClusterConfig::from_storage(
            Arc::clone(&self.registry),
            &stack.parameters,
            blob.as_ref(),
        )?)
    }

    /// Persists the artifacts of one configuration version.
    ///
    /// Partially uploaded artifacts are removed when a later write fails.
    fn persist_version(
        &self,
        name: &ClusterName,
        version: &ConfigVersion,
        config: &ClusterConfig,
        template: &Value,
        original_text: Option<&str>,
    ) -> Result<(), LifecycleError> {
        let original = original_text.map_or_else(
            || serde_json::to_string(config.source_document()).unwrap_or_default(),
            ToString::to_string,
        );
        let writes: [(String, BlobContent); 3] = [
            (original_key(name, version), BlobContent::Text(original)),
            (
                resolved_key(name, version),
                BlobContent::Json(config.to_document(DocumentMode::Full)),
            ),
            (template_key(name, version), BlobContent::Json(template.clone())),
        ];
        for (key, content) in &writes {
            if let Err(err) = self.store.put_blob(&self.settings.bucket, key, content) {
                let _cleanup =
                    self.store.delete_prefix(&self.settings.bucket, &version_prefix(name, version));
                return Err(ClusterActionError::new("persist", err.to_string()).into());
            }
        }
        Ok(())
    }

    /// Applies a fleet status transition, mapping contention distinctly.
    fn swap_fleet_status(
        &self,
        name: &ClusterName,
        expected: FleetStatus,
        transitional: FleetStatus,
        final_status: FleetStatus,
    ) -> Result<(), LifecycleError> {
        match self.fleet.compare_and_swap(name, expected, transitional, final_status) {
            Ok(()) => Ok(()),
            Err(FleetStoreError::Contention {
                expected,
                actual,
                ..
            }) => Err(ConcurrentUpdateError {
                cluster: name.clone(),
                expected,
                actual,
            }
            .into()),
            Err(err) => Err(ClusterActionError::new("fleet", err.to_string()).into()),
        }
    }

    /// Reads the recorded managed-fleet capacity from the stack parameters.
    fn recorded_fleet_capacity(&self, name: &ClusterName) -> Result<u64, LifecycleError> {
        let stack_name = StackName::for_cluster(name);
        let stack = self
            .stack
            .describe_stack(&stack_name)
            .map_err(|err| ClusterActionError::new("start", err.to_string()))?;
        Ok(stack
            .parameter(FLEET_CAPACITY_PARAM)
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_FLEET_CAPACITY))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Derives the cluster name back from its stack name.
fn cluster_name_of(stack: &StackName) -> ClusterName {
    ClusterName::new(stack.as_str().strip_prefix("peakstack-").unwrap_or(stack.as_str()))
}

/// Builds the standard tags applied to every cluster stack.
fn cluster_tags(name: &ClusterName, version: &ConfigVersion) -> Vec<StackTag> {
    vec![
        StackTag {
            key: "peakstack:cluster".to_string(),
            value: name.to_string(),
        },
        StackTag {
            key: "peakstack:version".to_string(),
            value: version.to_string(),
        },
    ]
}

/// Renders the deterministic infrastructure template for a configuration.
#[must_use]
pub fn render_template(config: &ClusterConfig) -> Value {
    json!({
        "FormatVersion": "2026-01",
        "Description": "Peakstack cluster stack",
        "Resources": {
            "HeadNode": { "Type": "Peakstack::Compute::HeadNode" },
            "ComputeFleet": { "Type": "Peakstack::Compute::Fleet" },
            "ClusterLogGroup": {
                "Type": "Peakstack::Logs::LogGroup",
                "DeletionPolicy": "Delete"
            }
        },
        "Configuration": config.to_document(DocumentMode::Full),
    })
}

/// Marks log resources to outlive the stack; returns true when changed.
fn retain_log_resources(template: &mut Value) -> bool {
    let mut changed = false;
    if let Some(resources) = template.get_mut("Resources").and_then(Value::as_object_mut) {
        for resource in resources.values_mut() {
            let is_log_group = resource
                .get("Type")
                .and_then(Value::as_str)
                .is_some_and(|kind| kind.contains("LogGroup"));
            if is_log_group
                && resource.get("DeletionPolicy").and_then(Value::as_str) != Some("Retain")
                && let Some(object) = resource.as_object_mut()
            {
                object.insert("DeletionPolicy".to_string(), Value::String("Retain".to_string()));
                changed = true;
            }
        }
    }
    changed
}
