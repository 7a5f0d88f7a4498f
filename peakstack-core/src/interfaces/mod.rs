// peakstack-core/src/interfaces/mod.rs
// ============================================================================
// Module: Peakstack Interfaces
// Description: Backend-agnostic interfaces for stacks, storage, and facts.
// Purpose: Define the collaborator contracts used by the lifecycle core.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the lifecycle core integrates with the cloud
//! without embedding provider-specific details. Implementations must be
//! deterministic where the contract allows and fail closed on missing or
//! invalid data. The core performs no cloud call outside these traits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::BlobVersionId;
use crate::core::identifiers::ClusterName;
use crate::core::identifiers::StackName;
use crate::core::storage::StackParam;

// ============================================================================
// SECTION: Stack Lifecycle
// ============================================================================

/// Status reported by the infrastructure stack service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    /// Stack creation in progress.
    CreateInProgress,
    /// Stack created successfully.
    CreateComplete,
    /// Stack creation failed.
    CreateFailed,
    /// Stack update in progress.
    UpdateInProgress,
    /// Stack updated successfully.
    UpdateComplete,
    /// Stack update failed and rolled back.
    UpdateFailed,
    /// Stack deletion in progress.
    DeleteInProgress,
    /// Stack deletion failed.
    DeleteFailed,
}

impl StackStatus {
    /// Returns true while the stack is mid-transition.
    #[must_use]
    pub const fn in_transition(self) -> bool {
        matches!(
            self,
            Self::CreateInProgress | Self::UpdateInProgress | Self::DeleteInProgress
        )
    }
}

/// Key/value tag applied to a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// Description of one stack as reported by the stack service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescription {
    /// Stack name.
    pub name: StackName,
    /// Current status.
    pub status: StackStatus,
    /// Flat configuration parameters recorded on the stack.
    pub parameters: Vec<StackParam>,
    /// Stack tags.
    pub tags: Vec<StackTag>,
    /// Stack outputs.
    pub outputs: Vec<StackParam>,
}

impl StackDescription {
    /// Returns the value of a recorded parameter.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|param| param.key == key)
            .map(|param| param.value.as_str())
    }
}

/// Request to create a new stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStackRequest {
    /// Stack name.
    pub name: StackName,
    /// Rendered infrastructure template.
    pub template: Value,
    /// Flat configuration parameters.
    pub parameters: Vec<StackParam>,
    /// Stack tags.
    pub tags: Vec<StackTag>,
    /// Whether automatic rollback on failure is disabled.
    pub disable_rollback: bool,
}

/// Stack service errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// No stack exists with the given name.
    #[error("stack '{0}' does not exist")]
    NotFound(String),
    /// A stack with the given name already exists.
    #[error("stack '{0}' already exists")]
    AlreadyExists(String),
    /// The stack service rejected the request.
    #[error("stack service rejected request: {0}")]
    Rejected(String),
    /// The stack service failed.
    #[error("stack service error: {0}")]
    Service(String),
}

/// Infrastructure stack lifecycle operations.
pub trait StackClient {
    /// Returns whether a stack exists.
    ///
    /// # Errors
    ///
    /// Returns [`StackError`] when the service cannot be queried.
    fn stack_exists(&self, name: &StackName) -> Result<bool, StackError>;

    /// Creates a new stack.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::AlreadyExists`] or a service error.
    fn create_stack(&self, request: &CreateStackRequest) -> Result<(), StackError>;

    /// Updates an existing stack's template and parameters.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::NotFound`] or a service error.
    fn update_stack(
        &self,
        name: &StackName,
        template: &Value,
        parameters: &[StackParam],
        tags: &[StackTag],
    ) -> Result<(), StackError>;

    /// Deletes a stack.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::NotFound`] when the stack is already gone.
    fn delete_stack(&self, name: &StackName) -> Result<(), StackError>;

    /// Describes a stack.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::NotFound`] or a service error.
    fn describe_stack(&self, name: &StackName) -> Result<StackDescription, StackError>;

    /// Returns the current stack template.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::NotFound`] or a service error.
    fn get_stack_template(&self, name: &StackName) -> Result<Value, StackError>;

    /// Replaces the stack template without changing parameters.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::NotFound`] or a service error.
    fn update_stack_template(&self, name: &StackName, template: &Value) -> Result<(), StackError>;

    /// Lists every stack owned by this deployment.
    ///
    /// # Errors
    ///
    /// Returns [`StackError`] when the service cannot be queried.
    fn list_stacks(&self) -> Result<Vec<StackDescription>, StackError>;
}

// ============================================================================
// SECTION: Object Store
// ============================================================================

/// Content stored in or retrieved from the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobContent {
    /// Plain text blob.
    Text(String),
    /// Structured JSON blob.
    Json(Value),
}

/// Object store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectStoreError {
    /// No blob exists at the given key (or version).
    #[error("blob '{0}' not found")]
    NotFound(String),
    /// The store rejected or failed the request.
    #[error("object store error: {0}")]
    Store(String),
}

/// Versioned blob storage.
pub trait ObjectStore {
    /// Writes a blob and returns its version identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the write fails.
    fn put_blob(
        &self,
        bucket: &str,
        key: &str,
        content: &BlobContent,
    ) -> Result<BlobVersionId, ObjectStoreError>;

    /// Reads a blob, optionally at a specific version.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::NotFound`] when no such blob exists.
    fn get_blob(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&BlobVersionId>,
    ) -> Result<BlobContent, ObjectStoreError>;

    /// Deletes every blob under a key prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the delete fails.
    fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<(), ObjectStoreError>;
}

// ============================================================================
// SECTION: Fleet Status Store
// ============================================================================

/// Recorded status of the compute fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FleetStatus {
    /// Fleet is stopped.
    Stopped,
    /// Fleet is draining towards stopped.
    Stopping,
    /// Fleet is starting.
    Starting,
    /// Fleet is running.
    Running,
    /// Fleet status is not recorded.
    Unknown,
}

/// Fleet status store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FleetStoreError {
    /// Conditional update lost a race; the caller should retry.
    #[error(
        "fleet status for '{cluster}' changed concurrently: expected {expected:?}, found {actual:?}"
    )]
    Contention {
        /// Cluster whose status was contended.
        cluster: String,
        /// Status the caller expected.
        expected: FleetStatus,
        /// Status actually recorded.
        actual: FleetStatus,
    },
    /// The store failed.
    #[error("fleet status store error: {0}")]
    Store(String),
}

/// Conditional fleet status storage.
pub trait FleetStatusStore {
    /// Returns the recorded fleet status for a cluster.
    ///
    /// # Errors
    ///
    /// Returns [`FleetStoreError`] when the store cannot be read.
    fn get_status(&self, cluster: &ClusterName) -> Result<FleetStatus, FleetStoreError>;

    /// Transitions the recorded status with compare-and-swap semantics.
    ///
    /// The transition is applied only when the current status equals
    /// `expected_from`; the store records `transitional` and then settles on
    /// `final_status`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetStoreError::Contention`] when the current status does
    /// not match `expected_from`.
    fn compare_and_swap(
        &self,
        cluster: &ClusterName,
        expected_from: FleetStatus,
        transitional: FleetStatus,
        final_status: FleetStatus,
    ) -> Result<(), FleetStoreError>;

    /// Sets the target capacity of a managed elastic fleet.
    ///
    /// # Errors
    ///
    /// Returns [`FleetStoreError`] when the capacity cannot be recorded.
    fn set_target_capacity(&self, cluster: &ClusterName, capacity: u64)
    -> Result<(), FleetStoreError>;
}

// ============================================================================
// SECTION: Compute and Network Facts
// ============================================================================

/// Recorded state of the head node instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Instance is starting.
    Pending,
    /// Instance is running.
    Running,
    /// Instance is shutting down.
    Stopping,
    /// Instance is stopped.
    Stopped,
    /// Instance is terminated.
    Terminated,
}

/// Capabilities of one instance type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTypeInfo {
    /// Instance type name.
    pub name: String,
    /// Number of vCPUs.
    pub vcpus: u32,
    /// CPU architecture identifier.
    pub architecture: String,
    /// Whether the type supports the high-performance fabric adapter.
    pub efa_supported: bool,
    /// Number of attached GPUs.
    pub gpu_count: u32,
}

/// Facts about one subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetInfo {
    /// Subnet identifier.
    pub subnet_id: String,
    /// Availability zone the subnet lives in.
    pub availability_zone: String,
    /// Owning VPC identifier.
    pub vpc_id: String,
}

/// One inspected security group rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    /// Protocol name, `-1` for all.
    pub protocol: String,
    /// First port of the allowed range.
    pub from_port: i64,
    /// Last port of the allowed range.
    pub to_port: i64,
}

/// Facts provider errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactsError {
    /// The provider failed or is unreachable.
    #[error("compute facts error: {0}")]
    Provider(String),
}

/// Read-only provider of compute and network facts for validators.
pub trait ComputeFacts {
    /// Looks up capability facts for an instance type.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError`] when the provider cannot be queried.
    fn instance_type(&self, name: &str) -> Result<Option<InstanceTypeInfo>, FactsError>;

    /// Looks up facts for a subnet.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError`] when the provider cannot be queried.
    fn subnet(&self, id: &str) -> Result<Option<SubnetInfo>, FactsError>;

    /// Inspects the inbound rules of a security group.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError`] when the provider cannot be queried.
    fn security_group_rules(&self, id: &str) -> Result<Vec<SecurityGroupRule>, FactsError>;

    /// Returns the recorded head node instance state for a cluster.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError`] when the provider cannot be queried.
    fn head_node_state(&self, cluster: &ClusterName) -> Result<InstanceState, FactsError>;
}
