// peakstack-core/src/runtime/harness.rs
// ============================================================================
// Module: Peakstack In-Memory Collaborators
// Description: Deterministic collaborator implementations for tests/demos.
// Purpose: Exercise the lifecycle core without external dependencies.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides simple in-memory implementations of every
//! collaborator interface, plus shared `Arc` wrappers so surfaces can hold
//! trait objects. The in-memory collaborators are deterministic (stack
//! operations complete immediately) and are not intended for production
//! use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;

use crate::core::identifiers::BlobVersionId;
use crate::core::identifiers::ClusterName;
use crate::core::identifiers::StackName;
use crate::core::storage::StackParam;
use crate::interfaces::BlobContent;
use crate::interfaces::ComputeFacts;
use crate::interfaces::CreateStackRequest;
use crate::interfaces::FactsError;
use crate::interfaces::FleetStatus;
use crate::interfaces::FleetStatusStore;
use crate::interfaces::FleetStoreError;
use crate::interfaces::InstanceState;
use crate::interfaces::InstanceTypeInfo;
use crate::interfaces::ObjectStore;
use crate::interfaces::ObjectStoreError;
use crate::interfaces::SecurityGroupRule;
use crate::interfaces::StackClient;
use crate::interfaces::StackDescription;
use crate::interfaces::StackError;
use crate::interfaces::StackStatus;
use crate::interfaces::StackTag;
use crate::interfaces::SubnetInfo;

// ============================================================================
// SECTION: In-Memory Stack Client
// ============================================================================

/// Stored state of one in-memory stack.
#[derive(Debug, Clone)]
struct StackRecord {
    /// Current status.
    status: StackStatus,
    /// Recorded parameters.
    parameters: Vec<StackParam>,
    /// Recorded tags.
    tags: Vec<StackTag>,
    /// Current template.
    template: Value,
}

/// Stack records keyed by stack name.
type StackTable = BTreeMap<String, StackRecord>;

/// In-memory stack client; operations complete immediately.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStackClient {
    /// Stack records protected by a mutex.
    stacks: Arc<Mutex<StackTable>>,
}

impl InMemoryStackClient {
    /// Creates an empty in-memory stack client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the status of a stack (test hook).
    ///
    /// # Errors
    ///
    /// Returns [`StackError::NotFound`] when no such stack exists.
    pub fn force_status(&self, name: &StackName, status: StackStatus) -> Result<(), StackError> {
        let mut guard = lock_stacks(&self.stacks)?;
        let record = guard
            .get_mut(name.as_str())
            .ok_or_else(|| StackError::NotFound(name.to_string()))?;
        record.status = status;
        Ok(())
    }
}

/// Locks the stack table, mapping poisoning to a service error.
fn lock_stacks(
    stacks: &Arc<Mutex<StackTable>>,
) -> Result<std::sync::MutexGuard<'_, StackTable>, StackError> {
    stacks.lock().map_err(|_| StackError::Service("stack table mutex poisoned".to_string()))
}

impl StackClient for InMemoryStackClient {
    fn stack_exists(&self, name: &StackName) -> Result<bool, StackError> {
        Ok(lock_stacks(&self.stacks)?.contains_key(name.as_str()))
    }

    fn create_stack(&self, request: &CreateStackRequest) -> Result<(), StackError> {
        let mut guard = lock_stacks(&self.stacks)?;
        if guard.contains_key(request.name.as_str()) {
            return Err(StackError::AlreadyExists(request.name.to_string()));
        }
        guard.insert(
            request.name.as_str().to_string(),
            StackRecord {
                status: StackStatus::CreateComplete,
                parameters: request.parameters.clone(),
                tags: request.tags.clone(),
                template: request.template.clone(),
            },
        );
        Ok(())
    }

    fn update_stack(
        &self,
        name: &StackName,
        template: &Value,
        parameters: &[StackParam],
        tags: &[StackTag],
    ) -> Result<(), StackError> {
        let mut guard = lock_stacks(&self.stacks)?;
        let record = guard
            .get_mut(name.as_str())
            .ok_or_else(|| StackError::NotFound(name.to_string()))?;
        record.template = template.clone();
        record.parameters = parameters.to_vec();
        record.tags = tags.to_vec();
        record.status = StackStatus::UpdateComplete;
        Ok(())
    }

    fn delete_stack(&self, name: &StackName) -> Result<(), StackError> {
        let mut guard = lock_stacks(&self.stacks)?;
        if guard.remove(name.as_str()).is_none() {
            return Err(StackError::NotFound(name.to_string()));
        }
        Ok(())
    }

    fn describe_stack(&self, name: &StackName) -> Result<StackDescription, StackError> {
        let guard = lock_stacks(&self.stacks)?;
        let record =
            guard.get(name.as_str()).ok_or_else(|| StackError::NotFound(name.to_string()))?;
        Ok(StackDescription {
            name: name.clone(),
            status: record.status,
            parameters: record.parameters.clone(),
            tags: record.tags.clone(),
            outputs: Vec::new(),
        })
    }

    fn get_stack_template(&self, name: &StackName) -> Result<Value, StackError> {
        let guard = lock_stacks(&self.stacks)?;
        guard
            .get(name.as_str())
            .map(|record| record.template.clone())
            .ok_or_else(|| StackError::NotFound(name.to_string()))
    }

    fn update_stack_template(&self, name: &StackName, template: &Value) -> Result<(), StackError> {
        let mut guard = lock_stacks(&self.stacks)?;
        let record = guard
            .get_mut(name.as_str())
            .ok_or_else(|| StackError::NotFound(name.to_string()))?;
        record.template = template.clone();
        Ok(())
    }

    fn list_stacks(&self) -> Result<Vec<StackDescription>, StackError> {
        let guard = lock_stacks(&self.stacks)?;
        Ok(guard
            .iter()
            .map(|(name, record)| StackDescription {
                name: StackName::new(name.clone()),
                status: record.status,
                parameters: record.parameters.clone(),
                tags: record.tags.clone(),
                outputs: Vec::new(),
            })
            .collect())
    }
}

// ============================================================================
// SECTION: In-Memory Object Store
// ============================================================================

/// Blob versions keyed by bucket and key.
type BlobTable = BTreeMap<(String, String), Vec<(BlobVersionId, BlobContent)>>;

/// In-memory versioned blob store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryObjectStore {
    /// Blob versions protected by a mutex.
    blobs: Arc<Mutex<BlobTable>>,
}

impl InMemoryObjectStore {
    /// Creates an empty in-memory object store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every key stored in a bucket (test hook).
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.blobs.lock().map_or_else(
            |_| Vec::new(),
            |guard| {
                guard
                    .keys()
                    .filter(|(stored_bucket, _)| stored_bucket == bucket)
                    .map(|(_, key)| key.clone())
                    .collect()
            },
        )
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put_blob(
        &self,
        bucket: &str,
        key: &str,
        content: &BlobContent,
    ) -> Result<BlobVersionId, ObjectStoreError> {
        let mut guard = self
            .blobs
            .lock()
            .map_err(|_| ObjectStoreError::Store("blob table mutex poisoned".to_string()))?;
        let versions = guard.entry((bucket.to_string(), key.to_string())).or_default();
        let version = BlobVersionId::new(format!("v{}", versions.len() + 1));
        versions.push((version.clone(), content.clone()));
        Ok(version)
    }

    fn get_blob(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&BlobVersionId>,
    ) -> Result<BlobContent, ObjectStoreError> {
        let guard = self
            .blobs
            .lock()
            .map_err(|_| ObjectStoreError::Store("blob table mutex poisoned".to_string()))?;
        let versions = guard
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;
        let found = match version {
            Some(version) => versions.iter().find(|(stored, _)| stored == version),
            None => versions.last(),
        };
        found
            .map(|(_, content)| content.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<(), ObjectStoreError> {
        let mut guard = self
            .blobs
            .lock()
            .map_err(|_| ObjectStoreError::Store("blob table mutex poisoned".to_string()))?;
        guard.retain(|(stored_bucket, key), _| {
            stored_bucket != bucket || !key.starts_with(prefix)
        });
        Ok(())
    }
}

// ============================================================================
// SECTION: In-Memory Fleet Status Store
// ============================================================================

/// Recorded status and transition history per cluster.
type FleetTable = BTreeMap<String, (FleetStatus, Vec<FleetStatus>)>;

/// In-memory fleet status store with compare-and-swap semantics.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFleetStatusStore {
    /// Recorded status and transition history protected by a mutex.
    state: Arc<Mutex<FleetTable>>,
    /// Recorded managed fleet capacities.
    capacities: Arc<Mutex<BTreeMap<String, u64>>>,
}

impl InMemoryFleetStatusStore {
    /// Creates an empty fleet status store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded transition history (test hook).
    #[must_use]
    pub fn history(&self, cluster: &ClusterName) -> Vec<FleetStatus> {
        self.state.lock().map_or_else(
            |_| Vec::new(),
            |guard| {
                guard.get(cluster.as_str()).map(|(_, history)| history.clone()).unwrap_or_default()
            },
        )
    }

    /// Returns the recorded target capacity (test hook).
    #[must_use]
    pub fn capacity(&self, cluster: &ClusterName) -> Option<u64> {
        self.capacities
            .lock()
            .map_or(None, |guard| guard.get(cluster.as_str()).copied())
    }
}

impl FleetStatusStore for InMemoryFleetStatusStore {
    fn get_status(&self, cluster: &ClusterName) -> Result<FleetStatus, FleetStoreError> {
        let guard = self
            .state
            .lock()
            .map_err(|_| FleetStoreError::Store("fleet table mutex poisoned".to_string()))?;
        Ok(guard.get(cluster.as_str()).map_or(FleetStatus::Unknown, |(status, _)| *status))
    }

    fn compare_and_swap(
        &self,
        cluster: &ClusterName,
        expected_from: FleetStatus,
        transitional: FleetStatus,
        final_status: FleetStatus,
    ) -> Result<(), FleetStoreError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| FleetStoreError::Store("fleet table mutex poisoned".to_string()))?;
        let entry = guard
            .entry(cluster.as_str().to_string())
            .or_insert_with(|| (FleetStatus::Unknown, Vec::new()));
        if entry.0 != expected_from {
            return Err(FleetStoreError::Contention {
                cluster: cluster.to_string(),
                expected: expected_from,
                actual: entry.0,
            });
        }
        entry.1.push(transitional);
        entry.1.push(final_status);
        entry.0 = final_status;
        Ok(())
    }

    fn set_target_capacity(
        &self,
        cluster: &ClusterName,
        capacity: u64,
    ) -> Result<(), FleetStoreError> {
        let mut guard = self
            .capacities
            .lock()
            .map_err(|_| FleetStoreError::Store("capacity table mutex poisoned".to_string()))?;
        guard.insert(cluster.as_str().to_string(), capacity);
        Ok(())
    }
}

// ============================================================================
// SECTION: Static Compute Facts
// ============================================================================

/// Static facts provider backed by in-memory tables.
#[derive(Debug, Default, Clone)]
pub struct StaticComputeFacts {
    /// Known instance types.
    instance_types: BTreeMap<String, InstanceTypeInfo>,
    /// Known subnets.
    subnets: BTreeMap<String, SubnetInfo>,
    /// Known security group rules.
    group_rules: BTreeMap<String, Vec<SecurityGroupRule>>,
    /// Recorded head node states per cluster.
    head_states: BTreeMap<String, InstanceState>,
}

impl StaticComputeFacts {
    /// Creates an empty facts provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider with a small baseline of common facts.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut facts = Self::new();
        for (name, vcpus, efa) in
            [("c5.xlarge", 4_u32, false), ("c5n.18xlarge", 72, true), ("t3.micro", 2, false)]
        {
            facts = facts.with_instance_type(InstanceTypeInfo {
                name: name.to_string(),
                vcpus,
                architecture: "x86_64".to_string(),
                efa_supported: efa,
                gpu_count: 0,
            });
        }
        facts
            .with_subnet(SubnetInfo {
                subnet_id: "subnet-head".to_string(),
                availability_zone: "zone-a".to_string(),
                vpc_id: "vpc-1".to_string(),
            })
            .with_subnet(SubnetInfo {
                subnet_id: "subnet-compute".to_string(),
                availability_zone: "zone-a".to_string(),
                vpc_id: "vpc-1".to_string(),
            })
    }

    /// Registers an instance type.
    #[must_use]
    pub fn with_instance_type(mut self, info: InstanceTypeInfo) -> Self {
        self.instance_types.insert(info.name.clone(), info);
        self
    }

    /// Registers a subnet.
    #[must_use]
    pub fn with_subnet(mut self, info: SubnetInfo) -> Self {
        self.subnets.insert(info.subnet_id.clone(), info);
        self
    }

    /// Registers security group rules.
    #[must_use]
    pub fn with_group_rules(mut self, group: &str, rules: Vec<SecurityGroupRule>) -> Self {
        self.group_rules.insert(group.to_string(), rules);
        self
    }

    /// Records a head node state for a cluster.
    #[must_use]
    pub fn with_head_state(mut self, cluster: &ClusterName, state: InstanceState) -> Self {
        self.head_states.insert(cluster.as_str().to_string(), state);
        self
    }
}

impl ComputeFacts for StaticComputeFacts {
    fn instance_type(&self, name: &str) -> Result<Option<InstanceTypeInfo>, FactsError> {
        Ok(self.instance_types.get(name).cloned())
    }

    fn subnet(&self, id: &str) -> Result<Option<SubnetInfo>, FactsError> {
        Ok(self.subnets.get(id).cloned())
    }

    fn security_group_rules(&self, id: &str) -> Result<Vec<SecurityGroupRule>, FactsError> {
        Ok(self.group_rules.get(id).cloned().unwrap_or_default())
    }

    fn head_node_state(&self, cluster: &ClusterName) -> Result<InstanceState, FactsError> {
        Ok(self.head_states.get(cluster.as_str()).copied().unwrap_or(InstanceState::Running))
    }
}

// ============================================================================
// SECTION: Shared Collaborator Wrappers
// ============================================================================

/// Shared stack client backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedStackClient {
    /// Inner implementation.
    inner: Arc<dyn StackClient + Send + Sync>,
}

impl SharedStackClient {
    /// Wraps a stack client in a shared, clonable wrapper.
    #[must_use]
    pub fn from_client(client: impl StackClient + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(client),
        }
    }
}

impl StackClient for SharedStackClient {
    fn stack_exists(&self, name: &StackName) -> Result<bool, StackError> {
        self.inner.stack_exists(name)
    }

    fn create_stack(&self, request: &CreateStackRequest) -> Result<(), StackError> {
        self.inner.create_stack(request)
    }

    fn update_stack(
        &self,
        name: &StackName,
        template: &Value,
        parameters: &[StackParam],
        tags: &[StackTag],
    ) -> Result<(), StackError> {
        self.inner.update_stack(name, template, parameters, tags)
    }

    fn delete_stack(&self, name: &StackName) -> Result<(), StackError> {
        self.inner.delete_stack(name)
    }

    fn describe_stack(&self, name: &StackName) -> Result<StackDescription, StackError> {
        self.inner.describe_stack(name)
    }

    fn get_stack_template(&self, name: &StackName) -> Result<Value, StackError> {
        self.inner.get_stack_template(name)
    }

    fn update_stack_template(&self, name: &StackName, template: &Value) -> Result<(), StackError> {
        self.inner.update_stack_template(name, template)
    }

    fn list_stacks(&self) -> Result<Vec<StackDescription>, StackError> {
        self.inner.list_stacks()
    }
}

/// Shared object store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedObjectStore {
    /// Inner implementation.
    inner: Arc<dyn ObjectStore + Send + Sync>,
}

impl SharedObjectStore {
    /// Wraps an object store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl ObjectStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }
}

impl ObjectStore for SharedObjectStore {
    fn put_blob(
        &self,
        bucket: &str,
        key: &str,
        content: &BlobContent,
    ) -> Result<BlobVersionId, ObjectStoreError> {
        self.inner.put_blob(bucket, key, content)
    }

    fn get_blob(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&BlobVersionId>,
    ) -> Result<BlobContent, ObjectStoreError> {
        self.inner.get_blob(bucket, key, version)
    }

    fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<(), ObjectStoreError> {
        self.inner.delete_prefix(bucket, prefix)
    }
}

/// Shared fleet status store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedFleetStatusStore {
    /// Inner implementation.
    inner: Arc<dyn FleetStatusStore + Send + Sync>,
}

impl SharedFleetStatusStore {
    /// Wraps a fleet status store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl FleetStatusStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }
}

impl FleetStatusStore for SharedFleetStatusStore {
    fn get_status(&self, cluster: &ClusterName) -> Result<FleetStatus, FleetStoreError> {
        self.inner.get_status(cluster)
    }

    fn compare_and_swap(
        &self,
        cluster: &ClusterName,
        expected_from: FleetStatus,
        transitional: FleetStatus,
        final_status: FleetStatus,
    ) -> Result<(), FleetStoreError> {
        self.inner.compare_and_swap(cluster, expected_from, transitional, final_status)
    }

    fn set_target_capacity(
        &self,
        cluster: &ClusterName,
        capacity: u64,
    ) -> Result<(), FleetStoreError> {
        self.inner.set_target_capacity(cluster, capacity)
    }
}

/// Shared compute facts provider backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedComputeFacts {
    /// Inner implementation.
    inner: Arc<dyn ComputeFacts + Send + Sync>,
}

impl SharedComputeFacts {
    /// Wraps a facts provider in a shared, clonable wrapper.
    #[must_use]
    pub fn from_facts(facts: impl ComputeFacts + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(facts),
        }
    }
}

impl ComputeFacts for SharedComputeFacts {
    fn instance_type(&self, name: &str) -> Result<Option<InstanceTypeInfo>, FactsError> {
        self.inner.instance_type(name)
    }

    fn subnet(&self, id: &str) -> Result<Option<SubnetInfo>, FactsError> {
        self.inner.subnet(id)
    }

    fn security_group_rules(&self, id: &str) -> Result<Vec<SecurityGroupRule>, FactsError> {
        self.inner.security_group_rules(id)
    }

    fn head_node_state(&self, cluster: &ClusterName) -> Result<InstanceState, FactsError> {
        self.inner.head_node_state(cluster)
    }
}
