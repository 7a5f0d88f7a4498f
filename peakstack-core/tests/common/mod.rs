// peakstack-core/tests/common/mod.rs
// =============================================================================
// Module: Core Test Helpers
// Description: Shared fixtures for peakstack-core integration tests.
// Purpose: Reduce duplication across configuration and lifecycle suites.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::sync::Arc;

use peakstack_core::ClusterController;
use peakstack_core::ClusterName;
use peakstack_core::ContextError;
use peakstack_core::ControllerSettings;
use peakstack_core::FleetStatus;
use peakstack_core::InstanceState;
use peakstack_core::SchemaRegistry;
use peakstack_core::UpdateContext;
use peakstack_core::cluster_schema;
use peakstack_core::runtime::InMemoryFleetStatusStore;
use peakstack_core::runtime::InMemoryObjectStore;
use peakstack_core::runtime::InMemoryStackClient;
use peakstack_core::runtime::StaticComputeFacts;
use serde_json::Value;
use serde_json::json;

/// Standard test result carrying a failure description.
pub type TestResult = Result<(), String>;

/// Builds the built-in schema registry.
pub fn schema() -> Result<Arc<SchemaRegistry>, String> {
    cluster_schema().map(Arc::new).map_err(|err| err.to_string())
}

/// A complete, valid cluster document with one queue and one resource.
pub fn base_doc() -> Value {
    json!({
        "Region": "us-east-1",
        "HeadNode": {
            "InstanceType": "c5.xlarge",
            "SubnetId": "subnet-head"
        },
        "Scheduling": {
            "Scheduler": "slurm",
            "SlurmQueues": [
                {
                    "Name": "q1",
                    "SubnetIds": ["subnet-compute"],
                    "ComputeResources": [
                        {
                            "Name": "cr1",
                            "InstanceType": "c5.xlarge",
                            "MinCount": 0,
                            "MaxCount": 10
                        }
                    ]
                }
            ]
        }
    })
}

/// Test collaborators backing one in-memory controller.
pub struct Collaborators {
    /// In-memory stack client.
    pub stack: InMemoryStackClient,
    /// In-memory object store.
    pub store: InMemoryObjectStore,
    /// In-memory fleet status store.
    pub fleet: InMemoryFleetStatusStore,
    /// Static facts provider.
    pub facts: StaticComputeFacts,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new()
    }
}

impl Collaborators {
    /// Creates collaborators with baseline facts.
    pub fn new() -> Self {
        Self {
            stack: InMemoryStackClient::new(),
            store: InMemoryObjectStore::new(),
            fleet: InMemoryFleetStatusStore::new(),
            facts: StaticComputeFacts::with_defaults(),
        }
    }

    /// Builds a controller over clones of these collaborators.
    pub fn controller(
        &self,
    ) -> Result<
        ClusterController<
            InMemoryStackClient,
            InMemoryObjectStore,
            InMemoryFleetStatusStore,
            StaticComputeFacts,
        >,
        String,
    > {
        Ok(ClusterController::new(
            self.stack.clone(),
            self.store.clone(),
            self.fleet.clone(),
            self.facts.clone(),
            schema()?,
            ControllerSettings::default(),
        ))
    }
}

/// Fixed-state update context for policy tests.
pub struct StubContext {
    /// Reported fleet status.
    pub fleet: FleetStatus,
    /// Reported head node state.
    pub head: InstanceState,
}

impl StubContext {
    /// Context with a running fleet and running head node.
    pub fn running() -> Self {
        Self {
            fleet: FleetStatus::Running,
            head: InstanceState::Running,
        }
    }

    /// Context with a stopped fleet and running head node.
    pub fn stopped() -> Self {
        Self {
            fleet: FleetStatus::Stopped,
            head: InstanceState::Running,
        }
    }
}

impl UpdateContext for StubContext {
    fn fleet_status(&self) -> Result<FleetStatus, ContextError> {
        Ok(self.fleet)
    }

    fn head_node_state(&self) -> Result<InstanceState, ContextError> {
        Ok(self.head)
    }
}

/// Convenience cluster name used across suites.
pub fn cluster() -> ClusterName {
    ClusterName::new("hpc-alpha")
}
