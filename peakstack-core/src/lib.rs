// peakstack-core/src/lib.rs
// ============================================================================
// Module: Peakstack Core Library
// Description: Public API surface for the Peakstack core.
// Purpose: Expose the configuration model, interfaces, and runtime.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Peakstack core provides the typed cluster configuration model, the
//! update-policy engine, and the cluster lifecycle controller. It is
//! backend-agnostic and integrates with the cloud through explicit
//! collaborator interfaces rather than embedding provider SDKs.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::BlobContent;
pub use interfaces::ComputeFacts;
pub use interfaces::CreateStackRequest;
pub use interfaces::FactsError;
pub use interfaces::FleetStatus;
pub use interfaces::FleetStatusStore;
pub use interfaces::FleetStoreError;
pub use interfaces::InstanceState;
pub use interfaces::InstanceTypeInfo;
pub use interfaces::ObjectStore;
pub use interfaces::ObjectStoreError;
pub use interfaces::SecurityGroupRule;
pub use interfaces::StackClient;
pub use interfaces::StackDescription;
pub use interfaces::StackError;
pub use interfaces::StackStatus;
pub use interfaces::StackTag;
pub use interfaces::SubnetInfo;
pub use runtime::CancelSignal;
pub use runtime::Change;
pub use runtime::ChangeResult;
pub use runtime::ChangeVerdict;
pub use runtime::ClusterActionError;
pub use runtime::ClusterController;
pub use runtime::ClusterDescription;
pub use runtime::ClusterState;
pub use runtime::ClusterUpdateError;
pub use runtime::ConcurrentUpdateError;
pub use runtime::ConfigValidationError;
pub use runtime::ContextError;
pub use runtime::ControllerSettings;
pub use runtime::CreateOptions;
pub use runtime::LifecycleError;
pub use runtime::Patch;
pub use runtime::UpdateContext;
pub use runtime::UpdateOptions;
pub use runtime::UpdatePolicyEngine;
pub use runtime::UpdateVerdict;
pub use runtime::ValidateOptions;
