// peakstack-api/src/lib.rs
// ============================================================================
// Module: Peakstack API Library
// Description: Thin HTTP surface over the cluster lifecycle controller.
// Purpose: Expose lifecycle operations as JSON endpoints with audit events.
// Dependencies: axum, peakstack-core, serde, tokio
// ============================================================================

//! ## Overview
//! The API crate wires the lifecycle controller behind an axum router.
//! Every endpoint performs exactly one controller call; error kinds map
//! deterministically onto HTTP status codes and structured error bodies.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod config;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditEvent;
pub use audit::AuditOutcome;
pub use audit::AuditSink;
pub use audit::NullAuditSink;
pub use audit::StderrAuditSink;
pub use config::ApiConfig;
pub use config::ApiConfigError;
pub use server::ApiController;
pub use server::ApiServerError;
pub use server::AppState;
pub use server::CreateClusterRequest;
pub use server::DeleteClusterRequest;
pub use server::ErrorBody;
pub use server::OperationResponse;
pub use server::UpdateClusterRequest;
pub use server::error_response;
pub use server::router;
pub use server::serve;
