// peakstack-api/src/server.rs
// ============================================================================
// Module: API Server
// Description: Axum router and handlers for cluster lifecycle requests.
// Purpose: Expose the controller as a thin JSON API with audit events.
// Dependencies: axum, peakstack-core, tokio
// ============================================================================

//! ## Overview
//! The API server maps each endpoint onto exactly one lifecycle controller
//! call and formats the result as JSON. Error kinds map onto HTTP status
//! codes deterministically: validation failures are 400 with the full
//! finding list, denied updates are 409 with per-change verdicts, and
//! contention is 409 with a retryable marker.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use peakstack_core::ChangeVerdict;
use peakstack_core::ClusterController;
use peakstack_core::ClusterName;
use peakstack_core::ConfigVersion;
use peakstack_core::CreateOptions;
use peakstack_core::FindingLevel;
use peakstack_core::LifecycleError;
use peakstack_core::UpdateOptions;
use peakstack_core::ValidateOptions;
use peakstack_core::ValidationFinding;
use peakstack_core::runtime::SharedComputeFacts;
use peakstack_core::runtime::SharedFleetStatusStore;
use peakstack_core::runtime::SharedObjectStore;
use peakstack_core::runtime::SharedStackClient;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::audit::AuditEvent;
use crate::audit::AuditSink;
use crate::config::ApiConfig;

// ============================================================================
// SECTION: State
// ============================================================================

/// Controller specialization used by the API surface.
pub type ApiController =
    ClusterController<SharedStackClient, SharedObjectStore, SharedFleetStatusStore, SharedComputeFacts>;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle controller.
    controller: Arc<ApiController>,
    /// Audit sink receiving one event per request.
    audit: Arc<dyn AuditSink + Send + Sync>,
}

impl AppState {
    /// Creates new shared state.
    #[must_use]
    pub fn new(controller: Arc<ApiController>, audit: Arc<dyn AuditSink + Send + Sync>) -> Self {
        Self {
            controller,
            audit,
        }
    }
}

// ============================================================================
// SECTION: Request and Response Bodies
// ============================================================================

/// Body of a cluster creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateClusterRequest {
    /// Declarative cluster document.
    pub document: Value,
    /// Skips fact-based and dry-run validators.
    #[serde(default)]
    pub suppress_validators: bool,
    /// Validation failure threshold; defaults to `error`.
    #[serde(default)]
    pub failure_level: Option<FindingLevel>,
    /// Disables automatic stack rollback on failure.
    #[serde(default)]
    pub disable_rollback: bool,
}

/// Body of a cluster update request.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateClusterRequest {
    /// Target cluster document.
    pub document: Value,
    /// Applies the update even when the policy verdict denies it.
    #[serde(default)]
    pub force: bool,
    /// Skips fact-based validators.
    #[serde(default)]
    pub suppress_validators: bool,
    /// Validation failure threshold; defaults to `error`.
    #[serde(default)]
    pub failure_level: Option<FindingLevel>,
}

/// Query parameters of a cluster deletion request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteClusterRequest {
    /// Marks log resources to outlive the stack.
    #[serde(default)]
    pub keep_logs: bool,
}

/// Response for fleet and delete operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResponse {
    /// Operation acknowledgement.
    pub status: String,
}

/// Error body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable error kind.
    pub kind: String,
    /// Human-readable message with remediation.
    pub message: String,
    /// Whether the caller may simply retry.
    pub retryable: bool,
    /// Full finding list for validation failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<ValidationFinding>>,
    /// Per-change verdicts for denied updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<ChangeVerdict>>,
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Maps a lifecycle error onto an HTTP status and error body.
#[must_use]
pub fn error_response(err: &LifecycleError) -> (StatusCode, ErrorBody) {
    let mut body = ErrorBody {
        kind: err.kind().to_string(),
        message: err.to_string(),
        retryable: false,
        findings: None,
        changes: None,
    };
    let status = match err {
        LifecycleError::Validation(validation) => {
            body.findings = Some(validation.findings.clone());
            StatusCode::BAD_REQUEST
        }
        LifecycleError::Config(_) => StatusCode::BAD_REQUEST,
        LifecycleError::Update(update) => {
            body.changes = Some(update.verdict.changes.clone());
            StatusCode::CONFLICT
        }
        LifecycleError::Concurrent(_) => {
            body.retryable = true;
            StatusCode::CONFLICT
        }
        LifecycleError::AlreadyExists(_) | LifecycleError::Busy { .. } => StatusCode::CONFLICT,
        LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::Action(_) => StatusCode::BAD_GATEWAY,
        LifecycleError::Policy(_) | LifecycleError::Hash(_) | LifecycleError::Cancelled => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, body)
}

/// Renders a controller result as an HTTP response.
fn respond<T: Serialize>(result: Result<T, LifecycleError>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(err) => {
            let (status, body) = error_response(&err);
            (status, Json(body)).into_response()
        }
    }
}

/// Emits the audit event for one finished request.
fn audit<T>(
    state: &AppState,
    operation: &'static str,
    cluster: Option<&str>,
    result: &Result<T, LifecycleError>,
) {
    let error_kind = result.as_ref().err().map(LifecycleError::kind);
    state.audit.emit(&AuditEvent::finished(operation, cluster, error_kind));
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Creates a cluster.
async fn create_cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<CreateClusterRequest>,
) -> Response {
    let options = CreateOptions {
        validate: ValidateOptions {
            failure_level: request.failure_level.unwrap_or_default(),
            suppress_validators: request.suppress_validators,
        },
        disable_rollback: request.disable_rollback,
        original_text: None,
    };
    let result = state.controller.create(&ClusterName::new(&*name), &request.document, &options);
    audit(&state, "create", Some(&name), &result);
    respond(result)
}

/// Updates a cluster towards a target document.
async fn update_cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<UpdateClusterRequest>,
) -> Response {
    let options = UpdateOptions {
        validate: ValidateOptions {
            failure_level: request.failure_level.unwrap_or_default(),
            suppress_validators: request.suppress_validators,
        },
        force: request.force,
        original_text: None,
    };
    let result = state.controller.update(&ClusterName::new(&*name), &request.document, &options);
    audit(&state, "update", Some(&name), &result);
    respond(result)
}

/// Describes a cluster.
async fn describe_cluster(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let result = state.controller.describe(&ClusterName::new(&*name));
    audit(&state, "describe", Some(&name), &result);
    respond(result)
}

/// Deletes a cluster.
async fn delete_cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(request): Query<DeleteClusterRequest>,
) -> Response {
    let keep_logs = request.keep_logs;
    let result = state
        .controller
        .delete(&ClusterName::new(&*name), keep_logs)
        .map(|()| OperationResponse {
            status: "deleting".to_string(),
        });
    audit(&state, "delete", Some(&name), &result);
    respond(result)
}

/// Lists every cluster.
async fn list_clusters(State(state): State<AppState>) -> Response {
    let result = state.controller.list();
    audit(&state, "list", None, &result);
    respond(result)
}

/// Starts the compute fleet.
async fn start_fleet(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let result = state.controller.start(&ClusterName::new(&*name)).map(|()| OperationResponse {
        status: "starting".to_string(),
    });
    audit(&state, "start", Some(&name), &result);
    respond(result)
}

/// Stops the compute fleet.
async fn stop_fleet(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let result = state.controller.stop(&ClusterName::new(&*name)).map(|()| OperationResponse {
        status: "stopping".to_string(),
    });
    audit(&state, "stop", Some(&name), &result);
    respond(result)
}

/// Exports the persisted resolved document of a cluster version.
async fn export_config(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    let result = state
        .controller
        .export_config(&ClusterName::new(&*name), &ConfigVersion::new(&*version));
    audit(&state, "export", Some(&name), &result);
    respond(result)
}

// ============================================================================
// SECTION: Router and Server
// ============================================================================

/// API server errors.
#[derive(Debug, Error)]
pub enum ApiServerError {
    /// Configuration rejected before serving.
    #[error("api server config error: {0}")]
    Config(String),
    /// Bind or serve failure.
    #[error("api server io error: {0}")]
    Io(String),
}

/// Builds the API router over shared state.
#[must_use]
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/v1/clusters", get(list_clusters))
        .route(
            "/v1/clusters/{name}",
            put(create_cluster)
                .patch(update_cluster)
                .get(describe_cluster)
                .delete(delete_cluster),
        )
        .route("/v1/clusters/{name}/fleet/start", post(start_fleet))
        .route("/v1/clusters/{name}/fleet/stop", post(stop_fleet))
        .route("/v1/clusters/{name}/versions/{version}", get(export_config))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Serves the API until the process is stopped.
///
/// # Errors
///
/// Returns [`ApiServerError`] when the configuration is invalid or the
/// listener cannot be bound.
pub async fn serve(config: ApiConfig, state: AppState) -> Result<(), ApiServerError> {
    config.validate().map_err(|err| ApiServerError::Config(err.to_string()))?;
    let addr: SocketAddr = config
        .bind
        .parse()
        .map_err(|err| ApiServerError::Config(format!("bind '{}': {err}", config.bind)))?;
    let app = router(state, config.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ApiServerError::Io(err.to_string()))?;
    axum::serve(listener, app).await.map_err(|err| ApiServerError::Io(err.to_string()))
}
