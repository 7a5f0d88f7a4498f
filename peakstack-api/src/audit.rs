// peakstack-api/src/audit.rs
// ============================================================================
// Module: API Audit Logging
// Description: Structured audit events for lifecycle requests.
// Purpose: Emit one redacted audit record per request without hard deps.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every lifecycle request produces one audit event. Events are serialized
//! as single-line JSON and routed through an [`AuditSink`]; the default
//! sink writes to stderr so deployments can attach their preferred log
//! pipeline without redesign.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One audit record for a lifecycle request.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Cluster the request addressed, when applicable.
    pub cluster: Option<String>,
    /// Lifecycle operation name.
    pub operation: &'static str,
    /// Request outcome.
    pub outcome: AuditOutcome,
    /// Stable error kind for failed requests.
    pub error_kind: Option<String>,
}

/// Outcome classification for audit events.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Request completed successfully.
    Ok,
    /// Request failed.
    Error,
}

impl AuditEvent {
    /// Builds an audit event for one finished request.
    #[must_use]
    pub fn finished(
        operation: &'static str,
        cluster: Option<&str>,
        error_kind: Option<&str>,
    ) -> Self {
        Self {
            event: "cluster_api_request",
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis())
                .unwrap_or_default(),
            cluster: cluster.map(ToString::to_string),
            operation,
            outcome: if error_kind.is_some() { AuditOutcome::Error } else { AuditOutcome::Ok },
            error_kind: error_kind.map(ToString::to_string),
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for audit events.
pub trait AuditSink {
    /// Emits one audit event. Sinks must never fail the request path.
    fn emit(&self, event: &AuditEvent);
}

/// Audit sink writing single-line JSON records to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn emit(&self, event: &AuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{line}");
        }
    }
}

/// Audit sink discarding every event (tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn emit(&self, _event: &AuditEvent) {}
}
