// peakstack-core/src/core/mod.rs
// ============================================================================
// Module: Peakstack Core Types
// Description: Configuration model shared by every Peakstack surface.
// Purpose: Provide stable types for parameters, sections, and config trees.
// Dependencies: regex, serde, serde_json
// ============================================================================

//! ## Overview
//! Core types define the typed, versioned, section-based configuration
//! model: parameter values and constraints, section specifications, the
//! schema registry, the configuration root, and the flat storage
//! representation. These types are the canonical source of truth for the
//! CLI and HTTP surfaces.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod catalog;
pub mod config;
pub mod error;
pub mod finding;
pub mod hashing;
pub mod identifiers;
pub mod param;
pub mod schema;
pub mod section;
pub mod storage;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::cluster_schema;
pub use config::ClusterConfig;
pub use config::DocumentMode;
pub use error::ConfigError;
pub use finding::FindingLevel;
pub use finding::ValidationFinding;
pub use finding::ValidationReport;
pub use hashing::HashError;
pub use identifiers::BlobVersionId;
pub use identifiers::ClusterName;
pub use identifiers::ConfigVersion;
pub use identifiers::PolicyName;
pub use identifiers::SectionLabel;
pub use identifiers::StackName;
pub use param::DefaultRule;
pub use param::ParamSpec;
pub use param::UNKNOWN_POLICY;
pub use param::Visibility;
pub use schema::SchemaBuilder;
pub use schema::SchemaRegistry;
pub use section::DEFAULT_LABEL;
pub use section::DocumentSource;
pub use section::ParentRef;
pub use section::Section;
pub use section::SectionSpec;
pub use section::SettingsRef;
pub use storage::StackParam;
pub use value::AllowedValues;
pub use value::ParamValue;
pub use value::ValueKind;
