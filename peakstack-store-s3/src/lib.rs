// peakstack-store-s3/src/lib.rs
// ============================================================================
// Module: Peakstack S3 Store Library
// Description: Object-store collaborator backed by S3-compatible storage.
// Purpose: Persist configuration artifacts durably outside the stack.
// Dependencies: aws-config, aws-sdk-s3, peakstack-core, tokio
// ============================================================================

//! ## Overview
//! This crate implements the core [`peakstack_core::ObjectStore`] interface
//! over S3-compatible storage. Keys and payload sizes are validated before
//! any call reaches the backend; storage is treated as untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_BLOB_BYTES;
pub use store::S3ObjectStore;
pub use store::S3StoreConfig;
pub use store::S3StoreError;
pub use store::validate_store_key;
