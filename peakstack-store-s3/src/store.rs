// peakstack-store-s3/src/store.rs
// ============================================================================
// Module: S3 Object Store
// Description: S3-backed implementation of the core object-store interface.
// Purpose: Persist versioned configuration blobs with strict validation.
// Dependencies: aws-config, aws-sdk-s3, peakstack-core, tokio
// ============================================================================

//! ## Overview
//! The S3 object store bridges the synchronous core interface onto the
//! async S3 SDK through a dedicated runtime. Keys are validated against
//! traversal and length limits before any request is issued, and reads are
//! size-capped so a corrupted bucket cannot exhaust memory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use peakstack_core::BlobContent;
use peakstack_core::BlobVersionId;
use peakstack_core::ObjectStore;
use peakstack_core::ObjectStoreError;
use serde::Deserialize;
use thiserror::Error;
use tokio::runtime::Runtime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum size of a stored configuration blob.
pub const MAX_BLOB_BYTES: usize = 4 * 1024 * 1024;

/// Maximum length of a single key segment.
const MAX_KEY_SEGMENT_LENGTH: usize = 255;
/// Maximum total key length.
const MAX_KEY_LENGTH: usize = 1024;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Connection configuration for the S3 object store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3StoreConfig {
    /// Region override; falls back to the ambient environment.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override for S3-compatible stores.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Key prefix applied to every object.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Forces path-style addressing (needed by some compatible stores).
    #[serde(default)]
    pub force_path_style: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while building the S3 store.
#[derive(Debug, Error)]
pub enum S3StoreError {
    /// Configuration or key input is invalid.
    #[error("s3 store invalid: {0}")]
    Invalid(String),
    /// Runtime or I/O failure.
    #[error("s3 store io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Key Validation
// ============================================================================

/// Validates an object key before it reaches the backend.
///
/// # Errors
///
/// Returns [`ObjectStoreError::Store`] for empty keys, traversal
/// segments, or length violations.
pub fn validate_store_key(key: &str) -> Result<(), ObjectStoreError> {
    if key.is_empty() {
        return Err(ObjectStoreError::Store("empty object key".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(ObjectStoreError::Store(format!(
            "object key exceeds {MAX_KEY_LENGTH} bytes"
        )));
    }
    if key.starts_with('/') {
        return Err(ObjectStoreError::Store("object key must be relative".to_string()));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(ObjectStoreError::Store(format!(
                "object key segment '{segment}' is not allowed"
            )));
        }
        if segment.len() > MAX_KEY_SEGMENT_LENGTH {
            return Err(ObjectStoreError::Store(format!(
                "object key segment exceeds {MAX_KEY_SEGMENT_LENGTH} bytes"
            )));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Runtime Bridging
// ============================================================================

/// Blocks on an object-store future using the store's runtime.
fn block_on_with_runtime<F, T>(runtime: &Runtime, future: F) -> Result<T, ObjectStoreError>
where
    F: Future<Output = Result<T, ObjectStoreError>> + Send + 'static,
    T: Send + 'static,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        std::thread::spawn(move || {
            let result = Runtime::new()
                .map_err(|err| ObjectStoreError::Store(err.to_string()))
                .and_then(|runtime| runtime.block_on(future));
            let _ = tx.send(result);
        });
        return rx.recv().unwrap_or_else(|_| {
            Err(ObjectStoreError::Store("object store thread join failed".to_string()))
        });
    }
    runtime.block_on(future)
}

// ============================================================================
// SECTION: S3 Object Store
// ============================================================================

/// S3-backed implementation of the core object-store interface.
pub struct S3ObjectStore {
    /// Underlying S3 client.
    client: Client,
    /// Key prefix applied to every object.
    prefix: String,
    /// Runtime used to drive the async SDK from synchronous callers.
    runtime: Option<Arc<Runtime>>,
}

impl Drop for S3ObjectStore {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = std::thread::spawn(move || drop(runtime));
        }
    }
}

impl S3ObjectStore {
    /// Builds a new S3 object store from connection configuration.
    ///
    /// # Errors
    ///
    /// Returns [`S3StoreError`] when the runtime or client cannot be
    /// initialized.
    pub fn new(config: &S3StoreConfig) -> Result<Self, S3StoreError> {
        let prefix = normalize_prefix(config.prefix.as_deref().unwrap_or(""))?;
        let runtime = Runtime::new().map_err(|err| S3StoreError::Io(err.to_string()))?;
        let region = config.region.clone();
        let endpoint = config.endpoint.clone();
        let shared_config = block_on_with_runtime(&runtime, async move {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = region {
                loader = loader.region(Region::new(region));
            }
            if let Some(endpoint) = endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            Ok(loader.load().await)
        })
        .map_err(|err| S3StoreError::Io(err.to_string()))?;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        Ok(Self {
            client,
            prefix,
            runtime: Some(Arc::new(runtime)),
        })
    }

    /// Applies the configured prefix to a key.
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// Returns the runtime or an error when the store was shut down.
    fn runtime(&self) -> Result<&Runtime, ObjectStoreError> {
        self.runtime
            .as_ref()
            .map(AsRef::as_ref)
            .ok_or_else(|| ObjectStoreError::Store("object store runtime closed".to_string()))
    }
}

impl ObjectStore for S3ObjectStore {
    fn put_blob(
        &self,
        bucket: &str,
        key: &str,
        content: &BlobContent,
    ) -> Result<BlobVersionId, ObjectStoreError> {
        validate_store_key(key)?;
        let bytes = encode_content(content)?;
        if bytes.len() > MAX_BLOB_BYTES {
            return Err(ObjectStoreError::Store(format!(
                "blob '{key}' exceeds {MAX_BLOB_BYTES} bytes"
            )));
        }
        let content_type = match content {
            BlobContent::Text(_) => "text/plain",
            BlobContent::Json(_) => "application/json",
        };
        let client = self.client.clone();
        let bucket = bucket.to_string();
        let key = self.prefixed_key(key);
        let content_type = content_type.to_string();
        block_on_with_runtime(self.runtime()?, async move {
            let output = client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_type(content_type)
                .body(ByteStream::from(bytes))
                .send()
                .await
                .map_err(|err| ObjectStoreError::Store(err.to_string()))?;
            Ok(BlobVersionId::new(
                output.version_id().unwrap_or("null").to_string(),
            ))
        })
    }

    fn get_blob(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&BlobVersionId>,
    ) -> Result<BlobContent, ObjectStoreError> {
        validate_store_key(key)?;
        let client = self.client.clone();
        let bucket = bucket.to_string();
        let raw_key = key.to_string();
        let prefixed = self.prefixed_key(key);
        let version = version.map(|version| version.as_str().to_string());
        let bytes = block_on_with_runtime(self.runtime()?, async move {
            let mut request = client.get_object().bucket(bucket).key(prefixed);
            if let Some(version) = version {
                request = request.version_id(version);
            }
            let output = request.send().await.map_err(|err| {
                if err.to_string().contains("NoSuchKey") {
                    ObjectStoreError::NotFound(raw_key.clone())
                } else {
                    ObjectStoreError::Store(err.to_string())
                }
            })?;
            if let Some(length) = output.content_length()
                && usize::try_from(length).unwrap_or(usize::MAX) > MAX_BLOB_BYTES
            {
                return Err(ObjectStoreError::Store(format!(
                    "blob '{raw_key}' exceeds {MAX_BLOB_BYTES} bytes"
                )));
            }
            output
                .body
                .collect()
                .await
                .map(|data| data.to_vec())
                .map_err(|err| ObjectStoreError::Store(err.to_string()))
        })?;
        decode_content(key, &bytes)
    }

    fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<(), ObjectStoreError> {
        validate_store_key(prefix.trim_end_matches('/'))?;
        let client = self.client.clone();
        let bucket = bucket.to_string();
        let prefix = self.prefixed_key(prefix);
        block_on_with_runtime(self.runtime()?, async move {
            let mut continuation: Option<String> = None;
            loop {
                let mut request =
                    client.list_objects_v2().bucket(bucket.clone()).prefix(prefix.clone());
                if let Some(token) = continuation.take() {
                    request = request.continuation_token(token);
                }
                let listing = request
                    .send()
                    .await
                    .map_err(|err| ObjectStoreError::Store(err.to_string()))?;
                for object in listing.contents() {
                    if let Some(key) = object.key() {
                        client
                            .delete_object()
                            .bucket(bucket.clone())
                            .key(key)
                            .send()
                            .await
                            .map_err(|err| ObjectStoreError::Store(err.to_string()))?;
                    }
                }
                match listing.next_continuation_token() {
                    Some(token) => continuation = Some(token.to_string()),
                    None => break,
                }
            }
            Ok(())
        })
    }
}

// ============================================================================
// SECTION: Content Encoding
// ============================================================================

/// Encodes blob content into raw bytes.
fn encode_content(content: &BlobContent) -> Result<Vec<u8>, ObjectStoreError> {
    match content {
        BlobContent::Text(text) => Ok(text.clone().into_bytes()),
        BlobContent::Json(value) => {
            serde_json::to_vec(value).map_err(|err| ObjectStoreError::Store(err.to_string()))
        }
    }
}

/// Decodes raw bytes into blob content, keyed by the object suffix.
fn decode_content(key: &str, bytes: &[u8]) -> Result<BlobContent, ObjectStoreError> {
    if key.ends_with(".json") {
        serde_json::from_slice(bytes)
            .map(BlobContent::Json)
            .map_err(|err| ObjectStoreError::Store(format!("blob '{key}' is not valid json: {err}")))
    } else {
        String::from_utf8(bytes.to_vec())
            .map(BlobContent::Text)
            .map_err(|err| ObjectStoreError::Store(format!("blob '{key}' is not valid utf-8: {err}")))
    }
}

/// Normalizes a configured key prefix to end with a single slash.
fn normalize_prefix(prefix: &str) -> Result<String, S3StoreError> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(S3StoreError::Invalid(format!(
                "prefix segment '{segment}' is not allowed"
            )));
        }
    }
    Ok(format!("{trimmed}/"))
}
