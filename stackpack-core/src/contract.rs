//! # contract: the object store seam
//!
//! The packaging pipeline depends on exactly two remote operations: asking
//! whether an object already exists under a key, and storing bytes under a
//! key. [`ObjectStore`] captures that capability so the pipeline runs against
//! a real S3-compatible endpoint, a local directory, an in-memory store, or a
//! `mockall` mock in tests.
//!
//! ## Implementations
//! - `stackpack::upload::HttpObjectStore` (CLI crate): path-style REST calls.
//! - [`crate::store::LocalObjectStore`]: buckets emulated as directories.
//! - [`crate::store::MemoryObjectStore`]: in-process, records every call.
//!
//! Implementors convert transport or service failures into a boxed
//! [`StoreError`]; the uploader wraps it with the artifact's logical name.

use std::collections::BTreeMap;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Error type for store operations (simple boxed error, as the transport varies).
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Everything needed to store one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    /// User metadata attached to the object (`x-amz-meta-*` on S3).
    pub metadata: BTreeMap<String, String>,
    /// KMS key id for server-side encryption. `None` means store-managed keys.
    pub kms_key_id: Option<String>,
}

/// Capability interface over a remote object store.
///
/// Calls block until the store answers. Implementations must not retry on
/// their own; a failed call is fatal to the current export.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ObjectStore: Send + Sync {
    /// Returns whether an object is stored under `key` in `bucket`.
    fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError>;

    /// Stores the request body and returns the object's locator.
    fn put_object(&self, request: &PutObjectRequest) -> Result<String, StoreError>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        (**self).object_exists(bucket, key)
    }

    fn put_object(&self, request: &PutObjectRequest) -> Result<String, StoreError> {
        (**self).put_object(request)
    }
}

/// `s3://bucket/key`, the canonical locator form for an uploaded object.
pub fn s3_uri(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{key}")
}
