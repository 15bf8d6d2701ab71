//! In-process [`ObjectStore`] implementations.
//!
//! [`LocalObjectStore`] keeps buckets as directories under a root, which is
//! what a `file://` endpoint selects on the command line. [`MemoryObjectStore`]
//! holds objects in memory and records every call; clones share state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contract::{s3_uri, ObjectStore, PutObjectRequest, StoreError};

const METADATA_SUFFIX: &str = ".metadata.json";

/// Sidecar written next to each object stored by [`LocalObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObjectMetadata {
    pub size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Buckets as directories: object `key` of `bucket` lives at `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fails for bucket or key segments that would leave the store root (`.`, `..`).
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for segment in std::iter::once(bucket).chain(key.split('/')) {
            match segment {
                "" => continue,
                "." | ".." => {
                    return Err(format!("object key '{bucket}/{key}' contains a '{segment}' segment").into())
                }
                _ => path.push(segment),
            }
        }
        Ok(path)
    }

    /// Reads back the metadata sidecar of a stored object.
    pub fn read_metadata(&self, bucket: &str, key: &str) -> Result<StoredObjectMetadata, StoreError> {
        let path = sidecar_path(&self.object_path(bucket, key)?);
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

fn sidecar_path(object_path: &Path) -> PathBuf {
    let mut name = object_path.as_os_str().to_owned();
    name.push(METADATA_SUFFIX);
    PathBuf::from(name)
}

impl ObjectStore for LocalObjectStore {
    fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self.object_path(bucket, key)?.is_file())
    }

    fn put_object(&self, request: &PutObjectRequest) -> Result<String, StoreError> {
        let path = self.object_path(&request.bucket, &request.key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &request.body)?;
        let sidecar = StoredObjectMetadata {
            size: request.body.len(),
            kms_key_id: request.kms_key_id.clone(),
            metadata: request.metadata.clone(),
        };
        fs::write(sidecar_path(&path), serde_json::to_vec_pretty(&sidecar)?)?;
        debug!(path = %path.display(), size = request.body.len(), "Stored object on local filesystem");
        Ok(s3_uri(&request.bucket, &request.key))
    }
}

/// One call made against a [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Exists { bucket: String, key: String },
    Put { bucket: String, key: String },
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<(String, String), PutObjectRequest>,
    calls: Vec<StoreCall>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object without recording a call.
    pub fn insert(&self, bucket: &str, key: &str, body: Vec<u8>) {
        let request = PutObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body,
            metadata: BTreeMap::new(),
            kms_key_id: None,
        };
        self.lock()
            .objects
            .insert((bucket.to_string(), key.to_string()), request);
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<PutObjectRequest> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn put_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, StoreCall::Put { .. }))
            .count()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Exists {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        Ok(state
            .objects
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    fn put_object(&self, request: &PutObjectRequest) -> Result<String, StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Put {
            bucket: request.bucket.clone(),
            key: request.key.clone(),
        });
        state.objects.insert(
            (request.bucket.clone(), request.key.clone()),
            request.clone(),
        );
        Ok(s3_uri(&request.bucket, &request.key))
    }
}
