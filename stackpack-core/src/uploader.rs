//! Content-addressed uploads.
//!
//! [`ArtifactUploader`] stores a payload under `<prefix>/<sha256>` in the
//! configured bucket. Because the key is derived from content, uploading the
//! same bytes twice lands on the same object, and an object that is already
//! present is not transferred again unless `force_upload` is set.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, error, info};

use crate::archive::fingerprint;
use crate::contract::{s3_uri, ObjectStore, PutObjectRequest};
use crate::error::{PackageError, PackageResult};

pub const DEFAULT_URL_BASE: &str = "https://s3.amazonaws.com";

/// Options applied to every object uploaded during a run.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub bucket: String,
    /// Key prefix, without trailing `/`. Empty or `None` means bucket root.
    pub prefix: Option<String>,
    pub kms_key_id: Option<String>,
    pub force_upload: bool,
    pub metadata: BTreeMap<String, String>,
    /// Base of path-style object URLs, e.g. `https://s3.eu-west-1.amazonaws.com`.
    pub url_base: String,
}

impl UploadSettings {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: None,
            kms_key_id: None,
            force_upload: false,
            metadata: BTreeMap::new(),
            url_base: DEFAULT_URL_BASE.to_string(),
        }
    }

    /// Object key for a payload with the given fingerprint.
    pub fn object_key(&self, fingerprint: &str) -> String {
        match self.prefix.as_deref().map(|p| p.trim_end_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}/{fingerprint}"),
            _ => fingerprint.to_string(),
        }
    }
}

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub bucket: String,
    pub key: String,
    pub fingerprint: String,
    /// Locator reported by the store, or `s3://bucket/key` when the transfer was skipped.
    /// Only logged; templates are rewritten from `bucket` and `key`.
    pub locator: String,
    url_base: String,
}

impl UploadedObject {
    pub fn s3_uri(&self) -> String {
        s3_uri(&self.bucket, &self.key)
    }

    /// Path-style URL: `<url_base>/<bucket>/<key>`.
    pub fn path_style_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.url_base.trim_end_matches('/'),
            self.bucket,
            self.key
        )
    }
}

/// Tally of store traffic for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub uploaded: usize,
    pub skipped_existing: usize,
    pub reused_in_run: usize,
}

pub struct ArtifactUploader<S: ObjectStore> {
    store: S,
    settings: UploadSettings,
    handled: HashMap<String, UploadedObject>,
    stats: UploadStats,
}

impl<S: ObjectStore> ArtifactUploader<S> {
    pub fn new(store: S, settings: UploadSettings) -> Self {
        Self {
            store,
            settings,
            handled: HashMap::new(),
            stats: UploadStats::default(),
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    /// Uploads `payload` under its content-derived key and returns where it lives.
    ///
    /// `logical_name` only identifies the artifact in logs and errors.
    pub fn upload(&mut self, payload: &[u8], logical_name: &str) -> PackageResult<UploadedObject> {
        let fingerprint = fingerprint(payload);
        let key = self.settings.object_key(&fingerprint);

        if let Some(existing) = self.handled.get(&key) {
            debug!(artifact = logical_name, key = %key, "Artifact already handled in this run");
            self.stats.reused_in_run += 1;
            return Ok(existing.clone());
        }

        let bucket = self.settings.bucket.clone();

        if !self.settings.force_upload {
            let exists = self
                .store
                .object_exists(&bucket, &key)
                .map_err(|source| {
                    error!(artifact = logical_name, key = %key, error = %source, "Existence check failed");
                    PackageError::UploadFailed {
                        logical_name: logical_name.to_string(),
                        source,
                    }
                })?;
            if exists {
                info!(artifact = logical_name, key = %key, "Object already exists, skipping upload");
                self.stats.skipped_existing += 1;
                let uploaded = self.record(key.clone(), fingerprint, s3_uri(&bucket, &key));
                return Ok(uploaded);
            }
        }

        let request = PutObjectRequest {
            bucket: bucket.clone(),
            key: key.clone(),
            body: payload.to_vec(),
            metadata: self.settings.metadata.clone(),
            kms_key_id: self.settings.kms_key_id.clone(),
        };
        info!(
            artifact = logical_name,
            bucket = %bucket,
            key = %key,
            size = payload.len(),
            forced = self.settings.force_upload,
            "Uploading artifact"
        );
        let locator = self.store.put_object(&request).map_err(|source| {
            error!(artifact = logical_name, key = %key, error = %source, "Upload failed");
            PackageError::UploadFailed {
                logical_name: logical_name.to_string(),
                source,
            }
        })?;
        self.stats.uploaded += 1;
        Ok(self.record(key, fingerprint, locator))
    }

    fn record(&mut self, key: String, fingerprint: String, locator: String) -> UploadedObject {
        let uploaded = UploadedObject {
            bucket: self.settings.bucket.clone(),
            key: key.clone(),
            fingerprint,
            locator,
            url_base: self.settings.url_base.clone(),
        };
        self.handled.insert(key, uploaded.clone());
        uploaded
    }
}
