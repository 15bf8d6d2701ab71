#![doc = "HTTP object store: the networked `ObjectStore` used by the CLI."]
//
//! # S3-compatible REST client
//!
//! [`HttpObjectStore`] speaks path-style S3 REST (`<endpoint>/<bucket>/<key>`)
//! over a blocking `reqwest` client:
//!
//! - `HEAD` answers [`ObjectStore::object_exists`]. A 404 means absent; so
//!   does a 403, which is what S3 returns for a missing key when the caller
//!   may not list the bucket.
//! - `PUT` stores the object with `x-amz-server-side-encryption` and one
//!   `x-amz-meta-<name>` header per metadata entry.
//!
//! Requests are sent unsigned. Credential handling is left to whatever sits
//! in front of the endpoint (a signing proxy, presigned bucket policy, or a
//! local emulator).

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use stackpack_core::contract::{s3_uri, ObjectStore, PutObjectRequest, StoreError};

pub struct HttpObjectStore {
    client: Client,
    endpoint: Url,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str) -> Result<Self, StoreError> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            tracing::error!(error = ?e, endpoint, "Invalid object store endpoint");
            format!("invalid endpoint URL '{endpoint}': {e}")
        })?;
        let client = Client::builder()
            .user_agent(concat!("stackpack/", env!("CARGO_PKG_VERSION")))
            .build()?;
        tracing::info!(endpoint = %endpoint, "Initialized HTTP object store client");
        Ok(Self { client, endpoint })
    }

    pub fn object_url(&self, bucket: &str, key: &str) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| format!("endpoint {} cannot carry a path", self.endpoint))?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        Ok(url)
    }
}

impl ObjectStore for HttpObjectStore {
    fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        let url = self.object_url(bucket, key)?;
        tracing::debug!(url = %url, "Checking whether object exists");
        let response = self.client.head(url.clone()).send().map_err(|e| {
            tracing::error!(error = ?e, url = %url, "HEAD request failed");
            e
        })?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(false),
            status => {
                tracing::error!(url = %url, %status, "Unexpected status checking object");
                Err(format!("HEAD {url} returned {status}").into())
            }
        }
    }

    fn put_object(&self, request: &PutObjectRequest) -> Result<String, StoreError> {
        let url = self.object_url(&request.bucket, &request.key)?;
        tracing::info!(
            url = %url,
            size = request.body.len(),
            metadata_entries = request.metadata.len(),
            "Uploading object"
        );

        let mut builder = self
            .client
            .put(url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(request.body.clone());
        builder = match &request.kms_key_id {
            Some(key_id) => builder
                .header("x-amz-server-side-encryption", "aws:kms")
                .header("x-amz-server-side-encryption-aws-kms-key-id", key_id.as_str()),
            None => builder.header("x-amz-server-side-encryption", "AES256"),
        };
        for (name, value) in &request.metadata {
            builder = builder.header(format!("x-amz-meta-{name}"), value.as_str());
        }

        let response = builder.send().map_err(|e| {
            tracing::error!(error = ?e, url = %url, "PUT request failed");
            e
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::error!(url = %url, %status, body = %body, "Object store rejected upload");
            return Err(format!("PUT {url} returned {status}: {body}").into());
        }

        tracing::info!(url = %url, "Successfully uploaded object");
        Ok(s3_uri(&request.bucket, &request.key))
    }
}
