//! Per-resource artifact resolution.
//!
//! For one resource definition: look up its artifact-reference fields, turn
//! every local path among them into an uploaded object, and write the
//! object's locator back in place. Values that are not plain local paths
//! (remote URIs, inline mappings, intrinsic functions) are left alone, so
//! resolving an already exported template changes nothing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::archive;
use crate::contract::ObjectStore;
use crate::error::{PackageError, PackageResult};
use crate::exporter::TemplateExporter;
use crate::resources::{artifact_fields, ArtifactField, ArtifactKind, LocatorStyle, INLINE_CODE_PROPERTY};
use crate::template::{render, OutputFormat};
use crate::uploader::UploadedObject;

static URI_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("valid URI scheme pattern"));

/// A local reference that was replaced during export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub resource_id: String,
    pub property: &'static str,
    pub local_path: PathBuf,
    pub object: UploadedObject,
}

/// Whether a property value already points at a remote location.
pub fn is_remote_reference(value: &str) -> bool {
    URI_SCHEME.is_match(value)
}

/// Resolves the artifact fields of `resource`, in place.
///
/// Relative paths are taken relative to `base_directory`. Nested templates
/// are exported through `exporter` before they are uploaded.
pub fn resolve_resource<S: ObjectStore>(
    exporter: &mut TemplateExporter<'_, S>,
    resource_id: &str,
    resource: &mut Value,
    base_directory: &Path,
) -> PackageResult<Vec<ResolvedArtifact>> {
    let Some(definition) = resource.as_object_mut() else {
        return Ok(Vec::new());
    };
    let Some(resource_type) = definition.get("Type").and_then(Value::as_str) else {
        return Ok(Vec::new());
    };
    let fields = artifact_fields(resource_type);
    if fields.is_empty() {
        return Ok(Vec::new());
    }
    let resource_type = resource_type.to_string();

    // Every referenced path must exist before anything is uploaded for this resource.
    let mut pending = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(local) = local_reference(definition, field) else {
            continue;
        };
        let local_path = absolute(base_directory, Path::new(&local));
        debug!(
            resource = resource_id,
            resource_type = %resource_type,
            property = field.property,
            path = %local_path.display(),
            "Resolving local artifact"
        );
        if !local_path.exists() {
            error!(resource = resource_id, path = %local_path.display(), "Referenced artifact does not exist");
            return Err(PackageError::MissingArtifact {
                resource_id: resource_id.to_string(),
                property: field.property.to_string(),
                path: local_path,
            });
        }
        pending.push((field, local_path));
    }

    let mut resolved = Vec::with_capacity(pending.len());
    for (field, local_path) in pending {
        let object = match field.kind {
            ArtifactKind::Template => upload_nested_template(exporter, resource_id, &local_path)?,
            ArtifactKind::Artifact { force_zip } => {
                let payload = package_path(resource_id, &local_path, force_zip)?;
                exporter
                    .uploader_mut()
                    .upload(&payload, &local_path.display().to_string())?
            }
        };
        write_locator(definition, field, &object);
        info!(
            resource = resource_id,
            property = field.property,
            locator = %object.locator,
            "Replaced local artifact reference"
        );
        resolved.push(ResolvedArtifact {
            resource_id: resource_id.to_string(),
            property: field.property,
            local_path,
            object,
        });
    }
    Ok(resolved)
}

/// The local path held by `field`, if it holds one.
fn local_reference(definition: &Map<String, Value>, field: &ArtifactField) -> Option<String> {
    let properties = definition.get("Properties");
    if properties
        .and_then(|p| p.get(INLINE_CODE_PROPERTY))
        .is_some()
    {
        return None;
    }
    match properties.and_then(|p| p.pointer(&pointer(field))) {
        Some(Value::String(s)) if is_remote_reference(s) => {
            debug!(property = field.property, value = %s, "Already remote, leaving untouched");
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => None,
        None if field.package_missing && properties.map_or(true, Value::is_object) => {
            Some(".".to_string())
        }
        None => None,
    }
}

fn write_locator(definition: &mut Map<String, Value>, field: &ArtifactField, object: &UploadedObject) {
    let value = match field.locator {
        LocatorStyle::S3Uri => Value::String(object.s3_uri()),
        LocatorStyle::PathStyleUrl => Value::String(object.path_style_url()),
        LocatorStyle::ObjectFields {
            bucket_field,
            key_field,
        } => {
            let mut fields = Map::with_capacity(2);
            fields.insert(bucket_field.to_string(), Value::String(object.bucket.clone()));
            fields.insert(key_field.to_string(), Value::String(object.key.clone()));
            Value::Object(fields)
        }
    };

    let properties = definition
        .entry("Properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(slot) = properties.pointer_mut(&pointer(field)) {
        *slot = value;
    } else if let Some(properties) = properties.as_object_mut() {
        properties.insert(field.property.to_string(), value);
    }
}

fn pointer(field: &ArtifactField) -> String {
    field.path().fold(String::new(), |mut acc, segment| {
        acc.push('/');
        acc.push_str(segment);
        acc
    })
}

fn absolute(base_directory: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_directory.join(path)
    }
}

/// Payload for a file or directory artifact.
fn package_path(resource_id: &str, path: &Path, force_zip: bool) -> PackageResult<Vec<u8>> {
    if path.is_dir() {
        archive::zip_directory(path)
    } else if path.is_file() {
        if force_zip && !archive::is_zip_file(path)? {
            archive::zip_file(path)
        } else {
            fs::read(path).map_err(|e| PackageError::io(path, e))
        }
    } else {
        Err(PackageError::InvalidArtifact {
            resource_id: resource_id.to_string(),
            path: path.to_path_buf(),
        })
    }
}

fn upload_nested_template<S: ObjectStore>(
    exporter: &mut TemplateExporter<'_, S>,
    resource_id: &str,
    path: &Path,
) -> PackageResult<UploadedObject> {
    if !path.is_file() {
        return Err(PackageError::InvalidArtifact {
            resource_id: resource_id.to_string(),
            path: path.to_path_buf(),
        });
    }
    let child_dir = path.parent().unwrap_or(Path::new("."));
    info!(resource = resource_id, template = %path.display(), "Exporting nested template");
    let child = exporter.export(path, child_dir)?;
    let body = render(&child, OutputFormat::Yaml)?;
    exporter
        .uploader_mut()
        .upload(body.as_bytes(), &path.display().to_string())
}
