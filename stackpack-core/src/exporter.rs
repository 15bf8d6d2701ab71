//! Template export: parse, resolve every resource, return the rewritten document.
//!
//! Nested templates are exported depth-first through the same exporter, so
//! a parent only ever references the exported form of its children. The
//! chain of templates currently being exported is tracked to reject a
//! template that (transitively) nests itself.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{error, info};

use crate::contract::ObjectStore;
use crate::error::{PackageError, PackageResult};
use crate::resolver::{resolve_resource, ResolvedArtifact};
use crate::template::load_template;
use crate::uploader::ArtifactUploader;

pub struct TemplateExporter<'u, S: ObjectStore> {
    uploader: &'u mut ArtifactUploader<S>,
    in_progress: Vec<PathBuf>,
    resolved: Vec<ResolvedArtifact>,
}

impl<'u, S: ObjectStore> TemplateExporter<'u, S> {
    pub fn new(uploader: &'u mut ArtifactUploader<S>) -> Self {
        Self {
            uploader,
            in_progress: Vec::new(),
            resolved: Vec::new(),
        }
    }

    pub fn uploader_mut(&mut self) -> &mut ArtifactUploader<S> {
        &mut *self.uploader
    }

    /// Every local reference replaced so far, nested templates included.
    pub fn resolved(&self) -> &[ResolvedArtifact] {
        &self.resolved
    }

    /// Exports the template at `template_path` (relative to `base_directory`
    /// when not absolute). Artifact paths inside it are resolved relative to
    /// the template's own directory.
    pub fn export(&mut self, template_path: &Path, base_directory: &Path) -> PackageResult<Value> {
        let path = if template_path.is_absolute() {
            template_path.to_path_buf()
        } else {
            base_directory.join(template_path)
        };
        let canonical = fs::canonicalize(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PackageError::InvalidTemplatePath { path: path.clone() },
            _ => PackageError::io(&path, e),
        })?;

        if self.in_progress.contains(&canonical) {
            error!(template = %canonical.display(), "Nested template cycle detected");
            return Err(PackageError::CyclicTemplate { path: canonical });
        }

        self.in_progress.push(canonical.clone());
        let result = self.export_document(&canonical);
        self.in_progress.pop();
        result
    }

    fn export_document(&mut self, path: &Path) -> PackageResult<Value> {
        let mut document = load_template(path)?;
        let template_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        info!(
            template = %path.display(),
            depth = self.in_progress.len(),
            "Exporting template"
        );

        if let Some(Value::Object(resources)) = document.get_mut("Resources") {
            for (resource_id, resource) in resources.iter_mut() {
                let resolved = resolve_resource(self, resource_id, resource, &template_dir)?;
                self.resolved.extend(resolved);
            }
        }

        Ok(document)
    }
}
