//! Package orchestration: validate → export → render → write.
//!
//! This is the whole pipeline behind `stackpack package`. The caller picks
//! the [`ObjectStore`] and the stream that stands in for standard output;
//! everything else comes from [`PackageOptions`].
//!
//! # Responsibilities
//! - Fail fast when the template file does not exist, before any store traffic
//! - Build the [`ArtifactUploader`] from the user's upload settings
//! - Export the template and render it as JSON or YAML
//! - Write the result to the output file (atomically) or to `out`
//!
//! # Error Handling
//! Any failure aborts the run and nothing is written: the document is fully
//! rendered before the output file is touched, and the output file only
//! appears once its complete contents have been flushed.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::contract::ObjectStore;
use crate::error::{PackageError, PackageResult};
use crate::exporter::TemplateExporter;
use crate::resolver::ResolvedArtifact;
use crate::template::{render, OutputFormat};
use crate::uploader::{ArtifactUploader, UploadSettings, UploadStats};

#[derive(Debug, Clone)]
pub struct PackageOptions {
    pub template_file: PathBuf,
    /// Directory the template path is relative to; usually the working directory.
    pub base_directory: PathBuf,
    /// `None` writes the packaged template to standard output.
    pub output_template_file: Option<PathBuf>,
    pub format: OutputFormat,
    pub upload: UploadSettings,
}

#[derive(Debug)]
pub struct PackageReport {
    pub artifacts: Vec<ResolvedArtifact>,
    pub stats: UploadStats,
    /// Absolute path of the written output file, when one was requested.
    pub output_path: Option<PathBuf>,
}

pub fn package<S: ObjectStore>(
    options: &PackageOptions,
    store: S,
    out: &mut impl Write,
) -> PackageResult<PackageReport> {
    let template_path = if options.template_file.is_absolute() {
        options.template_file.clone()
    } else {
        options.base_directory.join(&options.template_file)
    };
    if !template_path.is_file() {
        error!(template = %template_path.display(), "Template file not found");
        return Err(PackageError::InvalidTemplatePath {
            path: options.template_file.clone(),
        });
    }

    info!(
        template = %template_path.display(),
        bucket = %options.upload.bucket,
        prefix = options.upload.prefix.as_deref().unwrap_or(""),
        force_upload = options.upload.force_upload,
        "Packaging template"
    );

    let mut uploader = ArtifactUploader::new(store, options.upload.clone());
    let mut exporter = TemplateExporter::new(&mut uploader);
    let exported = exporter.export(&template_path, &options.base_directory)?;
    let artifacts = exporter.resolved().to_vec();
    let rendered = render(&exported, options.format)?;
    let stats = uploader.stats();

    let output_path = match &options.output_template_file {
        None => {
            out.write_all(rendered.as_bytes())
                .and_then(|_| out.flush())
                .map_err(|e| PackageError::io("<stdout>", e))?;
            None
        }
        Some(output_file) => {
            write_atomically(output_file, &rendered)?;
            let absolute = fs::canonicalize(output_file)
                .map_err(|e| PackageError::io(output_file, e))?;
            writeln!(
                out,
                "Successfully packaged artifacts and wrote output template to file {}.",
                output_file.display()
            )
            .and_then(|_| {
                writeln!(out, "Execute the following command to deploy the packaged template")
            })
            .and_then(|_| {
                writeln!(
                    out,
                    "sam deploy --template-file {} --stack-name <YOUR STACK NAME>",
                    absolute.display()
                )
            })
            .and_then(|_| out.flush())
            .map_err(|e| PackageError::io("<stdout>", e))?;
            Some(absolute)
        }
    };

    info!(
        artifacts = artifacts.len(),
        uploaded = stats.uploaded,
        skipped_existing = stats.skipped_existing,
        reused_in_run = stats.reused_in_run,
        "Packaging complete"
    );

    Ok(PackageReport {
        artifacts,
        stats,
        output_path,
    })
}

fn write_atomically(path: &Path, contents: &str) -> PackageResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| PackageError::io(dir, e))?;
    tmp.write_all(contents.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| PackageError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| PackageError::io(path, e.error))?;
    Ok(())
}
