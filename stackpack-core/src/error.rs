//! Error taxonomy for a packaging run.
//!
//! Every variant is fatal: it is raised where the problem is detected and
//! propagated unchanged to the caller of [`crate::package::package`], which
//! owns presenting it. Nothing is written to the output destination once one
//! of these has been returned.

use std::path::PathBuf;
use thiserror::Error;

use crate::contract::StoreError;

pub type PackageResult<T> = Result<T, PackageError>;

#[derive(Error, Debug)]
pub enum PackageError {
    /// The template file given to the orchestrator does not exist.
    #[error("template file not found: {}", path.display())]
    InvalidTemplatePath { path: PathBuf },

    /// A resource property points at a local path that does not exist.
    #[error(
        "resource '{resource_id}' references '{}' in property {property}, but that path does not exist",
        path.display()
    )]
    MissingArtifact {
        resource_id: String,
        property: String,
        path: PathBuf,
    },

    /// The referenced path exists but is neither a regular file nor a directory.
    #[error("resource '{resource_id}' references '{}', which is not a file or directory", path.display())]
    InvalidArtifact { resource_id: String, path: PathBuf },

    /// The object store rejected or could not complete a transfer.
    #[error("failed to upload {logical_name}: {source}")]
    UploadFailed {
        logical_name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to parse template {}: {message}", path.display())]
    TemplateParse { path: PathBuf, message: String },

    /// A nested template (directly or transitively) references itself.
    #[error("template {} references itself through its nested templates", path.display())]
    CyclicTemplate { path: PathBuf },

    #[error("failed to render template: {0}")]
    Serialization(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PackageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackageError::Io {
            path: path.into(),
            source,
        }
    }
}
