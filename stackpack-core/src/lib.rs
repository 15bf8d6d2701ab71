#![doc = "stackpack-core: core logic library for stackpack."]

//! Packages an infrastructure template for deployment: every local artifact
//! the template references is uploaded to an object store under a
//! content-derived key, and the template is rewritten to point at the
//! uploaded objects.
//!
//! # Pipeline
//! [`package::package`] → [`exporter::TemplateExporter::export`] →
//! [`resolver::resolve_resource`] per resource → [`uploader::ArtifactUploader::upload`]
//! → locator written back → rendered document.
//!
//! The object store is reached only through [`contract::ObjectStore`].

pub mod archive;
pub mod contract;
pub mod error;
pub mod exporter;
pub mod package;
pub mod resolver;
pub mod resources;
pub mod store;
pub mod template;
pub mod uploader;

pub use contract::{ObjectStore, PutObjectRequest, StoreError};
pub use error::{PackageError, PackageResult};
pub use package::{package, PackageOptions, PackageReport};
pub use template::OutputFormat;
pub use uploader::{ArtifactUploader, UploadSettings, UploadedObject};
