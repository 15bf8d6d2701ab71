///
/// This module implements the CLI interface for stackpack: argument parsing,
/// settings resolution, and the `run` entrypoint shared by `main` and the
/// integration tests.
///
/// All packaging logic (export, artifact resolution, uploads) lives in the
/// [`stackpack-core`] crate. This module only turns flags, environment
/// variables and the optional config file into a [`PackageOptions`] and picks
/// the object store.
///
/// [`stackpack-core`]: ../../stackpack-core/
use crate::load_config::{load_config, StoreSettings};
use crate::upload::HttpObjectStore;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use stackpack_core::store::LocalObjectStore;
use stackpack_core::uploader::DEFAULT_URL_BASE;
use stackpack_core::{package, ObjectStore, OutputFormat, PackageOptions, UploadSettings};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// CLI for stackpack: package infrastructure templates for deployment.
#[derive(Parser, Debug)]
#[clap(
    name = "stackpack",
    version,
    about = "Upload the local artifacts a template references and rewrite it to point at the uploads"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload local artifacts referenced by a template and write the packaged template
    Package(PackageArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct PackageArgs {
    /// Path to the template to package
    #[clap(long, alias = "template")]
    pub template_file: PathBuf,

    /// Bucket artifacts are uploaded to
    #[clap(long, env = "STACKPACK_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Prefix prepended to every object key
    #[clap(long, env = "STACKPACK_S3_PREFIX")]
    pub s3_prefix: Option<String>,

    /// KMS key id used to encrypt uploaded artifacts
    #[clap(long, env = "STACKPACK_KMS_KEY_ID")]
    pub kms_key_id: Option<String>,

    /// Write the packaged template here instead of standard output
    #[clap(long)]
    pub output_template_file: Option<PathBuf>,

    /// Render the packaged template as JSON (default is YAML)
    #[clap(long)]
    pub use_json: bool,

    /// Upload artifacts even if an object with the same key already exists
    #[clap(long)]
    pub force_upload: bool,

    /// Metadata attached to every uploaded artifact: KEY=VALUE or a JSON object; repeatable
    #[clap(long = "metadata", value_name = "KEY=VALUE|JSON")]
    pub metadata: Vec<String>,

    /// Region of the object store; selects the default endpoint
    #[clap(long, env = "STACKPACK_REGION")]
    pub region: Option<String>,

    /// Named profile from the config file
    #[clap(long, env = "STACKPACK_PROFILE")]
    pub profile: Option<String>,

    /// Object store endpoint; a file:// URL stores objects in a local directory
    #[clap(long, env = "STACKPACK_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// YAML config file with store defaults and profiles
    #[clap(long, env = "STACKPACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory the template path is relative to (defaults to the working directory)
    #[clap(long)]
    pub base_dir: Option<PathBuf>,
}

/// Parses one `--metadata` value: `KEY=VALUE` or a JSON object of strings.
pub fn parse_metadata(raw: &str) -> Result<BTreeMap<String, String>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .with_context(|| format!("--metadata '{raw}' is not a JSON object of strings"));
    }
    match trimmed.split_once('=') {
        Some((key, value)) if !key.is_empty() => {
            Ok(BTreeMap::from([(key.to_string(), value.to_string())]))
        }
        _ => anyhow::bail!("--metadata '{raw}' must be KEY=VALUE or a JSON object"),
    }
}

/// Endpoint used when none is configured: the global or regional S3 endpoint.
pub fn default_endpoint(region: Option<&str>) -> String {
    match region {
        Some(region) if !region.is_empty() => format!("https://s3.{region}.amazonaws.com"),
        _ => DEFAULT_URL_BASE.to_string(),
    }
}

/// Combines flags, the config file and defaults into the options for one run.
/// Returns the options and the endpoint the store should talk to.
pub fn resolve_options(args: &PackageArgs) -> Result<(PackageOptions, String)> {
    let file_settings = match &args.config {
        Some(path) => load_config(path)?.settings_for(args.profile.as_deref())?,
        None => {
            if let Some(profile) = &args.profile {
                tracing::warn!(profile = %profile, "--profile given without a config file; ignoring");
            }
            StoreSettings::default()
        }
    };

    let mut metadata = BTreeMap::new();
    for raw in &args.metadata {
        metadata.extend(parse_metadata(raw)?);
    }
    let flag_settings = StoreSettings {
        s3_bucket: args.s3_bucket.clone(),
        s3_prefix: args.s3_prefix.clone(),
        kms_key_id: args.kms_key_id.clone(),
        region: args.region.clone(),
        endpoint_url: args.endpoint_url.clone(),
        metadata,
    };
    let settings = file_settings.overlay(flag_settings);

    let bucket = settings.s3_bucket.clone().context(
        "an S3 bucket is required: pass --s3-bucket, set STACKPACK_S3_BUCKET or s3_bucket in the config file",
    )?;
    let endpoint = settings
        .endpoint_url
        .clone()
        .unwrap_or_else(|| default_endpoint(settings.region.as_deref()));

    let base_directory = match &args.base_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to determine the working directory")?,
    };

    let upload = UploadSettings {
        bucket,
        prefix: settings.s3_prefix,
        kms_key_id: settings.kms_key_id,
        force_upload: args.force_upload,
        metadata: settings.metadata,
        url_base: endpoint.trim_end_matches('/').to_string(),
    };

    let options = PackageOptions {
        template_file: args.template_file.clone(),
        base_directory,
        output_template_file: args.output_template_file.clone(),
        format: if args.use_json {
            OutputFormat::Json
        } else {
            OutputFormat::Yaml
        },
        upload,
    };
    Ok((options, endpoint))
}

/// Picks the store for an endpoint: `file://` → local directory, anything else → HTTP.
pub fn open_store(endpoint: &str) -> Result<Box<dyn ObjectStore>> {
    if let Some(root) = endpoint.strip_prefix("file://") {
        tracing::info!(root, "Using local directory object store");
        return Ok(Box::new(LocalObjectStore::new(root)));
    }
    let store = HttpObjectStore::new(endpoint).map_err(|e| anyhow::anyhow!(e))?;
    Ok(Box::new(store))
}

/// Extracted CLI logic entrypoint for integration tests and main()
pub fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Package(args) => {
            let (options, endpoint) = resolve_options(&args)?;
            tracing::info!(
                command = "package",
                template = %options.template_file.display(),
                endpoint = %endpoint,
                "Starting packaging"
            );
            let store = open_store(&endpoint)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            match package(&options, store, &mut out) {
                Ok(report) => {
                    tracing::info!(
                        command = "package",
                        artifacts = report.artifacts.len(),
                        uploaded = report.stats.uploaded,
                        "Packaging complete"
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "package", error = %e, "Packaging failed");
                    Err(e.into())
                }
            }
        }
    }
}
