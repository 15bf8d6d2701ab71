/// `load_config` module: loads the optional YAML config file that supplies store defaults.
///
/// The file holds the same settings as the `package` flags, once at the top
/// level and optionally per named profile:
///
/// ```yaml
/// s3_bucket: artifacts-dev
/// region: eu-west-1
/// metadata:
///   team: platform
/// profiles:
///   prod:
///     s3_bucket: artifacts-prod
///     kms_key_id: alias/artifacts
/// ```
///
/// Precedence when resolving: command-line flag or environment variable,
/// then the selected profile, then the top-level defaults.
///
/// # Errors
/// All errors use `anyhow::Error` and surface at the CLI boundary.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreSettings {
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub kms_key_id: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl StoreSettings {
    /// `other` wins wherever it has a value; metadata maps are merged.
    pub fn overlay(mut self, other: StoreSettings) -> StoreSettings {
        self.s3_bucket = other.s3_bucket.or(self.s3_bucket);
        self.s3_prefix = other.s3_prefix.or(self.s3_prefix);
        self.kms_key_id = other.kms_key_id.or(self.kms_key_id);
        self.region = other.region.or(self.region);
        self.endpoint_url = other.endpoint_url.or(self.endpoint_url);
        self.metadata.extend(other.metadata);
        self
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub defaults: StoreSettings,
    #[serde(default)]
    pub profiles: BTreeMap<String, StoreSettings>,
}

impl CliConfig {
    /// Top-level defaults with the named profile applied on top.
    pub fn settings_for(&self, profile: Option<&str>) -> Result<StoreSettings> {
        let Some(name) = profile else {
            return Ok(self.defaults.clone());
        };
        match self.profiles.get(name) {
            Some(selected) => {
                debug!(profile = name, "Applying config profile");
                Ok(self.defaults.clone().overlay(selected.clone()))
            }
            None => {
                error!(profile = name, "Profile not found in config file");
                anyhow::bail!(
                    "profile '{}' is not defined in the config file (known profiles: {})",
                    name,
                    self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
                )
            }
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref)
        .inspect_err(|e| error!(error = ?e, config_path = ?path_ref, "Failed to read config file"))
        .with_context(|| format!("Failed to read config file {}", path_ref.display()))?;

    let config: CliConfig = serde_yaml::from_str(&config_content)
        .inspect_err(|e| error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML"))
        .with_context(|| format!("Failed to parse config YAML {}", path_ref.display()))?;

    info!(
        config_path = ?path_ref,
        profiles = config.profiles.len(),
        "Parsed config YAML successfully"
    );
    Ok(config)
}
