//! Application configuration management.
//!
//! Settings are merged with figment, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. TOML config file (`--config PATH`, or the platform config directory)
//! 3. Environment variables prefixed with `S3DEDUPE_` (`__` separates nested keys,
//!    e.g. `S3DEDUPE_S3__REGION=eu-west-1`)
//! 4. Command-line flags (applied by the command layer)
//!
//! ```toml
//! backend = "s3"
//! register_path = "s3-duplicates.json"
//! list_threads = 4
//!
//! [s3]
//! region = "us-east-2"
//! endpoint_url = "http://localhost:9000"
//! force_path_style = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Default location the check phase writes its register to.
pub const DEFAULT_REGISTER_PATH: &str = "s3-duplicates.json";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "S3DEDUPE_";

/// Which storage backend a command talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Amazon S3 or an S3-compatible service
    #[default]
    S3,
    /// A local directory whose subdirectories act as buckets
    Local,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::S3 => write!(f, "s3"),
            BackendKind::Local => write!(f, "local"),
        }
    }
}

/// Settings for the S3 backend. Unset values fall back to the AWS provider chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    /// Region override
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services
    pub endpoint_url: Option<String>,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    pub force_path_style: bool,
}

/// Settings for the local directory backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// Directory whose subdirectories are treated as buckets
    pub root: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage backend
    pub backend: BackendKind,
    /// Where `check` writes the duplicate register
    pub register_path: PathBuf,
    /// Buckets listed concurrently (1 = sequential)
    pub list_threads: usize,
    /// Maximum objects requested per listing page
    pub page_size: Option<usize>,
    /// S3 backend settings
    pub s3: S3Settings,
    /// Local backend settings
    pub local: LocalSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            register_path: PathBuf::from(DEFAULT_REGISTER_PATH),
            list_threads: 1,
            page_size: None,
            s3: S3Settings::default(),
            local: LocalSettings::default(),
        }
    }
}

impl Config {
    /// Load the layered configuration.
    ///
    /// An explicit `path` must exist; the default platform path is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit file is missing or any layer fails to
    /// parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                Some(p.to_path_buf())
            }
            None => Self::config_path().ok().filter(|p| p.exists()),
        };

        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = &file {
            log::debug!("Loading config file: {}", file.display());
            figment = figment.merge(Toml::file(file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment
            .extract()
            .context("Failed to load configuration")?;
        Ok(config)
    }

    /// Write this configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Default platform-specific configuration path.
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "s3dedupe", "s3dedupe")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }

    /// Whether bucket listing should fan out over a thread pool.
    #[must_use]
    pub fn parallel_listing(&self) -> bool {
        self.list_threads > 1
    }
}
