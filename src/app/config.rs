//! Collector configuration
//!
//! Settings come from an optional TOML file, then `CSI_GC_*` environment
//! variables, then command line flags, each layer overriding the previous.

use anyhow::{Context, Result};
use serde::de::{value::StrDeserializer, IntoDeserializer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gc::{BinaryPolicy, GcOptions};
use crate::paths::{CsiLayout, DEFAULT_ROOT_DIR};

/// Environment variable overriding [`GcConfig::root_dir`]
pub const ROOT_DIR_ENV: &str = "CSI_GC_ROOT_DIR";
/// Environment variable overriding [`GcConfig::dry_run`]
pub const DRY_RUN_ENV: &str = "CSI_GC_DRY_RUN";

/// Configuration of the cache collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Root cache directory shared by all tenants
    pub root_dir: PathBuf,

    /// Report removals without performing them
    pub dry_run: bool,

    /// Time between passes in watch mode
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Remove legacy run directories once they hold no volumes
    pub prune_empty_run_dirs: bool,

    /// Which agent binaries of current-layout tenants to reclaim
    pub binary_policy: BinaryPolicy,
}

fn default_interval() -> Duration {
    Duration::from_secs(300)
}

/// Parse a human readable duration such as `90s` or `5m`
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let deserializer: StrDeserializer<'_, serde::de::value::Error> = value.into_deserializer();
    humantime_serde::deserialize(deserializer).map_err(|e| e.to_string())
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            dry_run: false,
            interval: default_interval(),
            prune_empty_run_dirs: false,
            binary_policy: BinaryPolicy::default(),
        }
    }
}

impl GcConfig {
    /// Load configuration from an optional file and the process environment
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path).await?,
            None => Self::default(),
        };
        config.merge_env_vars(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a TOML configuration file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `CSI_GC_*` overrides using `lookup` to read variables
    ///
    /// Unparseable boolean values are ignored.
    pub fn merge_env_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root_dir) = lookup(ROOT_DIR_ENV).filter(|v| !v.is_empty()) {
            self.root_dir = PathBuf::from(root_dir);
        }

        if let Some(dry_run) = lookup(DRY_RUN_ENV) {
            if let Ok(value) = dry_run.parse::<bool>() {
                self.dry_run = value;
            }
        }
    }

    pub fn with_root_dir(mut self, root_dir: PathBuf) -> Self {
        self.root_dir = root_dir;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn options(&self) -> GcOptions {
        GcOptions {
            dry_run: self.dry_run,
            prune_empty_run_dirs: self.prune_empty_run_dirs,
        }
    }

    pub fn layout(&self) -> CsiLayout {
        CsiLayout::new(self.root_dir.clone())
    }
}
