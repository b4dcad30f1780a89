//! `harvester.ron`: run settings and the retailers to harvest.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use engine_logging::{engine_info, engine_warn};
use harvester_engine::{FetchSettings, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::profiles;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_dir: PathBuf,
    pub state_file: PathBuf,
    /// Run-wide budget per retailer, in seconds.
    pub deadline_secs: Option<u64>,
    pub retry: RetryConfig,
    pub fetch: FetchConfig,
    pub retailers: Vec<RetailerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            state_file: PathBuf::from("harvester_state.ron"),
            deadline_secs: None,
            retry: RetryConfig::default(),
            fetch: FetchConfig::default(),
            retailers: profiles::BUILTIN_NAMES
                .iter()
                .map(|name| RetailerConfig::named(name))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let defaults = FetchSettings::default();
        Self {
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            request_timeout_secs: defaults.request_timeout.as_secs(),
            max_bytes: defaults.max_bytes,
        }
    }
}

impl FetchConfig {
    pub fn settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_bytes: self.max_bytes,
            ..FetchSettings::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RetailerConfig {
    /// Built-in profile name.
    pub name: String,
    /// Overrides the profile's worker count.
    pub concurrency: Option<usize>,
    /// Stored menu JSON for category-based retailers.
    pub categories_file: Option<PathBuf>,
    pub top_level_categories: Option<Vec<String>>,
    pub dedupe_key: Option<String>,
}

impl RetailerConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Config {
    /// Reads `path`, or returns the defaults when it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            engine_warn!("config {:?} not found; using defaults", path);
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Config = ron::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        engine_info!("loaded config from {:?}", path);
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for retailer in &self.retailers {
            if profiles::builtin(&retailer.name).is_none() {
                bail!(
                    "unknown retailer {:?}; known retailers: {}",
                    retailer.name,
                    profiles::BUILTIN_NAMES.join(", ")
                );
            }
        }
        Ok(())
    }

    /// Retailers to run: the named ones, or every configured one when
    /// `names` is empty. Names missing from the file get default settings.
    pub fn select(&self, names: &[String]) -> anyhow::Result<Vec<RetailerConfig>> {
        if names.is_empty() {
            return Ok(self.retailers.clone());
        }
        names
            .iter()
            .map(|name| {
                if profiles::builtin(name).is_none() {
                    bail!("unknown retailer {name:?}; known retailers: {}", profiles::BUILTIN_NAMES.join(", "));
                }
                Ok(self
                    .retailers
                    .iter()
                    .find(|r| r.name == *name)
                    .cloned()
                    .unwrap_or_else(|| RetailerConfig::named(name)))
            })
            .collect()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}
