use crate::core::pair::CurrencyPair;
use crate::core::snapshot::StaticBounds;
use crate::core::threshold::validate_params;
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_FRANKFURTER_URL: &str = "https://api.frankfurter.app";
pub const DEFAULT_OPEN_ER_API_URL: &str = "https://open.er-api.com";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PairConfig {
    pub pair: CurrencyPair,
    /// Static lower bound used when no computed thresholds exist.
    pub min: Option<f64>,
    /// Static upper bound used when no computed thresholds exist.
    pub max: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ThresholdConfig {
    #[serde(default = "default_percentile")]
    pub percentile: u32,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Recompute from inside the monitor once thresholds go stale.
    #[serde(default)]
    pub auto_update: bool,
}

fn default_percentile() -> u32 {
    10
}

fn default_lookback_days() -> u32 {
    365
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            percentile: default_percentile(),
            lookback_days: default_lookback_days(),
            auto_update: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            interval_secs: default_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FrankfurterProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OpenErApiProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub frankfurter: Option<FrankfurterProviderConfig>,
    pub open_er_api: Option<OpenErApiProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            frankfurter: Some(FrankfurterProviderConfig {
                base_url: DEFAULT_FRANKFURTER_URL.to_string(),
            }),
            open_er_api: Some(OpenErApiProviderConfig {
                base_url: DEFAULT_OPEN_ER_API_URL.to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub pairs: Vec<PairConfig>,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "fxalert", "fxalert")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("com", "fxalert", "fxalert")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pairs.is_empty() {
            bail!("At least one currency pair must be configured");
        }
        let mut seen = HashSet::new();
        for entry in &self.pairs {
            if !seen.insert(&entry.pair) {
                bail!("Currency pair {} is configured more than once", entry.pair);
            }
            match (entry.min, entry.max) {
                (Some(min), Some(max)) if min > max => {
                    bail!("Static min {} exceeds max {} for {}", min, max, entry.pair)
                }
                (Some(_), None) | (None, Some(_)) => {
                    bail!("Static bounds for {} need both min and max", entry.pair)
                }
                _ => {}
            }
        }
        validate_params(self.thresholds.percentile, self.thresholds.lookback_days)?;
        if self.monitor.interval_secs == 0 {
            bail!("monitor.interval_secs must be positive");
        }
        if self.monitor.request_timeout_secs == 0 {
            bail!("monitor.request_timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn pairs(&self) -> Vec<CurrencyPair> {
        self.pairs.iter().map(|p| p.pair.clone()).collect()
    }

    pub fn static_bounds(&self) -> StaticBounds {
        let overrides: HashMap<CurrencyPair, (f64, f64)> = self
            .pairs
            .iter()
            .filter_map(|p| Some((p.pair.clone(), (p.min?, p.max?))))
            .collect();
        StaticBounds::new(overrides)
    }

    pub fn frankfurter_url(&self) -> &str {
        self.providers
            .frankfurter
            .as_ref()
            .map_or(DEFAULT_FRANKFURTER_URL, |p| &p.base_url)
    }

    pub fn open_er_api_url(&self) -> &str {
        self.providers
            .open_er_api
            .as_ref()
            .map_or(DEFAULT_OPEN_ER_API_URL, |p| &p.base_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor.request_timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_secs)
    }
}
