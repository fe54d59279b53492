pub mod cli;
pub mod core;
pub mod providers;

use crate::core::config::AppConfig;
use crate::core::store::ThresholdStore;
use anyhow::Result;
use tracing::{debug, info};

pub enum AppCommand {
    /// Recompute thresholds, optionally overriding the configured settings.
    Update {
        percentile: Option<u32>,
        lookback_days: Option<u32>,
    },
    Status,
    /// A single monitor cycle.
    Check,
    Monitor,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fxalert starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let data_path = config.default_data_path()?;
    let store = ThresholdStore::new(&data_path, config.static_bounds());

    match command {
        AppCommand::Update {
            percentile,
            lookback_days,
        } => cli::update::run(&config, &store, percentile, lookback_days).await,
        AppCommand::Status => cli::status::run(&config, &store),
        AppCommand::Check => cli::monitor::run(&config, &store, true).await,
        AppCommand::Monitor => cli::monitor::run(&config, &store, false).await,
    }
}
