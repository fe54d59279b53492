//! Exchange rate sources: historical series and live quotes.

use crate::core::pair::CurrencyPair;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One daily observation of a pair's rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    pub date: NaiveDate,
    pub value: f64,
}

impl RateSample {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        RateSample { date, value }
    }

    pub fn is_valid(&self) -> bool {
        self.value.is_finite() && self.value > 0.0
    }
}

/// Drops invalid values and collapses duplicate dates, keeping the value that
/// arrived last. The result is ordered by date.
pub fn normalize_series(samples: &[RateSample]) -> Vec<RateSample> {
    let mut by_date = BTreeMap::new();
    for sample in samples.iter().filter(|s| s.is_valid()) {
        by_date.insert(sample.date, sample.value);
    }
    by_date
        .into_iter()
        .map(|(date, value)| RateSample { date, value })
        .collect()
}

#[async_trait]
pub trait HistoricalRateProvider: Send + Sync {
    /// Daily samples for `pair` between `start` and `end`, both inclusive.
    async fn fetch_series(
        &self,
        pair: &CurrencyPair,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RateSample>>;
}

#[async_trait]
pub trait LiveRateProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn get_rate(&self, pair: &CurrencyPair) -> Result<f64>;
}

/// A live rate along with the provider that supplied it.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveRate {
    pub rate: f64,
    pub source: String,
}

/// Live rate providers tried in order until one answers.
pub struct RateChain {
    providers: Vec<Box<dyn LiveRateProvider>>,
}

impl RateChain {
    pub fn new(providers: Vec<Box<dyn LiveRateProvider>>) -> Self {
        RateChain { providers }
    }

    pub async fn get_rate(&self, pair: &CurrencyPair) -> Result<LiveRate> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.get_rate(pair).await {
                Ok(rate) if rate.is_finite() && rate > 0.0 => {
                    debug!(%pair, provider = provider.name(), rate, "Live rate resolved");
                    return Ok(LiveRate {
                        rate,
                        source: provider.name().to_string(),
                    });
                }
                Ok(rate) => {
                    warn!(%pair, provider = provider.name(), rate, "Discarding invalid live rate");
                    failures.push(format!("{}: invalid rate {}", provider.name(), rate));
                }
                Err(e) => {
                    warn!(%pair, provider = provider.name(), error = %e, "Live rate provider failed");
                    failures.push(format!("{}: {}", provider.name(), e));
                }
            }
        }
        Err(anyhow!(
            "No live rate available for {}: [{}]",
            pair,
            failures.join("; ")
        ))
    }
}
