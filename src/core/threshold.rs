//! Percentile based alert bounds computed from a historical rate series.

use crate::core::pair::CurrencyPair;
use crate::core::rate::{HistoricalRateProvider, normalize_series};
use crate::core::snapshot::ThresholdSnapshot;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Fewest usable samples a series must have before bounds are computed.
pub const MIN_SAMPLES: usize = 2;

#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("data source failure for {pair}: {reason}")]
    DataSourceFailure { pair: CurrencyPair, reason: String },

    #[error("insufficient data for {pair}: {usable} usable samples, need at least {required}")]
    InsufficientData {
        pair: CurrencyPair,
        usable: usize,
        required: usize,
    },

    #[error("invalid percentile {0}: expected a value between 1 and 50")]
    InvalidPercentile(u32),

    #[error("invalid lookback of {0} days: expected at least one day")]
    InvalidLookback(u32),
}

impl ThresholdError {
    pub fn pair(&self) -> Option<&CurrencyPair> {
        match self {
            ThresholdError::DataSourceFailure { pair, .. }
            | ThresholdError::InsufficientData { pair, .. } => Some(pair),
            _ => None,
        }
    }
}

/// Alert bounds for one pair. `sample_count == 0` marks a static fallback,
/// which carries no series statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdBounds {
    pub pair: CurrencyPair,
    pub low: f64,
    pub high: f64,
    pub sample_count: usize,
    pub mean: Option<f64>,
    pub historical_min: Option<f64>,
    pub historical_max: Option<f64>,
}

impl ThresholdBounds {
    pub fn fixed(pair: &CurrencyPair, low: f64, high: f64) -> Self {
        ThresholdBounds {
            pair: pair.clone(),
            low,
            high,
            sample_count: 0,
            mean: None,
            historical_min: None,
            historical_max: None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.sample_count > 0
    }
}

/// Where a live rate sits relative to its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateStatus {
    Below,
    Within,
    Above,
}

impl RateStatus {
    /// Touching a bound counts as crossing it.
    pub fn classify(rate: f64, bounds: &ThresholdBounds) -> Self {
        if rate <= bounds.low {
            RateStatus::Below
        } else if rate >= bounds.high {
            RateStatus::Above
        } else {
            RateStatus::Within
        }
    }
}

/// Linearly interpolated percentile of an ascending slice.
///
/// `rank = p / 100 * (n - 1)`; the result interpolates between the values at
/// `floor(rank)` and `ceil(rank)`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

pub fn validate_params(percentile: u32, lookback_days: u32) -> Result<(), ThresholdError> {
    if !(1..=50).contains(&percentile) {
        return Err(ThresholdError::InvalidPercentile(percentile));
    }
    if lookback_days == 0 {
        return Err(ThresholdError::InvalidLookback(lookback_days));
    }
    Ok(())
}

/// Outcome of recomputing a batch of pairs. Only pairs that succeeded are in
/// the snapshot.
#[derive(Debug)]
pub struct BatchReport {
    pub snapshot: ThresholdSnapshot,
    pub failures: Vec<ThresholdError>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.snapshot.bounds.len()
    }

    pub fn all_failed(&self) -> bool {
        self.snapshot.bounds.is_empty()
    }
}

pub struct ThresholdCalculator<'a> {
    provider: &'a dyn HistoricalRateProvider,
    timeout: std::time::Duration,
}

impl<'a> ThresholdCalculator<'a> {
    pub fn new(provider: &'a dyn HistoricalRateProvider, timeout: std::time::Duration) -> Self {
        ThresholdCalculator { provider, timeout }
    }

    #[instrument(name = "ComputeThresholds", skip(self), fields(pair = %pair))]
    pub async fn compute(
        &self,
        pair: &CurrencyPair,
        percentile_low: u32,
        lookback_days: u32,
        today: NaiveDate,
    ) -> Result<ThresholdBounds, ThresholdError> {
        validate_params(percentile_low, lookback_days)?;

        let start = today - Duration::days(i64::from(lookback_days));
        debug!(%start, end = %today, "Fetching historical series");

        let fetch = self.provider.fetch_series(pair, start, today);
        let samples = match tokio::time::timeout(self.timeout, fetch).await {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => {
                return Err(ThresholdError::DataSourceFailure {
                    pair: pair.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ThresholdError::DataSourceFailure {
                    pair: pair.clone(),
                    reason: format!("timed out after {}s", self.timeout.as_secs_f64()),
                });
            }
        };

        let series = normalize_series(&samples);
        if series.len() < MIN_SAMPLES {
            return Err(ThresholdError::InsufficientData {
                pair: pair.clone(),
                usable: series.len(),
                required: MIN_SAMPLES,
            });
        }

        let mut values: Vec<f64> = series.iter().map(|s| s.value).collect();
        values.sort_by(f64::total_cmp);

        let p = f64::from(percentile_low);
        // Non-empty slice and p within 0..=100, so both are present.
        let low = percentile(&values, p).unwrap_or(values[0]);
        let high = percentile(&values, 100.0 - p).unwrap_or(values[values.len() - 1]);
        let mean = values.iter().sum::<f64>() / values.len() as f64;

        debug!(low, high, samples = values.len(), "Computed bounds");
        Ok(ThresholdBounds {
            pair: pair.clone(),
            low,
            high,
            sample_count: values.len(),
            mean: Some(mean),
            historical_min: values.first().copied(),
            historical_max: values.last().copied(),
        })
    }

    /// Computes every pair in turn, never in parallel, so the historical
    /// source's rate limits hold. A failing pair does not stop the batch.
    pub async fn compute_all(
        &self,
        pairs: &[CurrencyPair],
        percentile_low: u32,
        lookback_days: u32,
        now: DateTime<Utc>,
        update_callback: &(dyn Fn(&CurrencyPair)),
    ) -> Result<BatchReport, ThresholdError> {
        validate_params(percentile_low, lookback_days)?;
        info!(
            pairs = pairs.len(),
            percentile = percentile_low,
            lookback_days,
            "Recomputing thresholds"
        );

        let today = now.date_naive();
        let mut bounds = BTreeMap::new();
        let mut failures = Vec::new();
        for pair in pairs {
            match self.compute(pair, percentile_low, lookback_days, today).await {
                Ok(b) => {
                    bounds.insert(pair.clone(), b);
                }
                Err(e) => {
                    warn!(%pair, error = %e, "Threshold computation failed");
                    failures.push(e);
                }
            }
            update_callback(pair);
        }

        Ok(BatchReport {
            snapshot: ThresholdSnapshot::new(percentile_low, lookback_days, now, bounds),
            failures,
        })
    }
}
