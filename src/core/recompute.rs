use crate::core::pair::CurrencyPair;
use crate::core::store::ThresholdStore;
use crate::core::threshold::{BatchReport, ThresholdCalculator};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Computes fresh thresholds for `pairs` and stores them as the new snapshot.
///
/// The snapshot is saved when at least one pair succeeded; when every pair
/// fails the stored snapshot is left untouched and the report says so. A
/// failed save is an error.
pub async fn recompute(
    calculator: &ThresholdCalculator<'_>,
    store: &ThresholdStore,
    pairs: &[CurrencyPair],
    percentile: u32,
    lookback_days: u32,
    now: DateTime<Utc>,
    update_callback: &(dyn Fn(&CurrencyPair)),
) -> Result<BatchReport> {
    let report = calculator
        .compute_all(pairs, percentile, lookback_days, now, update_callback)
        .await?;

    if report.all_failed() {
        warn!(pairs = pairs.len(), "No thresholds computed, keeping stored snapshot");
        return Ok(report);
    }

    store
        .save(&report.snapshot)
        .context("Failed to save recomputed thresholds")?;
    info!(
        succeeded = report.succeeded(),
        failed = report.failures.len(),
        "Thresholds recomputed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::StaticBounds;
    use crate::core::threshold::tests::{StaticSeries, evenly_spaced};
    use std::time::Duration;
    use tempfile::tempdir;

    fn pairs(list: &[&str]) -> Vec<CurrencyPair> {
        list.iter().map(|p| p.parse().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_partial_success_is_saved() {
        let dir = tempdir().unwrap();
        let store = ThresholdStore::new(dir.path(), StaticBounds::default());
        let provider = StaticSeries::default().with("AUD/CNY", &evenly_spaced(4.4, 4.95, 255));
        let calculator = ThresholdCalculator::new(&provider, Duration::from_secs(5));

        let report = recompute(
            &calculator,
            &store,
            &pairs(&["AUD/CNY", "USD/AUD"]),
            10,
            365,
            Utc::now(),
            &|_| {},
        )
        .await
        .unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(store.load(), Some(report.snapshot));
    }

    #[tokio::test]
    async fn test_total_failure_keeps_previous_snapshot() {
        let dir = tempdir().unwrap();
        let store = ThresholdStore::new(dir.path(), StaticBounds::default());
        let good = StaticSeries::default().with("AUD/CNY", &[4.5, 4.6, 4.7]);
        let calculator = ThresholdCalculator::new(&good, Duration::from_secs(5));
        let first = recompute(&calculator, &store, &pairs(&["AUD/CNY"]), 10, 365, Utc::now(), &|_| {})
            .await
            .unwrap();

        let empty = StaticSeries::default();
        let calculator = ThresholdCalculator::new(&empty, Duration::from_secs(5));
        let second = recompute(&calculator, &store, &pairs(&["AUD/CNY"]), 10, 365, Utc::now(), &|_| {})
            .await
            .unwrap();

        assert!(second.all_failed());
        assert_eq!(store.load(), Some(first.snapshot));
    }

    #[tokio::test]
    async fn test_save_failure_is_surfaced() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = ThresholdStore::new(&blocker, StaticBounds::default());
        let provider = StaticSeries::default().with("AUD/CNY", &[4.5, 4.6]);
        let calculator = ThresholdCalculator::new(&provider, Duration::from_secs(5));

        let result = recompute(&calculator, &store, &pairs(&["AUD/CNY"]), 10, 365, Utc::now(), &|_| {}).await;
        assert!(result.is_err());
    }
}
