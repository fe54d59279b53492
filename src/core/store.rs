//! Durable storage for threshold snapshots.
//!
//! The snapshot lives in a single JSON file that is replaced atomically: the
//! new contents are written to a temporary file in the same directory, synced
//! and renamed over the old file. A reader sees either the previous snapshot or
//! the new one, never a mix.

use crate::core::pair::CurrencyPair;
use crate::core::snapshot::{BoundsSource, ResolvedBounds, StaticBounds, ThresholdSnapshot, resolve};
use crate::core::threshold::ThresholdBounds;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SNAPSHOT_FILE: &str = "thresholds.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to persist thresholds to {path}: {source}")]
    PersistenceFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode thresholds: {0}")]
    Encode(#[from] serde_json::Error),
}

// Written in one piece, but read field by field so a bad value only loses
// itself. See `ThresholdStore::load`.
#[derive(Debug, Serialize)]
struct SnapshotRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    percentile: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lookback_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    computed_at: Option<DateTime<Utc>>,
    bounds: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BoundsRecord {
    low: Option<f64>,
    high: Option<f64>,
    #[serde(default)]
    sample_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    historical_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    historical_max: Option<f64>,
}

impl From<&ThresholdBounds> for BoundsRecord {
    fn from(b: &ThresholdBounds) -> Self {
        BoundsRecord {
            low: Some(b.low),
            high: Some(b.high),
            sample_count: b.sample_count,
            mean: b.mean,
            historical_min: b.historical_min,
            historical_max: b.historical_max,
        }
    }
}

/// Missing or null fields are `None` quietly; badly typed ones with a warning.
fn decode_field<T: DeserializeOwned>(record: &Map<String, Value>, key: &str) -> Option<T> {
    let value = record.get(key).filter(|v| !v.is_null())?;
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(field = key, error = %e, "Ignoring unreadable snapshot metadata");
            None
        }
    }
}

/// RFC 3339, or a timestamp without offset read as local time.
fn decode_computed_at(record: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let raw: String = decode_field(record, "computed_at")?;
    if let Ok(at) = DateTime::parse_from_rfc3339(&raw) {
        return Some(at.with_timezone(&Utc));
    }
    let local = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());
    if local.is_none() {
        warn!(computed_at = %raw, "Ignoring unreadable computation time");
    }
    local.map(|at| at.with_timezone(&Utc))
}

fn decode_bounds(key: &str, value: Value) -> Option<ThresholdBounds> {
    let pair: CurrencyPair = match key.parse() {
        Ok(pair) => pair,
        Err(e) => {
            warn!(key, error = %e, "Skipping stored bounds with invalid pair");
            return None;
        }
    };
    let record: BoundsRecord = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(e) => {
            warn!(%pair, error = %e, "Skipping unreadable stored bounds");
            return None;
        }
    };
    match (record.low, record.high) {
        (Some(low), Some(high)) if low.is_finite() && high.is_finite() && low <= high => {
            Some(ThresholdBounds {
                pair,
                low,
                high,
                sample_count: record.sample_count,
                mean: record.mean,
                historical_min: record.historical_min,
                historical_max: record.historical_max,
            })
        }
        _ => {
            warn!(%pair, "Skipping stored bounds with missing or inverted limits");
            None
        }
    }
}

pub struct ThresholdStore {
    path: PathBuf,
    fallback: StaticBounds,
}

impl ThresholdStore {
    pub fn new(data_dir: &Path, fallback: StaticBounds) -> Self {
        ThresholdStore {
            path: data_dir.join(SNAPSHOT_FILE),
            fallback,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest persisted snapshot. A missing or corrupt file yields `None`;
    /// corruption is logged and otherwise ignored.
    pub fn load(&self) -> Option<ThresholdSnapshot> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored thresholds");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read stored thresholds");
                return None;
            }
        };

        let record = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(record)) => record,
            Ok(_) => {
                warn!(path = %self.path.display(), "Stored thresholds are not a JSON object, ignoring");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Stored thresholds are corrupt, ignoring");
                return None;
            }
        };

        let entries: Map<String, Value> = decode_field(&record, "bounds").unwrap_or_default();
        let bounds = entries
            .into_iter()
            .filter_map(|(key, value)| decode_bounds(&key, value))
            .map(|b| (b.pair.clone(), b))
            .collect();

        debug!(path = %self.path.display(), "Loaded stored thresholds");
        Some(ThresholdSnapshot {
            bounds,
            percentile: decode_field(&record, "percentile"),
            lookback_days: decode_field(&record, "lookback_days"),
            computed_at: decode_computed_at(&record),
        })
    }

    /// Atomically replaces the stored snapshot.
    pub fn save(&self, snapshot: &ThresholdSnapshot) -> Result<(), StoreError> {
        let bounds = snapshot
            .bounds
            .iter()
            .map(|(pair, b)| Ok((pair.to_string(), serde_json::to_value(BoundsRecord::from(b))?)))
            .collect::<Result<BTreeMap<_, _>, serde_json::Error>>()?;
        let record = SnapshotRecord {
            percentile: snapshot.percentile,
            lookback_days: snapshot.lookback_days,
            computed_at: snapshot.computed_at,
            bounds,
        };
        let encoded = serde_json::to_vec_pretty(&record)?;

        let persistence_failure = |source: std::io::Error| StoreError::PersistenceFailure {
            path: self.path.clone(),
            source,
        };
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(persistence_failure)?;

        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(persistence_failure)?;
        file.write_all(&encoded).map_err(persistence_failure)?;
        file.as_file().sync_all().map_err(persistence_failure)?;
        file.persist(&self.path)
            .map_err(|e| persistence_failure(e.error))?;

        info!(
            path = %self.path.display(),
            pairs = snapshot.bounds.len(),
            "Saved thresholds"
        );
        Ok(())
    }

    pub fn static_fallback(&self, pair: &CurrencyPair) -> ThresholdBounds {
        self.fallback.fallback(pair)
    }

    /// Snapshot bounds when present, static bounds otherwise.
    pub fn resolve(&self, snapshot: Option<&ThresholdSnapshot>, pair: &CurrencyPair) -> ResolvedBounds {
        let mut sources: Vec<&dyn BoundsSource> = Vec::with_capacity(2);
        if let Some(snapshot) = snapshot {
            sources.push(snapshot);
        }
        sources.push(&self.fallback);
        resolve(&sources, pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::BoundsOrigin;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn pair(s: &str) -> CurrencyPair {
        s.parse().unwrap()
    }

    fn sample_snapshot() -> ThresholdSnapshot {
        let mut bounds = BTreeMap::new();
        for (p, low, high) in [("AUD/CNY", 4.455, 4.895), ("USD/AUD", 1.4731, 1.5702)] {
            bounds.insert(
                pair(p),
                ThresholdBounds {
                    pair: pair(p),
                    low,
                    high,
                    sample_count: 255,
                    mean: Some((low + high) / 3.0),
                    historical_min: Some(low - 0.1),
                    historical_max: Some(high + 0.1),
                },
            );
        }
        let computed_at = Utc.with_ymd_and_hms(2026, 3, 15, 8, 30, 0).unwrap();
        ThresholdSnapshot::new(10, 365, computed_at, bounds)
    }

    #[test]
    fn test_load_without_save_is_absent() {
        let dir = tempdir().unwrap();
        let store = ThresholdStore::new(dir.path(), StaticBounds::default());

        assert!(store.load().is_none());
        let resolved = store.resolve(store.load().as_ref(), &pair("AUD/CNY"));
        assert_eq!(resolved.origin, BoundsOrigin::Static);
        assert_eq!((resolved.bounds.low, resolved.bounds.high), (4.50, 4.90));
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = ThresholdStore::new(&dir.path().join("nested"), StaticBounds::default());
        let snapshot = sample_snapshot();

        store.save(&snapshot).unwrap();
        assert_eq!(store.load(), Some(snapshot));
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let dir = tempdir().unwrap();
        let store = ThresholdStore::new(dir.path(), StaticBounds::default());
        store.save(&sample_snapshot()).unwrap();

        let mut next = sample_snapshot();
        next.bounds.remove(&pair("USD/AUD"));
        next.percentile = Some(5);
        store.save(&next).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, next);

        // Only the snapshot remains; temporary files were renamed away.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_absent() {
        let dir = tempdir().unwrap();
        let store = ThresholdStore::new(dir.path(), StaticBounds::default());
        std::fs::write(store.path(), "{ not json").unwrap();

        assert!(store.load().is_none());
    }

    #[test]
    fn test_missing_metadata_keeps_usable_bounds() {
        let dir = tempdir().unwrap();
        let store = ThresholdStore::new(dir.path(), StaticBounds::default());
        std::fs::write(
            store.path(),
            r#"{
                "bounds": {
                    "AUD/CNY": {"low": 4.6, "high": 4.8, "sample_count": 200},
                    "USD/AUD": {"low": 1.5},
                    "CHF/AUD": {"low": 1.9, "high": 1.6, "sample_count": 10},
                    "BAD": {"low": 1.0, "high": 2.0},
                    "AUD/HKD": "oops"
                }
            }"#,
        )
        .unwrap();

        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.percentile, None);
        assert_eq!(snapshot.lookback_days, None);
        assert_eq!(snapshot.computed_at, None);
        assert_eq!(snapshot.bounds.len(), 1);

        let resolved = store.resolve(Some(&snapshot), &pair("AUD/CNY"));
        assert_eq!(resolved.origin, BoundsOrigin::Dynamic);
        let resolved = store.resolve(Some(&snapshot), &pair("USD/AUD"));
        assert_eq!(resolved.origin, BoundsOrigin::Static);
        assert_eq!((resolved.bounds.low, resolved.bounds.high), (1.40, 1.60));
    }

    #[test]
    fn test_bad_metadata_keeps_bounds() {
        let dir = tempdir().unwrap();
        let store = ThresholdStore::new(dir.path(), StaticBounds::default());
        std::fs::write(
            store.path(),
            r#"{
                "percentile": "ten",
                "lookback_days": 365,
                "computed_at": "2026-03-15T08:00:00.123456",
                "bounds": {"AUD/CNY": {"low": 4.6, "high": 4.8, "sample_count": 200}}
            }"#,
        )
        .unwrap();

        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.percentile, None);
        assert_eq!(snapshot.lookback_days, Some(365));
        let naive = NaiveDateTime::parse_from_str("2026-03-15T08:00:00.123456", "%Y-%m-%dT%H:%M:%S%.f").unwrap();
        let expected = Local.from_local_datetime(&naive).earliest().unwrap().with_timezone(&Utc);
        assert_eq!(snapshot.computed_at, Some(expected));
        assert_eq!(snapshot.bounds[&pair("AUD/CNY")].low, 4.6);
    }

    #[test]
    fn test_unreadable_computation_time_is_unknown() {
        let dir = tempdir().unwrap();
        let store = ThresholdStore::new(dir.path(), StaticBounds::default());
        std::fs::write(
            store.path(),
            r#"{
                "computed_at": 20260315,
                "bounds": {"AUD/CNY": {"low": 4.6, "high": 4.8, "sample_count": 200}}
            }"#,
        )
        .unwrap();
        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.computed_at, None);
        assert_eq!(snapshot.bounds.len(), 1);

        std::fs::write(store.path(), r#"{"computed_at": "last tuesday", "bounds": []}"#).unwrap();
        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.computed_at, None);
        assert!(snapshot.bounds.is_empty());
    }

    #[test]
    fn test_save_into_unwritable_location_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let store = ThresholdStore::new(&blocker, StaticBounds::default());

        let err = store.save(&sample_snapshot()).unwrap_err();
        assert!(matches!(err, StoreError::PersistenceFailure { .. }));
    }
}
