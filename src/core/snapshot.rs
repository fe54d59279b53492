//! Threshold snapshots and the ordered fallback used to resolve a pair's
//! effective bounds.

use crate::core::pair::CurrencyPair;
use crate::core::threshold::ThresholdBounds;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use tracing::warn;

/// Built-in static bounds, used when neither a snapshot nor the config has
/// bounds for a pair.
pub const BUILTIN_FALLBACKS: &[(&str, f64, f64)] = &[
    ("AUD/CNY", 4.50, 4.90),
    ("CHF/AUD", 1.50, 1.85),
    ("USD/AUD", 1.40, 1.60),
    ("AUD/HKD", 4.85, 5.25),
    ("HKD/JPY", 18.0, 20.5),
];

/// Bounds for every pair computed together from one historical pull.
///
/// Metadata is optional because older or hand-edited files may lack it; the
/// bounds remain usable either way.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSnapshot {
    pub bounds: BTreeMap<CurrencyPair, ThresholdBounds>,
    pub percentile: Option<u32>,
    pub lookback_days: Option<u32>,
    pub computed_at: Option<DateTime<Utc>>,
}

impl ThresholdSnapshot {
    pub fn new(
        percentile: u32,
        lookback_days: u32,
        computed_at: DateTime<Utc>,
        bounds: BTreeMap<CurrencyPair, ThresholdBounds>,
    ) -> Self {
        ThresholdSnapshot {
            bounds,
            percentile: Some(percentile),
            lookback_days: Some(lookback_days),
            computed_at: Some(computed_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsOrigin {
    Dynamic,
    Static,
}

impl Display for BoundsOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                BoundsOrigin::Dynamic => "dynamic",
                BoundsOrigin::Static => "static",
            }
        )
    }
}

pub trait BoundsSource {
    fn origin(&self) -> BoundsOrigin;

    fn bounds_for(&self, pair: &CurrencyPair) -> Option<ThresholdBounds>;
}

impl BoundsSource for ThresholdSnapshot {
    fn origin(&self) -> BoundsOrigin {
        BoundsOrigin::Dynamic
    }

    fn bounds_for(&self, pair: &CurrencyPair) -> Option<ThresholdBounds> {
        self.bounds.get(pair).cloned()
    }
}

/// Hardcoded bounds, overridable per pair from the config.
#[derive(Debug, Clone, Default)]
pub struct StaticBounds {
    overrides: HashMap<CurrencyPair, (f64, f64)>,
}

impl StaticBounds {
    pub fn new(overrides: HashMap<CurrencyPair, (f64, f64)>) -> Self {
        StaticBounds { overrides }
    }

    /// Always yields bounds. A pair with no configured or built-in bounds gets
    /// an open range that never fires.
    pub fn fallback(&self, pair: &CurrencyPair) -> ThresholdBounds {
        if let Some((low, high)) = self.overrides.get(pair) {
            return ThresholdBounds::fixed(pair, *low, *high);
        }
        let key = pair.to_string();
        if let Some((_, low, high)) = BUILTIN_FALLBACKS.iter().find(|(p, _, _)| *p == key) {
            return ThresholdBounds::fixed(pair, *low, *high);
        }
        warn!(%pair, "No static bounds known, alerts for this pair are disabled");
        ThresholdBounds::fixed(pair, 0.0, f64::INFINITY)
    }
}

impl BoundsSource for StaticBounds {
    fn origin(&self) -> BoundsOrigin {
        BoundsOrigin::Static
    }

    fn bounds_for(&self, pair: &CurrencyPair) -> Option<ThresholdBounds> {
        Some(self.fallback(pair))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBounds {
    pub bounds: ThresholdBounds,
    pub origin: BoundsOrigin,
}

/// First source with bounds for `pair` wins. Never fails: with no source
/// answering, the pair gets an open range.
pub fn resolve(sources: &[&dyn BoundsSource], pair: &CurrencyPair) -> ResolvedBounds {
    sources
        .iter()
        .find_map(|source| {
            source.bounds_for(pair).map(|bounds| ResolvedBounds {
                bounds,
                origin: source.origin(),
            })
        })
        .unwrap_or_else(|| ResolvedBounds {
            bounds: ThresholdBounds::fixed(pair, 0.0, f64::INFINITY),
            origin: BoundsOrigin::Static,
        })
}
