//! Threshold engine: percentile bounds, their storage and staleness, and the
//! monitor that consumes them.

pub mod cache;
pub mod config;
pub mod log;
pub mod monitor;
pub mod notify;
pub mod pair;
pub mod rate;
pub mod recompute;
pub mod snapshot;
pub mod staleness;
pub mod store;
pub mod threshold;

// Re-export main types for cleaner imports
pub use notify::{DesktopNotifier, Notify};
pub use pair::CurrencyPair;
pub use rate::{HistoricalRateProvider, LiveRateProvider, RateChain, RateSample};
pub use snapshot::{BoundsOrigin, ThresholdSnapshot};
pub use staleness::Staleness;
pub use store::ThresholdStore;
pub use threshold::{ThresholdBounds, ThresholdCalculator, ThresholdError};
