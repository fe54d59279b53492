//! The long-running check loop: live rates against effective bounds.
//!
//! The monitor keeps one immutable copy of the stored snapshot and replaces it
//! only through [`Monitor::reload`], which every cycle calls before comparing
//! rates. It never fails on provider or store errors; pairs without a live
//! rate are skipped until the next cycle.

use crate::core::notify::Notify;
use crate::core::pair::CurrencyPair;
use crate::core::rate::{LiveRate, RateChain};
use crate::core::recompute::recompute;
use crate::core::snapshot::{ResolvedBounds, ThresholdSnapshot};
use crate::core::staleness::{ReminderTracker, Staleness};
use crate::core::store::ThresholdStore;
use crate::core::threshold::{RateStatus, ThresholdCalculator};
use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Recompute settings used when the monitor refreshes stale thresholds itself.
pub struct AutoUpdate<'a> {
    pub calculator: ThresholdCalculator<'a>,
    pub percentile: u32,
    pub lookback_days: u32,
}

#[derive(Debug, Clone)]
pub struct PairCheck {
    pub pair: CurrencyPair,
    pub resolved: ResolvedBounds,
    pub live: Option<LiveRate>,
    pub status: Option<RateStatus>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub checked_at: DateTime<Utc>,
    /// `None` when no snapshot is stored.
    pub staleness: Option<Staleness>,
    pub updated: bool,
    pub checks: Vec<PairCheck>,
}

pub struct Monitor<'a> {
    pairs: Vec<CurrencyPair>,
    store: &'a ThresholdStore,
    rates: &'a RateChain,
    notifier: &'a dyn Notify,
    auto_update: Option<AutoUpdate<'a>>,
    reminders: ReminderTracker,
    snapshot: Option<ThresholdSnapshot>,
    reported_missing: bool,
}

fn alert_text(pair: &CurrencyPair, rate: f64, status: RateStatus, resolved: &ResolvedBounds) -> Option<(String, String)> {
    match status {
        RateStatus::Below => Some((
            format!("Low Rate Alert: {pair} = {rate:.4}"),
            format!(
                "{pair} has fallen below your minimum threshold ({:.4}, {})",
                resolved.bounds.low, resolved.origin
            ),
        )),
        RateStatus::Above => Some((
            format!("High Rate Alert: {pair} = {rate:.4}"),
            format!(
                "{pair} has exceeded your maximum threshold ({:.4}, {})",
                resolved.bounds.high, resolved.origin
            ),
        )),
        RateStatus::Within => None,
    }
}

impl<'a> Monitor<'a> {
    pub fn new(
        pairs: Vec<CurrencyPair>,
        store: &'a ThresholdStore,
        rates: &'a RateChain,
        notifier: &'a dyn Notify,
    ) -> Self {
        Monitor {
            pairs,
            store,
            rates,
            notifier,
            auto_update: None,
            reminders: ReminderTracker::new(),
            snapshot: None,
            reported_missing: false,
        }
    }

    pub fn with_auto_update(mut self, auto_update: AutoUpdate<'a>) -> Self {
        self.auto_update = Some(auto_update);
        self
    }

    /// Replaces the held snapshot with whatever is stored now.
    pub fn reload(&mut self) {
        self.snapshot = self.store.load();
        if self.snapshot.is_some() {
            // A later loss of the snapshot gets reported again.
            self.reported_missing = false;
        }
        debug!(present = self.snapshot.is_some(), "Reloaded thresholds");
    }

    pub fn snapshot(&self) -> Option<&ThresholdSnapshot> {
        self.snapshot.as_ref()
    }

    fn staleness(&mut self, now: DateTime<Utc>) -> (Option<Staleness>, Option<(String, String)>) {
        let today = now.with_timezone(&Local).date_naive();
        match &self.snapshot {
            Some(snapshot) => {
                let computed_on = snapshot
                    .computed_at
                    .map(|t| t.with_timezone(&Local).date_naive());
                let (state, reminder) = self.reminders.check(computed_on, today);
                (Some(state), reminder.map(|r| (r.title, r.message)))
            }
            None if !self.reported_missing => {
                self.reported_missing = true;
                (
                    None,
                    Some((
                        "No Thresholds Configured".to_string(),
                        "Using static bounds. Run `fxalert update` to compute thresholds from historical rates."
                            .to_string(),
                    )),
                )
            }
            None => (None, None),
        }
    }

    async fn try_auto_update(&mut self, now: DateTime<Utc>) -> bool {
        let Some(auto) = &self.auto_update else {
            return false;
        };
        info!("Thresholds are stale, recomputing");
        match recompute(
            &auto.calculator,
            self.store,
            &self.pairs,
            auto.percentile,
            auto.lookback_days,
            now,
            &|_| {},
        )
        .await
        {
            Ok(report) if !report.all_failed() => {
                self.reminders.reset();
                self.reload();
                true
            }
            Ok(_) => {
                warn!("Automatic threshold update failed for every pair");
                false
            }
            Err(e) => {
                warn!(error = %e, "Automatic threshold update failed");
                false
            }
        }
    }

    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        self.reload();

        let mut updated = false;
        let mut staleness = self.staleness(now);
        let is_stale = staleness.0.is_none_or(|s| s.needs_update());
        if is_stale && self.auto_update.is_some() {
            updated = self.try_auto_update(now).await;
            if updated {
                staleness = self.staleness(now);
            }
        }

        let (state, reminder) = staleness;
        if let Some((title, message)) = reminder {
            info!(title, "Threshold reminder");
            self.notifier.notify(&title, &message).await;
        }

        let mut checks = Vec::with_capacity(self.pairs.len());
        for pair in &self.pairs {
            let resolved = self.store.resolve(self.snapshot.as_ref(), pair);
            let check = match self.rates.get_rate(pair).await {
                Ok(live) => {
                    let status = RateStatus::classify(live.rate, &resolved.bounds);
                    info!(
                        %pair,
                        rate = live.rate,
                        low = resolved.bounds.low,
                        high = resolved.bounds.high,
                        origin = %resolved.origin,
                        ?status,
                        "Checked rate"
                    );
                    if let Some((title, message)) = alert_text(pair, live.rate, status, &resolved) {
                        self.notifier.notify(&title, &message).await;
                    }
                    PairCheck {
                        pair: pair.clone(),
                        resolved,
                        live: Some(live),
                        status: Some(status),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(%pair, error = %e, "Skipping pair for this cycle");
                    PairCheck {
                        pair: pair.clone(),
                        resolved,
                        live: None,
                        status: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            checks.push(check);
        }

        CycleReport {
            checked_at: now,
            staleness: state,
            updated,
            checks,
        }
    }

    /// Runs a cycle every `interval` until Ctrl-C.
    pub async fn run(&mut self, interval: Duration, on_cycle: &(dyn Fn(&CycleReport))) -> Result<()> {
        self.run_until(interval, on_cycle, tokio::signal::ctrl_c()).await
    }

    /// Runs a cycle every `interval` until `shutdown` completes.
    pub async fn run_until(
        &mut self,
        interval: Duration,
        on_cycle: &(dyn Fn(&CycleReport)),
        shutdown: impl Future<Output = std::io::Result<()>>,
    ) -> Result<()> {
        info!(pairs = self.pairs.len(), ?interval, "Exchange rate monitor started");
        tokio::pin!(shutdown);
        loop {
            let report = self.run_cycle(Utc::now()).await;
            on_cycle(&report);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                signal = &mut shutdown => {
                    signal?;
                    info!("Exchange rate monitor stopped");
                    return Ok(());
                }
            }
        }
    }
}
