use super::ui;
use crate::core::cache::Cache;
use crate::core::config::AppConfig;
use crate::core::monitor::{AutoUpdate, CycleReport, Monitor};
use crate::core::notify::DesktopNotifier;
use crate::core::rate::{LiveRateProvider, RateChain};
use crate::core::store::ThresholdStore;
use crate::core::threshold::{RateStatus, ThresholdCalculator};
use crate::providers::frankfurter::FrankfurterProvider;
use crate::providers::open_er_api::{BASE_RATES_TTL, OpenErApiProvider};
use anyhow::Result;
use chrono::Local;
use std::sync::Arc;

/// One console line per pair, in the order the pairs are configured.
pub fn format_report(report: &CycleReport) -> String {
    let timestamp = report
        .checked_at
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S");
    let mut lines = Vec::with_capacity(report.checks.len() + 1);

    if let Some(staleness) = report.staleness.filter(|s| s.needs_update()) {
        lines.push(ui::style_text(
            &format!("{timestamp} - Thresholds {staleness}"),
            ui::StyleType::Warning,
        ));
    }
    if report.updated {
        lines.push(ui::style_text(
            &format!("{timestamp} - Thresholds recomputed"),
            ui::StyleType::Success,
        ));
    }

    for check in &report.checks {
        let bounds = &check.resolved.bounds;
        let line = match &check.live {
            Some(live) => {
                let line = format!(
                    "{timestamp} - {}: {:.4} (Alert range: {:.4} - {:.4}, {})",
                    check.pair, live.rate, bounds.low, bounds.high, check.resolved.origin
                );
                match check.status {
                    Some(RateStatus::Within) | None => line,
                    Some(_) => ui::style_text(&line, ui::StyleType::Error),
                }
            }
            None => ui::style_text(
                &format!(
                    "{timestamp} - {}: rate unavailable ({})",
                    check.pair,
                    check.error.as_deref().unwrap_or("unknown error")
                ),
                ui::StyleType::Subtle,
            ),
        };
        lines.push(line);
    }
    lines.join("\n")
}

fn print_report(report: &CycleReport) {
    println!("{}", format_report(report));
}

/// Runs the monitor against the configured providers. With `once` a single
/// cycle is run and printed.
pub async fn run(config: &AppConfig, store: &ThresholdStore, once: bool) -> Result<()> {
    let timeout = config.request_timeout();
    let cache = Arc::new(Cache::new(BASE_RATES_TTL));
    let providers: Vec<Box<dyn LiveRateProvider>> = vec![
        Box::new(OpenErApiProvider::new(
            config.open_er_api_url(),
            timeout,
            cache,
        )?),
        Box::new(FrankfurterProvider::new(config.frankfurter_url(), timeout)?),
    ];
    let rates = RateChain::new(providers);
    let historical = FrankfurterProvider::new(config.frankfurter_url(), timeout)?;
    let notifier = DesktopNotifier::detect();

    let mut monitor = Monitor::new(config.pairs(), store, &rates, &notifier);
    if config.thresholds.auto_update {
        monitor = monitor.with_auto_update(AutoUpdate {
            calculator: ThresholdCalculator::new(&historical, timeout),
            percentile: config.thresholds.percentile,
            lookback_days: config.thresholds.lookback_days,
        });
    }

    if once {
        let report = monitor.run_cycle(chrono::Utc::now()).await;
        print_report(&report);
        return Ok(());
    }
    monitor.run(config.interval(), &print_report).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pair::CurrencyPair;
    use crate::core::monitor::PairCheck;
    use crate::core::rate::LiveRate;
    use crate::core::snapshot::{BoundsOrigin, ResolvedBounds};
    use crate::core::staleness::Staleness;
    use crate::core::threshold::ThresholdBounds;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn check(pair: &str, rate: Option<f64>, origin: BoundsOrigin) -> PairCheck {
        let pair: CurrencyPair = pair.parse().unwrap();
        let bounds = ThresholdBounds::fixed(&pair, 4.5, 4.9);
        let status = rate.map(|r| RateStatus::classify(r, &bounds));
        PairCheck {
            pair,
            resolved: ResolvedBounds { bounds, origin },
            live: rate.map(|rate| LiveRate {
                rate,
                source: "test".to_string(),
            }),
            status,
            error: rate.is_none().then(|| "provider down".to_string()),
        }
    }

    #[test]
    fn test_format_report_lines() {
        let checked_at = Local
            .with_ymd_and_hms(2026, 4, 2, 9, 30, 0)
            .unwrap()
            .with_timezone(&Utc);
        let report = CycleReport {
            checked_at,
            staleness: Some(Staleness::DueForUpdate {
                since: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            }),
            updated: false,
            checks: vec![
                check("AUD/CNY", Some(4.71), BoundsOrigin::Dynamic),
                check("AUD/HKD", None, BoundsOrigin::Static),
            ],
        };

        let output = console::strip_ansi_codes(&format_report(&report)).to_string();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "2026-04-02 09:30:00 - Thresholds due for update since 2026-04-01",
                "2026-04-02 09:30:00 - AUD/CNY: 4.7100 (Alert range: 4.5000 - 4.9000, dynamic)",
                "2026-04-02 09:30:00 - AUD/HKD: rate unavailable (provider down)",
            ]
        );
    }
}
