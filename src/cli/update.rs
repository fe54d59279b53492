use super::ui;
use crate::core::config::AppConfig;
use crate::core::recompute::recompute;
use crate::core::store::ThresholdStore;
use crate::core::threshold::{BatchReport, ThresholdCalculator};
use crate::providers::frankfurter::FrankfurterProvider;
use anyhow::{Result, bail};
use chrono::Utc;
use comfy_table::Cell;

impl BatchReport {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Pair"),
            ui::header_cell("Low"),
            ui::header_cell("High"),
            ui::header_cell("Mean"),
            ui::header_cell("Min"),
            ui::header_cell("Max"),
            ui::header_cell("Samples"),
        ]);

        for (pair, bounds) in &self.snapshot.bounds {
            table.add_row(vec![
                Cell::new(pair.to_string()),
                ui::rate_cell(bounds.low),
                ui::rate_cell(bounds.high),
                ui::format_optional_cell(bounds.mean, |v| format!("{v:.4}")),
                ui::format_optional_cell(bounds.historical_min, |v| format!("{v:.4}")),
                ui::format_optional_cell(bounds.historical_max, |v| format!("{v:.4}")),
                Cell::new(bounds.sample_count),
            ]);
        }

        let percentile = self.snapshot.percentile.unwrap_or_default();
        let mut output = format!(
            "{}\n\n",
            ui::style_text(
                &format!(
                    "Thresholds (P{} - P{}, {} days)",
                    percentile,
                    100 - percentile.min(100),
                    self.snapshot.lookback_days.unwrap_or_default()
                ),
                ui::StyleType::Title
            )
        );
        output.push_str(&table.to_string());

        for failure in &self.failures {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(&format!("Skipped: {failure}"), ui::StyleType::Error)
            ));
        }
        output
    }
}

pub async fn run(
    config: &AppConfig,
    store: &ThresholdStore,
    percentile: Option<u32>,
    lookback_days: Option<u32>,
) -> Result<()> {
    let percentile = percentile.unwrap_or(config.thresholds.percentile);
    let lookback_days = lookback_days.unwrap_or(config.thresholds.lookback_days);
    let pairs = config.pairs();

    let provider = FrankfurterProvider::new(config.frankfurter_url(), config.request_timeout())?;
    let calculator = ThresholdCalculator::new(&provider, config.request_timeout());

    let pb = ui::new_progress_bar(pairs.len() as u64, true)?;
    pb.set_message("Fetching historical rates...");
    let report = recompute(
        &calculator,
        store,
        &pairs,
        percentile,
        lookback_days,
        Utc::now(),
        &|_| pb.inc(1),
    )
    .await;
    pb.finish_and_clear();
    let report = report?;

    if report.all_failed() {
        for failure in &report.failures {
            eprintln!("{}", ui::style_text(&failure.to_string(), ui::StyleType::Error));
        }
        bail!(
            "Threshold update failed for all {} pairs, stored thresholds left unchanged",
            pairs.len()
        );
    }

    println!("{}", report.display_as_table());
    println!(
        "\n{} {}",
        ui::style_text("Saved to", ui::StyleType::Success),
        ui::style_text(&store.path().display().to_string(), ui::StyleType::Subtle)
    );
    Ok(())
}
