use super::ui;
use crate::core::config::AppConfig;
use crate::core::pair::CurrencyPair;
use crate::core::snapshot::ThresholdSnapshot;
use crate::core::staleness::{Staleness, due_date};
use crate::core::store::ThresholdStore;
use anyhow::Result;
use chrono::{Local, NaiveDate};
use comfy_table::Cell;

fn staleness_line(snapshot: &ThresholdSnapshot, today: NaiveDate) -> String {
    let Some(computed_at) = snapshot.computed_at else {
        return ui::style_text(
            "Computed: unknown (run `fxalert update` to refresh)",
            ui::StyleType::Warning,
        );
    };
    let computed_on = computed_at.with_timezone(&Local).date_naive();
    let state = Staleness::evaluate(computed_on, today);
    let style_type = if state.needs_update() {
        ui::StyleType::Warning
    } else {
        ui::StyleType::Success
    };
    let next = due_date(computed_on).map_or("N/A".to_string(), |d| d.to_string());
    format!(
        "Computed: {} ({}), next update due {}",
        computed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        ui::style_text(&state.to_string(), style_type),
        next
    )
}

/// Effective bounds per configured pair with their origin and the stored
/// snapshot's age.
pub fn render(
    pairs: &[CurrencyPair],
    store: &ThresholdStore,
    snapshot: Option<&ThresholdSnapshot>,
    today: NaiveDate,
) -> String {
    let mut output = format!(
        "{}\n\n",
        ui::style_text("Threshold Status", ui::StyleType::Title)
    );

    match snapshot {
        Some(snapshot) => {
            output.push_str(&staleness_line(snapshot, today));
            output.push('\n');
            output.push_str(&format!(
                "Percentile: {}, lookback: {} days\n",
                snapshot
                    .percentile
                    .map_or("N/A".to_string(), |p| format!("P{p}")),
                snapshot
                    .lookback_days
                    .map_or("N/A".to_string(), |d| d.to_string()),
            ));
        }
        None => {
            output.push_str(&ui::style_text(
                "No stored thresholds, static bounds in use",
                ui::StyleType::Warning,
            ));
            output.push('\n');
        }
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Pair"),
        ui::header_cell("Low"),
        ui::header_cell("High"),
        ui::header_cell("Origin"),
        ui::header_cell("Samples"),
    ]);
    for pair in pairs {
        let resolved = store.resolve(snapshot, pair);
        let samples = Some(resolved.bounds.sample_count).filter(|n| *n > 0);
        table.add_row(vec![
            Cell::new(pair.to_string()),
            ui::rate_cell(resolved.bounds.low),
            ui::rate_cell(resolved.bounds.high),
            ui::origin_cell(resolved.origin),
            ui::format_optional_cell(samples, |n| n.to_string()),
        ]);
    }

    output.push('\n');
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\n\n{}",
        ui::style_text(&store.path().display().to_string(), ui::StyleType::Subtle)
    ));
    output
}

pub fn run(config: &AppConfig, store: &ThresholdStore) -> Result<()> {
    let snapshot = store.load();
    let today = Local::now().date_naive();
    println!("{}", render(&config.pairs(), store, snapshot.as_ref(), today));
    Ok(())
}
