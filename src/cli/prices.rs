use super::ui;
use crate::app::{App, PriceRow};
use crate::coordinator::{LoadOutcome, PriceLoadCoordinator};
use anyhow::Result;
use comfy_table::{Cell, Color};

pub fn display_as_table(rows: &[PriceRow]) -> String {
    let mut table = ui::new_styled_table();

    table.set_header(vec![
        ui::header_cell("Identifier"),
        ui::header_cell("Name"),
        ui::header_cell("Units"),
        ui::header_cell("Price"),
        ui::header_cell("Value"),
        ui::header_cell("Status"),
    ]);

    for row in rows {
        let name = row
            .price
            .as_ref()
            .and_then(|p| p.short_name.clone())
            .unwrap_or_default();
        let price = ui::format_optional_cell(row.price.as_ref(), |p| {
            format!("{:.2}{}", p.price, p.currency)
        });
        let value = ui::format_optional_cell(row.value(), |v| format!("{v:.2}"));

        table.add_row(vec![
            Cell::new(&row.identifier),
            Cell::new(name),
            Cell::new(format!("{:.2}", row.units)),
            price,
            value,
            status_cell(row),
        ]);
    }

    let mut output = format!(
        "{}\n\n",
        ui::style_text("Current Prices", ui::StyleType::Title)
    );
    output.push_str(&table.to_string());
    output
}

fn status_cell(row: &PriceRow) -> Cell {
    match (&row.outcome, &row.price) {
        (Some(LoadOutcome::Failed(_)), None) => Cell::new("failed").fg(Color::Red),
        (Some(LoadOutcome::Pending), None) => Cell::new("pending").fg(Color::Yellow),
        (_, Some(_)) => Cell::new("loaded").fg(Color::Green),
        (_, None) => Cell::new("missing").fg(Color::DarkGrey),
    }
}

/// Shows a progress bar until every in-flight load has settled.
pub async fn wait_with_progress(coordinator: &PriceLoadCoordinator) {
    let mut progress = coordinator.subscribe_progress();
    let total = progress.borrow_and_update().in_flight as u64;
    if total == 0 {
        return;
    }

    let pb = ui::new_progress_bar(total, true);
    pb.set_message("Loading prices...");
    loop {
        let in_flight = progress.borrow_and_update().in_flight as u64;
        pb.set_position(total.saturating_sub(in_flight));
        if in_flight == 0 || progress.changed().await.is_err() {
            break;
        }
    }
    pb.finish_and_clear();
}

pub async fn run(app: &App) -> Result<()> {
    app.evaluated().await;
    wait_with_progress(app.coordinator()).await;
    println!("{}", display_as_table(&app.rows()));
    Ok(())
}
