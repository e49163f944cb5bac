use std::path::Path;

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use dbma_model::{OutcomeStatus, RuleOutcome};

use crate::types::ImportResult;

pub fn print_summary(result: &ImportResult) {
    println!("Collection: {}", result.collection_key);
    println!(
        "Database version: {}   Collector script: {}",
        result.db_version, result.collection_version
    );
    println!(
        "Ingested {} table(s), skipped {}, invalid {}",
        result.ingested.len(),
        result.skipped.len(),
        result.invalid.len()
    );

    print_outcome_table(result);
    print_invalid_table(result);

    if !result.produced_files.is_empty() {
        println!();
        println!("Produced files:");
        for file in &result.produced_files {
            println!("- {}", file.display());
        }
    }
    if !result.handoff.is_empty() {
        println!(
            "Handed {} table(s) to the warehouse loader",
            result.handoff.len()
        );
    }
    if !result.views.is_empty() {
        println!("Created {} view(s): {}", result.views.len(), result.views.join(", "));
    }
}

fn print_outcome_table(result: &ImportResult) {
    if result.outcomes.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Rule"),
        header_cell("Status"),
        header_cell("Reason"),
        header_cell("Detail"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    let mut executed = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;
    for (id, outcome) in &result.outcomes {
        match outcome.status {
            OutcomeStatus::Executed => executed += 1,
            OutcomeStatus::Failed => failed += 1,
            OutcomeStatus::Skipped => skipped += 1,
        }
        table.add_row(vec![
            Cell::new(id.clone())
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            status_cell(outcome),
            reason_cell(outcome),
            detail_cell(outcome),
        ]);
    }
    println!();
    println!("Rules: {executed} executed, {failed} failed, {skipped} skipped");
    println!("{table}");
}

fn print_invalid_table(result: &ImportResult) {
    if result.invalid.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![header_cell("File"), header_cell("Reason")]);
    apply_summary_table_style(&mut table);
    for (path, reason) in &result.invalid {
        table.add_row(vec![
            Cell::new(file_name(path)),
            Cell::new(reason.clone()).fg(Color::Yellow),
        ]);
    }
    println!();
    println!("Invalid files:");
    println!("{table}");
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(140);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn status_cell(outcome: &RuleOutcome) -> Cell {
    match outcome.status {
        OutcomeStatus::Executed => Cell::new("EXECUTED")
            .fg(Color::Green)
            .add_attribute(Attribute::Bold),
        OutcomeStatus::Failed => Cell::new("FAILED")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        OutcomeStatus::Skipped => Cell::new("SKIPPED").fg(Color::DarkGrey),
    }
}

fn reason_cell(outcome: &RuleOutcome) -> Cell {
    match outcome.skip_reason {
        Some(reason) => Cell::new(reason.to_string()).fg(Color::Yellow),
        None => dim_cell("-"),
    }
}

fn detail_cell(outcome: &RuleOutcome) -> Cell {
    match &outcome.detail {
        Some(detail) => Cell::new(detail.clone()).fg(Color::Red),
        None => dim_cell("-"),
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or_else(|| path.display().to_string(), str::to_string)
}
