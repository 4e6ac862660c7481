//! Terminal output formatting for the meridian CLI.
//! Uses comfy-table for tabular output and colored for
//! severity-aware terminal styling.

use std::collections::BTreeMap;

use colored::Colorize;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};

use meridian_core::{Change, PlanReport};

/// Print the plan report: per-table summary, change list, generated SQL.
pub fn print_plan_report(report: &PlanReport) {
    if !report.has_changes {
        println!("{}", "Schema is up to date. No changes necessary.".green().bold());
        return;
    }

    println!(
        "{}",
        format!("Found {} schema change(s):", report.changes.len())
            .yellow()
            .bold()
    );
    println!();
    print_summary_table(&report.changes);
    println!();

    for change in &report.changes {
        let line = format!("{}", change);
        if line.starts_with('+') {
            println!("  {}", line.green());
        } else if line.starts_with('-') {
            println!("  {}", line.red());
        } else {
            println!("  {}", line.yellow());
        }
    }

    if !report.statements.is_empty() {
        println!();
        println!("{}", "Generated SQL:".bold());
        for statement in &report.statements {
            println!("{}", statement.dimmed());
        }
    }
}

/// Per-table change counts as a table.
fn print_summary_table(changes: &[Change]) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for change in changes {
        *counts.entry(change_table(change)).or_insert(0) += 1;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Table"), Cell::new("Changes")]);

    for (name, count) in counts {
        table.add_row(vec![Cell::new(name), Cell::new(count)]);
    }

    println!("{table}");
}

fn change_table(change: &Change) -> &str {
    match change {
        Change::CreateTable { table_name, .. }
        | Change::DropTable { table_name }
        | Change::DropColumn { table_name, .. }
        | Change::DropConstraint { table_name, .. } => table_name,
        Change::AddColumn { column } => &column.table_name,
        Change::AlterColumn { target, .. } => &target.table_name,
        Change::AddConstraint { constraint } => constraint.table_name(),
        Change::AddIndex { index } => &index.table_name,
        // Drops carry only the index name
        Change::DropIndex { .. } => "(index)",
    }
}
