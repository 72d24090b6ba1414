use std::path::Path;

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use ndd_core::ChoiceMap;
use ndd_etl::EtlSummary;
use ndd_transform::{ImportOutcome, NotesOutcome};

use crate::commands::NextIds;

pub fn print_etl_summary(summary: &EtlSummary) {
    println!("Archive: {}", summary.archive_zip.display());
    println!(
        "Records: {} referrals, {} families, {} members, {} clinical",
        summary.referrals, summary.families, summary.members, summary.clinical
    );
    println!("New subject ids: {}", summary.new_subject_ids);
    println!("{}", etl_table(summary));
}

fn etl_table(summary: &EtlSummary) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Schema"),
        header_cell("Rows"),
        header_cell("File"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    let mut total = 0usize;
    for file in &summary.tables {
        total += file.rows;
        table.add_row(vec![
            Cell::new(&file.table)
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            Cell::new(&file.schema),
            count_cell(file.rows),
            dim_cell(file_name(&file.path)),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        dim_cell("-"),
        Cell::new(total).add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    table
}

pub fn print_import_outcome(outcome: &ImportOutcome) {
    println!("Output: {}", outcome.output.display());
    println!("Rows: {}  Columns: {}", outcome.rows, outcome.columns);
    if outcome.report.is_clean() {
        return;
    }
    println!("{}", import_report_table(outcome));
}

fn import_report_table(outcome: &ImportOutcome) -> Table {
    let report = &outcome.report;
    let mut table = Table::new();
    table.set_header(vec![header_cell("Issue"), header_cell("Field"), header_cell("Row")]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    for field in &report.missing_fields {
        table.add_row(vec![issue_cell("missing column", Color::Yellow), Cell::new(field), dim_cell("-")]);
    }
    for (field, field_type) in &report.skipped_fields {
        table.add_row(vec![
            issue_cell("not importable", Color::DarkGrey),
            Cell::new(format!("{field} ({field_type})")),
            dim_cell("-"),
        ]);
    }
    let rows = [
        ("yes/no blanked", Color::Red, &report.blanked),
        ("label unmapped", Color::Yellow, &report.unmapped),
        ("checkbox unmapped", Color::Yellow, &report.unmapped_checkbox),
    ];
    for (label, color, values) in rows {
        for value in values {
            table.add_row(vec![
                issue_cell(label, color),
                Cell::new(&value.field),
                Cell::new(value.row + 1),
            ]);
        }
    }
    table
}

pub fn print_notes_outcome(outcome: &NotesOutcome) {
    println!("Output: {}", outcome.output.display());
    let mut table = Table::new();
    table.set_header(vec![header_cell("Notes"), header_cell("Count")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    table.add_row(vec![Cell::new("written"), count_cell(outcome.notes)]);
    table.add_row(vec![Cell::new("already in REDCap"), count_cell(outcome.updated)]);
    table.add_row(vec![Cell::new("MRN not found"), count_cell(outcome.unmatched)]);
    table.add_row(vec![
        Cell::new("imported"),
        match outcome.imported {
            Some(count) => count_cell(count),
            None => dim_cell("not pushed"),
        },
    ]);
    println!("{table}");
}

pub fn print_icd10(output: &Path, diagnoses: usize) {
    println!("Output: {}", output.display());
    println!("Diagnoses: {diagnoses}");
}

pub fn print_choices(field: &str, choices: &ChoiceMap) {
    println!("{}", choices_table(field, choices));
}

fn choices_table(field: &str, choices: &ChoiceMap) -> Table {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Code"), header_cell(field)]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    for (code, label) in choices.iter() {
        table.add_row(vec![Cell::new(code).fg(Color::Blue), Cell::new(label)]);
    }
    table
}

pub fn print_next_ids(ids: &NextIds) {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Identifier"), header_cell("Next")]);
    apply_table_style(&mut table);
    table.add_row(vec![
        Cell::new("data-collection record"),
        Cell::new(ids.data_collection_id).add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        Cell::new(format!("F-number ({})", ids.date.format("%Y-%m-%d"))),
        Cell::new(ids.f_number).add_attribute(Attribute::Bold),
    ]);
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
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(140);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn issue_cell(label: &str, color: Color) -> Cell {
    Cell::new(label).fg(color)
}

fn count_cell(count: usize) -> Cell {
    if count == 0 {
        dim_cell(count)
    } else {
        Cell::new(count)
    }
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_are_listed_in_dictionary_order() {
        let choices = ChoiceMap::parse("2, Mother | 1, Proband");
        let rendered = choices_table("demo_relation", &choices).to_string();
        let mother = rendered.find("Mother").unwrap();
        let proband = rendered.find("Proband").unwrap();
        assert!(mother < proband);
        assert!(rendered.contains("demo_relation"));
    }
}
