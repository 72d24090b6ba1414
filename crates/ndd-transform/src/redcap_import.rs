//! Spreadsheet → REDCap import file.
//!
//! Values are translated from the human-readable labels a collaborator
//! typed into codes the target project accepts, driven entirely by that
//! project's data dictionary. Nothing that fails to translate stops the
//! run; it is collected in an [`ImportReport`] instead.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use ndd_core::decode::{checkbox_column_name, encode_choice, encode_yes_no, expand_checkbox};
use ndd_core::{ChoiceMap, ParseOptions};
use ndd_ingest::{load_dictionary, read_table, sibling_path, write_table};
use ndd_model::{DataDictionary, FieldMeta, FieldType, Table};
use regex::Regex;
use tracing::{info, warn};

use crate::error::Result;

static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]{0,3}:[0-9]{0,3}:[0-9]{0,3}").expect("Invalid time regex")
});

const DATE_MDY: &str = "date_mdy";

/// A value that could not be translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedValue {
    pub field: String,
    /// Zero-based data row.
    pub row: usize,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Dictionary fields with no column in the data file.
    pub missing_fields: Vec<String>,
    /// Fields whose type has no import translation (calc, descriptive, ...).
    pub skipped_fields: Vec<(String, FieldType)>,
    /// Yes/no values that were blanked.
    pub blanked: Vec<UnmappedValue>,
    /// Dropdown and radio labels left as typed.
    pub unmapped: Vec<UnmappedValue>,
    /// Checkbox labels with no matching choice.
    pub unmapped_checkbox: Vec<UnmappedValue>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.missing_fields.is_empty()
            && self.skipped_fields.is_empty()
            && self.blanked.is_empty()
            && self.unmapped.is_empty()
            && self.unmapped_checkbox.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ImportTable {
    pub table: Table,
    pub report: ImportReport,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub output: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub report: ImportReport,
}

/// `Date Of Birth` → `date_of_birth`.
pub fn normalize_header(header: &str) -> String {
    header.replace(' ', "_").to_lowercase()
}

fn strip_times(value: &str) -> String {
    TIME_PATTERN.replace_all(value, "").trim().to_string()
}

fn translate_yes_no(field: &str, values: &[&str], report: &mut ImportReport) -> Vec<String> {
    values
        .iter()
        .enumerate()
        .map(|(row, value)| match encode_yes_no(value) {
            Some(code) => code.to_string(),
            None => {
                report.blanked.push(UnmappedValue {
                    field: field.to_string(),
                    row,
                    value: (*value).to_string(),
                });
                String::new()
            }
        })
        .collect()
}

fn translate_choice(
    field: &str,
    choices: &ChoiceMap,
    values: &[&str],
    report: &mut ImportReport,
) -> Vec<String> {
    values
        .iter()
        .enumerate()
        .map(|(row, value)| {
            let value = value.trim();
            if value.is_empty() || choices.label(value).is_some() {
                return value.to_string();
            }
            match encode_choice(choices, value) {
                Some(code) => code.to_string(),
                None => {
                    report.unmapped.push(UnmappedValue {
                        field: field.to_string(),
                        row,
                        value: value.to_string(),
                    });
                    value.to_string()
                }
            }
        })
        .collect()
}

fn expand_checkbox_column(
    field: &str,
    choices: &ChoiceMap,
    values: &[&str],
    report: &mut ImportReport,
) -> Vec<(String, Vec<String>)> {
    let mut columns: Vec<(String, Vec<String>)> = choices
        .codes()
        .map(|code| {
            (
                checkbox_column_name(field, code),
                Vec::with_capacity(values.len()),
            )
        })
        .collect();
    for (row, value) in values.iter().enumerate() {
        let expanded = expand_checkbox(field, choices, value);
        for ((_, flag), (_, column)) in expanded.columns.iter().zip(columns.iter_mut()) {
            column.push((*flag).to_string());
        }
        report
            .unmapped_checkbox
            .extend(expanded.unmapped.into_iter().map(|label| UnmappedValue {
                field: field.to_string(),
                row,
                value: label,
            }));
    }
    columns
}

fn choices_of(meta: &FieldMeta) -> ChoiceMap {
    ChoiceMap::parse_with(&meta.choices, ParseOptions { strip_markup: true })
}

/// Translate `data` into the shape the dictionary's project imports.
///
/// The id column comes first, then every translatable dictionary field in
/// dictionary order, with checkbox fields expanded in place.
pub fn translate(data: &Table, id_field: &str, dictionary: &DataDictionary) -> ImportTable {
    let mut data = data.clone();
    data.map_headers(normalize_header);
    let id_field = normalize_header(id_field);
    let mut report = ImportReport::default();

    let mut out_headers = vec![id_field.clone()];
    let mut out_columns = vec![match data.column(&id_field) {
        Some(values) => values.into_iter().map(str::to_string).collect(),
        None => {
            report.missing_fields.push(id_field.clone());
            vec![String::new(); data.len()]
        }
    }];

    for meta in dictionary.iter() {
        let field = meta.field_name.as_str();
        if field == id_field {
            continue;
        }
        let Some(values) = data.column(field) else {
            report.missing_fields.push(field.to_string());
            continue;
        };
        match &meta.field_type {
            FieldType::Text | FieldType::Notes => {
                let column = if meta.validation == DATE_MDY {
                    values.iter().map(|v| strip_times(v)).collect()
                } else {
                    values.iter().map(|v| (*v).to_string()).collect()
                };
                out_headers.push(field.to_string());
                out_columns.push(column);
            }
            FieldType::YesNo | FieldType::TrueFalse => {
                out_headers.push(field.to_string());
                out_columns.push(translate_yes_no(field, &values, &mut report));
            }
            FieldType::Dropdown | FieldType::Radio => {
                let choices = choices_of(meta);
                out_headers.push(field.to_string());
                out_columns.push(translate_choice(field, &choices, &values, &mut report));
            }
            FieldType::Checkbox => {
                let choices = choices_of(meta);
                for (name, column) in expand_checkbox_column(field, &choices, &values, &mut report) {
                    out_headers.push(name);
                    out_columns.push(column);
                }
            }
            other => report.skipped_fields.push((field.to_string(), other.clone())),
        }
    }

    let mut table = Table::new(out_headers);
    for row in 0..data.len() {
        table.push_row(out_columns.iter().map(|column| column[row].clone()).collect());
    }
    ImportTable { table, report }
}

fn log_report(report: &ImportReport) {
    for field in &report.missing_fields {
        warn!(field, "field not found in data");
    }
    for (field, field_type) in &report.skipped_fields {
        warn!(field, %field_type, "field type has no import translation, dropped");
    }
    for value in &report.blanked {
        warn!(field = %value.field, row = value.row, "value is not a boolean, set to blank");
    }
    for value in &report.unmapped {
        warn!(field = %value.field, row = value.row, "label not in choice list");
    }
    for value in &report.unmapped_checkbox {
        warn!(field = %value.field, row = value.row, "checkbox label not in choice list");
    }
}

/// Translate a data file and write `<stem>_redcap_import.csv` beside it.
pub fn run(data_path: &Path, id_field: &str, dictionary_path: &Path) -> Result<ImportOutcome> {
    let data = read_table(data_path)?;
    let dictionary = load_dictionary(dictionary_path)?;
    let ImportTable { table, report } = translate(&data, id_field, &dictionary);
    log_report(&report);

    let output = sibling_path(data_path, "_redcap_import", "csv");
    write_table(&output, &table)?;
    info!(
        output = %output.display(),
        rows = table.len(),
        columns = table.headers.len(),
        "REDCap import file written"
    );
    Ok(ImportOutcome {
        output,
        rows: table.len(),
        columns: table.headers.len(),
        report,
    })
}
