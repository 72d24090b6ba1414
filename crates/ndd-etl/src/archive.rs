//! LabKey study archive tables.
//!
//! Each configured LabKey table is assembled from one or more decoded
//! instruments and written as `study/datasets/dataset<ID>.tsv` or
//! `lists/<query>.tsv` under the archive root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndd_core::{coerce_datetime, concat_fields, concat_other, piped_instance};
use ndd_ingest::write_table;
use ndd_model::{EtlConfig, InstrumentConfig, LabkeyTableConfig, Record, Table, events, fields};
use tracing::{info, warn};

use crate::error::{EtlError, Result, io_error};
use crate::forms::{FormRow, FormTable, complete_field};
use crate::split::{EventData, REFERRAL, SUBJECT_ID};

pub const STUDY_SCHEMA: &str = "study";
pub const LISTS_SCHEMA: &str = "lists";
pub const LISTS_DIR: &str = "lists";
pub const DATASETS_DIR: &str = "study/datasets";

const SUBJECT_COLUMN: &str = "SubjectID";
const FAMILY_COLUMN: &str = "familyid";
const DATE_COLUMN: &str = "date";
const LSID_COLUMN: &str = "lsid";
const LIST_ID_COLUMN: &str = "id";
const QC_STATE_COLUMN: &str = "QCStateLabel";

const LSID_PREFIX: &str = "urn:lsid:labkey.com:Study.Data-5";

/// Member field that piped references point at.
const PIPED_NAME_FIELD: &str = "demo_firstname";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    pub table: String,
    pub schema: String,
    pub path: PathBuf,
    pub rows: usize,
}

/// `urn:lsid:labkey.com:Study.Data-5:<dataset>.<subject>.<yyyymmdd.HHMM>.<instance>`
pub fn lsid(dataset_id: &str, subject: &str, date: &str, instance: &str) -> Option<String> {
    let stamp = coerce_datetime(date)?.format("%Y%m%d.%H%M");
    let instance = if instance.trim().is_empty() {
        "0"
    } else {
        instance.trim()
    };
    Some(format!("{LSID_PREFIX}:{dataset_id}.{subject}.{stamp}.{instance}"))
}

/// Subject id behind a piped `[family_member_arm_1][demo_firstname][n]` value.
fn piped_subject(data: &EventData, record_id: &str, raw: &str) -> String {
    piped_instance(raw, events::MEMBER, PIPED_NAME_FIELD)
        .and_then(|instance| data.member_subject_id(record_id, instance))
        .unwrap_or_default()
        .to_string()
}

/// Value of `column` from the form row, else from the event row it came from.
fn form_or_source<'a>(form: &FormTable, row: &'a FormRow, source: &'a [Record], column: &str) -> &'a str {
    if form.has_column(column) {
        row.values.get(column)
    } else {
        source.get(row.source).map_or("", |r| r.get(column))
    }
}

fn filter_completed(form: &mut FormTable) {
    let complete = complete_field(&form.instrument);
    let keep = [complete.as_str(), fields::REPEAT_INSTANCE];
    form.retain_rows(|row| {
        !row.values.get(&complete).trim().is_empty() && !row.values.is_blank_except(&keep)
    });
}

fn apply_column_rules(form: &mut FormTable, config: &InstrumentConfig) {
    for (target, rule) in &config.other {
        form.set_column(target, |row| {
            concat_other(row.values.get(&rule.data), row.values.get(&rule.other))
        });
    }
    for rule in config.other.values() {
        if !config.other.contains_key(&rule.other) {
            form.drop_column(&rule.other);
        }
    }
    for (target, sources) in &config.concat {
        form.set_column(target, |row| {
            concat_fields(sources.iter().map(|field| row.values.get(field)))
        });
    }
    for (from, to) in &config.rename {
        form.rename_column(from, to);
    }
    for column in &config.drop {
        form.drop_column(column);
    }
    if form.event != events::CLINICAL {
        form.drop_column(fields::REPEAT_INSTANCE);
    }
    if !config.req_qc {
        let complete = complete_field(&form.instrument);
        form.drop_column(&complete);
    }
}

fn attach_study_columns(
    form: &mut FormTable,
    config: &InstrumentConfig,
    dataset_id: &str,
    data: &EventData,
) -> Result<()> {
    let source = data.rows(&form.event).unwrap_or_default();
    let date_column = config
        .date_column
        .clone()
        .ok_or_else(|| EtlError::MissingDateColumn(form.instrument.clone()))?;

    let subjects: Vec<String> = form
        .rows
        .iter()
        .map(|row| {
            let origin = source.get(row.source);
            match form.event.as_str() {
                REFERRAL | events::MEMBER => origin.map_or("", |r| r.get(SUBJECT_ID)).to_string(),
                events::CLINICAL => match &config.subject_column {
                    Some(column) => piped_subject(
                        data,
                        origin.map_or("", Record::record_id),
                        form_or_source(form, row, source, column),
                    ),
                    None => String::new(),
                },
                _ => String::new(),
            }
        })
        .collect();
    let dates: Vec<String> = form
        .rows
        .iter()
        .map(|row| form_or_source(form, row, source, &date_column).trim().to_string())
        .collect();

    let mut subjects = subjects.into_iter();
    form.set_column(SUBJECT_COLUMN, |_| subjects.next().unwrap_or_default());
    if let Some(column) = &config.subject_column {
        form.drop_column(column);
    }
    for column in &config.subject_refs {
        form.set_column(column, |row| {
            let record_id = source.get(row.source).map_or("", Record::record_id);
            piped_subject(data, record_id, row.values.get(column))
        });
    }
    let mut dates = dates.into_iter();
    form.set_column(DATE_COLUMN, |_| dates.next().unwrap_or_default());
    if date_column != DATE_COLUMN {
        form.drop_column(&date_column);
    }

    let before = form.rows.len();
    form.retain_rows(|row| !row.values.get(DATE_COLUMN).is_empty());
    let undated = before - form.rows.len();
    let before = form.rows.len();
    form.retain_rows(|row| !row.values.get(SUBJECT_COLUMN).is_empty());
    let unassigned = before - form.rows.len();
    if undated + unassigned > 0 {
        warn!(instrument = %form.instrument, undated, unassigned, "rows skipped, LabKey needs a date and a subject");
    }

    if !config.is_demo {
        let lsids: Vec<Option<String>> = form
            .rows
            .iter()
            .map(|row| {
                let instance = source.get(row.source).map_or("", Record::repeat_instance);
                lsid(
                    dataset_id,
                    row.values.get(SUBJECT_COLUMN),
                    row.values.get(DATE_COLUMN),
                    instance,
                )
            })
            .collect();
        let mut rows = Vec::with_capacity(form.rows.len());
        for (mut row, lsid) in form.rows.drain(..).zip(lsids) {
            match lsid {
                Some(lsid) => {
                    row.values.set(LSID_COLUMN, lsid);
                    rows.push(row);
                }
                None => warn!(
                    instrument = %form.instrument,
                    date = row.values.get(DATE_COLUMN),
                    "unparseable date, row skipped"
                ),
            }
        }
        form.rows = rows;
        if !form.has_column(LSID_COLUMN) {
            form.headers.push(LSID_COLUMN.to_string());
        }
    }
    Ok(())
}

/// Apply an instrument's rules and LabKey identifiers to its decoded table.
pub fn prepare_form(
    form: &FormTable,
    config: &InstrumentConfig,
    table: &LabkeyTableConfig,
    data: &EventData,
) -> Result<FormTable> {
    let mut form = form.clone();
    filter_completed(&mut form);
    apply_column_rules(&mut form, config);

    let source = data.rows(&form.event).unwrap_or_default();
    if config.family_id {
        form.set_column(FAMILY_COLUMN, |row| {
            source.get(row.source).map_or("", Record::record_id).to_string()
        });
    }
    if table.schema == STUDY_SCHEMA {
        attach_study_columns(&mut form, config, &table.dataset_id, data)?;
    } else if config.list_id {
        form.set_column(LIST_ID_COLUMN, |row| {
            source.get(row.source).map_or("", Record::record_id).to_string()
        });
    }
    Ok(form)
}

/// Join the table's instruments row by row; the first instrument to supply
/// a column wins.
pub fn build_table(
    name: &str,
    table: &LabkeyTableConfig,
    forms: &std::collections::BTreeMap<String, FormTable>,
    config: &EtlConfig,
    data: &EventData,
) -> Result<Table> {
    let mut headers: Vec<String> = Vec::new();
    let mut rows: Vec<Record> = Vec::new();
    let mut index: HashMap<(String, usize), usize> = HashMap::new();

    for instrument in &table.instruments {
        let missing = || EtlError::MissingInstrument {
            table: name.to_string(),
            instrument: instrument.clone(),
        };
        let form = forms.get(instrument).ok_or_else(missing)?;
        let instrument_config = config.instruments.get(instrument).ok_or_else(missing)?;
        let prepared = prepare_form(form, instrument_config, table, data)?;

        for header in &prepared.headers {
            if !headers.contains(header) {
                headers.push(header.clone());
            }
        }
        for row in prepared.rows {
            let key = (prepared.event.clone(), row.source);
            match index.get(&key) {
                Some(&idx) => {
                    let merged = &mut rows[idx];
                    for (column, value) in row.values.iter() {
                        if !merged.contains(column) {
                            merged.set(column, value);
                        }
                    }
                }
                None => {
                    index.insert(key, rows.len());
                    rows.push(row.values);
                }
            }
        }
    }

    if table.schema == STUDY_SCHEMA {
        headers.push(QC_STATE_COLUMN.to_string());
    }
    Ok(Table::from_records(headers, &rows))
}

/// Archive-relative path of a table's TSV.
pub fn dataset_path(archive: &Path, name: &str, table: &LabkeyTableConfig) -> PathBuf {
    if table.schema == STUDY_SCHEMA {
        archive
            .join(DATASETS_DIR)
            .join(format!("dataset{}.tsv", table.dataset_id))
    } else {
        archive.join(LISTS_DIR).join(format!("{name}.tsv"))
    }
}

/// Write every configured table under `archive`.
pub fn write_tables(
    archive: &Path,
    forms: &std::collections::BTreeMap<String, FormTable>,
    config: &EtlConfig,
    data: &EventData,
) -> Result<Vec<DatasetFile>> {
    let mut written = Vec::with_capacity(config.tables.len());
    for (name, table_config) in &config.tables {
        let table = build_table(name, table_config, forms, config, data)?;
        let path = dataset_path(archive, name, table_config);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        write_table(&path, &table)?;
        info!(table = %name, schema = %table_config.schema, rows = table.len(), path = %path.display(), "LabKey table written");
        written.push(DatasetFile {
            table: name.clone(),
            schema: table_config.schema.clone(),
            path,
            rows: table.len(),
        });
    }
    Ok(written)
}
