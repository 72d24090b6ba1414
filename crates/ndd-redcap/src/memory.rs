//! In-memory REDCap project for tests of the crates built on [`RedcapApi`].

use std::sync::{Mutex, MutexGuard};

use ndd_model::{DataDictionary, Record, Table, fields};

use crate::api::{RecordQuery, RedcapApi};
use crate::error::{RedcapError, Result};

const SYSTEM_FIELDS: &[&str] = &[
    fields::RECORD_ID,
    fields::EVENT_NAME,
    fields::REPEAT_INSTRUMENT,
    fields::REPEAT_INSTANCE,
];

#[derive(Debug, Default)]
struct State {
    rows: Vec<Record>,
    imports: Vec<Vec<Record>>,
    fail_imports: bool,
}

/// A project held in memory.
///
/// Imports follow REDCap's default overwrite behaviour: blank values do not
/// clear stored ones.
#[derive(Debug, Default)]
pub struct MemoryRedcap {
    dictionary: DataDictionary,
    state: Mutex<State>,
}

impl MemoryRedcap {
    pub fn new(dictionary: DataDictionary, rows: Vec<Record>) -> Self {
        Self {
            dictionary,
            state: Mutex::new(State {
                rows,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Every row currently stored.
    pub fn rows(&self) -> Vec<Record> {
        self.state().rows.clone()
    }

    /// Batches passed to [`RedcapApi::import_records`], in call order.
    pub fn imports(&self) -> Vec<Vec<Record>> {
        self.state().imports.clone()
    }

    /// Make every later import fail with a 403.
    pub fn fail_imports(&self) {
        self.state().fail_imports = true;
    }

    /// Stored row with the given record id and event.
    pub fn find(&self, record_id: &str, event: &str) -> Option<Record> {
        self.state()
            .rows
            .iter()
            .find(|r| r.record_id() == record_id && r.event() == event)
            .cloned()
    }

    fn keep_column(&self, column: &str, query: &RecordQuery) -> bool {
        if SYSTEM_FIELDS.contains(&column) {
            return true;
        }
        let base = column.split("___").next().unwrap_or(column);
        if !query.fields.is_empty() && query.fields.iter().any(|f| f == base) {
            return true;
        }
        if query.forms.is_empty() {
            return query.fields.is_empty();
        }
        query.forms.iter().any(|form| {
            column == format!("{form}_complete")
                || self
                    .dictionary
                    .get(base)
                    .is_some_and(|meta| &meta.form_name == form)
        })
    }
}

fn same_row(a: &Record, b: &Record) -> bool {
    a.record_id() == b.record_id()
        && a.event() == b.event()
        && a.repeat_instrument() == b.repeat_instrument()
        && a.repeat_instance() == b.repeat_instance()
}

impl RedcapApi for MemoryRedcap {
    fn export_records(&self, query: &RecordQuery) -> Result<Table> {
        let state = self.state();
        let rows: Vec<&Record> = state
            .rows
            .iter()
            .filter(|r| query.records.is_empty() || query.records.iter().any(|id| id == r.record_id()))
            .collect();
        let mut headers: Vec<String> = Vec::new();
        for column in self
            .dictionary
            .field_names()
            .chain(rows.iter().flat_map(|r| r.fields()))
        {
            if self.keep_column(column, query) && !headers.iter().any(|h| h == column) {
                headers.push(column.to_string());
            }
        }
        for system in SYSTEM_FIELDS.iter().rev() {
            if let Some(idx) = headers.iter().position(|h| h == system) {
                let column = headers.remove(idx);
                headers.insert(0, column);
            }
        }
        let rows: Vec<Record> = rows.into_iter().cloned().collect();
        Ok(Table::from_records(headers, &rows))
    }

    fn export_metadata(&self, forms: &[String]) -> Result<DataDictionary> {
        if forms.is_empty() {
            return Ok(self.dictionary.clone());
        }
        let fields = self
            .dictionary
            .iter()
            .filter(|f| forms.contains(&f.form_name))
            .cloned()
            .collect();
        Ok(DataDictionary::new(fields)?)
    }

    fn import_records(&self, records: &[Record]) -> Result<usize> {
        let mut state = self.state();
        if state.fail_imports {
            return Err(RedcapError::Status {
                status: 403,
                body: r#"{"error":"You do not have permissions to use the API"}"#.to_string(),
            });
        }
        state.imports.push(records.to_vec());
        let mut ids: Vec<&str> = Vec::new();
        for record in records {
            match state.rows.iter().position(|r| same_row(r, record)) {
                Some(idx) => {
                    let existing = &mut state.rows[idx];
                    for (field, value) in record.iter().filter(|(_, v)| !v.is_empty()) {
                        existing.set(field, value);
                    }
                }
                None => state.rows.push(record.clone()),
            }
            if !ids.contains(&record.record_id()) {
                ids.push(record.record_id());
            }
        }
        Ok(ids.len())
    }
}
