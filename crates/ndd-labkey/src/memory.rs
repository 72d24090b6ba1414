//! In-memory LabKey server for tests of the crates built on [`LabkeyApi`].

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::api::{LabkeyApi, Row};
use crate::error::{LabkeyError, Result};

/// Columns tried, in order, to match an updated row to a stored one.
const KEY_COLUMNS: &[&str] = &["SubjectID", "id", "Key", "lsid"];

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<(String, String), Vec<Row>>,
    fail_inserts: bool,
}

#[derive(Debug, Default)]
pub struct MemoryLabkey {
    state: Mutex<State>,
}

fn key_of(row: &Row) -> Option<(&str, &Value)> {
    KEY_COLUMNS
        .iter()
        .find_map(|column| row.get(*column).map(|value| (*column, value)))
}

fn not_found(schema: &str, query: &str, exception: &str) -> LabkeyError {
    LabkeyError::Status {
        schema: schema.to_string(),
        query: query.to_string(),
        status: 404,
        exception: exception.to_string(),
    }
}

impl MemoryLabkey {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replace a query's contents.
    pub fn set_rows(&self, schema: &str, query: &str, rows: Vec<Row>) {
        self.state()
            .tables
            .insert((schema.to_string(), query.to_string()), rows);
    }

    pub fn rows(&self, schema: &str, query: &str) -> Vec<Row> {
        self.state()
            .tables
            .get(&(schema.to_string(), query.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Make every later insert fail.
    pub fn fail_inserts(&self) {
        self.state().fail_inserts = true;
    }
}

impl LabkeyApi for MemoryLabkey {
    fn select_rows(&self, schema: &str, query: &str) -> Result<Vec<Row>> {
        self.state()
            .tables
            .get(&(schema.to_string(), query.to_string()))
            .cloned()
            .ok_or_else(|| not_found(schema, query, "query does not exist"))
    }

    fn insert_rows(&self, schema: &str, query: &str, rows: &[Row]) -> Result<usize> {
        let mut state = self.state();
        if state.fail_inserts {
            return Err(LabkeyError::Status {
                schema: schema.to_string(),
                query: query.to_string(),
                status: 400,
                exception: "insert rejected".to_string(),
            });
        }
        state
            .tables
            .entry((schema.to_string(), query.to_string()))
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows.len())
    }

    fn update_rows(&self, schema: &str, query: &str, rows: &[Row]) -> Result<usize> {
        let mut state = self.state();
        let table = state
            .tables
            .get_mut(&(schema.to_string(), query.to_string()))
            .ok_or_else(|| not_found(schema, query, "query does not exist"))?;
        for row in rows {
            let (column, value) =
                key_of(row).ok_or_else(|| not_found(schema, query, "row has no key column"))?;
            let stored = table
                .iter_mut()
                .find(|r| r.get(column) == Some(value))
                .ok_or_else(|| not_found(schema, query, "row not found"))?;
            for (k, v) in row {
                stored.insert(k.clone(), v.clone());
            }
        }
        Ok(rows.len())
    }
}
