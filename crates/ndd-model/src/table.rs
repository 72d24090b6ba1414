use std::collections::BTreeMap;

use crate::record::Record;

/// Column-ordered string table.
///
/// Used wherever column order matters: spreadsheet ingestion, REDCap
/// import files and LabKey study archive TSVs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell value, empty when the column or row is missing.
    pub fn cell(&self, row: usize, column: &str) -> &str {
        self.column_index(column)
            .and_then(|idx| self.rows.get(row).and_then(|r| r.get(idx)))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }

    /// Append a row, padding or truncating to the header width.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Replace the column if present, otherwise append it.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) {
        let idx = match self.column_index(name) {
            Some(idx) => idx,
            None => {
                self.headers.push(name.to_string());
                for row in &mut self.rows {
                    row.push(String::new());
                }
                self.headers.len() - 1
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
    }

    pub fn drop_columns(&mut self, names: &[&str]) {
        let keep: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !names.contains(&h.as_str()))
            .map(|(idx, _)| idx)
            .collect();
        self.select_indices(&keep);
    }

    /// Keep only the named columns, in the given order. Unknown names are ignored.
    pub fn select_columns(&mut self, names: &[String]) {
        let keep: Vec<usize> = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        self.select_indices(&keep);
    }

    fn select_indices(&mut self, keep: &[usize]) {
        self.headers = keep.iter().map(|&idx| self.headers[idx].clone()).collect();
        for row in &mut self.rows {
            *row = keep
                .iter()
                .map(|&idx| row.get(idx).cloned().unwrap_or_default())
                .collect();
        }
    }

    pub fn rename_columns(&mut self, renames: &BTreeMap<String, String>) {
        for header in &mut self.headers {
            if let Some(new_name) = renames.get(header.as_str()) {
                header.clone_from(new_name);
            }
        }
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Table, usize) -> bool,
    {
        let mut kept = Vec::with_capacity(self.rows.len());
        for idx in 0..self.rows.len() {
            if keep(self, idx) {
                kept.push(self.rows[idx].clone());
            }
        }
        self.rows = kept;
    }

    /// Map every header through `f`.
    pub fn map_headers<F: FnMut(&str) -> String>(&mut self, mut f: F) {
        for header in &mut self.headers {
            *header = f(header);
        }
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, v)| (h.clone(), v.clone()))
                    .collect()
            })
            .collect()
    }

    /// Build a table from records using `headers` as the column order.
    pub fn from_records(headers: Vec<String>, records: &[Record]) -> Self {
        let rows = records
            .iter()
            .map(|record| headers.iter().map(|h| record.get(h).to_string()).collect())
            .collect();
        Self { headers, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new(vec!["a".into(), "b".into(), "c".into()]);
        table.push_row(vec!["1".into(), "2".into(), "3".into()]);
        table.push_row(vec!["4".into(), "5".into()]);
        table
    }

    #[test]
    fn short_rows_are_padded() {
        let table = sample();
        assert_eq!(table.cell(1, "c"), "");
        assert_eq!(table.cell(1, "b"), "5");
    }

    #[test]
    fn set_and_drop_columns() {
        let mut table = sample();
        table.set_column("d", vec!["x".into(), "y".into()]);
        table.drop_columns(&["a", "c"]);
        assert_eq!(table.headers, vec!["b", "d"]);
        assert_eq!(table.rows[1], vec!["5", "y"]);
    }

    #[test]
    fn records_round_trip_through_headers() {
        let table = sample();
        let records = table.to_records();
        assert_eq!(records[0].get("b"), "2");
        let rebuilt = Table::from_records(table.headers.clone(), &records);
        assert_eq!(rebuilt, table);
    }
}
