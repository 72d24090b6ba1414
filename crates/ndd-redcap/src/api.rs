use ndd_model::{DataDictionary, Record, Table};

use crate::error::Result;

/// Filter for a record export. Empty lists mean "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub forms: Vec<String>,
    pub records: Vec<String>,
    pub fields: Vec<String>,
}

impl RecordQuery {
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn forms<I, S>(mut self, forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forms.extend(forms.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn record(mut self, id: impl Into<String>) -> Self {
        self.records.push(id.into());
        self
    }

    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }
}

/// Operations the pipeline needs from one REDCap project.
pub trait RedcapApi: Send + Sync {
    /// Flat record export with the header row preserved.
    ///
    /// An export with no rows still carries the column names.
    fn export_records(&self, query: &RecordQuery) -> Result<Table>;

    /// Data dictionary of the given forms (all forms when empty).
    fn export_metadata(&self, forms: &[String]) -> Result<DataDictionary>;

    /// Import or overwrite records; returns the count REDCap reports.
    fn import_records(&self, records: &[Record]) -> Result<usize>;

    /// Record export as rows.
    fn export_rows(&self, query: &RecordQuery) -> Result<Vec<Record>> {
        Ok(self.export_records(query)?.to_records())
    }

    fn import_record(&self, record: &Record) -> Result<usize> {
        self.import_records(std::slice::from_ref(record))
    }
}
