use ndd_model::Record;
use serde_json::{Map, Value};

use crate::error::Result;

/// One LabKey row as sent and received over the query API.
pub type Row = Map<String, Value>;

/// Row with every record field as a string value.
pub fn row_from_record(record: &Record) -> Row {
    record
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// Build a row from `(column, value)` pairs.
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// The query operations the pipeline uses.
pub trait LabkeyApi: Send + Sync {
    fn select_rows(&self, schema: &str, query: &str) -> Result<Vec<Row>>;

    /// Returns the number of rows LabKey reports as affected.
    fn insert_rows(&self, schema: &str, query: &str, rows: &[Row]) -> Result<usize>;

    /// Fails when a row has no existing counterpart.
    fn update_rows(&self, schema: &str, query: &str, rows: &[Row]) -> Result<usize>;
}
