//! REDCap data dictionary files as downloaded from the project setup page.

use std::path::Path;

use ndd_model::DataDictionary;
use tracing::info;

use crate::error::Result;
use crate::table::read_table;

/// Load a dictionary file (CSV or Excel) with either the download or the
/// API column names.
pub fn load_dictionary(path: &Path) -> Result<DataDictionary> {
    let table = read_table(path)?;
    let dictionary = DataDictionary::from_records(&table.to_records())?;
    info!(
        path = %path.display(),
        fields = dictionary.len(),
        forms = dictionary.form_names().len(),
        "data dictionary loaded"
    );
    Ok(dictionary)
}
