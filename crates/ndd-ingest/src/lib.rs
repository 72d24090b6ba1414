//! Flat-file ingestion for the one-off transforms and the study archive.

pub mod dictionary;
pub mod error;
pub mod table;

pub use dictionary::load_dictionary;
pub use error::{IngestError, Result};
pub use table::{
    FileFormat, decode_text, read_delimited, read_delimited_from, read_excel, read_table, sibling_path,
    table_to_string, write_delimited, write_table,
};
