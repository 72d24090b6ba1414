//! Reading and writing [`Table`]s as CSV, TSV or Excel files.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto};
use chrono::Timelike;
use csv::{ReaderBuilder, WriterBuilder};
use ndd_model::Table;
use tracing::debug;

use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Tsv,
    Excel,
}

impl FileFormat {
    /// Format implied by the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "tsv" | "tab" | "txt" => Ok(Self::Tsv),
            "xls" | "xlsx" | "xlsm" => Ok(Self::Excel),
            _ => Err(IngestError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn delimiter(self) -> u8 {
        match self {
            Self::Tsv => b'\t',
            Self::Csv | Self::Excel => b',',
        }
    }
}

fn normalize_header(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').trim().to_string()
}

fn normalize_cell(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').to_string()
}

/// Build a table from raw rows; the first non-blank row is the header.
fn from_raw_rows(raw_rows: Vec<Vec<String>>) -> Table {
    let mut rows = raw_rows
        .into_iter()
        .filter(|row| row.iter().any(|value| !value.trim().is_empty()));
    let Some(header) = rows.next() else {
        return Table::default();
    };
    let mut table = Table::new(header.iter().map(|h| normalize_header(h)).collect());
    for row in rows {
        table.push_row(row);
    }
    table
}

/// Read any supported file into a table.
pub fn read_table(path: &Path) -> Result<Table> {
    let format = FileFormat::from_path(path)?;
    let table = match format {
        FileFormat::Csv | FileFormat::Tsv => read_delimited(path, format.delimiter())?,
        FileFormat::Excel => read_excel(path)?,
    };
    debug!(
        path = %path.display(),
        ?format,
        rows = table.len(),
        columns = table.headers.len(),
        "table loaded"
    );
    Ok(table)
}

/// Text as UTF-8, or as Latin-1 when it is not valid UTF-8.
///
/// Dictionary downloads and EHR reports are often Windows-1252 encoded.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().iter().map(|&b| char::from(b)).collect(),
    }
}

pub fn read_delimited(path: &Path, delimiter: u8) -> Result<Table> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = decode_text(bytes);
    read_delimited_from(text.as_bytes(), delimiter).map_err(|source| IngestError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_delimited_from<R: Read>(reader: R, delimiter: u8) -> csv::Result<Table> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(reader);
    let mut raw_rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        raw_rows.push(record.iter().map(normalize_cell).collect());
    }
    Ok(from_raw_rows(raw_rows))
}

fn excel_error(path: &Path, err: impl std::fmt::Display) -> IngestError {
    IngestError::Excel {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => normalize_cell(s),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if value.num_seconds_from_midnight() == 0 => {
                value.format("%Y-%m-%d").to_string()
            }
            Some(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => cell.to_string(),
        },
        other => other.to_string(),
    }
}

/// Read the first worksheet of an `.xls`/`.xlsx` workbook.
pub fn read_excel(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path).map_err(|e| excel_error(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::EmptyWorkbook(path.to_path_buf()))?
        .map_err(|e| excel_error(path, e))?;
    let raw_rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    Ok(from_raw_rows(raw_rows))
}

/// Write a table, tab-separated for `.tsv`/`.tab` paths and comma-separated otherwise.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    let delimiter = match FileFormat::from_path(path) {
        Ok(format) => format.delimiter(),
        Err(_) => b',',
    };
    let file = File::create(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_delimited(file, table, delimiter).map_err(|source| IngestError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), rows = table.len(), "table written");
    Ok(())
}

pub fn write_delimited<W: Write>(writer: W, table: &Table, delimiter: u8) -> csv::Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(writer);
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Render a table as delimited text.
pub fn table_to_string(table: &Table, delimiter: u8) -> csv::Result<String> {
    let mut buffer = Vec::new();
    write_delimited(&mut buffer, table, delimiter)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// `<dir>/<stem><suffix>.<ext>` next to `path`.
pub fn sibling_path(path: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_from_extension() {
        assert_eq!(FileFormat::from_path(Path::new("a.CSV")).unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_path(Path::new("a.tab")).unwrap(), FileFormat::Tsv);
        assert_eq!(FileFormat::from_path(Path::new("a.xlsx")).unwrap(), FileFormat::Excel);
        assert!(FileFormat::from_path(Path::new("a.json")).is_err());
    }

    #[test]
    fn leading_blank_rows_are_skipped() {
        let text = ",,\n\u{feff}MRN , Note Date,Text\n123,2019-01-02, hello \n,,\n";
        let table = read_delimited_from(text.as_bytes(), b',').unwrap();
        assert_eq!(table.headers, vec!["MRN", "Note Date", "Text"]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "Text"), "hello");
    }

    #[test]
    fn latin1_text_is_decoded() {
        assert_eq!(decode_text(b"caf\xe9".to_vec()), "café");
        assert_eq!(decode_text("café".as_bytes().to_vec()), "café");
    }

    #[test]
    fn ragged_rows_are_padded() {
        let table = read_delimited_from("a\tb\tc\n1\t2\n".as_bytes(), b'\t').unwrap();
        assert_eq!(table.rows[0], vec!["1", "2", ""]);
    }

    #[test]
    fn sibling_paths() {
        assert_eq!(
            sibling_path(Path::new("/data/referrals.xlsx"), "_redcap_import", "csv"),
            PathBuf::from("/data/referrals_redcap_import.csv")
        );
    }

    #[test]
    fn renders_tsv() {
        let mut table = Table::new(vec!["SubjectID".into(), "note".into()]);
        table.push_row(vec!["7".into(), "a,b".into()]);
        assert_eq!(table_to_string(&table, b'\t').unwrap(), "SubjectID\tnote\n7\ta,b\n");
    }
}
