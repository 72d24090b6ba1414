//! Decoding of REDCap response bodies.

use ndd_model::Table;
use serde_json::Value;

use crate::error::{RedcapError, Result};

/// Body text as UTF-8, or as Latin-1 when it is not valid UTF-8.
///
/// Older projects hold free text pasted from Windows applications.
pub fn decode_body(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            tracing::debug!(len = bytes.len(), "response is not UTF-8, decoding as Latin-1");
            bytes.iter().map(|&b| char::from(b)).collect()
        }
    }
}

/// Parse a CSV export with a header row. An empty body gives an empty table.
pub fn parse_csv(text: &str) -> Result<Table> {
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return Ok(Table::default());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut table = Table::new(headers);
    for row in reader.records() {
        let row = row?;
        table.push_row(row.iter().map(str::to_string).collect());
    }
    Ok(table)
}

/// Number of records REDCap reports as imported: `{"count": N}`.
pub fn parse_count(text: &str) -> Result<usize> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|_| RedcapError::UnexpectedResponse(text.to_string()))?;
    let count = match value.get("count") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    count
        .and_then(|c| usize::try_from(c).ok())
        .ok_or_else(|| RedcapError::UnexpectedResponse(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through() {
        assert_eq!(decode_body("José".as_bytes()), "José");
    }

    #[test]
    fn latin1_fallback() {
        assert_eq!(decode_body(&[b'J', b'o', b's', 0xE9]), "José");
    }

    #[test]
    fn csv_with_quoted_newlines() {
        let body = "redcap_id,notes\n1,\"line one\nline two\"\n2,plain\n";
        let table = parse_csv(body).unwrap();
        assert_eq!(table.headers, vec!["redcap_id", "notes"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "notes"), "line one\nline two");
        assert_eq!(table.cell(1, "redcap_id"), "2");
    }

    #[test]
    fn header_only_csv_is_empty() {
        let table = parse_csv("redcap_id,fnum\n").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.headers.len(), 2);
        assert!(parse_csv("\n").unwrap().headers.is_empty());
    }

    #[test]
    fn count_responses() {
        assert_eq!(parse_count(r#"{"count": 3}"#).unwrap(), 3);
        assert_eq!(parse_count(r#"{"count":"12"}"#).unwrap(), 12);
        assert!(parse_count(r#"{"error":"bad token"}"#).is_err());
        assert!(parse_count("oops").is_err());
    }
}
