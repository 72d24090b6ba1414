//! Translation between stored REDCap codes and human-readable labels.
//!
//! The export direction turns codes into labels for the warehouse. The
//! import direction turns spreadsheet labels back into codes, reporting
//! whatever it could not map instead of failing.

use std::collections::BTreeMap;

use regex::Regex;

use crate::choices::ChoiceMap;
use crate::error::{CoreError, Result};

/// Separator between labels of a multi-valued checkbox.
pub const CHECKBOX_SEPARATOR: &str = ";";

/// Label for a dropdown or radio code. Unknown codes pass through unchanged.
pub fn decode_choice<'a>(choices: &'a ChoiceMap, value: &'a str) -> &'a str {
    choices.label(value).unwrap_or(value)
}

/// Label for a yes/no value. Empty and unmapped values decode to empty.
pub fn decode_yes_no<'a>(yes_no: &'a BTreeMap<String, String>, value: &str) -> &'a str {
    yes_no.get(value.trim()).map_or("", String::as_str)
}

/// Export columns backing one checkbox field, one per choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckboxColumns {
    columns: Vec<(String, String)>,
}

impl CheckboxColumns {
    /// Find the `field___code` export column of every choice.
    ///
    /// Each code must match exactly one column.
    pub fn locate(field: &str, choices: &ChoiceMap, headers: &[&str]) -> Result<Self> {
        let mut columns = Vec::with_capacity(choices.len());
        for (code, label) in choices.iter() {
            let pattern = format!(
                "^{}_*{}$",
                regex::escape(field),
                regex::escape(&code.to_lowercase())
            );
            let matcher = Regex::new(&pattern).map_err(|_| CoreError::MissingCheckboxColumn {
                field: field.to_string(),
                code: code.to_string(),
                found: 0,
            })?;
            let mut found = headers.iter().filter(|h| matcher.is_match(h));
            match (found.next(), found.next()) {
                (Some(column), None) => columns.push(((*column).to_string(), label.to_string())),
                (first, second) => {
                    let count = usize::from(first.is_some())
                        + usize::from(second.is_some())
                        + found.count();
                    return Err(CoreError::MissingCheckboxColumn {
                        field: field.to_string(),
                        code: code.to_string(),
                        found: count,
                    });
                }
            }
        }
        Ok(Self { columns })
    }

    /// Column names in choice order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(c, _)| c.as_str())
    }

    /// Labels of the checked columns joined with `;`.
    ///
    /// `value_of` looks a column up in the row being decoded.
    pub fn decode<'a, F>(&self, value_of: F) -> String
    where
        F: Fn(&str) -> &'a str,
    {
        let checked: Vec<&str> = self
            .columns
            .iter()
            .filter(|(column, _)| value_of(column).trim() == "1")
            .map(|(_, label)| label.as_str())
            .collect();
        checked.join(CHECKBOX_SEPARATOR)
    }
}

/// Code for a dropdown or radio label.
pub fn encode_choice<'a>(choices: &'a ChoiceMap, label: &str) -> Option<&'a str> {
    choices.code(label.trim())
}

/// Code for a free-form yes/no answer. Empty input encodes to empty.
pub fn encode_yes_no(value: &str) -> Option<&'static str> {
    match value.trim().to_lowercase().as_str() {
        "" => Some(""),
        "t" | "true" | "y" | "yes" | "1" => Some("1"),
        "f" | "false" | "n" | "no" | "0" => Some("0"),
        _ => None,
    }
}

/// A `;`-separated label list expanded to `field___code` 0/1 columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedCheckbox {
    /// One entry per choice, in choice order.
    pub columns: Vec<(String, &'static str)>,
    /// Labels with no matching choice.
    pub unmapped: Vec<String>,
}

pub fn checkbox_column_name(field: &str, code: &str) -> String {
    format!("{field}___{}", code.to_lowercase())
}

pub fn expand_checkbox(field: &str, choices: &ChoiceMap, value: &str) -> ExpandedCheckbox {
    let mut selected = Vec::new();
    let mut unmapped = Vec::new();
    for label in value
        .split(CHECKBOX_SEPARATOR)
        .map(str::trim)
        .filter(|l| !l.is_empty())
    {
        match choices.code(label) {
            Some(code) => selected.push(code),
            None => unmapped.push(label.to_string()),
        }
    }
    let columns = choices
        .codes()
        .map(|code| {
            let flag = if selected.contains(&code) { "1" } else { "0" };
            (checkbox_column_name(field, code), flag)
        })
        .collect();
    ExpandedCheckbox { columns, unmapped }
}

#[cfg(test)]
mod tests {
    use ndd_model::Record;

    use super::*;

    fn yes_no() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("1".to_string(), "Yes".to_string()),
            ("0".to_string(), "No".to_string()),
        ])
    }

    #[test]
    fn choices_decode_or_pass_through() {
        let map = ChoiceMap::parse("1, Male | 2, Female");
        assert_eq!(decode_choice(&map, "2"), "Female");
        assert_eq!(decode_choice(&map, "7"), "7");
        assert_eq!(decode_choice(&map, ""), "");
    }

    #[test]
    fn yes_no_decoding() {
        let map = yes_no();
        assert_eq!(decode_yes_no(&map, "1"), "Yes");
        assert_eq!(decode_yes_no(&map, "0"), "No");
        assert_eq!(decode_yes_no(&map, ""), "");
    }

    #[test]
    fn checkbox_columns_join_checked_labels() {
        let map = ChoiceMap::parse("1, Focal | 2, Generalized | 10, Unknown");
        let record = Record::from_pairs([
            ("redcap_id", "5"),
            ("sztype___1", "1"),
            ("sztype___2", "0"),
            ("sztype___10", "1"),
        ]);
        let headers: Vec<&str> = record.fields().collect();
        let columns = CheckboxColumns::locate("sztype", &map, &headers).unwrap();
        assert_eq!(
            columns.names().collect::<Vec<_>>(),
            vec!["sztype___1", "sztype___2", "sztype___10"]
        );
        assert_eq!(columns.decode(|c| record.get(c)), "Focal;Unknown");
    }

    #[test]
    fn text_codes_match_lowercased_columns() {
        let map = ChoiceMap::parse("MSH, Mount Sinai | NYU, NYU Langone");
        let headers = ["site___msh", "site___nyu"];
        let columns = CheckboxColumns::locate("site", &map, &headers).unwrap();
        assert_eq!(columns.decode(|c| if c == "site___nyu" { "1" } else { "" }), "NYU Langone");
    }

    #[test]
    fn missing_checkbox_column_is_fatal() {
        let map = ChoiceMap::parse("1, Focal | 2, Generalized");
        let err = CheckboxColumns::locate("sztype", &map, &["sztype___1"]).unwrap_err();
        assert_eq!(
            err,
            CoreError::MissingCheckboxColumn {
                field: "sztype".to_string(),
                code: "2".to_string(),
                found: 0
            }
        );
    }

    #[test]
    fn ambiguous_checkbox_column_is_fatal() {
        let map = ChoiceMap::parse("1, Focal");
        let err = CheckboxColumns::locate("sztype", &map, &["sztype___1", "sztype_1"]).unwrap_err();
        assert!(matches!(err, CoreError::MissingCheckboxColumn { found: 2, .. }));
    }

    #[test]
    fn yes_no_encoding() {
        assert_eq!(encode_yes_no("TRUE"), Some("1"));
        assert_eq!(encode_yes_no(" y "), Some("1"));
        assert_eq!(encode_yes_no("No"), Some("0"));
        assert_eq!(encode_yes_no(""), Some(""));
        assert_eq!(encode_yes_no("maybe"), None);
    }

    #[test]
    fn checkbox_labels_expand_to_flags() {
        let map = ChoiceMap::parse("1, Focal | 2, Generalized | 3, Absence");
        let expanded = expand_checkbox("sztype", &map, "Absence; Focal;Tonic");
        assert_eq!(
            expanded.columns,
            vec![
                ("sztype___1".to_string(), "1"),
                ("sztype___2".to_string(), "0"),
                ("sztype___3".to_string(), "1"),
            ]
        );
        assert_eq!(expanded.unmapped, vec!["Tonic".to_string()]);
    }

    #[test]
    fn labels_encode_to_codes() {
        let map = ChoiceMap::parse("1, Male | 2, Female");
        assert_eq!(encode_choice(&map, " Female "), Some("2"));
        assert_eq!(encode_choice(&map, "Other"), None);
    }
}
