//! Per-instrument tables decoded from codes to labels.

use std::collections::{BTreeMap, BTreeSet};

use ndd_core::decode::{decode_choice, decode_yes_no};
use ndd_core::{CheckboxColumns, ChoiceMap};
use ndd_model::{DataDictionary, EtlConfig, FieldType, Record, fields};
use tracing::{debug, info};

use crate::error::{EtlError, Result};
use crate::split::EventData;

/// One instrument row, tied to the event row it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRow {
    /// Index into the event's rows.
    pub source: usize,
    pub values: Record,
}

/// An instrument's columns in output order.
#[derive(Debug, Clone)]
pub struct FormTable {
    pub instrument: String,
    pub event: String,
    pub headers: Vec<String>,
    pub rows: Vec<FormRow>,
}

pub fn complete_field(instrument: &str) -> String {
    format!("{instrument}_complete")
}

impl FormTable {
    /// One row per event row, holding the completion status and repeat instance.
    pub fn new(instrument: &str, event: &str, source_rows: &[Record]) -> Self {
        let complete = complete_field(instrument);
        let rows = source_rows
            .iter()
            .enumerate()
            .map(|(source, row)| FormRow {
                source,
                values: Record::new()
                    .with(complete.as_str(), row.get(&complete))
                    .with(fields::REPEAT_INSTANCE, row.repeat_instance()),
            })
            .collect();
        Self {
            instrument: instrument.to_string(),
            event: event.to_string(),
            headers: vec![complete, fields::REPEAT_INSTANCE.to_string()],
            rows,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    fn add_header(&mut self, name: &str) {
        if !self.has_column(name) {
            self.headers.push(name.to_string());
        }
    }

    /// Set a column from each row's current values.
    pub fn set_column<F>(&mut self, name: &str, mut value_of: F)
    where
        F: FnMut(&FormRow) -> String,
    {
        self.add_header(name);
        for row in &mut self.rows {
            let value = value_of(row);
            row.values.set(name, value);
        }
    }

    pub fn drop_column(&mut self, name: &str) {
        self.headers.retain(|h| h != name);
        for row in &mut self.rows {
            row.values.remove(name);
        }
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if !self.has_column(from) {
            return;
        }
        if self.has_column(to) {
            self.drop_column(to);
        }
        for header in &mut self.headers {
            if header == from {
                *header = to.to_string();
            }
        }
        for row in &mut self.rows {
            if let Some(value) = row.values.remove(from) {
                row.values.set(to, value);
            }
        }
    }

    pub fn retain_rows<F: FnMut(&FormRow) -> bool>(&mut self, keep: F) {
        self.rows.retain(keep);
    }
}

/// Every column present on any of `rows`, in first-seen order.
fn event_columns(rows: &[Record]) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    let mut columns = Vec::new();
    for column in rows.iter().flat_map(Record::fields) {
        if seen.insert(column) {
            columns.push(column);
        }
    }
    columns
}

/// Build and decode the table of every configured instrument.
///
/// Each dictionary is walked in order; a field lands in its form's table when
/// the form is configured, the field is not excluded, is not an identifier
/// (other than `redcap_id`), and the form's event carries it. A checkbox whose
/// export columns cannot be located stops the run.
pub fn decode_forms(
    config: &EtlConfig,
    data: &EventData,
    dictionaries: &[&DataDictionary],
) -> Result<BTreeMap<String, FormTable>> {
    let mut forms = BTreeMap::new();
    let mut columns_by_event: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (instrument, instrument_config) in &config.instruments {
        let event = instrument_config.event.as_str();
        let rows = data.rows(event).ok_or_else(|| EtlError::UnknownEvent {
            instrument: instrument.clone(),
            event: event.to_string(),
        })?;
        columns_by_event
            .entry(event)
            .or_insert_with(|| event_columns(rows));
        forms.insert(instrument.clone(), FormTable::new(instrument, event, rows));
    }

    for dictionary in dictionaries {
        for meta in dictionary.iter() {
            let field = meta.field_name.as_str();
            if config.dont_import.iter().any(|f| f == field) {
                continue;
            }
            let Some(form) = forms.get_mut(&meta.form_name) else {
                continue;
            };
            if meta.identifier && field != fields::RECORD_ID {
                continue;
            }
            let Some(rows) = data.rows(&form.event) else {
                continue;
            };
            let columns = columns_by_event
                .get(form.event.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let is_checkbox = meta.field_type == FieldType::Checkbox;
            if !is_checkbox && !columns.contains(&field) {
                continue;
            }

            match meta.field_type {
                FieldType::Checkbox => {
                    if meta.choices.trim().is_empty() || rows.is_empty() {
                        continue;
                    }
                    let choices = ChoiceMap::parse(&meta.choices);
                    let checkbox = CheckboxColumns::locate(field, &choices, columns)?;
                    form.set_column(field, |row| checkbox.decode(|column| rows[row.source].get(column)));
                }
                FieldType::Dropdown | FieldType::Radio if !meta.choices.trim().is_empty() => {
                    let choices = ChoiceMap::parse(&meta.choices);
                    form.set_column(field, |row| {
                        decode_choice(&choices, rows[row.source].get(field)).to_string()
                    });
                }
                FieldType::YesNo => {
                    form.set_column(field, |row| {
                        decode_yes_no(&config.yes_no, rows[row.source].get(field)).to_string()
                    });
                }
                _ => form.set_column(field, |row| rows[row.source].get(field).to_string()),
            }
        }
    }

    for form in forms.values() {
        debug!(instrument = %form.instrument, columns = form.headers.len(), rows = form.rows.len(), "instrument decoded");
    }
    info!(instruments = forms.len(), "instruments decoded");
    Ok(forms)
}

#[cfg(test)]
mod tests {
    use ndd_model::{FieldMeta, InstrumentConfig, events};

    use super::*;

    fn meta(name: &str, field_type: FieldType, choices: &str) -> FieldMeta {
        FieldMeta {
            field_name: name.to_string(),
            form_name: "demographics".to_string(),
            field_type,
            field_label: String::new(),
            choices: choices.to_string(),
            validation: String::new(),
            identifier: false,
        }
    }

    fn config() -> EtlConfig {
        let mut config = EtlConfig::default();
        config.instruments.insert(
            "demographics".to_string(),
            InstrumentConfig {
                event: events::MEMBER.to_string(),
                ..InstrumentConfig::default()
            },
        );
        config.dont_import.push("demo_firstname".to_string());
        config
    }

    fn member() -> Record {
        Record::new()
            .with("redcap_id", "7")
            .with("redcap_event_name", events::MEMBER)
            .with("redcap_repeat_instance", "2")
            .with("demographics_complete", "2")
            .with("demo_relation", "2")
            .with("demo_firstname", "Ann")
            .with("demo_sex", "2")
            .with("demo_race___1", "1")
            .with("demo_race___2", "0")
            .with("demo_race___99", "1")
            .with("demo_consent", "1")
    }

    #[test]
    fn fields_decode_by_type() {
        let dictionary = DataDictionary::new(vec![
            meta("redcap_id", FieldType::Text, ""),
            meta("demo_firstname", FieldType::Text, ""),
            meta("demo_relation", FieldType::Dropdown, "1, Proband | 2, Mother"),
            meta("demo_sex", FieldType::Radio, "1, Male | 2, Female"),
            meta("demo_race", FieldType::Checkbox, "1, White | 2, Asian | 99, Other"),
            meta("demo_consent", FieldType::YesNo, ""),
            meta("demo_missing", FieldType::Text, ""),
        ])
        .unwrap();
        let data = EventData::split(Vec::new(), vec![member()]);
        let forms = decode_forms(&config(), &data, &[&dictionary]).unwrap();
        let form = &forms["demographics"];
        assert_eq!(
            form.headers,
            vec![
                "demographics_complete",
                "redcap_repeat_instance",
                "redcap_id",
                "demo_relation",
                "demo_sex",
                "demo_race",
                "demo_consent",
            ]
        );
        let row = &form.rows[0].values;
        assert_eq!(row.get("demo_relation"), "Mother");
        assert_eq!(row.get("demo_sex"), "Female");
        assert_eq!(row.get("demo_race"), "White;Other");
        assert_eq!(row.get("demo_consent"), "Yes");
        assert_eq!(row.get("redcap_repeat_instance"), "2");
    }

    #[test]
    fn unlocatable_checkbox_is_fatal() {
        let dictionary = DataDictionary::new(vec![meta(
            "demo_lang",
            FieldType::Checkbox,
            "1, English | 2, Spanish",
        )])
        .unwrap();
        let data = EventData::split(Vec::new(), vec![member()]);
        let err = decode_forms(&config(), &data, &[&dictionary]).unwrap_err();
        assert!(matches!(err, EtlError::Decode(_)));
    }

    #[test]
    fn unknown_event_is_rejected() {
        let mut config = config();
        config.instruments.get_mut("demographics").unwrap().event = "arm_9".to_string();
        let err = decode_forms(&config, &EventData::default(), &[]).unwrap_err();
        assert!(matches!(err, EtlError::UnknownEvent { .. }));
    }

    #[test]
    fn rename_replaces_existing_column() {
        let mut form = FormTable::new("enrollment", events::MEMBER, &[member()]);
        form.set_column("a", |_| "1".to_string());
        form.set_column("b", |_| "2".to_string());
        form.rename_column("a", "b");
        assert_eq!(form.headers, vec!["enrollment_complete", "redcap_repeat_instance", "b"]);
        assert_eq!(form.rows[0].values.get("b"), "1");
    }
}
