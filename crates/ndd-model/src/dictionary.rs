use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::record::Record;

/// REDCap field types as they appear in the data dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Notes,
    Dropdown,
    Radio,
    Checkbox,
    YesNo,
    TrueFalse,
    Calc,
    Descriptive,
    File,
    Slider,
    Sql,
    Other(String),
}

impl FieldType {
    /// Field types whose stored values are codes from a choice list.
    pub fn has_choices(&self) -> bool {
        matches!(self, Self::Dropdown | Self::Radio | Self::Checkbox)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Notes => "notes",
            Self::Dropdown => "dropdown",
            Self::Radio => "radio",
            Self::Checkbox => "checkbox",
            Self::YesNo => "yesno",
            Self::TrueFalse => "truefalse",
            Self::Calc => "calc",
            Self::Descriptive => "descriptive",
            Self::File => "file",
            Self::Slider => "slider",
            Self::Sql => "sql",
            Self::Other(name) => name,
        }
    }
}

impl FromStr for FieldType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "text" => Self::Text,
            "notes" => Self::Notes,
            "dropdown" => Self::Dropdown,
            "radio" => Self::Radio,
            "checkbox" => Self::Checkbox,
            "yesno" => Self::YesNo,
            "truefalse" => Self::TrueFalse,
            "calc" => Self::Calc,
            "descriptive" => Self::Descriptive,
            "file" => Self::File,
            "slider" => Self::Slider,
            "sql" => Self::Sql,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a project's data dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub field_name: String,
    pub form_name: String,
    pub field_type: FieldType,
    pub field_label: String,
    /// Raw `select_choices_or_calculations` text.
    pub choices: String,
    pub validation: String,
    pub identifier: bool,
}

// API metadata export columns first, data dictionary download columns second.
const COL_FIELD_NAME: &[&str] = &["field_name", "Variable / Field Name"];
const COL_FORM_NAME: &[&str] = &["form_name", "Form Name"];
const COL_FIELD_TYPE: &[&str] = &["field_type", "Field Type"];
const COL_FIELD_LABEL: &[&str] = &["field_label", "Field Label"];
const COL_CHOICES: &[&str] = &[
    "select_choices_or_calculations",
    "Choices, Calculations, OR Slider Labels",
];
const COL_VALIDATION: &[&str] = &[
    "text_validation_type_or_show_slider_number",
    "Text Validation Type OR Show Slider Number",
];
const COL_IDENTIFIER: &[&str] = &["identifier", "Identifier?"];

fn first_of<'a>(record: &'a Record, names: &[&str]) -> &'a str {
    names
        .iter()
        .find(|name| record.contains(name))
        .map(|name| record.get(name))
        .unwrap_or("")
}

impl FieldMeta {
    /// Build from a metadata row using either the API or the download column names.
    pub fn from_record(record: &Record) -> Self {
        Self {
            field_name: first_of(record, COL_FIELD_NAME).trim().to_string(),
            form_name: first_of(record, COL_FORM_NAME).trim().to_string(),
            field_type: first_of(record, COL_FIELD_TYPE)
                .parse()
                .unwrap_or(FieldType::Text),
            field_label: first_of(record, COL_FIELD_LABEL).to_string(),
            choices: first_of(record, COL_CHOICES).to_string(),
            validation: first_of(record, COL_VALIDATION).trim().to_string(),
            identifier: first_of(record, COL_IDENTIFIER).trim().eq_ignore_ascii_case("y"),
        }
    }
}

/// A project's data dictionary, indexed by field name in dictionary order.
#[derive(Debug, Clone, Default)]
pub struct DataDictionary {
    fields: Vec<FieldMeta>,
    index: BTreeMap<String, usize>,
}

impl DataDictionary {
    /// Build a dictionary, rejecting duplicate field names.
    pub fn new(fields: Vec<FieldMeta>) -> Result<Self> {
        let mut index = BTreeMap::new();
        for (idx, field) in fields.iter().enumerate() {
            if index.insert(field.field_name.clone(), idx).is_some() {
                return Err(ModelError::DuplicateField(field.field_name.clone()));
            }
        }
        Ok(Self { fields, index })
    }

    pub fn from_records(records: &[Record]) -> Result<Self> {
        Self::new(records.iter().map(FieldMeta::from_record).collect())
    }

    pub fn get(&self, field_name: &str) -> Option<&FieldMeta> {
        self.index.get(field_name).map(|&idx| &self.fields[idx])
    }

    pub fn contains(&self, field_name: &str) -> bool {
        self.index.contains_key(field_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.field_name.as_str())
    }

    /// Distinct form names in dictionary order.
    pub fn form_names(&self) -> Vec<&str> {
        let mut forms: Vec<&str> = Vec::new();
        for field in &self.fields {
            if !forms.contains(&field.form_name.as_str()) {
                forms.push(&field.form_name);
            }
        }
        forms
    }

    /// Rename a field in place (e.g. the referral project's `redcap_id`).
    pub fn rename_field(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.index.remove(from) {
            self.fields[idx].field_name = to.to_string();
            self.index.insert(to.to_string(), idx);
        }
    }

    /// Keep only the fields of the given form.
    #[must_use]
    pub fn restricted_to_form(&self, form: &str) -> Self {
        let fields: Vec<FieldMeta> = self
            .fields
            .iter()
            .filter(|f| f.form_name == form)
            .cloned()
            .collect();
        let index = fields
            .iter()
            .enumerate()
            .map(|(idx, f)| (f.field_name.clone(), idx))
            .collect();
        Self { fields, index }
    }
}
