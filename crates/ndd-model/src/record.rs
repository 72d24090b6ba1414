use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// REDCap system field names.
pub mod fields {
    pub const RECORD_ID: &str = "redcap_id";
    pub const EVENT_NAME: &str = "redcap_event_name";
    pub const REPEAT_INSTANCE: &str = "redcap_repeat_instance";
    pub const REPEAT_INSTRUMENT: &str = "redcap_repeat_instrument";
}

/// Event names of the data-collection project arms.
pub mod events {
    /// One row per family.
    pub const FAMILY: &str = "family_data_arm_1";
    /// One repeating row per family member.
    pub const MEMBER: &str = "family_member_arm_1";
    /// Repeating longitudinal clinical instruments.
    pub const CLINICAL: &str = "clinical_data_coll_arm_1";
}

/// A single flat REDCap row.
///
/// Absent fields read as the empty string, which is also how REDCap
/// exports blank values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(field, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> &str {
        self.values.get(field).map(String::as_str).unwrap_or("")
    }

    /// Returns the value only when the field is present and non-blank.
    pub fn non_empty(&self, field: &str) -> Option<&str> {
        let value = self.get(field);
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.values.insert(field.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.values.remove(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy every field of `other` into this record, overwriting on conflict.
    pub fn merge(&mut self, other: &Record) {
        for (field, value) in other.iter() {
            self.set(field, value);
        }
    }

    pub fn record_id(&self) -> &str {
        self.get(fields::RECORD_ID)
    }

    pub fn event(&self) -> &str {
        self.get(fields::EVENT_NAME)
    }

    pub fn repeat_instance(&self) -> &str {
        self.get(fields::REPEAT_INSTANCE)
    }

    pub fn repeat_instrument(&self) -> &str {
        self.get(fields::REPEAT_INSTRUMENT)
    }

    /// True when every field except `ignore` is blank.
    pub fn is_blank_except(&self, ignore: &[&str]) -> bool {
        self.values
            .iter()
            .filter(|(field, _)| !ignore.contains(&field.as_str()))
            .all(|(_, value)| value.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

/// Rows belonging to the given event.
pub fn by_event<'a>(records: &'a [Record], event: &'a str) -> impl Iterator<Item = &'a Record> {
    records.iter().filter(move |r| r.event() == event)
}

/// First row whose `field` equals `value`.
pub fn find_by<'a>(records: &'a [Record], field: &str, value: &str) -> Option<&'a Record> {
    records.iter().find(|r| r.get(field) == value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_read_empty() {
        let record = Record::new().with("redcap_id", "12");
        assert_eq!(record.record_id(), "12");
        assert_eq!(record.get("fnum"), "");
        assert!(record.non_empty("fnum").is_none());
    }

    #[test]
    fn blank_except_ignores_listed_fields() {
        let record = Record::from_pairs([
            ("demographics_complete", "2"),
            ("redcap_repeat_instance", "1"),
            ("demo_sex", ""),
        ]);
        assert!(record.is_blank_except(&["demographics_complete", "redcap_repeat_instance"]));
        let record = record.with("demo_sex", "Male");
        assert!(!record.is_blank_except(&["demographics_complete", "redcap_repeat_instance"]));
    }

    #[test]
    fn serializes_as_flat_object() {
        let record = Record::new().with("redcap_id", "3").with("fnum", "F190001");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"fnum":"F190001","redcap_id":"3"}"#);
    }

    #[test]
    fn event_filter() {
        let rows = vec![
            Record::new().with("redcap_event_name", events::FAMILY),
            Record::new().with("redcap_event_name", events::MEMBER),
            Record::new().with("redcap_event_name", events::MEMBER),
        ];
        assert_eq!(by_event(&rows, events::MEMBER).count(), 2);
    }
}
