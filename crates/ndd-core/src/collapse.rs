//! Collapse of several mutually-exclusive checkbox/dropdown fields in one
//! project onto a single field in another project.
//!
//! The referral project asks for the referring physician with one field per
//! hospital (`sinaiprovider`, `nyuprovider`, ...) while the data-collection
//! project has a single `physician` field. The two projects number their
//! choices independently, so values are carried across by label.

use ndd_model::{DataDictionary, Record};

use crate::choices::ChoiceMap;
use crate::error::{CoreError, Result};

/// A populated-or-empty source value together with its field's choices.
#[derive(Debug, Clone, Copy)]
pub struct CollapseSource<'a> {
    pub field: &'a str,
    pub value: &'a str,
    pub choices: &'a ChoiceMap,
}

/// Translate the first non-empty source value into the target's code.
///
/// Returns an empty string when every source is empty. Later populated
/// sources are ignored.
pub fn collapse_values(
    sources: &[CollapseSource<'_>],
    target_field: &str,
    target: &ChoiceMap,
) -> Result<String> {
    let Some(source) = sources.iter().find(|s| !s.value.is_empty()) else {
        return Ok(String::new());
    };
    let label = source
        .choices
        .label(source.value)
        .ok_or_else(|| CoreError::UnknownCode {
            field: source.field.to_string(),
            code: source.value.to_string(),
        })?;
    target
        .code(label)
        .map(str::to_string)
        .ok_or_else(|| CoreError::UnknownLabel {
            field: target_field.to_string(),
            label: label.to_string(),
        })
}

/// Dictionary-driven form of [`collapse_values`] for a single record.
pub fn collapse_checkbox(
    record: &Record,
    sources: &[&str],
    target: &str,
    source_dictionary: &DataDictionary,
    target_dictionary: &DataDictionary,
) -> Result<String> {
    let Some(field) = sources.iter().find(|f| !record.get(f).is_empty()) else {
        return Ok(String::new());
    };
    let source_meta = source_dictionary
        .get(field)
        .ok_or_else(|| CoreError::UnknownField((*field).to_string()))?;
    let target_meta = target_dictionary
        .get(target)
        .ok_or_else(|| CoreError::UnknownField(target.to_string()))?;
    let source_choices = ChoiceMap::parse(&source_meta.choices);
    let target_choices = ChoiceMap::parse(&target_meta.choices);
    collapse_values(
        &[CollapseSource {
            field: *field,
            value: record.get(field),
            choices: &source_choices,
        }],
        target,
        &target_choices,
    )
}
