//! Small per-value helpers used while reshaping forms.

use regex::Regex;
use tracing::debug;

use crate::decode::CHECKBOX_SEPARATOR;

/// Join the non-empty values with `;`.
pub fn concat_fields<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .filter(|v| !v.trim().is_empty())
        .collect::<Vec<_>>()
        .join(CHECKBOX_SEPARATOR)
}

/// Fold the free-text explanation into the `Other` entry of a choice value.
///
/// `"Focal;Other"` with explanation `"tonic"` becomes `"Focal;Other:tonic"`.
/// Only whole `Other` entries are rewritten.
pub fn concat_other(data: &str, other: &str) -> String {
    let other = other.trim();
    if other.is_empty() {
        return data.to_string();
    }
    data.split(CHECKBOX_SEPARATOR)
        .map(|entry| {
            if entry.trim() == "Other" {
                format!("Other:{other}")
            } else {
                entry.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(CHECKBOX_SEPARATOR)
}

/// Digits of an F-number (`F190001` → `190001`). Empty and `None` stay empty.
pub fn f_number_digits(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "None" {
        return "";
    }
    trimmed.strip_prefix('F').unwrap_or(trimmed)
}

/// Repeat instance named by a piped dropdown value such as
/// `[family_member_arm_1][demo_firstname][3]`.
///
/// Empty values and `Unknown...` selections name nobody.
pub fn piped_instance(raw: &str, event: &str, field: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("Unknown") {
        return None;
    }
    let pattern = format!(
        r"\[{}\]\[{}\]\[([0-9]+)\]",
        regex::escape(event),
        regex::escape(field)
    );
    let instance = Regex::new(&pattern)
        .ok()?
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok());
    if instance.is_none() {
        debug!(event, field, "value does not reference a repeat instance");
    }
    instance
}

/// Key used to spot the same person entered twice: names lowercased,
/// then date of birth and sex as stored.
pub fn duplicate_key(first_name: &str, last_name: &str, dob: &str, sex: &str) -> String {
    format!(
        "{}{}{}{}",
        first_name.trim().to_lowercase(),
        last_name.trim().to_lowercase(),
        dob.trim(),
        sex.trim()
    )
}
