//! Sequential identifier allocation.
//!
//! Every allocator takes the identifiers already in use and returns the
//! next one. Nothing here reserves the value, so two callers working from
//! the same snapshot will hand out the same identifier.

use chrono::{Datelike, NaiveDate};
use ndd_model::{FNumber, IndividualNumber, Relation};
use tracing::debug;

use crate::dates::coerce_date;
use crate::error::{CoreError, Result};

/// Next data-collection record id: highest integer id plus one, or 1.
///
/// Values that are not integers are ignored.
pub fn next_data_collection_id<'a, I>(existing: I) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    existing
        .into_iter()
        .filter_map(|id| id.trim().parse::<u64>().ok())
        .max()
        .map_or(1, |max| max + 1)
}

/// Year an F-number belongs to: the appointment date's year, or today's
/// when the appointment is empty or unparseable.
pub fn f_number_year(appointment: &str, today: NaiveDate) -> i32 {
    match coerce_date(appointment) {
        Some(date) => date.year(),
        None => {
            if !appointment.trim().is_empty() {
                debug!(appointment, "unparseable appointment date, using today");
            }
            today.year()
        }
    }
}

/// Next F-number for `year`, continuing the highest sequence already
/// issued for that year. Malformed F-numbers are ignored.
pub fn next_f_number_for_year<'a, I>(year: i32, existing: I) -> Result<FNumber>
where
    I: IntoIterator<Item = &'a str>,
{
    let target = FNumber::new(year, 0).year();
    let max = existing
        .into_iter()
        .filter_map(|raw| raw.parse::<FNumber>().ok())
        .filter(|fnum| fnum.year() == target)
        .map(|fnum| fnum.sequence())
        .max()
        .unwrap_or(0);
    let sequence = max + 1;
    if sequence > FNumber::MAX_SEQUENCE {
        return Err(CoreError::FNumberExhausted { year: target });
    }
    Ok(FNumber::new(year, sequence))
}

/// Next F-number for a family whose first appointment is `appointment`.
pub fn next_f_number<'a, I>(appointment: &str, today: NaiveDate, existing: I) -> Result<FNumber>
where
    I: IntoIterator<Item = &'a str>,
{
    next_f_number_for_year(f_number_year(appointment, today), existing)
}

/// Individual number for a new family member.
///
/// Proband, parents and non-biological parents get their reserved number.
/// Everyone else gets one more than the highest sequential number in the
/// family, never below [`IndividualNumber::FIRST_UNRESERVED`]. A family
/// with no sequential numbers yet (88/99 do not count) starts at
/// [`IndividualNumber::PROBAND`].
pub fn next_individual_number<'a, I>(relation: &Relation, existing: I) -> IndividualNumber
where
    I: IntoIterator<Item = &'a str>,
{
    if let Some(reserved) = relation.reserved_number() {
        return reserved;
    }
    let Some(max) = existing
        .into_iter()
        .filter_map(|raw| raw.parse::<IndividualNumber>().ok())
        .filter(|num| !num.is_non_biological_parent())
        .map(IndividualNumber::value)
        .max()
    else {
        return IndividualNumber::PROBAND;
    };
    let mut next = IndividualNumber::new((max + 1).max(IndividualNumber::FIRST_UNRESERVED.value()));
    // Sequential numbers run past 87 and 98 without landing on 88/99.
    while next.is_reserved() {
        next = IndividualNumber::new(next.value() + 1);
    }
    next
}

/// Next repeat instance after those already stored for one key.
pub fn next_repeat_instance<'a, I>(existing: I) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    existing
        .into_iter()
        .filter_map(|raw| {
            let trimmed = raw.trim();
            trimmed.strip_suffix(".0").unwrap_or(trimmed).parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0)
        + 1
}

/// Hands out warehouse subject ids in order within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectIdSequence {
    next: u64,
}

impl SubjectIdSequence {
    /// Start from the warehouse's reported next id (`None` when it had none).
    pub fn new(first: Option<u64>) -> Self {
        Self {
            next: first.unwrap_or(0),
        }
    }

    pub fn allocate(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn peek(&self) -> u64 {
        self.next
    }
}
