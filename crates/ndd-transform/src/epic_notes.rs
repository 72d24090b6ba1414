//! Epic epilepsy follow-up notes → REDCap `epifu` instances.
//!
//! The EDW report has one row per note line. Lines are joined back into
//! notes, the smart-phrase sections of each note are pulled into their
//! own fields, and each note is matched to a data-collection member by
//! MRN. A note already in REDCap (same record, date and provider) keeps
//! its repeat instance; new notes get the next free ones.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use ndd_core::coerce_date;
use ndd_ingest::{read_table, write_table};
use ndd_model::{Record, Table, events, fields};
use ndd_redcap::{RecordQuery, RedcapApi};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Result, TransformError};

pub const INSTRUMENT: &str = "epifu";

/// Forms exported to match MRNs and find existing notes.
pub const EXPORT_FORMS: &[&str] = &["family_enrollment", "demographics", "enrollment", INSTRUMENT];

const COL_MRN: &str = "Y_MRN";
const COL_TIMESTAMP: &str = "LOG_TIMESTAMP";
const COL_PROVIDER: &str = "Employee Name";
const COL_DEPARTMENT: &str = "DEPARTMENT_NAME";
const COL_LINE: &str = "LINE";
const COL_TEXT: &str = "NOTE_TEXT";

pub const FIELD_SUBJECT: &str = "epifu_subj";
pub const FIELD_NOTE_DATE: &str = "epifu_notedate";
pub const FIELD_PROVIDER: &str = "epifu_provider";
pub const FIELD_DEPARTMENT: &str = "epifu_dept";
pub const FIELD_FULL_NOTE: &str = "epifu_fullnote";
pub const FIELD_SYNC_DATE: &str = "epifu_syncdate";

const MEMBER_MRN: &str = "demo_mrn";

/// Smart-phrase headings in the order they appear in the template, with the
/// field each one fills. Every heading ends the section before it.
const SECTIONS: &[(&str, Option<&str>)] = &[
    ("Interval History", Some("epifu_inthist")),
    ("Medications", Some("epifu_meds")),
    ("Magnet", Some("epifu_magnet")),
    ("Long episodes", Some("epifu_longeps")),
    ("Detection", Some("epifu_detect")),
    ("Stimulation", Some("epifu_stim")),
    ("Number of seizures per month", Some("epifu_nseizmo")),
    ("Number of Events since last visit", Some("epifu_neventsincelast")),
    ("Seizure Risk factors", Some("epifu_seizriskfact")),
    ("Medical Record Review", Some("epifu_mrrev")),
    ("Previous Imaging", Some("epifu_previmg")),
    ("Laboratory Data", Some("epifu_labdata")),
    ("School/Home issues", Some("epifu_schhomissue")),
    ("Past Medical History", Some("epifu_pastmedhx")),
    ("Past Medical History Diagnosis", None),
    ("Last recorded seizure", Some("epifu_lastrecseiz")),
    ("Semiology", Some("epifu_semiol")),
    ("Change in Semiology", Some("epifu_semiolchange")),
    ("Etiology", Some("epifu_etiol")),
    ("Associated Disorders", Some("epifu_assocdis")),
];

static SECTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let mut headings: Vec<&str> = SECTIONS.iter().map(|(heading, _)| *heading).collect();
    headings.sort_by_key(|h| std::cmp::Reverse(h.len()));
    let alternation = headings
        .iter()
        .map(|h| regex::escape(h))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("({alternation}):")).expect("Invalid section regex")
});

/// Section fields in template order.
pub fn section_fields() -> impl Iterator<Item = &'static str> {
    SECTIONS.iter().filter_map(|(_, field)| *field)
}

/// One note reassembled from its report lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpicNote {
    pub mrn: String,
    pub timestamp: String,
    pub provider: String,
    pub department: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct NotesImport {
    pub records: Vec<Record>,
    /// Notes whose MRN matched no member.
    pub unmatched: usize,
    /// Notes that reuse an instance already in REDCap.
    pub updated: usize,
}

#[derive(Debug, Clone)]
pub struct NotesOutcome {
    pub output: PathBuf,
    pub notes: usize,
    pub unmatched: usize,
    pub updated: usize,
    /// Count REDCap reported, `None` when nothing was pushed.
    pub imported: Option<usize>,
}

/// Drop line breaks and turn non-breaking spaces into plain ones.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .map(|c| if c == '\u{a0}' { ' ' } else { c })
        .collect()
}

/// Text of each smart-phrase section, keyed by field.
///
/// A section runs from its heading to the next heading of any kind. When a
/// heading repeats, the first occurrence wins.
pub fn extract_sections(text: &str) -> BTreeMap<&'static str, String> {
    let headings: Vec<_> = SECTION_PATTERN.captures_iter(text).collect();
    let mut sections = BTreeMap::new();
    for (idx, captures) in headings.iter().enumerate() {
        let (Some(whole), Some(heading)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let Some(field) = SECTIONS
            .iter()
            .find(|(h, _)| *h == heading.as_str())
            .and_then(|(_, field)| *field)
        else {
            continue;
        };
        let end = headings
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        sections
            .entry(field)
            .or_insert_with(|| text[whole.end()..end].trim().to_string());
    }
    sections
}

fn require_column(table: &Table, path: &Path, column: &str) -> Result<()> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(TransformError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })
    }
}

fn line_number(raw: &str) -> f64 {
    raw.trim().parse().unwrap_or(f64::MAX)
}

/// Join report lines into notes, ordered by MRN, timestamp and line.
pub fn concatenate_notes(table: &Table) -> Vec<EpicNote> {
    let mut order: Vec<usize> = (0..table.len()).collect();
    order.sort_by(|&a, &b| {
        (table.cell(a, COL_MRN), table.cell(a, COL_TIMESTAMP))
            .cmp(&(table.cell(b, COL_MRN), table.cell(b, COL_TIMESTAMP)))
            .then_with(|| {
                line_number(table.cell(a, COL_LINE)).total_cmp(&line_number(table.cell(b, COL_LINE)))
            })
    });

    let mut notes: Vec<EpicNote> = Vec::new();
    let mut index: HashMap<(String, String, String, String), usize> = HashMap::new();
    for row in order {
        let key = (
            table.cell(row, COL_MRN).to_string(),
            table.cell(row, COL_TIMESTAMP).to_string(),
            table.cell(row, COL_PROVIDER).to_string(),
            table.cell(row, COL_DEPARTMENT).to_string(),
        );
        let text = table.cell(row, COL_TEXT);
        match index.get(&key) {
            Some(&idx) => notes[idx].text.push_str(text),
            None => {
                index.insert(key.clone(), notes.len());
                let (mrn, timestamp, provider, department) = key;
                notes.push(EpicNote {
                    mrn,
                    timestamp,
                    provider,
                    department,
                    text: text.to_string(),
                });
            }
        }
    }
    notes
}

/// Read an EDW note report and reassemble its notes.
pub fn read_notes(path: &Path) -> Result<Vec<EpicNote>> {
    let table = read_table(path)?;
    for column in [COL_MRN, COL_TIMESTAMP, COL_PROVIDER, COL_DEPARTMENT, COL_LINE, COL_TEXT] {
        require_column(&table, path, column)?;
    }
    let notes = concatenate_notes(&table);
    info!(path = %path.display(), lines = table.len(), notes = notes.len(), "Epic notes read");
    Ok(notes)
}

fn note_date(timestamp: &str) -> String {
    coerce_date(timestamp).map_or_else(
        || timestamp.trim().to_string(),
        |date| date.format("%Y-%m-%d").to_string(),
    )
}

fn instance_number(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    raw.strip_suffix(".0").unwrap_or(raw).parse().ok()
}

/// Build `epifu` rows for every note whose MRN matches a member.
///
/// `existing` is a data-collection export covering members and `epifu`
/// instances.
pub fn build_import(notes: &[EpicNote], existing: &[Record], today: NaiveDate) -> NotesImport {
    let mut members: HashMap<&str, (&str, &str)> = HashMap::new();
    for member in existing.iter().filter(|r| r.event() == events::MEMBER) {
        let Some(mrn) = member.non_empty(MEMBER_MRN) else {
            continue;
        };
        let mrn = mrn.trim();
        if members.contains_key(mrn) {
            warn!(record = member.record_id(), "MRN shared by more than one member, keeping the first");
            continue;
        }
        members.insert(mrn, (member.record_id(), member.repeat_instance()));
    }

    let mut known: HashMap<(&str, &str, &str), u32> = HashMap::new();
    let mut next_instance: HashMap<String, u32> = HashMap::new();
    for row in existing
        .iter()
        .filter(|r| r.event() == events::CLINICAL && r.repeat_instrument() == INSTRUMENT)
    {
        let Some(instance) = instance_number(row.repeat_instance()) else {
            continue;
        };
        known.insert(
            (row.record_id(), row.get(FIELD_NOTE_DATE), row.get(FIELD_PROVIDER)),
            instance,
        );
        let next = next_instance.entry(row.record_id().to_string()).or_insert(1);
        *next = (*next).max(instance + 1);
    }

    let sync_date = today.format("%Y-%m-%d").to_string();
    let mut import = NotesImport::default();
    for note in notes {
        let Some(&(record_id, subject)) = members.get(note.mrn.trim()) else {
            debug!(timestamp = %note.timestamp, "note MRN matches no member");
            import.unmatched += 1;
            continue;
        };
        let date = note_date(&note.timestamp);
        let provider = clean_text(&note.provider);
        let instance = match known.get(&(record_id, date.as_str(), provider.as_str())) {
            Some(&instance) => {
                import.updated += 1;
                instance
            }
            None => {
                let next = next_instance.entry(record_id.to_string()).or_insert(1);
                let instance = *next;
                *next += 1;
                instance
            }
        };

        let text = clean_text(&note.text);
        let mut record = Record::new()
            .with(fields::RECORD_ID, record_id)
            .with(fields::EVENT_NAME, events::CLINICAL)
            .with(fields::REPEAT_INSTRUMENT, INSTRUMENT)
            .with(fields::REPEAT_INSTANCE, instance.to_string())
            .with(FIELD_SUBJECT, subject)
            .with(FIELD_NOTE_DATE, date)
            .with(FIELD_PROVIDER, provider)
            .with(FIELD_DEPARTMENT, clean_text(&note.department))
            .with(FIELD_SYNC_DATE, sync_date.as_str());
        for field in section_fields() {
            record.set(field, "");
        }
        for (field, value) in extract_sections(&text) {
            record.set(field, value);
        }
        record.set(FIELD_FULL_NOTE, text);
        import.records.push(record);
    }
    import
}

/// Column order of the written import file.
pub fn import_columns() -> Vec<String> {
    [
        fields::RECORD_ID,
        fields::EVENT_NAME,
        fields::REPEAT_INSTRUMENT,
        fields::REPEAT_INSTANCE,
        FIELD_SUBJECT,
        FIELD_NOTE_DATE,
        FIELD_PROVIDER,
        FIELD_DEPARTMENT,
        FIELD_FULL_NOTE,
    ]
    .into_iter()
    .chain(section_fields())
    .chain([FIELD_SYNC_DATE])
    .map(str::to_string)
    .collect()
}

/// Read the report, write the import file to `output`, and push it unless
/// `push` is false.
pub fn run(
    report: &Path,
    api: &dyn RedcapApi,
    output: &Path,
    push: bool,
    today: NaiveDate,
) -> Result<NotesOutcome> {
    let notes = read_notes(report)?;
    let existing = api.export_rows(&RecordQuery::all().forms(EXPORT_FORMS.iter().copied()))?;
    let import = build_import(&notes, &existing, today);
    if import.unmatched > 0 {
        warn!(notes = import.unmatched, "notes dropped, MRN not found in data collection");
    }

    write_table(output, &Table::from_records(import_columns(), &import.records))?;
    info!(output = %output.display(), rows = import.records.len(), "epifu import file written");

    let imported = if push && !import.records.is_empty() {
        let count = api.import_records(&import.records)?;
        info!(count, "epifu notes imported");
        Some(count)
    } else {
        None
    };

    Ok(NotesOutcome {
        output: output.to_path_buf(),
        notes: import.records.len(),
        unmatched: import.unmatched,
        updated: import.updated,
        imported,
    })
}
