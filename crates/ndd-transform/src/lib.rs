//! One-off transforms that turn files from outside the pipeline into
//! REDCap imports or flat lookup tables.

pub mod epic_notes;
pub mod error;
pub mod icd10;
pub mod redcap_import;

pub use epic_notes::{EpicNote, NotesImport, NotesOutcome};
pub use error::{Result, TransformError};
pub use icd10::Diagnosis;
pub use redcap_import::{ImportOutcome, ImportReport, ImportTable, UnmappedValue};
