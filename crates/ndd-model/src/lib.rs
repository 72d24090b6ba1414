//! Shared types for the NDD REDCap/LabKey pipeline.
//!
//! Records and tables are string-valued: REDCap exports every value as
//! text, and LabKey imports TSV, so nothing is typed until it has to be.

pub mod config;
pub mod dictionary;
pub mod error;
pub mod ids;
pub mod record;
pub mod table;

pub use config::{
    EtlConfig, FieldMaps, InstrumentConfig, LabkeyConfig, LabkeyTableConfig, NddConfig,
    OtherFieldConfig, RedcapConfig, ServerConfig, load_config,
};
pub use dictionary::{DataDictionary, FieldMeta, FieldType};
pub use error::{ModelError, Result};
pub use ids::{FNumber, IndividualNumber, Relation};
pub use record::{Record, by_event, events, fields, find_by};
pub use table::Table;
