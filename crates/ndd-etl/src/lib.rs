//! Batch copy of REDCap referral and data-collection records into a LabKey
//! study archive.
//!
//! A run exports both projects, splits rows by event, decodes every
//! configured instrument, assigns missing warehouse subject ids, writes one
//! TSV per LabKey table and zips the archive for import.

pub mod archive;
pub mod error;
pub mod forms;
pub mod package;
pub mod pull;
pub mod split;
pub mod subjects;

use std::path::PathBuf;

use ndd_labkey::LabkeyApi;
use ndd_model::{EtlConfig, fields};
use ndd_redcap::RedcapApi;
use tracing::info;

pub use archive::{DatasetFile, write_tables};
pub use error::{EtlError, Result};
pub use forms::{FormTable, decode_forms};
pub use package::{package_archive, remove_old_tables};
pub use split::EventData;
pub use subjects::sync_subject_ids;

#[derive(Debug, Clone, Copy, Default)]
pub struct EtlOptions {
    /// Leave REDCap untouched; the archive is still written.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct EtlSummary {
    pub referrals: usize,
    pub families: usize,
    pub members: usize,
    pub clinical: usize,
    pub new_subject_ids: usize,
    pub tables: Vec<DatasetFile>,
    pub archive_zip: PathBuf,
}

/// Run the whole batch.
pub fn run(
    config: &EtlConfig,
    referral: &dyn RedcapApi,
    data_collection: &dyn RedcapApi,
    labkey: &dyn LabkeyApi,
    options: EtlOptions,
) -> Result<EtlSummary> {
    if config.archive_path.as_os_str().is_empty() {
        return Err(EtlError::NoArchivePath);
    }
    let archive = config.archive_path.as_path();

    let data_instruments: Vec<String> = config
        .instruments
        .keys()
        .filter(|name| !config.referral_instruments.contains(name))
        .cloned()
        .collect();
    let referral_rows = pull::pull_referrals(referral)?;
    let data_rows = pull::pull_data_collection(data_collection, &data_instruments, config.chunk_size)?;
    let mut data = EventData::split(referral_rows, data_rows);
    info!(
        referrals = data.referrals.len(),
        families = data.families.len(),
        members = data.members.len(),
        clinical = data.clinical.len(),
        "records split by event"
    );

    let mut referral_dictionary = referral.export_metadata(&config.referral_instruments)?;
    referral_dictionary.rename_field(fields::RECORD_ID, split::REFERRAL_ID);
    let data_dictionary = data_collection.export_metadata(&[])?;

    let new_subject_ids = sync_subject_ids(&mut data, labkey, data_collection, options.dry_run)?;
    let forms = decode_forms(config, &data, &[&referral_dictionary, &data_dictionary])?;

    let removed = remove_old_tables(archive)?;
    info!(removed, archive = %archive.display(), "previous tables cleared");
    let tables = write_tables(archive, &forms, config, &data)?;
    let archive_zip = package_archive(archive)?;

    Ok(EtlSummary {
        referrals: data.referrals.len(),
        families: data.families.len(),
        members: data.members.len(),
        clinical: data.clinical.len(),
        new_subject_ids,
        tables,
        archive_zip,
    })
}
