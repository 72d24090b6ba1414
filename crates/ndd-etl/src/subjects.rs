//! Warehouse subject ids for family members that do not have one yet.

use ndd_core::SubjectIdSequence;
use ndd_labkey::{LabkeyApi, next_subject_id};
use ndd_model::{Record, fields};
use ndd_redcap::RedcapApi;
use tracing::info;

use crate::error::{EtlError, Result};
use crate::split::{EventData, SUBJECT_ID};

/// Give every member lacking a subject id the next one in sequence.
///
/// Returns the REDCap rows that store the new ids.
pub fn assign_subject_ids(members: &mut [Record], sequence: &mut SubjectIdSequence) -> Vec<Record> {
    let mut updates = Vec::new();
    for member in members.iter_mut() {
        if member.non_empty(SUBJECT_ID).is_some() {
            continue;
        }
        let id = sequence.allocate().to_string();
        member.set(SUBJECT_ID, id.as_str());
        updates.push(
            Record::new()
                .with(fields::RECORD_ID, member.record_id())
                .with(fields::EVENT_NAME, member.event())
                .with(fields::REPEAT_INSTRUMENT, member.repeat_instrument())
                .with(fields::REPEAT_INSTANCE, member.repeat_instance())
                .with(SUBJECT_ID, id),
        );
    }
    updates
}

/// Assign subject ids, store them in REDCap unless `dry_run`, and copy them
/// onto the matching referrals. A failed write-back is fatal.
pub fn sync_subject_ids(
    data: &mut EventData,
    labkey: &dyn LabkeyApi,
    redcap: &dyn RedcapApi,
    dry_run: bool,
) -> Result<usize> {
    let mut sequence = SubjectIdSequence::new(Some(next_subject_id(labkey)?));
    let first = sequence.peek();
    let updates = assign_subject_ids(&mut data.members, &mut sequence);
    if !updates.is_empty() {
        info!(count = updates.len(), first, "subject ids assigned");
        if dry_run {
            info!("dry run, subject ids not written to REDCap");
        } else {
            redcap
                .import_records(&updates)
                .map_err(|source| EtlError::WriteBack { source })?;
        }
    }
    data.link_referral_subjects();
    Ok(updates.len())
}
