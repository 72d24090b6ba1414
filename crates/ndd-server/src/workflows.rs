//! Identifier assignment and contact copying across the referral,
//! data-collection and sample projects and LabKey.
//!
//! Each workflow reads current state, computes the next identifier with
//! `ndd_core`, and writes it back. Nothing is locked in between, so two
//! triggers handled at the same moment can hand out the same identifier.
//!
//! REDCap failures end the workflow. LabKey writes are logged by the
//! `ndd_labkey` helpers and the workflow carries on without them.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use ndd_core::{
    ChoiceMap, collapse_checkbox, duplicate_key, next_data_collection_id, next_f_number,
    next_individual_number,
};
use ndd_labkey::{LabkeyApi, insert_row, next_subject_id, row, upsert_row};
use ndd_model::{
    DataDictionary, FNumber, FieldMaps, IndividualNumber, Record, Relation, events, fields,
};
use ndd_redcap::{RecordQuery, RedcapApi};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{Result, WorkflowError};

pub mod forms {
    pub const REFERRAL: &str = "physician_referral_form";
    pub const PROGRESS_NOTES: &str = "progress_notes";
    pub const FAMILY_ENROLLMENT: &str = "family_enrollment";
    pub const ENROLLMENT: &str = "enrollment";
    pub const DEMOGRAPHICS: &str = "demographics";
}

/// Referral project fields.
pub mod referral {
    pub const FIRST_NAME: &str = "firstname";
    pub const LAST_NAME: &str = "lastname";
    pub const MRN: &str = "epic";
    pub const DOB: &str = "dob";
    pub const SEX: &str = "sex";
    pub const REFERRAL_DATE: &str = "referraldate";
    pub const DATA_COLLECTION_ID: &str = "dataproj_id";
    pub const INDIVIDUAL_NUMBER: &str = "idnum";
    pub const F_INDIVIDUAL_ID: &str = "f_idnum";
    pub const VERIFIED_UNIQUE: &str = "verifiedunique";
    pub const TRIGGER_ENROLL: &str = "referral_triggerenroll";
    pub const PINTO_STATUS: &str = "pintoreferral_stat";
    pub const APPOINTMENT_DATE: &str = "apptdate";
    pub const PROVIDER_EMAIL: &str = "provider_email";
    pub const SITE_STATUS: &str = "sinaistatus";
    pub const SINAI_PROVIDER: &str = "sinaiprovider";
    pub const NYU_PROVIDER: &str = "nyuprovider";
    pub const PROVIDER_OTHER: &str = "providerother";
    pub const HOSPITAL_CENTER_OTHER: &str = "hospitalcenter_other";
    /// Per-site provider fields collapsed onto the data-collection `physician`.
    pub const PHYSICIAN_SOURCES: [&str; 3] = ["sinaiprovider", "nyuprovider", "barnabasprovider"];
    /// Fields collapsed onto the data-collection `hospitalcenter`.
    pub const CENTER_SOURCES: [&str; 2] = ["sinaicenter", "sinaistatus"];
}

/// Data-collection project fields.
pub mod data {
    pub const REFERRAL_ID: &str = "referralid";
    pub const LABKEY_FAMILY_ID: &str = "labkey_famid";
    pub const ENROLLED_DATE: &str = "dataprojdate";
    pub const F_NUMBER: &str = "fnum";
    pub const FAMILY_EMAIL: &str = "fam_email";
    pub const FIRST_NAME: &str = "demo_firstname";
    pub const LAST_NAME: &str = "demo_lastname";
    pub const MRN: &str = "demo_mrn";
    pub const DOB: &str = "demo_dob";
    pub const SEX: &str = "demo_sex";
    pub const RELATION: &str = "demo_relation";
    pub const DATE_ADDED: &str = "demo_dateadded";
    pub const REFERRAL_DATE: &str = "referraldate";
    pub const HAS_NDD: &str = "hasndd";
    pub const INDIVIDUAL_NUMBER: &str = "idnum";
    pub const F_INDIVIDUAL_ID: &str = "f_idnum";
    pub const SUBJECT_ID: &str = "labkey_subjid";
    pub const PHYSICIAN: &str = "physician";
    pub const PHYSICIAN_OTHER: &str = "physician_other";
    pub const HOSPITAL_CENTER: &str = "hospitalcenter";
    pub const HOSPITAL_CENTER_OTHER: &str = "hospitalcenter_other";
    pub const PHONE: &str = "demo_phone";
    pub const EMAIL: &str = "demo_email";
    pub const COPY_CONTACT_FROM: &str = "demo_copycontactfrom";
    pub const CONTACT_FIELDS: [&str; 10] = [
        "demo_address1",
        "demo_address2",
        "demo_apt",
        "demo_city",
        "demo_state",
        "demo_zip",
        "demo_email",
        "demo_email2",
        "demo_phone",
        "demo_phone2",
    ];
}

pub const SUBMISSION_ID: &str = "submission_id";

const LISTS: &str = "lists";
const STUDY: &str = "study";
const FAMILIES: &str = "Families";
const ENROLLMENT: &str = "Enrollment";
const DEMOGRAPHICS: &str = "Demographics";

/// Clients and start-up metadata shared by every workflow.
pub struct Services {
    pub referral: Arc<dyn RedcapApi>,
    pub data: Arc<dyn RedcapApi>,
    pub sample: Arc<dyn RedcapApi>,
    pub labkey: Arc<dyn LabkeyApi>,
    pub referral_dictionary: DataDictionary,
    pub data_dictionary: DataDictionary,
    pub fields: FieldMaps,
}

impl Services {
    /// Bundle the clients and fetch both projects' data dictionaries.
    pub fn load(
        referral: Arc<dyn RedcapApi>,
        data: Arc<dyn RedcapApi>,
        sample: Arc<dyn RedcapApi>,
        labkey: Arc<dyn LabkeyApi>,
        fields: FieldMaps,
    ) -> Result<Self> {
        let referral_dictionary = referral.export_metadata(&[])?;
        let data_dictionary = data.export_metadata(&[])?;
        info!(
            referral_fields = referral_dictionary.len(),
            data_fields = data_dictionary.len(),
            "data dictionaries loaded"
        );
        Ok(Self {
            referral,
            data,
            sample,
            labkey,
            referral_dictionary,
            data_dictionary,
            fields,
        })
    }

    /// Label of a `demo_relation` code, or the code itself when unknown.
    pub fn relation_label(&self, code: &str) -> String {
        self.data_dictionary
            .get(data::RELATION)
            .map(|meta| ChoiceMap::parse(&meta.choices))
            .and_then(|choices| choices.label(code.trim()).map(str::to_string))
            .unwrap_or_else(|| code.trim().to_string())
    }
}

/// Body REDCap posts to a data-entry trigger URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Trigger {
    pub record: String,
    #[serde(default)]
    pub instrument: String,
    #[serde(default)]
    pub redcap_repeat_instance: Option<String>,
}

impl Trigger {
    pub fn repeat_instance(&self) -> Option<&str> {
        self.redcap_repeat_instance
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn member_update(record_id: &str, instance: &str) -> Record {
    Record::new()
        .with(fields::RECORD_ID, record_id)
        .with(fields::EVENT_NAME, events::MEMBER)
        .with(fields::REPEAT_INSTANCE, instance)
}

fn family_update(record_id: &str) -> Record {
    Record::new()
        .with(fields::RECORD_ID, record_id)
        .with(fields::EVENT_NAME, events::FAMILY)
}

fn is_proband_number(raw: &str) -> bool {
    raw.parse::<IndividualNumber>()
        .is_ok_and(|n| n == IndividualNumber::PROBAND)
}

/// The non-repeating row of a referral record.
pub fn fetch_referral(services: &Services, record_id: &str) -> Result<Record> {
    services
        .referral
        .export_rows(&RecordQuery::all().record(record_id))?
        .into_iter()
        .find(|r| r.repeat_instrument().is_empty())
        .ok_or_else(|| WorkflowError::MissingRecord {
            project: "referral",
            record: record_id.to_string(),
        })
}

/// Family-member rows of one data-collection record, limited to `form`.
fn member_rows(services: &Services, record_id: &str, form: &str, extra: &[&str]) -> Result<Vec<Record>> {
    let query = RecordQuery::all()
        .record(record_id)
        .forms([form])
        .fields([fields::RECORD_ID])
        .fields(extra.iter().copied());
    Ok(services
        .data
        .export_rows(&query)?
        .into_iter()
        .filter(|r| r.event() == events::MEMBER)
        .collect())
}

/// Family rows of every data-collection record.
fn family_rows(services: &Services) -> Result<Vec<Record>> {
    let query = RecordQuery::all()
        .forms([forms::FAMILY_ENROLLMENT])
        .fields([fields::RECORD_ID]);
    Ok(services
        .data
        .export_rows(&query)?
        .into_iter()
        .filter(|r| r.event() == events::FAMILY)
        .collect())
}

fn family_row(services: &Services, record_id: &str) -> Result<Record> {
    let query = RecordQuery::all()
        .record(record_id)
        .forms([forms::FAMILY_ENROLLMENT])
        .fields([fields::RECORD_ID]);
    services
        .data
        .export_rows(&query)?
        .into_iter()
        .find(|r| r.event() == events::FAMILY)
        .ok_or_else(|| WorkflowError::MissingRecord {
            project: "data collection",
            record: record_id.to_string(),
        })
}

/// Next free data-collection record id.
pub fn allocate_data_collection_id(services: &Services) -> Result<u64> {
    let query = RecordQuery::all()
        .forms([forms::FAMILY_ENROLLMENT])
        .fields([fields::RECORD_ID]);
    let rows = services.data.export_rows(&query)?;
    Ok(next_data_collection_id(rows.iter().map(Record::record_id)))
}

/// Referring provider's email from the configured maps, chosen by the
/// referral's site status (`1` Sinai, `2` NYU).
///
/// `None` when no site status is recorded; an empty string when the site
/// or provider has no configured email.
pub fn provider_email(referral: &Record, maps: &FieldMaps) -> Option<String> {
    let (emails, provider) = match referral.get(referral::SITE_STATUS).trim() {
        "" => return None,
        "1" => (&maps.sinai_provider_emails, referral.get(referral::SINAI_PROVIDER)),
        "2" => (&maps.nyu_provider_emails, referral.get(referral::NYU_PROVIDER)),
        _ => return Some(String::new()),
    };
    match emails.get(provider.trim()) {
        Some(email) => Some(email.clone()),
        None => {
            warn!(provider, "no email configured for referring provider");
            Some(String::new())
        }
    }
}

/// Fill `provider_email` on a referral that lacks one.
fn fill_provider_email(services: &Services, referral_row: &Record) -> Result<bool> {
    if referral_row.non_empty(referral::PROVIDER_EMAIL).is_some() {
        return Ok(false);
    }
    let Some(email) = provider_email(referral_row, &services.fields).filter(|e| !e.is_empty())
    else {
        return Ok(false);
    };
    services.referral.import_record(
        &Record::new()
            .with(fields::RECORD_ID, referral_row.record_id())
            .with(referral::PROVIDER_EMAIL, email),
    )?;
    debug!(record = referral_row.record_id(), "provider email filled");
    Ok(true)
}

/// Referral checkbox value carried onto `target`, blank when it cannot be
/// decoded.
fn collapsed(services: &Services, referral_row: &Record, sources: &[&str], target: &str) -> String {
    collapse_checkbox(
        referral_row,
        sources,
        target,
        &services.referral_dictionary,
        &services.data_dictionary,
    )
    .unwrap_or_else(|err| {
        warn!(record = referral_row.record_id(), target, error = %err, "referral choice not carried across, left blank");
        String::new()
    })
}

/// Create or refresh the family row and proband member row in the
/// data-collection project from a referral.
///
/// New families also get their enrolment dates, and the referral gets the
/// new data-collection id and individual number `01`.
pub fn push_to_data_collection(
    services: &Services,
    referral_row: &Record,
    data_collection_id: &str,
    individual_number: &str,
    is_new: bool,
    today: NaiveDate,
) -> Result<IndividualNumber> {
    let referral_id = referral_row.record_id();
    let number = if is_new || individual_number.trim().is_empty() {
        IndividualNumber::PROBAND
    } else {
        individual_number
            .parse::<IndividualNumber>()
            .map_err(|_| WorkflowError::InvalidValue {
                record: referral_id.to_string(),
                field: referral::INDIVIDUAL_NUMBER,
                value: individual_number.to_string(),
            })?
    };
    let instance = if number == IndividualNumber::PROBAND {
        "1".to_string()
    } else {
        member_rows(services, data_collection_id, forms::ENROLLMENT, &[])?
            .into_iter()
            .find(|m| m.get(data::INDIVIDUAL_NUMBER).parse::<IndividualNumber>().ok() == Some(number))
            .map(|m| m.repeat_instance().to_string())
            .ok_or_else(|| WorkflowError::MissingMember {
                record: data_collection_id.to_string(),
                instance: number.to_string(),
            })?
    };

    let mut family = family_update(data_collection_id)
        .with(data::REFERRAL_ID, referral_id)
        .with(data::LABKEY_FAMILY_ID, data_collection_id);
    let mut proband = member_update(data_collection_id, &instance)
        .with(data::FIRST_NAME, referral_row.get(referral::FIRST_NAME))
        .with(data::LAST_NAME, referral_row.get(referral::LAST_NAME))
        .with(data::MRN, referral_row.get(referral::MRN))
        .with(data::DOB, referral_row.get(referral::DOB))
        .with(data::SEX, referral_row.get(referral::SEX))
        .with(data::INDIVIDUAL_NUMBER, number.to_string())
        .with(
            data::PHYSICIAN,
            collapsed(services, referral_row, &referral::PHYSICIAN_SOURCES, data::PHYSICIAN),
        )
        .with(data::PHYSICIAN_OTHER, referral_row.get(referral::PROVIDER_OTHER))
        .with(
            data::HOSPITAL_CENTER,
            collapsed(services, referral_row, &referral::CENTER_SOURCES, data::HOSPITAL_CENTER),
        )
        .with(
            data::HOSPITAL_CENTER_OTHER,
            referral_row.get(referral::HOSPITAL_CENTER_OTHER),
        );
    if is_new {
        let today = date_text(today);
        family.set(data::ENROLLED_DATE, today.as_str());
        proband.set(data::RELATION, Relation::Proband.code());
        proband.set(data::DATE_ADDED, today);
        proband.set(data::REFERRAL_DATE, referral_row.get(referral::REFERRAL_DATE));
        proband.set(data::HAS_NDD, "1");
    }
    services.data.import_records(&[family, proband])?;

    if is_new {
        services.referral.import_record(
            &Record::new()
                .with(fields::RECORD_ID, referral_id)
                .with(referral::DATA_COLLECTION_ID, data_collection_id)
                .with(referral::INDIVIDUAL_NUMBER, number.to_string()),
        )?;
    }
    info!(
        referral = referral_id,
        record = data_collection_id,
        is_new,
        "referral pushed to data collection"
    );
    Ok(IndividualNumber::PROBAND)
}

/// Store a family's F-number in data collection and LabKey `lists.Families`.
pub fn assign_family_id(services: &Services, data_collection_id: &str, fnum: FNumber) -> Result<()> {
    services
        .data
        .import_record(&family_update(data_collection_id).with(data::F_NUMBER, fnum.to_string()))?;
    upsert_row(
        services.labkey.as_ref(),
        LISTS,
        FAMILIES,
        row([("id", json!(data_collection_id)), ("fnum", json!(fnum.to_string()))]),
    )
    .ok();
    info!(record = data_collection_id, %fnum, "F-number assigned");
    Ok(())
}

/// Store a member's F-individual id in data collection, optionally on the
/// referral, and in LabKey `study.Enrollment`. Returns the id.
pub fn assign_individual_id(
    services: &Services,
    referral_id: Option<&str>,
    data_collection_id: &str,
    instance: &str,
    subject_id: &str,
    fnum: FNumber,
    number: IndividualNumber,
) -> Result<String> {
    let f_individual_id = fnum.individual_id(number);
    services.data.import_record(
        &member_update(data_collection_id, instance)
            .with(data::F_INDIVIDUAL_ID, f_individual_id.as_str())
            .with(data::INDIVIDUAL_NUMBER, number.to_string()),
    )?;
    if let Some(referral_id) = referral_id {
        services.referral.import_record(
            &Record::new()
                .with(fields::RECORD_ID, referral_id)
                .with(referral::F_INDIVIDUAL_ID, f_individual_id.as_str()),
        )?;
    }
    upsert_row(
        services.labkey.as_ref(),
        STUDY,
        ENROLLMENT,
        row([
            ("SubjectID", json!(subject_id)),
            ("idnum", json!(number.to_string())),
            ("f_idnum", json!(f_individual_id)),
        ]),
    )
    .ok();
    info!(record = data_collection_id, instance, f_idnum = %f_individual_id, "F-individual id assigned");
    Ok(f_individual_id)
}

/// Store a member's warehouse subject id in data collection and add the
/// member to LabKey `study.Demographics`.
pub fn assign_labkey_id(
    services: &Services,
    data_collection_id: &str,
    instance: &str,
    subject_id: u64,
    relation_label: &str,
    date_added: &str,
) -> Result<()> {
    services.data.import_record(
        &member_update(data_collection_id, instance).with(data::SUBJECT_ID, subject_id.to_string()),
    )?;
    insert_row(
        services.labkey.as_ref(),
        STUDY,
        DEMOGRAPHICS,
        row([
            ("SubjectID", json!(subject_id)),
            ("demo_relation", json!(relation_label)),
            ("date", json!(date_added)),
            ("familyid", json!(data_collection_id)),
        ]),
    )
    .ok();
    info!(record = data_collection_id, instance, subject_id, "subject id assigned");
    Ok(())
}

/// Copy the proband's email onto the family row.
pub fn set_family_email(services: &Services, data_collection_id: &str, email: &str) -> Result<()> {
    services
        .data
        .import_record(&family_update(data_collection_id).with(data::FAMILY_EMAIL, email))?;
    debug!(record = data_collection_id, "family email set");
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateCheck {
    pub checked: usize,
    pub duplicates: usize,
}

/// Mark unverified referrals unique (`1`) or duplicate (`0`) by comparing
/// name, date of birth and sex with every enrolled family member.
///
/// Checks one referral when `record` is given, otherwise all of them.
pub fn check_duplicates(services: &Services, record: Option<&str>) -> Result<DuplicateCheck> {
    let mut query = RecordQuery::all()
        .forms([forms::REFERRAL])
        .fields([fields::RECORD_ID]);
    if let Some(id) = record {
        query = query.record(id);
    }
    let unverified: Vec<Record> = services
        .referral
        .export_rows(&query)?
        .into_iter()
        .filter(|r| r.repeat_instrument().is_empty() && r.get(referral::VERIFIED_UNIQUE) != "1")
        .collect();
    if unverified.is_empty() {
        return Ok(DuplicateCheck::default());
    }

    let enrolled_query = RecordQuery::all()
        .forms([forms::DEMOGRAPHICS])
        .fields([fields::RECORD_ID]);
    let enrolled: HashSet<String> = services
        .data
        .export_rows(&enrolled_query)?
        .iter()
        .filter(|r| r.event() == events::MEMBER)
        .map(|m| {
            duplicate_key(
                m.get(data::FIRST_NAME),
                m.get(data::LAST_NAME),
                m.get(data::DOB),
                m.get(data::SEX),
            )
        })
        .collect();

    let mut result = DuplicateCheck::default();
    let updates: Vec<Record> = unverified
        .iter()
        .map(|r| {
            let key = duplicate_key(
                r.get(referral::FIRST_NAME),
                r.get(referral::LAST_NAME),
                r.get(referral::DOB),
                r.get(referral::SEX),
            );
            let duplicate = enrolled.contains(&key);
            result.checked += 1;
            if duplicate {
                result.duplicates += 1;
                warn!(record = r.record_id(), "referral matches an enrolled family member");
            }
            Record::new()
                .with(fields::RECORD_ID, r.record_id())
                .with(referral::VERIFIED_UNIQUE, if duplicate { "0" } else { "1" })
        })
        .collect();
    services.referral.import_records(&updates)?;
    info!(checked = result.checked, duplicates = result.duplicates, "duplicate check done");
    Ok(result)
}

/// Overwrite the proband's contact fields with those recorded in the
/// referral's progress notes. Returns the number of fields copied.
pub fn copy_contact_info(services: &Services, data_collection_id: &str) -> Result<usize> {
    let query = RecordQuery::all()
        .record(data_collection_id)
        .fields([fields::RECORD_ID, data::REFERRAL_ID]);
    let referral_id = services
        .data
        .export_rows(&query)?
        .into_iter()
        .find(|r| r.event() == events::FAMILY)
        .and_then(|r| r.non_empty(data::REFERRAL_ID).map(str::to_string))
        .ok_or_else(|| WorkflowError::MissingField {
            record: data_collection_id.to_string(),
            field: data::REFERRAL_ID,
        })?;

    let notes_query = RecordQuery::all()
        .record(referral_id.as_str())
        .forms([forms::PROGRESS_NOTES])
        .fields([fields::RECORD_ID]);
    let notes = services
        .referral
        .export_rows(&notes_query)?
        .into_iter()
        .find(|r| r.repeat_instrument().is_empty())
        .ok_or_else(|| WorkflowError::MissingRecord {
            project: "referral",
            record: referral_id.clone(),
        })?;

    let mut proband = member_update(data_collection_id, "1");
    for (from, to) in &services.fields.progress_notes_to_demographics {
        proband.set(to.as_str(), notes.get(from));
    }
    services.data.import_record(&proband)?;
    let copied = services.fields.progress_notes_to_demographics.len();
    info!(record = data_collection_id, referral = %referral_id, copied, "contact info copied to proband");
    Ok(copied)
}

/// Relation code and the referral field prefix its contact details go to.
const FAMILY_CONTACTS: [(&str, &str); 3] = [("2", "mom"), ("3", "dad"), ("4", "sib")];

/// Copy mother, father and sibling contact details from data collection
/// onto the referral. Returns the number of relations found.
pub fn copy_parents_info(services: &Services, referral_id: &str) -> Result<usize> {
    let referral_row = fetch_referral(services, referral_id)?;
    let data_collection_id = referral_row
        .non_empty(referral::DATA_COLLECTION_ID)
        .ok_or_else(|| WorkflowError::MissingField {
            record: referral_id.to_string(),
            field: referral::DATA_COLLECTION_ID,
        })?
        .trim();
    let members = member_rows(services, data_collection_id, forms::DEMOGRAPHICS, &[])?;

    let mut update = Record::new().with(fields::RECORD_ID, referral_id);
    let mut found = 0;
    for (relation, prefix) in FAMILY_CONTACTS {
        let Some(member) = members.iter().find(|m| m.get(data::RELATION).trim() == relation) else {
            continue;
        };
        for (suffix, field) in [
            ("firstname", data::FIRST_NAME),
            ("lastname", data::LAST_NAME),
            ("phone", data::PHONE),
            ("email", data::EMAIL),
        ] {
            update.set(format!("{prefix}_{suffix}"), member.get(field));
        }
        found += 1;
    }
    services.referral.import_record(&update)?;
    info!(referral = referral_id, relations = found, "family contacts copied to referral");
    Ok(found)
}

fn copy_contact_between(
    services: &Services,
    data_collection_id: &str,
    instance: &str,
    members: &[Record],
) -> Result<bool> {
    let target = members
        .iter()
        .find(|m| m.repeat_instance() == instance)
        .ok_or_else(|| WorkflowError::MissingMember {
            record: data_collection_id.to_string(),
            instance: instance.to_string(),
        })?;
    let Some(from) = target.non_empty(data::COPY_CONTACT_FROM).map(str::trim) else {
        return Ok(false);
    };
    let Some(source) = members.iter().find(|m| m.repeat_instance() == from) else {
        warn!(record = data_collection_id, instance, from, "member to copy contact from not found");
        return Ok(false);
    };
    let mut update = member_update(data_collection_id, instance);
    for field in data::CONTACT_FIELDS {
        update.set(field, source.get(field));
    }
    update.set(data::COPY_CONTACT_FROM, "");
    services.data.import_record(&update)?;
    info!(record = data_collection_id, instance, from, "member contact copied");
    Ok(true)
}

/// Copy contact details onto a member from the member named in its
/// `demo_copycontactfrom` field. Returns whether anything was copied.
pub fn copy_member_contact(services: &Services, data_collection_id: &str, instance: &str) -> Result<bool> {
    let members = member_rows(services, data_collection_id, forms::DEMOGRAPHICS, &[])?;
    copy_contact_between(services, data_collection_id, instance, &members)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferralOutcome {
    pub provider_email: bool,
    /// Set when the referral was pushed to data collection.
    pub data_collection_id: Option<String>,
    pub subject_id: Option<u64>,
    pub f_individual_id: Option<String>,
}

/// Handle a save in the referral project.
///
/// Fills the provider email, enrols a verified referral flagged for
/// enrolment (allocating a data-collection id, a LabKey family row and a
/// subject id for new families), and gives the proband of a Pinto
/// referral with an appointment an F-number.
pub fn referral_pipeline(services: &Services, trigger: &Trigger, today: NaiveDate) -> Result<ReferralOutcome> {
    let record_id = trigger.record.trim();
    let referral_row = fetch_referral(services, record_id)?;
    let mut outcome = ReferralOutcome::default();
    if trigger.instrument == forms::REFERRAL {
        outcome.provider_email = fill_provider_email(services, &referral_row)?;
    }

    let (data_collection_id, is_new) = match referral_row.non_empty(referral::DATA_COLLECTION_ID) {
        Some(id) => (id.trim().to_string(), false),
        None => (allocate_data_collection_id(services)?.to_string(), true),
    };
    let mut individual_number = referral_row.get(referral::INDIVIDUAL_NUMBER).trim().to_string();

    if referral_row.get(referral::TRIGGER_ENROLL) == "1" && referral_row.get(referral::VERIFIED_UNIQUE) == "1" {
        individual_number = push_to_data_collection(
            services,
            &referral_row,
            &data_collection_id,
            &individual_number,
            is_new,
            today,
        )?
        .to_string();
        if is_new {
            insert_row(
                services.labkey.as_ref(),
                LISTS,
                FAMILIES,
                row([("id", json!(data_collection_id)), ("referralid", json!(record_id))]),
            )
            .ok();
            let subject_id = next_subject_id(services.labkey.as_ref())?;
            assign_labkey_id(
                services,
                &data_collection_id,
                "1",
                subject_id,
                &services.relation_label(Relation::Proband.code()),
                &date_text(today),
            )?;
            outcome.subject_id = Some(subject_id);
        }
        outcome.data_collection_id = Some(data_collection_id.clone());
    }

    let appointment = referral_row.get(referral::APPOINTMENT_DATE).trim();
    if referral_row.get(referral::PINTO_STATUS) == "1"
        && !appointment.is_empty()
        && is_proband_number(&individual_number)
    {
        outcome.f_individual_id =
            assign_proband_f_number(services, record_id, &data_collection_id, appointment, today)?;
    }
    Ok(outcome)
}

/// Give a family without an F-number the next one for the appointment
/// year and the proband their F-individual id.
fn assign_proband_f_number(
    services: &Services,
    referral_id: &str,
    data_collection_id: &str,
    appointment: &str,
    today: NaiveDate,
) -> Result<Option<String>> {
    let families = family_rows(services)?;
    let family = families
        .iter()
        .find(|f| f.record_id() == data_collection_id)
        .ok_or_else(|| WorkflowError::MissingRecord {
            project: "data collection",
            record: data_collection_id.to_string(),
        })?;
    if family.non_empty(data::F_NUMBER).is_some() {
        return Ok(None);
    }
    let subject_id = member_rows(services, data_collection_id, forms::ENROLLMENT, &[])?
        .into_iter()
        .find(|m| is_proband_number(m.get(data::INDIVIDUAL_NUMBER)))
        .map(|m| m.get(data::SUBJECT_ID).to_string())
        .unwrap_or_default();
    let fnum = next_f_number(appointment, today, families.iter().map(|f| f.get(data::F_NUMBER)))?;
    assign_family_id(services, data_collection_id, fnum)?;
    assign_individual_id(
        services,
        Some(referral_id),
        data_collection_id,
        "1",
        &subject_id,
        fnum,
        IndividualNumber::PROBAND,
    )
    .map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataOutcome {
    pub subject_id: Option<u64>,
    pub f_individual_id: Option<String>,
    pub contact_copied: bool,
    pub family_email: bool,
}

/// Handle a save in the data-collection project.
///
/// A saved enrollment or demographics form gives a member with a relation
/// a subject id and, once the family has an F-number, an individual
/// number. A saved demographics form also copies contact details and,
/// for the proband, the family email.
pub fn data_pipeline(services: &Services, trigger: &Trigger) -> Result<DataOutcome> {
    let record_id = trigger.record.trim();
    let instrument = trigger.instrument.as_str();
    let mut outcome = DataOutcome::default();
    if instrument != forms::DEMOGRAPHICS && instrument != forms::ENROLLMENT {
        debug!(instrument, "no data-collection workflow for instrument");
        return Ok(outcome);
    }
    let instance = trigger
        .repeat_instance()
        .ok_or_else(|| WorkflowError::MissingField {
            record: record_id.to_string(),
            field: fields::REPEAT_INSTANCE,
        })?;

    let enrolled = member_rows(
        services,
        record_id,
        forms::ENROLLMENT,
        &[data::DATE_ADDED, data::RELATION],
    )?;
    let member = enrolled
        .iter()
        .find(|m| m.repeat_instance() == instance)
        .ok_or_else(|| WorkflowError::MissingMember {
            record: record_id.to_string(),
            instance: instance.to_string(),
        })?;
    let relation = member.get(data::RELATION).trim();
    if !relation.is_empty() {
        let mut subject_id = member.get(data::SUBJECT_ID).trim().to_string();
        if subject_id.is_empty() {
            let next = next_subject_id(services.labkey.as_ref())?;
            assign_labkey_id(
                services,
                record_id,
                instance,
                next,
                &services.relation_label(relation),
                member.get(data::DATE_ADDED),
            )?;
            subject_id = next.to_string();
            outcome.subject_id = Some(next);
        }
        if member.get(data::INDIVIDUAL_NUMBER).trim().is_empty() {
            let family = family_row(services, record_id)?;
            if let Some(raw) = family.non_empty(data::F_NUMBER) {
                let fnum = raw.parse::<FNumber>().map_err(|_| WorkflowError::InvalidValue {
                    record: record_id.to_string(),
                    field: data::F_NUMBER,
                    value: raw.to_string(),
                })?;
                let number = next_individual_number(
                    &Relation::from_code(relation),
                    enrolled.iter().map(|m| m.get(data::INDIVIDUAL_NUMBER)),
                );
                outcome.f_individual_id = Some(assign_individual_id(
                    services,
                    None,
                    record_id,
                    instance,
                    &subject_id,
                    fnum,
                    number,
                )?);
            }
        }
    }

    if instrument == forms::DEMOGRAPHICS {
        let members = member_rows(services, record_id, forms::DEMOGRAPHICS, &[])?;
        outcome.contact_copied = copy_contact_between(services, record_id, instance, &members)?;
        if instance == "1" {
            if let Some(email) = members
                .iter()
                .find(|m| m.repeat_instance() == "1")
                .and_then(|m| m.non_empty(data::EMAIL))
            {
                set_family_email(services, record_id, email)?;
                outcome.family_email = true;
            }
        }
    }
    Ok(outcome)
}

/// Handle a save in the sample project: the submission must be
/// identifiable by a unique `submission_id`. Returns the rows seen.
pub fn sample_pipeline(services: &Services, trigger: &Trigger) -> Result<usize> {
    let mut query = RecordQuery::all().record(trigger.record.trim());
    if !trigger.instrument.is_empty() {
        query = query.forms([trigger.instrument.as_str()]);
    }
    let rows = services.sample.export_rows(&query)?;
    let mut seen = HashSet::new();
    for row in &rows {
        if !seen.insert(row.get(SUBMISSION_ID)) {
            return Err(WorkflowError::DuplicateSubmission(row.get(SUBMISSION_ID).to_string()));
        }
    }
    info!(record = %trigger.record, rows = rows.len(), "sample submission received");
    Ok(rows.len())
}

/// Data-collection id a referral was enrolled under.
pub fn referral_data_collection_id(services: &Services, referral_id: &str) -> Result<String> {
    fetch_referral(services, referral_id)?
        .non_empty(referral::DATA_COLLECTION_ID)
        .map(|id| id.trim().to_string())
        .ok_or_else(|| WorkflowError::MissingField {
            record: referral_id.to_string(),
            field: referral::DATA_COLLECTION_ID,
        })
}

/// Referral a data-collection family came from.
pub fn data_collection_referral_id(services: &Services, data_collection_id: &str) -> Result<String> {
    family_row(services, data_collection_id)?
        .non_empty(data::REFERRAL_ID)
        .map(|id| id.trim().to_string())
        .ok_or_else(|| WorkflowError::MissingField {
            record: data_collection_id.to_string(),
            field: data::REFERRAL_ID,
        })
}

/// F-number of a data-collection family.
pub fn family_f_number(services: &Services, data_collection_id: &str) -> Result<String> {
    family_row(services, data_collection_id)?
        .non_empty(data::F_NUMBER)
        .map(|id| id.trim().to_string())
        .ok_or_else(|| WorkflowError::MissingField {
            record: data_collection_id.to_string(),
            field: data::F_NUMBER,
        })
}
