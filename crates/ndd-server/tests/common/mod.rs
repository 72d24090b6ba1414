#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use ndd_labkey::{MemoryLabkey, row};
use ndd_model::{DataDictionary, FieldMaps, FieldMeta, FieldType, Record, RedcapConfig, events};
use ndd_redcap::MemoryRedcap;
use ndd_server::Services;
use serde_json::json;

fn meta(name: &str, form: &str, field_type: FieldType, choices: &str) -> FieldMeta {
    FieldMeta {
        field_name: name.to_string(),
        form_name: form.to_string(),
        field_type,
        field_label: String::new(),
        choices: choices.to_string(),
        validation: String::new(),
        identifier: false,
    }
}

fn text(name: &str, form: &str) -> FieldMeta {
    meta(name, form, FieldType::Text, "")
}

fn referral_project() -> MemoryRedcap {
    let form = "physician_referral_form";
    let mut dictionary = vec![
        text("redcap_id", form),
        text("firstname", form),
        text("lastname", form),
        text("epic", form),
        text("dob", form),
        text("sex", form),
        text("referraldate", form),
        text("dataproj_id", form),
        text("idnum", form),
        text("f_idnum", form),
        text("verifiedunique", form),
        text("referral_triggerenroll", form),
        text("pintoreferral_stat", form),
        text("apptdate", form),
        text("provider_email", form),
        meta("sinaistatus", form, FieldType::Radio, "1, Mount Sinai | 2, NYU"),
        meta("sinaiprovider", form, FieldType::Dropdown, "3, Dr A | 4, Dr B"),
        text("providerother", form),
    ];
    dictionary.push(text("pn_address1", "progress_notes"));
    dictionary.push(text("pn_phone", "progress_notes"));
    let dictionary = DataDictionary::new(dictionary).unwrap();

    let rows = vec![
        Record::new()
            .with("redcap_id", "10")
            .with("firstname", "Ana")
            .with("lastname", "Diaz")
            .with("dob", "2015-06-01")
            .with("sex", "2")
            .with("dataproj_id", "1")
            .with("idnum", "01")
            .with("f_idnum", "F190001-01")
            .with("verifiedunique", "1")
            .with("pn_address1", "1 Main St")
            .with("pn_phone", "555-0100"),
        Record::new()
            .with("redcap_id", "11")
            .with("firstname", "Ben")
            .with("lastname", "Cole")
            .with("dob", "2016-01-01")
            .with("sex", "1")
            .with("dataproj_id", "2")
            .with("idnum", "01")
            .with("verifiedunique", "1")
            .with("referral_triggerenroll", "1")
            .with("pintoreferral_stat", "1")
            .with("apptdate", "2020-02-03"),
        Record::new()
            .with("redcap_id", "12")
            .with("firstname", "Cara")
            .with("lastname", "Moss")
            .with("dob", "2017-03-03")
            .with("sex", "2")
            .with("referraldate", "2020-05-05")
            .with("verifiedunique", "1")
            .with("referral_triggerenroll", "1")
            .with("sinaistatus", "1")
            .with("sinaiprovider", "3"),
        Record::new()
            .with("redcap_id", "13")
            .with("firstname", "maria")
            .with("lastname", "DIAZ")
            .with("dob", "1985-01-01")
            .with("sex", "2"),
    ];
    MemoryRedcap::new(dictionary, rows)
}

fn data_project() -> MemoryRedcap {
    let dictionary = DataDictionary::new(vec![
        text("redcap_id", "family_enrollment"),
        text("referralid", "family_enrollment"),
        text("labkey_famid", "family_enrollment"),
        text("dataprojdate", "family_enrollment"),
        text("fnum", "family_enrollment"),
        text("fam_email", "family_enrollment"),
        text("idnum", "enrollment"),
        text("f_idnum", "enrollment"),
        text("labkey_subjid", "enrollment"),
        meta("physician", "enrollment", FieldType::Dropdown, "1, Dr A | 2, Dr B"),
        text("physician_other", "enrollment"),
        meta("hospitalcenter", "enrollment", FieldType::Dropdown, "1, Mount Sinai | 2, NYU"),
        text("hospitalcenter_other", "enrollment"),
        text("referraldate", "enrollment"),
        text("hasndd", "enrollment"),
        text("demo_firstname", "demographics"),
        text("demo_lastname", "demographics"),
        text("demo_mrn", "demographics"),
        text("demo_dob", "demographics"),
        text("demo_sex", "demographics"),
        meta(
            "demo_relation",
            "demographics",
            FieldType::Dropdown,
            "1, Proband | 2, Mother | 3, Father | 4, Sibling",
        ),
        text("demo_dateadded", "demographics"),
        text("demo_address1", "demographics"),
        text("demo_city", "demographics"),
        text("demo_email", "demographics"),
        text("demo_phone", "demographics"),
        text("demo_copycontactfrom", "demographics"),
    ])
    .unwrap();

    let family = |id: &str, referral: &str, fnum: &str| {
        Record::new()
            .with("redcap_id", id)
            .with("redcap_event_name", events::FAMILY)
            .with("referralid", referral)
            .with("labkey_famid", id)
            .with("fnum", fnum)
    };
    let member = |id: &str, instance: &str, relation: &str| {
        Record::new()
            .with("redcap_id", id)
            .with("redcap_event_name", events::MEMBER)
            .with("redcap_repeat_instance", instance)
            .with("demo_relation", relation)
    };
    let rows = vec![
        family("1", "10", "F190001"),
        member("1", "1", "1")
            .with("demo_firstname", "Ana")
            .with("demo_lastname", "Diaz")
            .with("demo_dob", "2015-06-01")
            .with("demo_sex", "2")
            .with("demo_email", "ana.family@example.org")
            .with("idnum", "01")
            .with("f_idnum", "F190001-01")
            .with("labkey_subjid", "100"),
        member("1", "2", "2")
            .with("demo_firstname", "Maria")
            .with("demo_lastname", "Diaz")
            .with("demo_dob", "1985-01-01")
            .with("demo_sex", "2")
            .with("demo_email", "maria@example.org")
            .with("demo_phone", "555-0199")
            .with("demo_address1", "9 Elm St")
            .with("demo_city", "Bronx")
            .with("idnum", "02")
            .with("f_idnum", "F190001-02")
            .with("labkey_subjid", "101"),
        member("1", "3", "4")
            .with("demo_firstname", "Leo")
            .with("demo_lastname", "Diaz")
            .with("demo_dateadded", "2020-06-01")
            .with("demo_copycontactfrom", "2"),
        family("2", "11", ""),
        member("2", "1", "1")
            .with("demo_firstname", "Ben")
            .with("demo_lastname", "Cole")
            .with("idnum", "01")
            .with("labkey_subjid", "102"),
    ];
    MemoryRedcap::new(dictionary, rows)
}

fn sample_project() -> MemoryRedcap {
    let dictionary = DataDictionary::new(vec![
        text("redcap_id", "sample_submission"),
        text("submission_id", "sample_submission"),
    ])
    .unwrap();
    let submission = |id: &str, instance: &str, submission: &str| {
        Record::new()
            .with("redcap_id", id)
            .with("redcap_repeat_instrument", "sample_submission")
            .with("redcap_repeat_instance", instance)
            .with("submission_id", submission)
    };
    MemoryRedcap::new(
        dictionary,
        vec![
            submission("S1", "1", "A"),
            submission("S1", "2", "A"),
            submission("S2", "1", "B"),
            submission("S2", "2", "C"),
        ],
    )
}

fn field_maps() -> FieldMaps {
    FieldMaps {
        progress_notes_to_demographics: BTreeMap::from([
            ("pn_address1".to_string(), "demo_address1".to_string()),
            ("pn_phone".to_string(), "demo_phone".to_string()),
        ]),
        sinai_provider_emails: BTreeMap::from([("3".to_string(), "dr.a@sinai.org".to_string())]),
        nyu_provider_emails: BTreeMap::new(),
    }
}

pub fn redcap_config() -> RedcapConfig {
    RedcapConfig {
        api_url: "https://redcap.example.org/api/".to_string(),
        base_url: "https://redcap.example.org/record_home.php?pid=".to_string(),
        referral_pid: "101".to_string(),
        referral_token: String::new(),
        data_pid: "202".to_string(),
        data_token: String::new(),
        sample_pid: "303".to_string(),
        sample_token: String::new(),
    }
}

pub struct Fixture {
    pub referral: Arc<MemoryRedcap>,
    pub data: Arc<MemoryRedcap>,
    pub sample: Arc<MemoryRedcap>,
    pub labkey: Arc<MemoryLabkey>,
    pub services: Arc<Services>,
}

impl Fixture {
    pub fn new() -> Self {
        let referral = Arc::new(referral_project());
        let data = Arc::new(data_project());
        let sample = Arc::new(sample_project());
        let labkey = Arc::new(MemoryLabkey::new());
        labkey.set_rows("study", "GetNextSubjectID", vec![row([("nextSubjID", json!(200))])]);
        labkey.set_rows(
            "lists",
            "Families",
            vec![row([("id", json!("1")), ("fnum", json!("F190001"))])],
        );
        let services = Services::load(
            referral.clone(),
            data.clone(),
            sample.clone(),
            labkey.clone(),
            field_maps(),
        )
        .unwrap();
        Self {
            referral,
            data,
            sample,
            labkey,
            services: Arc::new(services),
        }
    }

    pub fn referral_row(&self, id: &str) -> Record {
        self.referral
            .rows()
            .into_iter()
            .find(|r| r.record_id() == id)
            .unwrap()
    }

    pub fn member(&self, id: &str, instance: &str) -> Record {
        self.data
            .rows()
            .into_iter()
            .find(|r| {
                r.record_id() == id
                    && r.event() == events::MEMBER
                    && r.repeat_instance() == instance
            })
            .unwrap()
    }

    pub fn family(&self, id: &str) -> Record {
        self.data.find(id, events::FAMILY).unwrap()
    }
}
