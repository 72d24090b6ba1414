use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use ndd_etl::{EtlError, EtlOptions, run};
use ndd_labkey::{MemoryLabkey, row};
use ndd_model::{
    DataDictionary, EtlConfig, FieldMeta, FieldType, InstrumentConfig, LabkeyTableConfig, Record,
    events,
};
use ndd_redcap::MemoryRedcap;
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

fn referral_project() -> MemoryRedcap {
    let dictionary = DataDictionary::new(vec![
        meta("redcap_id", "referral_form", FieldType::Text, ""),
        meta("f_idnum", "referral_form", FieldType::Text, ""),
        meta("ref_date", "referral_form", FieldType::Text, ""),
        meta("ref_reason", "referral_form", FieldType::Radio, "1, Seizures | 2, Delay"),
    ])
    .unwrap();
    let rows = vec![
        Record::new()
            .with("redcap_id", "1")
            .with("f_idnum", "F190001-01")
            .with("ref_date", "2019-03-04")
            .with("ref_reason", "1")
            .with("referral_form_complete", "2"),
        Record::new()
            .with("redcap_id", "2")
            .with("f_idnum", "")
            .with("ref_date", "2019-05-01")
            .with("ref_reason", "2")
            .with("referral_form_complete", "0"),
    ];
    MemoryRedcap::new(dictionary, rows)
}

fn data_project() -> MemoryRedcap {
    let dictionary = DataDictionary::new(vec![
        meta("redcap_id", "family_info", FieldType::Text, ""),
        meta("fam_city", "family_info", FieldType::Text, ""),
        meta("demo_relation", "demographics", FieldType::Dropdown, "1, Proband | 2, Mother"),
        meta("f_idnum", "demographics", FieldType::Text, ""),
        meta("labkey_subjid", "demographics", FieldType::Text, ""),
        meta("demo_dob", "demographics", FieldType::Text, ""),
    ])
    .unwrap();
    let member = |instance: &str, relation: &str, fnum: &str, subject: &str, dob: &str| {
        Record::new()
            .with("redcap_id", "7")
            .with("redcap_event_name", events::MEMBER)
            .with("redcap_repeat_instance", instance)
            .with("demo_relation", relation)
            .with("f_idnum", fnum)
            .with("labkey_subjid", subject)
            .with("demo_dob", dob)
            .with("demographics_complete", "2")
    };
    let rows = vec![
        Record::new()
            .with("redcap_id", "7")
            .with("redcap_event_name", events::FAMILY)
            .with("fam_city", "Boston")
            .with("family_info_complete", "2"),
        member("1", "1", "F190001-01", "", "2015-06-01"),
        member("2", "2", "F190001-02", "40", "1985-01-01"),
        member("3", "", "", "", ""),
    ];
    MemoryRedcap::new(dictionary, rows)
}

fn labkey() -> MemoryLabkey {
    let labkey = MemoryLabkey::new();
    labkey.set_rows(
        "study",
        "GetNextSubjectID",
        vec![row([("nextSubjID", json!(41))])],
    );
    labkey
}

fn config(archive: &Path) -> EtlConfig {
    let mut config = EtlConfig {
        archive_path: archive.to_path_buf(),
        referral_instruments: vec!["referral_form".to_string()],
        ..EtlConfig::default()
    };
    config.instruments = BTreeMap::from([
        (
            "referral_form".to_string(),
            InstrumentConfig {
                event: "referral".to_string(),
                date_column: Some("ref_date".to_string()),
                ..InstrumentConfig::default()
            },
        ),
        (
            "demographics".to_string(),
            InstrumentConfig {
                event: events::MEMBER.to_string(),
                is_demo: true,
                date_column: Some("demo_dob".to_string()),
                drop: vec!["labkey_subjid".to_string()],
                ..InstrumentConfig::default()
            },
        ),
        (
            "family_info".to_string(),
            InstrumentConfig {
                event: events::FAMILY.to_string(),
                list_id: true,
                drop: vec!["redcap_id".to_string()],
                ..InstrumentConfig::default()
            },
        ),
    ]);
    let study = |dataset_id: &str, instrument: &str| LabkeyTableConfig {
        schema: "study".to_string(),
        dataset_id: dataset_id.to_string(),
        instruments: vec![instrument.to_string()],
    };
    config.tables = BTreeMap::from([
        ("Referrals".to_string(), study("5001", "referral_form")),
        ("Demographics".to_string(), study("5002", "demographics")),
        (
            "Families".to_string(),
            LabkeyTableConfig {
                schema: "lists".to_string(),
                dataset_id: String::new(),
                instruments: vec!["family_info".to_string()],
            },
        ),
    ]);
    config
}

fn zip_entry(zip_path: &Path, name: &str) -> String {
    let mut zip = zip::ZipArchive::new(fs::File::open(zip_path).unwrap()).unwrap();
    let mut contents = String::new();
    zip.by_name(name).unwrap().read_to_string(&mut contents).unwrap();
    contents
}

#[test]
fn batch_writes_and_packages_the_study_archive() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive");
    let stale = archive.join("study/datasets/dataset9999.tsv");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "old\n").unwrap();

    let referral = referral_project();
    let data = data_project();
    let labkey = labkey();
    let summary = run(
        &config(&archive),
        &referral,
        &data,
        &labkey,
        EtlOptions::default(),
    )
    .unwrap();

    assert_eq!(summary.referrals, 1);
    assert_eq!(summary.families, 1);
    assert_eq!(summary.members, 2);
    assert_eq!(summary.clinical, 0);
    assert_eq!(summary.new_subject_ids, 1);
    assert_eq!(summary.tables.len(), 3);
    assert!(!stale.exists());

    let imports = data.imports();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].len(), 1);
    assert_eq!(imports[0][0].get("labkey_subjid"), "41");
    assert_eq!(imports[0][0].repeat_instance(), "1");

    assert_eq!(summary.archive_zip, dir.path().join("studyArchiveToImport.zip"));
    assert_eq!(
        zip_entry(&summary.archive_zip, "study/datasets/dataset5001.tsv"),
        "referral_id\tf_idnum\tref_reason\tSubjectID\tdate\tlsid\tQCStateLabel\n\
         1\tF190001-01\tSeizures\t41\t2019-03-04\turn:lsid:labkey.com:Study.Data-5:5001.41.20190304.0000.0\t\n"
    );
    assert_eq!(
        zip_entry(&summary.archive_zip, "study/datasets/dataset5002.tsv"),
        "demo_relation\tf_idnum\tSubjectID\tdate\tQCStateLabel\n\
         Proband\tF190001-01\t41\t2015-06-01\t\n\
         Mother\tF190001-02\t40\t1985-01-01\t\n"
    );
    assert_eq!(
        zip_entry(&summary.archive_zip, "lists/Families.tsv"),
        "fam_city\tid\nBoston\t7\n"
    );
}

#[test]
fn dry_run_leaves_redcap_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let data = data_project();
    let summary = run(
        &config(&dir.path().join("archive")),
        &referral_project(),
        &data,
        &labkey(),
        EtlOptions { dry_run: true },
    )
    .unwrap();
    assert_eq!(summary.new_subject_ids, 1);
    assert!(data.imports().is_empty());
    assert!(summary.archive_zip.exists());
}

#[test]
fn failed_write_back_stops_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let data = data_project();
    data.fail_imports();
    let err = run(
        &config(&dir.path().join("archive")),
        &referral_project(),
        &data,
        &labkey(),
        EtlOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, EtlError::WriteBack { .. }));
    assert!(!dir.path().join("studyArchiveToImport.zip").exists());
}

#[test]
fn archive_path_is_required() {
    let err = run(
        &EtlConfig::default(),
        &referral_project(),
        &data_project(),
        &labkey(),
        EtlOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, EtlError::NoArchivePath));
}
