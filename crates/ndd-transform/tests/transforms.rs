use std::fs;

use chrono::NaiveDate;
use ndd_model::{DataDictionary, FieldMeta, FieldType, Record, events, fields};
use ndd_redcap::MemoryRedcap;
use ndd_transform::{epic_notes, icd10, redcap_import};
use tempfile::tempdir;

const DICTIONARY: &str = "\
Variable / Field Name,Form Name,Section Header,Field Type,Field Label,\"Choices, Calculations, OR Slider Labels\",Field Note,Text Validation Type OR Show Slider Number,Identifier?
study_id,intake,,text,Study ID,,,,
visit_date,intake,,text,Visit date,,,date_mdy,
consented,intake,,yesno,Consented,,,,
sex,intake,,radio,Sex,\"1, Male | 2, Female\",,,
seizure_types,intake,,checkbox,Seizure types,\"1, Focal <br>| 2, Generalized | 3, Unknown\",,,
bmi,intake,,calc,BMI,[weight]/[height],,,
";

const DATA: &str = "\
Study ID,Visit Date,Consented,Sex,Seizure Types
S-1,03/04/2019 10:15:00,yes,Female,Focal;Generalized
S-2,11/12/2019,N,Male,
S-3,,perhaps,Other,Absence
";

#[test]
fn spreadsheet_becomes_import_file() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("collaborator.csv");
    let dictionary_path = dir.path().join("dictionary.csv");
    fs::write(&data_path, DATA).unwrap();
    fs::write(&dictionary_path, DICTIONARY).unwrap();

    let outcome = redcap_import::run(&data_path, "Study ID", &dictionary_path).unwrap();
    assert_eq!(outcome.output, dir.path().join("collaborator_redcap_import.csv"));
    assert_eq!(outcome.rows, 3);
    assert_eq!(outcome.report.blanked.len(), 1);
    assert_eq!(outcome.report.unmapped[0].value, "Other");
    assert_eq!(outcome.report.unmapped_checkbox[0].value, "Absence");
    assert_eq!(outcome.report.missing_fields, vec!["bmi"]);

    let written = fs::read_to_string(&outcome.output).unwrap();
    insta::assert_snapshot!(written, @r"
    study_id,visit_date,consented,sex,seizure_types___1,seizure_types___2,seizure_types___3
    S-1,03/04/2019,1,2,1,1,0
    S-2,11/12/2019,0,1,0,0,0
    S-3,,,Other,0,0,0
    ");
}

fn meta(name: &str, form: &str) -> FieldMeta {
    FieldMeta {
        field_name: name.to_string(),
        form_name: form.to_string(),
        field_type: FieldType::Text,
        field_label: String::new(),
        choices: String::new(),
        validation: String::new(),
        identifier: false,
    }
}

fn data_collection() -> MemoryRedcap {
    let dictionary = DataDictionary::new(vec![
        meta("redcap_id", "family_enrollment"),
        meta("demo_mrn", "demographics"),
        meta("epifu_subj", "epifu"),
        meta("epifu_notedate", "epifu"),
        meta("epifu_provider", "epifu"),
    ])
    .unwrap();
    let member = |id: &str, instance: &str, mrn: &str| {
        Record::new()
            .with(fields::RECORD_ID, id)
            .with(fields::EVENT_NAME, events::MEMBER)
            .with(fields::REPEAT_INSTRUMENT, "demographics")
            .with(fields::REPEAT_INSTANCE, instance)
            .with("demo_mrn", mrn)
    };
    let existing_note = Record::new()
        .with(fields::RECORD_ID, "7")
        .with(fields::EVENT_NAME, events::CLINICAL)
        .with(fields::REPEAT_INSTRUMENT, epic_notes::INSTRUMENT)
        .with(fields::REPEAT_INSTANCE, "3")
        .with("epifu_subj", "1")
        .with("epifu_notedate", "2019-05-01")
        .with("epifu_provider", "Smith, Ann");
    MemoryRedcap::new(
        dictionary,
        vec![
            member("7", "1", "100"),
            member("7", "2", "200"),
            member("8", "1", ""),
            existing_note,
        ],
    )
}

const NOTES: &str = "\
Y_MRN,LOG_TIMESTAMP,Employee Name,DEPARTMENT_NAME,LINE,NOTE_TEXT
100,2019-05-01,\"Smith, Ann\",Neurology,1,Interval History: stable. Medications: 
100,2019-05-01,\"Smith, Ann\",Neurology,2,lamotrigine
200,2019-06-10,\"Jones, Bo\",Neurology,1,Magnet: swiped twice
100,2019-07-02,\"Smith, Ann\",Neurology,1,Semiology: staring
999,2019-07-02,\"Smith, Ann\",Neurology,1,Semiology: unmatched
";

#[test]
fn notes_reuse_and_allocate_instances() {
    let dir = tempdir().unwrap();
    let report = dir.path().join("edw_notes.csv");
    fs::write(&report, NOTES).unwrap();
    let output = dir.path().join("epifuclinnotes_import.csv");
    let redcap = data_collection();
    let today = NaiveDate::from_ymd_opt(2020, 1, 15).unwrap();

    let outcome = epic_notes::run(&report, &redcap, &output, true, today).unwrap();
    assert_eq!(outcome.notes, 3);
    assert_eq!(outcome.unmatched, 1);
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.imported, Some(1));

    let imports = redcap.imports();
    assert_eq!(imports.len(), 1);
    let batch = &imports[0];
    let first = &batch[0];
    assert_eq!(first.repeat_instance(), "3");
    assert_eq!(first.get("epifu_inthist"), "stable.");
    assert_eq!(first.get("epifu_meds"), "lamotrigine");
    assert_eq!(first.get("epifu_syncdate"), "2020-01-15");
    assert_eq!(first.repeat_instrument(), "epifu");

    let instances: Vec<(&str, &str)> = batch
        .iter()
        .map(|r| (r.get("epifu_subj"), r.repeat_instance()))
        .collect();
    assert_eq!(instances, vec![("1", "3"), ("1", "4"), ("2", "5")]);

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.starts_with("redcap_id,redcap_event_name,redcap_repeat_instrument"));
    assert_eq!(written.lines().count(), 4);
}

#[test]
fn notes_are_not_pushed_on_request() {
    let dir = tempdir().unwrap();
    let report = dir.path().join("edw_notes.csv");
    fs::write(&report, NOTES).unwrap();
    let redcap = data_collection();
    let today = NaiveDate::from_ymd_opt(2020, 1, 15).unwrap();

    let outcome =
        epic_notes::run(&report, &redcap, &dir.path().join("out.csv"), false, today).unwrap();
    assert_eq!(outcome.imported, None);
    assert!(redcap.imports().is_empty());
}

#[test]
fn icd10_file_is_flattened() {
    let dir = tempdir().unwrap();
    let xml = dir.path().join("icd10cm_tabular_2020.xml");
    fs::write(
        &xml,
        "<ICD10CM.tabular><diag><name>G40</name><desc>Epilepsy, \"recurrent\"</desc></diag></ICD10CM.tabular>",
    )
    .unwrap();

    let (output, count) = icd10::run(&xml).unwrap();
    assert_eq!(count, 1);
    assert_eq!(output, dir.path().join("icd10cm_tabular_2020_parsed.csv"));
    assert_eq!(
        fs::read_to_string(output).unwrap(),
        "G40,\"Epilepsy, \"\"recurrent\"\"\"\n"
    );
}
