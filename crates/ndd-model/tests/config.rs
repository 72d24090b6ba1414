//! Tests for configuration loading.

use std::io::Write;

use ndd_model::load_config;

const SAMPLE: &str = r#"
[redcap]
api_url = "https://redcap.example.org/api/"
base_url = "https://redcap.example.org/redcap_v9/DataEntry/record_home.php?pid="
referral_pid = "101"
referral_token = "REFTOKEN"
data_pid = "102"
data_token = "DATATOKEN"

[labkey]
server = "labkey.example.org:8443"
project = "NDDdb"

[server]
origins = ["https://redcap.example.org"]
family_page_url = "https://labkey.example.org/labkey/NDDdb/wiki-page.view?name=Family%20Details&Fnum="

[etl]
archive_path = "/srv/ndd/archive"
referral_instruments = ["physician_referral_form"]
dont_import = ["demo_firstname", "demo_lastname"]

[etl.instruments.demographics]
event = "family_member_arm_1"
is_demo = true
date_column = "demo_dateadded"
drop = ["demo_copycontactfrom"]

[etl.instruments.demographics.other.demo_race]
data = "demo_race"
other = "demo_race_other"

[etl.tables.Demographics]
schema = "study"
dataset_id = "5001"
instruments = ["demographics"]

[fields.sinai_provider_emails]
"1" = "dr.one@example.org"
"#;

#[test]
fn loads_sample_config_with_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.redcap.data_pid, "102");
    assert_eq!(config.labkey.context_path, "labkey");
    assert!(config.labkey.use_ssl);
    assert_eq!(config.server.bind, "0.0.0.0:5000");
    assert_eq!(config.etl.chunk_size, 10);
    assert_eq!(config.etl.yes_no.get("1").map(String::as_str), Some("Yes"));

    let demo = &config.etl.instruments["demographics"];
    assert!(demo.is_demo);
    assert_eq!(demo.date_column.as_deref(), Some("demo_dateadded"));
    assert_eq!(demo.other["demo_race"].other, "demo_race_other");

    let table = &config.etl.tables["Demographics"];
    assert_eq!(table.schema, "study");
    assert_eq!(table.instruments, vec!["demographics"]);

    assert_eq!(
        config.fields.sinai_provider_emails.get("1").map(String::as_str),
        Some("dr.one@example.org")
    );
}

#[test]
fn record_urls() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();
    let config = load_config(file.path()).unwrap();

    assert_eq!(
        config.redcap.record_url("101", Some("7")),
        "https://redcap.example.org/redcap_v9/DataEntry/record_home.php?pid=101&arm=1&id=7"
    );
    assert!(config.redcap.record_url("101", None).ends_with("pid=101&arm=1"));
}

#[test]
fn malformed_config_reports_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[redcap\napi_url = 1").unwrap();
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("failed to parse config"));
}
