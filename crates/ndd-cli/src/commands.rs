use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use ndd_cli::logging::redact_value;
use ndd_core::{ChoiceMap, coerce_date, next_data_collection_id, next_f_number};
use ndd_etl::{EtlOptions, EtlSummary};
use ndd_ingest::{load_dictionary, sibling_path};
use ndd_labkey::LabkeyClient;
use ndd_model::{FNumber, NddConfig, Record, RedcapConfig, events, fields, load_config};
use ndd_redcap::{RecordQuery, RedcapApi, RedcapClient};
use ndd_server::{AppState, Services};
use ndd_transform::{ImportOutcome, NotesOutcome};
use tracing::{info, info_span, trace};

use crate::cli::{ChoicesArgs, EpicNotesArgs, EtlArgs, NextIdsArgs, RedcapImportArgs, ServeArgs};

const FAMILY_FORM: &str = "family_enrollment";
const F_NUMBER: &str = "fnum";

pub fn load(path: &Path) -> Result<NddConfig> {
    load_config(path).with_context(|| format!("load config {}", path.display()))
}

fn redcap_client(config: &RedcapConfig, token: &str, project: &str) -> Result<RedcapClient> {
    if token.trim().is_empty() {
        bail!("no API token configured for the {project} project");
    }
    RedcapClient::new(&config.api_url, token, project)
        .with_context(|| format!("create {project} REDCap client"))
}

fn labkey_client(config: &NddConfig) -> Result<LabkeyClient> {
    LabkeyClient::from_config(&config.labkey).context("create LabKey client")
}

pub fn run_etl(config: &NddConfig, args: &EtlArgs) -> Result<EtlSummary> {
    let span = info_span!("etl", dry_run = args.dry_run);
    let _guard = span.enter();
    let referral = redcap_client(&config.redcap, &config.redcap.referral_token, "referral")?;
    let data = redcap_client(&config.redcap, &config.redcap.data_token, "data collection")?;
    let labkey = labkey_client(config)?;
    let summary = ndd_etl::run(
        &config.etl,
        &referral,
        &data,
        &labkey,
        EtlOptions {
            dry_run: args.dry_run,
        },
    )
    .context("ETL run")?;
    info!(zip = %summary.archive_zip.display(), "study archive ready");
    Ok(summary)
}

/// Build the clients, then serve on a tokio runtime.
///
/// The blocking HTTP clients must be dropped outside the runtime, so the
/// services are kept alive here until it has shut down.
pub fn run_serve(config: &NddConfig, args: &ServeArgs) -> Result<()> {
    let mut server = config.server.clone();
    if let Some(bind) = &args.bind {
        server.bind.clone_from(bind);
    }
    let referral = redcap_client(&config.redcap, &config.redcap.referral_token, "referral")?;
    let data = redcap_client(&config.redcap, &config.redcap.data_token, "data collection")?;
    let sample = RedcapClient::new(
        &config.redcap.api_url,
        &config.redcap.sample_token,
        "sample",
    )
    .context("create sample REDCap client")?;
    let labkey = labkey_client(config)?;

    let services = Arc::new(
        Services::load(
            Arc::new(referral),
            Arc::new(data),
            Arc::new(sample),
            Arc::new(labkey),
            config.fields.clone(),
        )
        .context("load data dictionaries")?,
    );
    let state = AppState::new(
        Arc::clone(&services),
        config.redcap.clone(),
        &server.family_page_url,
    );

    let runtime = tokio::runtime::Runtime::new().context("start async runtime")?;
    let served = runtime.block_on(ndd_server::serve(state, &server));
    drop(runtime);
    drop(services);
    served.context("webhook server")
}

pub fn run_redcap_import(args: &RedcapImportArgs) -> Result<ImportOutcome> {
    let outcome = ndd_transform::redcap_import::run(&args.data, &args.id_field, &args.dictionary)
        .with_context(|| format!("translate {}", args.data.display()))?;
    for value in &outcome.report.unmapped {
        trace!(field = %value.field, row = value.row, value = redact_value(&value.value), "unmapped label");
    }
    Ok(outcome)
}

pub fn run_epic_notes(config: &NddConfig, args: &EpicNotesArgs) -> Result<NotesOutcome> {
    let data = redcap_client(&config.redcap, &config.redcap.data_token, "data collection")?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| sibling_path(&args.export, "_epifu_import", "csv"));
    ndd_transform::epic_notes::run(
        &args.export,
        &data,
        &output,
        !args.no_push,
        Local::now().date_naive(),
    )
    .with_context(|| format!("load notes from {}", args.export.display()))
}

pub fn run_icd10(xml: &Path) -> Result<(PathBuf, usize)> {
    ndd_transform::icd10::run(xml).with_context(|| format!("parse {}", xml.display()))
}

pub fn run_choices(args: &ChoicesArgs) -> Result<ChoiceMap> {
    let dictionary = load_dictionary(&args.dictionary)
        .with_context(|| format!("load dictionary {}", args.dictionary.display()))?;
    let Some(field) = dictionary.get(&args.field) else {
        bail!("{} is not in {}", args.field, args.dictionary.display());
    };
    if !field.field_type.has_choices() {
        bail!("{} is a {} field without choices", args.field, field.field_type);
    }
    Ok(ChoiceMap::parse(&field.choices))
}

#[derive(Debug, Clone)]
pub struct NextIds {
    pub data_collection_id: u64,
    pub f_number: FNumber,
    pub date: NaiveDate,
}

pub fn run_next_ids(config: &NddConfig, args: &NextIdsArgs) -> Result<NextIds> {
    let today = Local::now().date_naive();
    let appointment = args.date.as_deref().unwrap_or("");
    if !appointment.is_empty() && coerce_date(appointment).is_none() {
        bail!("unrecognised date {appointment}");
    }
    let data = redcap_client(&config.redcap, &config.redcap.data_token, "data collection")?;
    let query = RecordQuery::all()
        .forms([FAMILY_FORM])
        .fields([fields::RECORD_ID]);
    let rows = data.export_rows(&query).context("export families")?;
    next_ids(&rows, appointment, today)
}

fn next_ids(rows: &[Record], appointment: &str, today: NaiveDate) -> Result<NextIds> {
    let data_collection_id = next_data_collection_id(rows.iter().map(Record::record_id));
    let families = rows.iter().filter(|r| r.event() == events::FAMILY);
    let f_number = next_f_number(appointment, today, families.map(|r| r.get(F_NUMBER)))?;
    Ok(NextIds {
        data_collection_id,
        f_number,
        date: coerce_date(appointment).unwrap_or(today),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(id: &str, fnum: &str) -> Record {
        Record::new()
            .with(fields::RECORD_ID, id)
            .with(fields::EVENT_NAME, events::FAMILY)
            .with(F_NUMBER, fnum)
    }

    #[test]
    fn next_ids_follow_existing_families() {
        let rows = vec![
            family("4", "F200002"),
            family("9", "F200005"),
            family("2", "F190040"),
            Record::new()
                .with(fields::RECORD_ID, "9")
                .with(fields::EVENT_NAME, events::MEMBER),
        ];
        let today = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        let ids = next_ids(&rows, "2020-11-30", today).unwrap();
        assert_eq!(ids.data_collection_id, 10);
        assert_eq!(ids.f_number.to_string(), "F200006");
        assert_eq!(ids.date, NaiveDate::from_ymd_opt(2020, 11, 30).unwrap());

        let ids = next_ids(&rows, "", today).unwrap();
        assert_eq!(ids.f_number.to_string(), "F210001");
        assert_eq!(ids.date, today);
    }
}
