//! TOML configuration for every pipeline entry point.
//!
//! API tokens can be left out of the file and supplied through the
//! environment instead (see [`NddConfig::apply_env_overrides`]).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

pub const ENV_REFERRAL_TOKEN: &str = "NDD_REDCAP_REFERRAL_TOKEN";
pub const ENV_DATA_TOKEN: &str = "NDD_REDCAP_DATA_TOKEN";
pub const ENV_SAMPLE_TOKEN: &str = "NDD_REDCAP_SAMPLE_TOKEN";
pub const ENV_LABKEY_API_KEY: &str = "NDD_LABKEY_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NddConfig {
    pub redcap: RedcapConfig,
    pub labkey: LabkeyConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub etl: EtlConfig,
    #[serde(default)]
    pub fields: FieldMaps,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedcapConfig {
    /// API endpoint, e.g. `https://redcap.example.org/api/`.
    pub api_url: String,
    /// Record page prefix; the project id, arm and record id are appended.
    pub base_url: String,
    pub referral_pid: String,
    #[serde(default)]
    pub referral_token: String,
    pub data_pid: String,
    #[serde(default)]
    pub data_token: String,
    #[serde(default)]
    pub sample_pid: String,
    #[serde(default)]
    pub sample_token: String,
}

impl RedcapConfig {
    /// Link to a project's record home page.
    pub fn record_url(&self, pid: &str, record: Option<&str>) -> String {
        match record {
            Some(id) => format!("{}{pid}&arm=1&id={id}", self.base_url),
            None => format!("{}{pid}&arm=1", self.base_url),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabkeyConfig {
    pub server: String,
    pub project: String,
    #[serde(default)]
    pub enrollment_project: String,
    #[serde(default = "default_context_path")]
    pub context_path: String,
    #[serde(default = "default_true")]
    pub use_ssl: bool,
    #[serde(default)]
    pub api_key: String,
}

fn default_context_path() -> String {
    "labkey".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Origins allowed by CORS. Empty means any origin.
    #[serde(default)]
    pub origins: Vec<String>,
    /// LabKey family details page; the F-number is appended.
    #[serde(default)]
    pub family_page_url: String,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            origins: Vec::new(),
            family_page_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Root of the LabKey study archive tree (`lists/`, `study/datasets/`).
    #[serde(default)]
    pub archive_path: PathBuf,
    /// Number of instruments requested per REDCap export call.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Instruments that live in the referral project.
    #[serde(default)]
    pub referral_instruments: Vec<String>,
    /// Fields never copied to LabKey.
    #[serde(default)]
    pub dont_import: Vec<String>,
    #[serde(default = "default_yes_no")]
    pub yes_no: BTreeMap<String, String>,
    #[serde(default)]
    pub instruments: BTreeMap<String, InstrumentConfig>,
    #[serde(default)]
    pub tables: BTreeMap<String, LabkeyTableConfig>,
}

fn default_chunk_size() -> usize {
    10
}

fn default_yes_no() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("1".to_string(), "Yes".to_string()),
        ("0".to_string(), "No".to_string()),
    ])
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            archive_path: PathBuf::new(),
            chunk_size: default_chunk_size(),
            referral_instruments: Vec::new(),
            dont_import: Vec::new(),
            yes_no: default_yes_no(),
            instruments: BTreeMap::new(),
            tables: BTreeMap::new(),
        }
    }
}

/// How one REDCap instrument maps onto LabKey.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// `referral`, or a data-collection event name.
    pub event: String,
    /// Keep the `<instrument>_complete` column as a QC column.
    #[serde(default)]
    pub req_qc: bool,
    /// Demographics-style dataset: one row per subject, no LSID.
    #[serde(default)]
    pub is_demo: bool,
    /// Column that supplies the dataset `date`.
    #[serde(default)]
    pub date_column: Option<String>,
    /// Column holding a piped family-member reference (clinical instruments).
    #[serde(default)]
    pub subject_column: Option<String>,
    /// Columns holding piped family-member references to replace with SubjectIDs.
    #[serde(default)]
    pub subject_refs: Vec<String>,
    /// Add a `familyid` column holding the data-collection record id.
    #[serde(default)]
    pub family_id: bool,
    /// Add an `id` column holding the record id (list tables keyed per family).
    #[serde(default)]
    pub list_id: bool,
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub concat: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub other: BTreeMap<String, OtherFieldConfig>,
}

/// A choice field plus the free-text field explaining its `Other` option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtherFieldConfig {
    pub data: String,
    pub other: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabkeyTableConfig {
    /// `study` or `lists`.
    pub schema: String,
    #[serde(default)]
    pub dataset_id: String,
    pub instruments: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMaps {
    /// Referral progress-note contact fields copied onto proband demographics.
    #[serde(default)]
    pub progress_notes_to_demographics: BTreeMap<String, String>,
    #[serde(default)]
    pub sinai_provider_emails: BTreeMap<String, String>,
    #[serde(default)]
    pub nyu_provider_emails: BTreeMap<String, String>,
}

impl NddConfig {
    pub fn from_toml(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| ModelError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fill API credentials from the environment when set.
    pub fn apply_env_overrides(&mut self) {
        let overrides: [(&str, &mut String); 4] = [
            (ENV_REFERRAL_TOKEN, &mut self.redcap.referral_token),
            (ENV_DATA_TOKEN, &mut self.redcap.data_token),
            (ENV_SAMPLE_TOKEN, &mut self.redcap.sample_token),
            (ENV_LABKEY_API_KEY, &mut self.labkey.api_key),
        ];
        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    tracing::debug!(var, "credential taken from environment");
                    *slot = value;
                }
            }
        }
    }
}

/// Read a config file and apply environment overrides.
pub fn load_config(path: &Path) -> Result<NddConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = NddConfig::from_toml(&text, path)?;
    config.apply_env_overrides();
    Ok(config)
}
