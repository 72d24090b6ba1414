//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "ndd",
    version,
    about = "NDD REDCap and LabKey integration",
    long_about = "Batch jobs and webhook server for the NDD referral, data-collection and \
                  sample REDCap projects and the LabKey warehouse.\n\n\
                  Commands that talk to REDCap or LabKey read ndd.toml (see --config); \
                  API tokens may come from the environment instead."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file.
    #[arg(
        long,
        value_name = "PATH",
        env = "NDD_CONFIG",
        default_value = "ndd.toml",
        global = true
    )]
    pub config: PathBuf,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for warnings only).
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow participant values in trace logs.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Copy REDCap records into a LabKey study archive and zip it.
    Etl(EtlArgs),

    /// Run the REDCap data-entry-trigger webhook server.
    Serve(ServeArgs),

    /// Turn a spreadsheet into a REDCap import file using a data dictionary.
    RedcapImport(RedcapImportArgs),

    /// Load an Epic follow-up note export into the data-collection project.
    EpicNotes(EpicNotesArgs),

    /// Extract (code, description) pairs from the ICD-10-CM tabular XML.
    Icd10(Icd10Args),

    /// Show the parsed choice list of a dictionary field.
    Choices(ChoicesArgs),

    /// Show the next data-collection id and F-number.
    NextIds(NextIdsArgs),
}

#[derive(Parser)]
pub struct EtlArgs {
    /// Build the archive without writing subject ids back to REDCap.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Parser)]
pub struct ServeArgs {
    /// Listen address (overrides `[server] bind`).
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

#[derive(Parser)]
pub struct RedcapImportArgs {
    /// Data file (.csv, .tsv, .tab, .xls or .xlsx).
    #[arg(value_name = "DATA")]
    pub data: PathBuf,

    /// Column holding the record id.
    #[arg(value_name = "ID_FIELD")]
    pub id_field: String,

    /// REDCap data dictionary export.
    #[arg(value_name = "DICTIONARY")]
    pub dictionary: PathBuf,
}

#[derive(Parser)]
pub struct EpicNotesArgs {
    /// Epic EDW note export.
    #[arg(value_name = "EXPORT")]
    pub export: PathBuf,

    /// Import file path (default: <EXPORT stem>_epifu_import.csv).
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Write the import file without pushing it to REDCap.
    #[arg(long = "no-push")]
    pub no_push: bool,
}

#[derive(Parser)]
pub struct Icd10Args {
    #[arg(value_name = "XML")]
    pub xml: PathBuf,
}

#[derive(Parser)]
pub struct ChoicesArgs {
    #[arg(value_name = "FIELD")]
    pub field: String,

    /// REDCap data dictionary export.
    #[arg(long, value_name = "FILE")]
    pub dictionary: PathBuf,
}

#[derive(Parser)]
pub struct NextIdsArgs {
    /// Appointment date the F-number is for (default: today).
    #[arg(long, value_name = "DATE")]
    pub date: Option<String>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_are_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_bind_override_parses() {
        let cli = Cli::try_parse_from(["ndd", "--config", "site.toml", "serve", "--bind", "127.0.0.1:8080"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("site.toml"));
        match cli.command {
            Command::Serve(args) => assert_eq!(args.bind.as_deref(), Some("127.0.0.1:8080")),
            _ => panic!("expected serve"),
        }
    }
}
