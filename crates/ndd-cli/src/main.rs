//! `ndd`: batch jobs and webhook server for the NDD REDCap projects.

use std::io::{self, IsTerminal};

use clap::{ColorChoice, Parser};
use ndd_cli::logging::{LogConfig, LogFormat, init_logging};
use tracing::level_filters::LevelFilter;

mod cli;
mod commands;
mod summary;

use crate::cli::{Cli, Command, LogFormatArg, LogLevelArg};
use crate::commands::{
    load, run_choices, run_epic_notes, run_etl, run_icd10, run_next_ids, run_redcap_import,
    run_serve,
};
use crate::summary::{
    print_choices, print_etl_summary, print_icd10, print_import_outcome, print_next_ids,
    print_notes_outcome,
};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match run(&cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Command::Etl(args) => {
            let config = load(&cli.config)?;
            print_etl_summary(&run_etl(&config, args)?);
        }
        Command::Serve(args) => {
            let config = load(&cli.config)?;
            run_serve(&config, args)?;
        }
        Command::RedcapImport(args) => {
            let outcome = run_redcap_import(args)?;
            print_import_outcome(&outcome);
            if !outcome.report.is_clean() {
                return Ok(2);
            }
        }
        Command::EpicNotes(args) => {
            let config = load(&cli.config)?;
            print_notes_outcome(&run_epic_notes(&config, args)?);
        }
        Command::Icd10(args) => {
            let (output, diagnoses) = run_icd10(&args.xml)?;
            print_icd10(&output, diagnoses);
        }
        Command::Choices(args) => {
            print_choices(&args.field, &run_choices(args)?);
        }
        Command::NextIds(args) => {
            let config = load(&cli.config)?;
            print_next_ids(&run_next_ids(&config, args)?);
        }
    }
    Ok(0)
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file.clone_from(&cli.log_file);
    config.log_data = cli.log_data;
    config.with_timestamps = matches!(cli.command, Command::Serve(_));
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
