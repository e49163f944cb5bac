//! CLI argument definitions for the migration-assessment transformer.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "dbma",
    version,
    about = "Database migration assessment transformer",
    long_about = "Transform collector extract files with the configured rule set.\n\n\
                  Ingests per-table CSV extracts, runs the prioritized rule passes,\n\
                  and materializes produced tables next to their sources."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

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
}

#[derive(Subcommand)]
pub enum Command {
    /// Ingest a collection of extract files and run the rule passes.
    Import(ImportArgs),

    /// List the configured rules with their gating windows.
    Rules(RulesArgs),
}

#[derive(Parser)]
pub struct ImportArgs {
    /// Directory holding the collector extract files.
    #[arg(value_name = "FILES_LOCATION")]
    pub files_location: PathBuf,

    /// Transformer configuration document (parameters, rules, table schemas).
    #[arg(long = "config", value_name = "PATH")]
    pub config: PathBuf,

    /// Only ingest files whose names end with this collection id.
    #[arg(long = "collection-id", value_name = "ID", default_value = "")]
    pub collection_id: String,

    /// Override the database version parsed from the collection key.
    #[arg(long = "db-version", value_name = "VERSION")]
    pub db_version: Option<String>,

    /// Override the collector script version parsed from the collection key.
    #[arg(long = "collection-version", value_name = "VERSION")]
    pub collection_version: Option<String>,

    /// Field separator of the extract files.
    ///
    /// Collections produced by scripts older than 2.0.5 always use ','
    /// regardless of this setting.
    #[arg(long = "sep", default_value = ";")]
    pub sep: char,

    /// Schema reconciliation mode for ingested tables.
    #[arg(long = "schema-mode", value_enum, default_value = "fillgap")]
    pub schema_mode: SchemaModeArg,

    /// Append repeated table names onto the existing frame instead of
    /// replacing it. Useful when importing several collections at once.
    #[arg(long = "consolidate-tables")]
    pub consolidate_tables: bool,

    /// Ingest files even when they fail the extract validation checks.
    #[arg(long = "skip-validation")]
    pub skip_validation: bool,

    /// Free-form comment recorded with the run.
    #[arg(long = "import-comment", default_value = "")]
    pub import_comment: String,
}

#[derive(Parser)]
pub struct RulesArgs {
    /// Transformer configuration document.
    #[arg(long = "config", value_name = "PATH")]
    pub config: PathBuf,
}

/// Schema reconciliation choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum SchemaModeArg {
    Manual,
    Auto,
    Fillgap,
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
