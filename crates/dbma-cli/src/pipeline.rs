//! Import run orchestration with explicit stages.
//!
//! The run follows these stages in order:
//! 1. **Discover**: list extract files, check version consistency
//! 2. **Resolve**: run parameters from the collection key, schema baseline
//! 3. **Ingest**: validate and load extracts into the table registry
//! 4. **Transform**: reshape pass, then execution group "1"
//! 5. **Handoff**: produced files go to the warehouse loader
//! 6. **Post-load**: execution group "2"

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::{info, info_span};

use dbma_ingest::{
    IngestOptions, IngestReport, ReadOptions, TableRegistry, collection_key, db_version_of_key,
    delimiter_for, ensure_consistent_db_versions, ensure_single_script_version, ingest_files,
    list_extract_files,
};
use dbma_model::{
    OutcomeStatus, RuleOutcomes, RunParameters, SchemaMode, SchemaRegistry, TransformerConfig,
};
use dbma_transform::{
    EmitOptions, Executor, ExecutorState, WarehouseLoader, handoff_produced_files,
};

/// Run options resolved from the command line.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Directory holding the collector extract files. Produced files are
    /// written back here.
    pub files_location: PathBuf,
    /// Suffix filter for extract file names; empty matches every `.csv`.
    pub collection_id: String,
    /// Override for the database version parsed from the collection key.
    pub db_version: Option<String>,
    /// Override for the collector script version parsed from the collection key.
    pub collection_version: Option<String>,
    /// Configured field separator; collections older than 2.0.5 always use `,`.
    pub sep: u8,
    pub schema_mode: SchemaMode,
    /// Append repeated table names instead of replacing the earlier frame.
    pub consolidate_tables: bool,
    pub skip_validation: bool,
    pub import_comment: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            files_location: PathBuf::new(),
            collection_id: String::new(),
            db_version: None,
            collection_version: None,
            sep: b';',
            schema_mode: SchemaMode::default(),
            consolidate_tables: false,
            skip_validation: false,
            import_comment: String::new(),
        }
    }
}

/// Everything an import run produced, for the summary and the exit code.
#[derive(Debug)]
pub struct ImportRun {
    pub run: RunParameters,
    pub report: IngestReport,
    pub outcomes: RuleOutcomes,
    pub produced_files: Vec<PathBuf>,
}

/// Resolve the run parameters from the first discovered file name, with CLI
/// overrides taking precedence. A run without a resolvable database version
/// cannot gate rules and is fatal.
pub fn resolve_run_parameters(
    files: &[PathBuf],
    options: &ImportOptions,
) -> Result<RunParameters> {
    let script_version = ensure_single_script_version(files)?;
    let first = files
        .first()
        .ok_or_else(|| anyhow!("no extract files to resolve the collection key from"))?;
    let key = collection_key(first).ok_or_else(|| {
        anyhow!(
            "file name {} carries no collection key token",
            first.display()
        )
    })?;
    let db_version = match &options.db_version {
        Some(version) => version.clone(),
        None => db_version_of_key(&key).ok_or_else(|| {
            anyhow!("cannot resolve the database version from '{key}'; pass --db-version")
        })?,
    };
    let collection_version = options
        .collection_version
        .clone()
        .unwrap_or(script_version);
    Ok(RunParameters {
        // Produced files reuse the key verbatim, .csv suffix included.
        collection_key: format!("{key}.csv"),
        db_version,
        collection_version,
        import_comment: options.import_comment.clone(),
    })
}

/// Run the whole import: discovery, ingest, both rule passes, and the
/// warehouse handoff in between.
pub fn run_import(
    options: &ImportOptions,
    config: &TransformerConfig,
    loader: &mut dyn WarehouseLoader,
) -> Result<ImportRun> {
    let files = list_extract_files(&options.files_location, &options.collection_id)?;
    ensure_consistent_db_versions(&files)?;
    let run = resolve_run_parameters(&files, options)?;
    info!(
        collection_key = %run.collection_key,
        db_version = %run.db_version,
        collection_version = %run.collection_version,
        file_count = files.len(),
        "resolved run parameters"
    );

    let mut schema = SchemaRegistry::resolve(
        &config.table_schemas,
        &run.collection_version,
        &run.db_version,
    )
    .context("resolve the table schemas for this collection")?;
    let delimiter = delimiter_for(&run.collection_version, options.sep);

    let ingest_options = IngestOptions {
        read: ReadOptions {
            skip_rows: 1,
            delimiter,
        },
        schema_mode: options.schema_mode,
        consolidate_tables: options.consolidate_tables,
        skip_validation: options.skip_validation,
    };
    let mut registry = TableRegistry::new();
    let ingest_span = info_span!("ingest", file_count = files.len());
    let report = ingest_span.in_scope(|| {
        ingest_files(
            &files,
            ingest_options,
            &config.parameters,
            &mut schema,
            &mut registry,
        )
    })?;
    info!(
        loaded = report.loaded.len(),
        skipped = report.skipped.len(),
        invalid = report.invalid.len(),
        "ingest complete"
    );

    let emit = EmitOptions {
        files_location: options.files_location.clone(),
        collection_key: run.collection_key.clone(),
        delimiter,
    };
    let mut state = ExecutorState::default();
    let mut outcomes = RuleOutcomes::new();
    {
        let mut executor = Executor {
            registry: &mut registry,
            schema: &mut schema,
            run: &run,
            emit: &emit,
            loader: &mut *loader,
            state: &mut state,
        };
        let reshape_span = info_span!("reshape_pass");
        merge_outcomes(
            &mut outcomes,
            reshape_span.in_scope(|| executor.run_reshape_pass(&config.parameters, &config.rules)),
        );
        let group1_span = info_span!("pass", group = "1");
        merge_outcomes(
            &mut outcomes,
            group1_span.in_scope(|| executor.run_group("1", &config.rules)),
        );
    }

    handoff_produced_files(&state.produced_files, &schema, &mut *loader)
        .context("hand produced files to the warehouse loader")?;
    info!(
        produced = state.produced_files.len(),
        "warehouse handoff complete"
    );

    {
        let mut executor = Executor {
            registry: &mut registry,
            schema: &mut schema,
            run: &run,
            emit: &emit,
            loader: &mut *loader,
            state: &mut state,
        };
        let group2_span = info_span!("pass", group = "2");
        merge_outcomes(
            &mut outcomes,
            group2_span.in_scope(|| executor.run_group("2", &config.rules)),
        );
    }

    Ok(ImportRun {
        run,
        report,
        outcomes,
        produced_files: state.produced_files,
    })
}

/// Merge a later pass into the accumulated outcomes. Every pass re-gates the
/// whole rule set, so a rule executed in pass one surfaces as a group skip in
/// pass two; the definitive outcome must not be overwritten by that skip.
pub fn merge_outcomes(accumulated: &mut RuleOutcomes, pass: RuleOutcomes) {
    for (id, outcome) in pass {
        match accumulated.get(&id) {
            Some(existing)
                if existing.status != OutcomeStatus::Skipped
                    && outcome.status == OutcomeStatus::Skipped => {}
            _ => {
                accumulated.insert(id, outcome);
            }
        }
    }
}
