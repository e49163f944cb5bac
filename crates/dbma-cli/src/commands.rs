use anyhow::{Context, Result, anyhow};
use comfy_table::Table;

use dbma_cli::pipeline::{ImportOptions, run_import};
use dbma_model::{OutcomeStatus, SchemaMode, TransformerConfig};
use dbma_transform::RecordingLoader;

use crate::cli::{ImportArgs, RulesArgs, SchemaModeArg};
use crate::summary::apply_table_style;
use crate::types::ImportResult;

pub fn run_import_command(args: &ImportArgs) -> Result<ImportResult> {
    let config = load_config(&args.config)?;
    let sep = u8::try_from(args.sep)
        .map_err(|_| anyhow!("--sep must be a single ASCII character"))?;
    let options = ImportOptions {
        files_location: args.files_location.clone(),
        collection_id: args.collection_id.clone(),
        db_version: args.db_version.clone(),
        collection_version: args.collection_version.clone(),
        sep,
        schema_mode: schema_mode(args.schema_mode),
        consolidate_tables: args.consolidate_tables,
        skip_validation: args.skip_validation,
        import_comment: args.import_comment.clone(),
    };

    let mut loader = RecordingLoader::default();
    let run = run_import(&options, &config, &mut loader)?;
    let has_failures = run
        .outcomes
        .values()
        .any(|outcome| outcome.status == OutcomeStatus::Failed);

    Ok(ImportResult {
        collection_key: run.run.collection_key,
        db_version: run.run.db_version,
        collection_version: run.run.collection_version,
        ingested: run.report.loaded,
        skipped: run.report.skipped,
        invalid: run.report.invalid,
        outcomes: run.outcomes,
        produced_files: run.produced_files,
        handoff: loader.loads,
        views: loader.views.into_iter().map(|(name, _)| name).collect(),
        has_failures,
    })
}

pub fn run_rules(args: &RulesArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let mut table = Table::new();
    table.set_header(vec![
        "Rule", "Priority", "Group", "Type", "Action", "Status", "DB window", "Script window",
    ]);
    apply_table_style(&mut table);
    for id in config.rules.ids_by_priority() {
        let Some(rule) = config.rules.get(id) else {
            continue;
        };
        table.add_row(vec![
            id.to_string(),
            rule.priority.to_string(),
            rule.execution_group.clone(),
            format!("{:?}", rule.kind),
            format!("{:?}", rule.action),
            rule.status.clone(),
            format!("{}..{}", rule.min_db_version, rule.max_db_version),
            format!(
                "{}..{}",
                rule.min_sql_script_version, rule.max_sql_script_version
            ),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn load_config(path: &std::path::Path) -> Result<TransformerConfig> {
    TransformerConfig::from_path(path)
        .with_context(|| format!("read configuration {}", path.display()))
}

fn schema_mode(arg: SchemaModeArg) -> SchemaMode {
    match arg {
        SchemaModeArg::Manual => SchemaMode::Manual,
        SchemaModeArg::Auto => SchemaMode::Auto,
        SchemaModeArg::Fillgap => SchemaMode::Fillgap,
    }
}
