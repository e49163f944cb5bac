//! Warehouse Loader boundary.
//!
//! The engine never talks to a warehouse itself: produced files, their
//! resolved schemas, and CREATE VIEW statements are handed across this trait.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::info;

use dbma_ingest::table_name;
use dbma_model::{ColumnSpec, SchemaRegistry};

pub trait WarehouseLoader {
    /// Create (or replace) a view from verbatim SQL text.
    fn create_view(&mut self, name: &str, sql: &str) -> Result<()>;

    /// Load one produced file with its resolved column list.
    fn load_table(&mut self, table: &str, file: &Path, columns: &[ColumnSpec]) -> Result<()>;
}

/// Records the handoff instead of persisting it. Used when the run targets
/// CSV output only, and by tests asserting what would have been loaded.
#[derive(Debug, Default)]
pub struct RecordingLoader {
    pub views: Vec<(String, String)>,
    pub loads: Vec<(String, PathBuf)>,
}

impl WarehouseLoader for RecordingLoader {
    fn create_view(&mut self, name: &str, sql: &str) -> Result<()> {
        info!(view = %name, "recording view definition");
        self.views.push((name.to_string(), sql.to_string()));
        Ok(())
    }

    fn load_table(&mut self, table: &str, file: &Path, _columns: &[ColumnSpec]) -> Result<()> {
        self.loads.push((table.to_string(), file.to_path_buf()));
        Ok(())
    }
}

/// Hand every produced file to the loader with its schema entry. A produced
/// table without a schema entry is a hard error: emission reconciles AUTO, so
/// a miss here means the run state is inconsistent.
pub fn handoff_produced_files(
    produced: &[PathBuf],
    schema: &SchemaRegistry,
    loader: &mut dyn WarehouseLoader,
) -> Result<()> {
    for file in produced {
        let Some(table) = table_name(file) else {
            bail!("produced file {} has no table token", file.display());
        };
        let Some(columns) = schema.get(&table) else {
            bail!("no schema entry for produced table '{table}'");
        };
        loader.load_table(&table, file, columns)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbma_model::ColumnSpec;

    #[test]
    fn handoff_requires_a_schema_entry() {
        let mut schema = SchemaRegistry::new();
        let mut loader = RecordingLoader::default();
        let files = vec![PathBuf::from("/tmp/opdbt__mystery__121_2.0.3_x.csv")];
        assert!(handoff_produced_files(&files, &schema, &mut loader).is_err());

        schema.insert(
            "mystery",
            vec![ColumnSpec::from(("A".to_string(), "STRING".to_string()))],
        );
        handoff_produced_files(&files, &schema, &mut loader).unwrap();
        assert_eq!(loader.loads.len(), 1);
        assert_eq!(loader.loads[0].0, "mystery");
    }
}
