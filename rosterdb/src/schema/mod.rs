mod parser;
mod types;

pub use parser::{parse_schema, parse_schema_str};
pub use types::{
    index_name, Constraints, FieldDefinition, FieldType, SchemaDefinition, TableDefinition,
};

use crate::error::{Result, StoreError};
use std::path::{Path, PathBuf};

/// Parsed table definition source. Read once, then hands out per-table
/// definitions to every service built from it.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    source: PathBuf,
    definition: SchemaDefinition,
}

impl SchemaCatalog {
    /// Read and parse the definition source at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let source = path.as_ref().to_path_buf();
        let definition = parse_schema(&source)?;
        log::debug!(
            "Loaded {} table definition(s) from {}",
            definition.tables.len(),
            source.display()
        );
        Ok(SchemaCatalog { source, definition })
    }

    /// Build a catalog from an in-memory definition string
    pub fn parse(content: &str) -> Result<Self> {
        Ok(SchemaCatalog {
            source: PathBuf::from("<inline>"),
            definition: parse_schema_str(content)?,
        })
    }

    /// Resolve the definition of one table
    pub fn table(&self, name: &str) -> Result<TableDefinition> {
        self.definition.table(name).cloned().ok_or_else(|| {
            StoreError::Configuration(format!(
                "Table definition not found: {name} (in {})",
                self.source.display()
            ))
        })
    }

}

/// Read the definition source and return the entry for `table`
pub fn load_definition(path: impl AsRef<Path>, table: &str) -> Result<TableDefinition> {
    SchemaCatalog::open(path)?.table(table)
}
