use crate::error::{Result, StoreError};
use super::types::SchemaDefinition;
use std::collections::HashSet;
use std::path::Path;

/// Parse a table definition file into a SchemaDefinition.
/// JSON is the usual format; YAML is accepted as well.
pub fn parse_schema(path: &Path) -> Result<SchemaDefinition> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        StoreError::Configuration(format!(
            "Could not load table definitions from {}: {e}",
            path.display()
        ))
    })?;
    parse_schema_str(&content)
}

/// Parse a table definition string into a SchemaDefinition
pub fn parse_schema_str(content: &str) -> Result<SchemaDefinition> {
    let schema: SchemaDefinition = serde_yaml::from_str(content)
        .map_err(|e| StoreError::Configuration(format!("Invalid table definitions: {e}")))?;
    check_schema(&schema)?;
    Ok(schema)
}

fn check_schema(schema: &SchemaDefinition) -> Result<()> {
    let mut seen = HashSet::new();
    for table in &schema.tables {
        if !seen.insert(table.name.as_str()) {
            return Err(StoreError::Configuration(format!(
                "Table '{}' is defined more than once",
                table.name
            )));
        }

        for indexed in &table.indices {
            if table.field(indexed).is_none() {
                return Err(StoreError::Configuration(format!(
                    "Table '{}' declares an index on unknown field '{indexed}'",
                    table.name
                )));
            }
        }

        for field in &table.definitions {
            if let (Some(min), Some(max)) = (field.constraints.min, field.constraints.max) {
                if min > max {
                    return Err(StoreError::Configuration(format!(
                        "Field '{}.{}' has min {min} greater than max {max}",
                        table.name, field.name
                    )));
                }
            }
        }
    }
    Ok(())
}
