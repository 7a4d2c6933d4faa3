use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Top-level table definition source (`table_definitions.json`)
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
}

/// Definition of a single table (entity type)
#[derive(Debug, Clone, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    /// Field definitions in declaration order
    #[serde(default, deserialize_with = "ordered_fields")]
    pub definitions: Vec<FieldDefinition>,
    /// Extra non-unique fields to keep a secondary index for
    #[serde(default)]
    pub indices: Vec<String>,
}

/// A single named field with its type and constraints
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub constraints: Constraints,
}

/// Field type enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    #[serde(alias = "int")]
    Integer,
    Number,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(untagged)]
    Custom(std::string::String),
}

/// Per-field constraint object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub not_null: bool,
    /// Exact character length for string values
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

#[derive(Deserialize)]
struct RawField {
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default)]
    constraints: Option<Constraints>,
}

fn ordered_fields<'de, D>(deserializer: D) -> std::result::Result<Vec<FieldDefinition>, D::Error>
where
    D: Deserializer<'de>,
{
    // serde_yaml::Mapping keeps insertion order, serde's HashMap would not
    let mapping = serde_yaml::Mapping::deserialize(deserializer)?;
    mapping
        .into_iter()
        .map(|(key, value)| {
            let name = key
                .as_str()
                .ok_or_else(|| D::Error::custom("field names must be strings"))?
                .to_string();
            let raw: RawField = serde_yaml::from_value(value)
                .map_err(|e| D::Error::custom(format!("field '{name}': {e}")))?;
            Ok(FieldDefinition {
                name,
                field_type: raw.field_type,
                constraints: raw.constraints.unwrap_or_default(),
            })
        })
        .collect()
}

/// Name of the index kept for `field`
pub fn index_name(field: &str) -> String {
    format!("{field}_id_idx")
}

impl SchemaDefinition {
    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }
}

impl TableDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.definitions.iter().find(|f| f.name == name)
    }

    pub fn is_unique(&self, field: &str) -> bool {
        self.field(field).map(|f| f.constraints.unique).unwrap_or(false)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.definitions.iter().filter(|f| f.constraints.unique)
    }

    /// Every field that carries an index: unique fields first, then the
    /// declared `indices` in order, without repeats.
    pub fn indexed_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.unique_fields().map(|f| f.name.as_str()).collect();
        for name in &self.indices {
            if !fields.contains(&name.as_str()) {
                fields.push(name);
            }
        }
        fields
    }
}
