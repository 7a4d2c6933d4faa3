use std::path::{Path, PathBuf};

/// Default directory holding one `<table>.json` document per table
pub const DEFAULT_DATA_DIR: &str = "db";

/// Default table definition source
pub const DEFAULT_SCHEMA_PATH: &str = "table_definitions.json";

/// Where a store keeps its documents and where it reads its table definitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub schema_path: PathBuf,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>, schema_path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            data_dir: data_dir.into(),
            schema_path: schema_path.into(),
        }
    }

    /// Persisted document path for `table`
    pub fn document_path(&self, table: &str) -> PathBuf {
        document_path(&self.data_dir, table)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::new(DEFAULT_DATA_DIR, DEFAULT_SCHEMA_PATH)
    }
}

pub(crate) fn document_path(data_dir: &Path, table: &str) -> PathBuf {
    data_dir.join(format!("{table}.json"))
}
