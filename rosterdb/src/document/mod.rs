// Persisted table document - `{ data, indices }` stored as pretty-printed JSON

use crate::error::{Result, StoreError};
use crate::index::IndexSet;
use crate::{FieldMap, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Everything stored for one table: the records keyed by id and the
/// indices derived from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDocument {
    #[serde(default)]
    pub data: BTreeMap<RecordId, FieldMap>,
    #[serde(default)]
    pub indices: IndexSet,
}

impl TableDocument {
    /// Load the document at `path`. Returns None if the file does not exist yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Persistence(format!("Could not load {}: {e}", path.display()))
        })?;
        let document = serde_json::from_str(&content).map_err(|e| {
            StoreError::Persistence(format!("Could not parse {}: {e}", path.display()))
        })?;
        Ok(Some(document))
    }

    /// Rewrite the whole document. The new content goes to a temporary file in
    /// the same directory first and is renamed over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let failed = |e: &dyn std::fmt::Display| {
            StoreError::Persistence(format!("Could not save {}: {e}", path.display()))
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| failed(&e))?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| failed(&e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| failed(&e))?;
        tmp.write_all(b"\n").map_err(|e| failed(&e))?;
        tmp.persist(path).map_err(|e| failed(&e.error))?;
        Ok(())
    }

    /// Highest id in use, or 0 for an empty table
    pub fn max_id(&self) -> RecordId {
        self.data.keys().next_back().copied().unwrap_or(0)
    }
}
