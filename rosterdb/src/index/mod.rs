// Secondary indices kept alongside the records of one table.
//
// Each indexed field owns one `Index` under the name `<field>_id_idx`. The
// shape (unique slot vs ordered bucket) is fixed when the index is created
// from the table definition.

use crate::error::{Result, StoreError};
use crate::schema::{index_name, TableDefinition};
use crate::{FieldMap, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Canonical index key for a field value. Strings are used verbatim, other
/// scalars by their JSON text. Null is never indexed.
pub fn index_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// One field's index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Index {
    /// value -> the single record holding it
    Unique(BTreeMap<String, RecordId>),
    /// value -> records holding it, in insertion order
    NonUnique(BTreeMap<String, Vec<RecordId>>),
}

impl Index {
    pub fn new(unique: bool) -> Self {
        if unique {
            Index::Unique(BTreeMap::new())
        } else {
            Index::NonUnique(BTreeMap::new())
        }
    }

    pub fn is_unique(&self) -> bool {
        matches!(self, Index::Unique(_))
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        match self {
            Index::Unique(slots) => slots.len(),
            Index::NonUnique(buckets) => buckets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record `id` under `key`: overwrite for unique, append-if-absent otherwise
    pub fn insert(&mut self, key: String, id: RecordId) {
        match self {
            Index::Unique(slots) => {
                slots.insert(key, id);
            }
            Index::NonUnique(buckets) => {
                let bucket = buckets.entry(key).or_default();
                if !bucket.contains(&id) {
                    bucket.push(id);
                }
            }
        }
    }

    /// Strike `id` from `key`, dropping the entry once nothing is left under it
    pub fn remove(&mut self, key: &str, id: RecordId) {
        match self {
            Index::Unique(slots) => {
                if slots.get(key) == Some(&id) {
                    slots.remove(key);
                }
            }
            Index::NonUnique(buckets) => {
                if let Some(bucket) = buckets.get_mut(key) {
                    bucket.retain(|existing| *existing != id);
                    if bucket.is_empty() {
                        buckets.remove(key);
                    }
                }
            }
        }
    }

    pub fn lookup(&self, key: &str) -> Vec<RecordId> {
        match self {
            Index::Unique(slots) => slots.get(key).copied().into_iter().collect(),
            Index::NonUnique(buckets) => buckets.get(key).cloned().unwrap_or_default(),
        }
    }

    /// First record other than `exclude` holding `key`
    pub fn conflicting(&self, key: &str, exclude: Option<RecordId>) -> Option<RecordId> {
        self.lookup(key)
            .into_iter()
            .find(|id| Some(*id) != exclude)
    }

    /// Whether any entry still points at `id`
    pub fn references(&self, id: RecordId) -> bool {
        match self {
            Index::Unique(slots) => slots.values().any(|v| *v == id),
            Index::NonUnique(buckets) => buckets.values().any(|b| b.contains(&id)),
        }
    }
}

/// All indices of one table, keyed by index name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexSet(BTreeMap<String, Index>);

impl IndexSet {
    pub fn get(&self, field: &str) -> Option<&Index> {
        self.0.get(&index_name(field))
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(&index_name(field))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Index)> {
        self.0.iter().map(|(name, index)| (name.as_str(), index))
    }

    /// Make the set match the table definition: add missing indices, replace
    /// ones whose shape no longer matches the field's uniqueness and drop ones
    /// for fields that are no longer indexed. Returns true if anything changed,
    /// in which case the contents must be rebuilt.
    pub fn reconcile(&mut self, table: &TableDefinition) -> bool {
        let declared: Vec<String> = table
            .indexed_fields()
            .into_iter()
            .map(index_name)
            .collect();

        let before = self.0.len();
        self.0.retain(|name, _| declared.contains(name));
        let mut changed = self.0.len() != before;

        for field in table.indexed_fields() {
            let unique = table.is_unique(field);
            let entry = self.0.entry(index_name(field)).or_insert_with(|| {
                changed = true;
                Index::new(unique)
            });
            if entry.is_unique() != unique {
                *entry = Index::new(unique);
                changed = true;
            }
        }

        changed
    }

    /// Recompute every index from scratch
    pub fn rebuild(&mut self, table: &TableDefinition, records: &BTreeMap<RecordId, FieldMap>) {
        for (name, index) in self.0.iter_mut() {
            *index = Index::new(index.is_unique());
            log::debug!("Rebuilding index {}.{name}", table.name);
        }
        for (id, fields) in records {
            for field in table.unique_fields() {
                let existing = fields
                    .get(&field.name)
                    .and_then(index_key)
                    .and_then(|key| self.get(&field.name)?.conflicting(&key, Some(*id)));
                if let Some(existing) = existing {
                    log::warn!(
                        "{}: records {existing} and {id} share a value for unique field '{}'",
                        table.name,
                        field.name
                    );
                }
            }
            self.update_indices(fields, *id);
        }
    }

    /// Index `id` under the current value of every field that has an index
    pub fn update_indices(&mut self, fields: &FieldMap, id: RecordId) {
        for (field, value) in fields {
            let Some(index) = self.0.get_mut(&index_name(field)) else {
                continue;
            };
            if let Some(key) = index_key(value) {
                index.insert(key, id);
            }
        }
    }

    /// Remove `id` from every index, using the field values it was indexed under
    pub fn remove_record(&mut self, fields: &FieldMap, id: RecordId) {
        for (field, value) in fields {
            let Some(index) = self.0.get_mut(&index_name(field)) else {
                continue;
            };
            if let Some(key) = index_key(value) {
                index.remove(&key, id);
            }
        }
    }

    /// Ids recorded for `value` of `field`, or None when there is no index to
    /// answer from
    pub fn lookup(&self, field: &str, value: &Value) -> Option<Vec<RecordId>> {
        let index = self.get(field)?;
        let key = index_key(value)?;
        Some(index.lookup(&key))
    }

    /// Fail if any unique field of `fields` already belongs to another record
    pub fn check_unique(
        &self,
        table: &TableDefinition,
        fields: &FieldMap,
        exclude: Option<RecordId>,
    ) -> Result<()> {
        for field in table.unique_fields() {
            let Some(index) = self.get(&field.name) else {
                continue;
            };
            let Some(key) = fields.get(&field.name).and_then(index_key) else {
                continue;
            };
            if index.conflicting(&key, exclude).is_some() {
                return Err(StoreError::UniqueConstraintViolation {
                    table: table.name.clone(),
                    field: field.name.clone(),
                    value: key,
                });
            }
        }
        Ok(())
    }

    /// Whether any index still references `id`
    pub fn references(&self, id: RecordId) -> bool {
        self.0.values().any(|index| index.references(id))
    }
}
