use crate::config::{self, StoreConfig};
use crate::document::TableDocument;
use crate::error::{Result, StoreError};
use crate::index::{index_key, IndexSet};
use crate::model::Entity;
use crate::schema::{SchemaCatalog, TableDefinition};
use crate::validation;
use crate::{FieldMap, RecordId};
use serde_json::Value;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// CRUD handle for one table.
///
/// Owns the table's whole document in memory; every mutating call rewrites
/// the persisted file before returning. Two stores over the same data
/// directory do not see each other's writes.
pub struct RecordStore<T: Entity> {
    path: PathBuf,
    table: TableDefinition,
    document: TableDocument,
    /// Highest id handed out by this handle, so deleting the newest record
    /// does not free its id for the rest of the session
    last_id: RecordId,
    _entity: PhantomData<T>,
}

impl<T: Entity> RecordStore<T> {
    /// Read the table definitions named in `config` and open the store for `T`
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let catalog = SchemaCatalog::open(&config.schema_path)?;
        Self::from_catalog(&catalog, &config.data_dir)
    }

    /// Open the store for `T` using an already loaded catalog
    pub fn from_catalog(catalog: &SchemaCatalog, data_dir: &Path) -> Result<Self> {
        Self::with_table(catalog.table(T::TABLE)?, data_dir)
    }

    /// Open the store for `T` with an explicit table definition.
    /// Creates the data directory if needed and loads the persisted document.
    pub fn with_table(table: TableDefinition, data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            StoreError::Persistence(format!(
                "Could not create data directory {}: {e}",
                data_dir.display()
            ))
        })?;

        let path = config::document_path(data_dir, &table.name);
        let loaded = TableDocument::load(&path)?;
        let existed = loaded.is_some();
        let mut document = loaded.unwrap_or_default();

        let rebuild = document.indices.reconcile(&table) && existed;
        if rebuild {
            log::info!(
                "Index layout of {} changed, rebuilding from {} record(s)",
                table.name,
                document.data.len()
            );
            document.indices.rebuild(&table, &document.data);
        }

        let store = RecordStore {
            path,
            table,
            last_id: document.max_id(),
            document,
            _entity: PhantomData,
        };
        if rebuild {
            store.save()?;
        }

        log::info!(
            "Opened table {} ({} record(s)) at {}",
            store.table.name,
            store.document.data.len(),
            store.path.display()
        );
        Ok(store)
    }

    // ── Public contract ──────────────────────────────────────────────

    /// Insert a new record. The candidate's id is ignored and replaced by
    /// the next free id.
    pub fn create(&mut self, candidate: T) -> Result<T> {
        let mut created = candidate;
        let fields = created.to_fields()?;
        validation::ensure_valid(&self.table, &fields)?;
        self.document
            .indices
            .check_unique(&self.table, &fields, None)?;

        let id = self.next_id()?;
        created.set_id(id);
        let fields = created.to_fields()?;

        self.document.indices.update_indices(&fields, id);
        self.document.data.insert(id, fields);
        self.last_id = id;
        self.save()?;

        log::debug!("Created {}/{id}", self.table.name);
        Ok(created)
    }

    pub fn get_by_id(&self, id: RecordId) -> Result<T> {
        let fields = self
            .document
            .data
            .get(&id)
            .ok_or_else(|| not_found(&self.table.name, id))?;
        T::from_fields(fields)
    }

    /// Records whose `field` equals `value`. Answered from the field's index
    /// when there is one, otherwise by scanning every record.
    ///
    /// Both paths compare index keys, so a number matches its decimal text:
    /// `"2"` and `2` find the same records. Null matches missing or null fields.
    pub fn get_by_field(&self, field: &str, value: impl Into<Value>) -> Result<Vec<T>> {
        let value = value.into();

        if let Some(ids) = self.document.indices.lookup(field, &value) {
            let mut records = Vec::with_capacity(ids.len());
            for id in ids {
                match self.document.data.get(&id) {
                    Some(fields) => records.push(T::from_fields(fields)?),
                    None => log::warn!(
                        "Skipping stale {} entry for {}/{id}",
                        crate::schema::index_name(field),
                        self.table.name
                    ),
                }
            }
            return Ok(records);
        }

        self.document
            .data
            .values()
            .filter(|fields| {
                let stored = fields.get(field).unwrap_or(&Value::Null);
                index_key(stored) == index_key(&value)
            })
            .map(T::from_fields)
            .collect()
    }

    /// Every record, in id order
    pub fn get_all(&self) -> Result<Vec<T>> {
        self.document.data.values().map(T::from_fields).collect()
    }

    /// Replace the stored record with `record`'s fields. The id must exist.
    pub fn update(&mut self, record: T) -> Result<T> {
        let id = record.id();
        if !self.document.data.contains_key(&id) {
            return Err(not_found(&self.table.name, id));
        }

        let mut fields = record.to_fields()?;
        fields.insert("id".into(), Value::from(id));
        validation::ensure_valid(&self.table, &fields)?;
        self.document
            .indices
            .check_unique(&self.table, &fields, Some(id))?;

        self.remove_from_indices(id)?;
        self.document.indices.update_indices(&fields, id);
        let updated = T::from_fields(&fields)?;
        self.document.data.insert(id, fields);
        self.save()?;

        log::debug!("Updated {}/{id}", self.table.name);
        Ok(updated)
    }

    pub fn delete(&mut self, id: RecordId) -> Result<()> {
        if !self.document.data.contains_key(&id) {
            return Err(not_found(&self.table.name, id));
        }

        self.remove_from_indices(id)?;
        self.document.data.remove(&id);
        self.save()?;

        log::debug!("Deleted {}/{id}", self.table.name);
        Ok(())
    }

    // ── Maintenance and introspection ────────────────────────────────

    /// Recompute every index from the stored records and persist
    pub fn rebuild_indices(&mut self) -> Result<()> {
        self.document.indices.reconcile(&self.table);
        self.document
            .indices
            .rebuild(&self.table, &self.document.data);
        self.save()?;
        log::info!("Rebuilt indices of {}", self.table.name);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.document.data.len()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.document.data.contains_key(&id)
    }

    pub fn table(&self) -> &TableDefinition {
        &self.table
    }

    pub fn indices(&self) -> &IndexSet {
        &self.document.indices
    }

    /// Stored field map of a record, as persisted
    pub fn raw(&self, id: RecordId) -> Option<&FieldMap> {
        self.document.data.get(&id)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Internals ────────────────────────────────────────────────────

    fn next_id(&self) -> Result<RecordId> {
        self.document
            .max_id()
            .max(self.last_id)
            .checked_add(1)
            .ok_or_else(|| {
                StoreError::Persistence(format!(
                    "No ids left in {}: highest id is {}",
                    self.table.name,
                    RecordId::MAX
                ))
            })
    }

    /// Drop every index entry of the stored version of `id`. The record must
    /// exist; a miss here means data and caller disagree.
    fn remove_from_indices(&mut self, id: RecordId) -> Result<()> {
        let TableDocument { data, indices } = &mut self.document;
        let stored = data
            .get(&id)
            .ok_or_else(|| not_found(&self.table.name, id))?;
        indices.remove_record(stored, id);
        Ok(())
    }

    fn save(&self) -> Result<()> {
        self.document.save(&self.path)
    }
}

fn not_found(table: &str, id: RecordId) -> StoreError {
    StoreError::NotFound {
        table: table.to_string(),
        id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CourseEnrollment, Student};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    const DEFINITIONS: &str = r#"
{
  "tables": [
    {
      "name": "students",
      "definitions": {
        "name": { "type": "string", "constraints": { "not_null": true } },
        "email": { "type": "string", "constraints": { "unique": true, "not_null": true } },
        "phone": { "type": "string", "constraints": { "unique": true } }
      },
      "indices": ["name"]
    },
    {
      "name": "course_enrollments",
      "definitions": {
        "student_id": { "type": "integer", "constraints": { "not_null": true } },
        "course_id": { "type": "integer", "constraints": { "not_null": true } },
        "grade": { "type": "integer", "constraints": { "min": 0, "max": 5 } }
      },
      "indices": ["student_id"]
    }
  ]
}
"#;

    fn setup() -> (TempDir, StoreConfig) {
        let tmp = TempDir::new().unwrap();
        let schema_path = tmp.path().join("table_definitions.json");
        std::fs::write(&schema_path, DEFINITIONS).unwrap();
        let config = StoreConfig::new(tmp.path().join("db"), schema_path);
        (tmp, config)
    }

    fn students(config: &StoreConfig) -> RecordStore<Student> {
        RecordStore::open(config).unwrap()
    }

    #[test]
    fn test_open_creates_data_dir() {
        let (_tmp, config) = setup();
        let store = students(&config);
        assert!(config.data_dir.is_dir());
        assert_eq!(store.count(), 0);
        // Nothing is written until the first mutation
        assert!(!store.path().exists());
    }

    #[test]
    fn test_open_unknown_table() {
        let (_tmp, config) = setup();
        let result = RecordStore::<crate::model::Course>::open(&config);
        assert!(matches!(result, Err(StoreError::Configuration(_))));
    }

    #[test]
    fn test_create_assigns_ids() {
        let (_tmp, config) = setup();
        let mut store = students(&config);

        let ole = store
            .create(Student::new("Ole", "a@x.no", "91234567"))
            .unwrap();
        let kari = store
            .create(Student::new("Kari", "b@x.no", "92345678"))
            .unwrap();

        assert_eq!(ole.id, 1);
        assert_eq!(kari.id, 2);
        assert_eq!(store.get_by_id(2).unwrap(), kari);
        assert_eq!(store.raw(1).unwrap()["id"], json!(1));
    }

    #[test]
    fn test_create_ignores_candidate_id() {
        let (_tmp, config) = setup();
        let mut store = students(&config);
        let mut candidate = Student::new("Ole", "a@x.no", "91234567");
        candidate.id = 77;
        assert_eq!(store.create(candidate).unwrap().id, 1);
    }

    #[test]
    fn test_create_rejects_invalid_record() {
        let (_tmp, config) = setup();
        let mut store: RecordStore<CourseEnrollment> = RecordStore::open(&config).unwrap();
        let mut enrollment = CourseEnrollment::new(1, 1);
        enrollment.grade = 9;

        let err = store.create(enrollment).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_get_by_id_not_found() {
        let (_tmp, config) = setup();
        let store = students(&config);
        match store.get_by_id(5) {
            Err(StoreError::NotFound { table, id }) => {
                assert_eq!(table, "students");
                assert_eq!(id, 5);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_get_by_field_index_and_scan() {
        let (_tmp, config) = setup();
        let mut store = students(&config);
        store.create(Student::new("Ole", "a@x.no", "1")).unwrap();
        store.create(Student::new("Kari", "b@x.no", "2")).unwrap();
        store.create(Student::new("Ole", "c@x.no", "3")).unwrap();

        // name is indexed, non-unique: insertion order
        let oles = store.get_by_field("name", "Ole").unwrap();
        let ids: Vec<RecordId> = oles.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3]);

        // id is not indexed: linear scan
        let by_id = store.get_by_field("id", 2u64).unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].name, "Kari");

        assert!(store.get_by_field("email", "missing@x.no").unwrap().is_empty());
        assert!(store.get_by_field("nonexistent", "x").unwrap().is_empty());
    }

    #[test]
    fn test_update_moves_index_entries() {
        let (_tmp, config) = setup();
        let mut store = students(&config);
        let mut ole = store.create(Student::new("Ole", "a@x.no", "1")).unwrap();

        ole.email = "new@x.no".into();
        ole.name = "Ole H".into();
        let updated = store.update(ole.clone()).unwrap();
        assert_eq!(updated, ole);

        assert!(store.get_by_field("email", "a@x.no").unwrap().is_empty());
        assert_eq!(store.get_by_field("email", "new@x.no").unwrap(), vec![ole.clone()]);
        assert!(store.get_by_field("name", "Ole").unwrap().is_empty());
        assert!(!store.indices().get("name").unwrap().lookup("Ole").contains(&1));
    }

    #[test]
    fn test_update_unknown_id() {
        let (_tmp, config) = setup();
        let mut store = students(&config);
        let mut ghost = Student::new("Ghost", "g@x.no", "0");
        ghost.id = 4;
        assert!(matches!(
            store.update(ghost),
            Err(StoreError::NotFound { id: 4, .. })
        ));
    }

    #[test]
    fn test_update_unique_conflict_leaves_state_untouched() {
        let (_tmp, config) = setup();
        let mut store = students(&config);
        store.create(Student::new("Ole", "a@x.no", "1")).unwrap();
        let mut kari = store.create(Student::new("Kari", "b@x.no", "2")).unwrap();

        kari.email = "a@x.no".into();
        let err = store.update(kari).unwrap_err();
        assert!(matches!(err, StoreError::UniqueConstraintViolation { .. }));
        assert_eq!(store.get_by_id(2).unwrap().email, "b@x.no");
        assert_eq!(store.get_by_field("email", "b@x.no").unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let (_tmp, config) = setup();
        let mut store = students(&config);
        store.create(Student::new("Ole", "a@x.no", "1")).unwrap();

        store.delete(1).unwrap();
        assert!(!store.contains(1));
        assert!(!store.indices().references(1));
        assert!(matches!(store.delete(1), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_persisted_between_instances() {
        let (_tmp, config) = setup();
        {
            let mut store = students(&config);
            store.create(Student::new("Ole", "a@x.no", "1")).unwrap();
            store.create(Student::new("Kari", "b@x.no", "2")).unwrap();
        }

        let mut reopened = students(&config);
        assert_eq!(reopened.count(), 2);
        assert_eq!(reopened.get_by_field("email", "b@x.no").unwrap()[0].id, 2);
        assert!(matches!(
            reopened.create(Student::new("Other", "a@x.no", "3")),
            Err(StoreError::UniqueConstraintViolation { .. })
        ));
    }

    #[test]
    fn test_persisted_shape() {
        let (_tmp, config) = setup();
        let mut store = students(&config);
        store.create(Student::new("Ole", "a@x.no", "1")).unwrap();

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(
            raw,
            json!({
                "data": {
                    "1": { "id": 1, "name": "Ole", "email": "a@x.no", "phone": "1" }
                },
                "indices": {
                    "email_id_idx": { "unique": { "a@x.no": 1 } },
                    "name_id_idx": { "non_unique": { "Ole": [1] } },
                    "phone_id_idx": { "unique": { "1": 1 } }
                }
            })
        );
    }

    #[test]
    fn test_open_rebuilds_missing_indices() {
        let (_tmp, config) = setup();
        std::fs::create_dir_all(&config.data_dir).unwrap();
        std::fs::write(
            config.document_path("students"),
            r#"{ "data": { "1": { "id": 1, "name": "Ole", "email": "a@x.no", "phone": "1" } } }"#,
        )
        .unwrap();

        let store = students(&config);
        assert_eq!(store.indices().get("email").unwrap().lookup("a@x.no"), vec![1]);
        assert_eq!(store.get_by_field("name", "Ole").unwrap().len(), 1);
    }

    #[test]
    fn test_stale_index_entry_is_skipped() {
        let (_tmp, config) = setup();
        std::fs::create_dir_all(&config.data_dir).unwrap();
        std::fs::write(
            config.document_path("students"),
            r#"{
                "data": { "1": { "id": 1, "name": "Ole", "email": "a@x.no", "phone": "1" } },
                "indices": {
                    "email_id_idx": { "unique": { "a@x.no": 1 } },
                    "name_id_idx": { "non_unique": { "Ole": [1, 7] } },
                    "phone_id_idx": { "unique": { "1": 1 } }
                }
            }"#,
        )
        .unwrap();

        let store = students(&config);
        let oles = store.get_by_field("name", "Ole").unwrap();
        assert_eq!(oles.len(), 1);
        assert_eq!(oles[0].id, 1);
    }

    #[test]
    fn test_deleting_newest_does_not_free_its_id() {
        let (_tmp, config) = setup();
        let mut store = students(&config);
        for (email, phone) in [("a@x.no", "1"), ("b@x.no", "2"), ("c@x.no", "3")] {
            store.create(Student::new("S", email, phone)).unwrap();
        }

        store.delete(3).unwrap();
        let next = store.create(Student::new("S", "d@x.no", "4")).unwrap();
        assert_eq!(next.id, 4);
    }

    #[test]
    fn test_reopened_store_continues_from_persisted_max() {
        let (_tmp, config) = setup();
        {
            let mut store = students(&config);
            store.create(Student::new("S", "a@x.no", "1")).unwrap();
            store.create(Student::new("S", "b@x.no", "2")).unwrap();
            store.delete(2).unwrap();
        }

        let mut store = students(&config);
        let next = store.create(Student::new("S", "c@x.no", "3")).unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn test_exhausted_id_space_is_persistence_error() {
        let (_tmp, config) = setup();
        std::fs::create_dir_all(&config.data_dir).unwrap();
        std::fs::write(
            config.document_path("students"),
            r#"{ "data": { "18446744073709551615": {
                "id": 18446744073709551615, "name": "Ole", "email": "a@x.no", "phone": "1"
            } } }"#,
        )
        .unwrap();

        let mut store = students(&config);
        let err = store
            .create(Student::new("Kari", "b@x.no", "2"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)), "{err:?}");
        assert_eq!(store.count(), 1);
        assert!(store.get_by_field("email", "b@x.no").unwrap().is_empty());
    }

    #[test]
    fn test_write_failure_is_persistence_error() {
        let (_tmp, config) = setup();
        let mut store = students(&config);
        store.create(Student::new("Ole", "a@x.no", "1")).unwrap();

        std::fs::remove_dir_all(&config.data_dir).unwrap();
        let err = store
            .create(Student::new("Kari", "b@x.no", "2"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)), "{err:?}");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_lookup_matches_number_text_on_both_paths() {
        let (_tmp, config) = setup();
        let mut store: RecordStore<CourseEnrollment> = RecordStore::open(&config).unwrap();
        let created = store.create(CourseEnrollment::new(1, 2)).unwrap();

        // student_id is indexed, course_id is scanned
        assert_eq!(store.get_by_field("student_id", "1").unwrap(), vec![created.clone()]);
        assert_eq!(store.get_by_field("student_id", 1u64).unwrap(), vec![created.clone()]);
        assert_eq!(store.get_by_field("course_id", "2").unwrap(), vec![created.clone()]);
        assert_eq!(store.get_by_field("course_id", 2u64).unwrap(), vec![created]);
        assert!(store.get_by_field("course_id", "02").unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_indices() {
        let (_tmp, config) = setup();
        let mut store = students(&config);
        store.create(Student::new("Ole", "a@x.no", "1")).unwrap();
        store.create(Student::new("Kari", "b@x.no", "2")).unwrap();
        let before = store.indices().clone();

        store.rebuild_indices().unwrap();
        assert_eq!(store.indices(), &before);
    }
}
