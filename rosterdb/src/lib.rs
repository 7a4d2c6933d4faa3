pub mod analytics;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod model;
pub mod schema;
pub mod service;
pub mod store;
pub mod validation;

/// System-assigned record id. 0 marks a record that has not been created yet.
pub type RecordId = u64;

/// A record as the store sees it: field name to value, including `id`
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use model::{Course, CourseEnrollment, Entity, Student};
pub use schema::{SchemaCatalog, TableDefinition};
pub use service::{CourseService, EnrollmentService, Services, StudentService};
pub use store::RecordStore;
