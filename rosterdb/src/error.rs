use crate::RecordId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unique constraint violation on {table}: {field} {value} already exists")]
    UniqueConstraintViolation {
        table: String,
        field: String,
        value: String,
    },

    #[error("Record not found: {table}/{id}")]
    NotFound { table: String, id: RecordId },

    #[error("Multiple {table} records ({count}) with {field} = {value}")]
    MultipleMatches {
        table: String,
        field: String,
        value: String,
        count: usize,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Student {student_id} is already enrolled in course {course_id}")]
    AlreadyEnrolled {
        student_id: RecordId,
        course_id: RecordId,
    },

    #[error("Student {student_id} is not enrolled in course {course_id}, enroll first")]
    NotEnrolled {
        student_id: RecordId,
        course_id: RecordId,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StoreError {
    /// Storage and configuration failures leave the store in an unknown state.
    /// Everything else is an ordinary outcome the caller is expected to handle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::Configuration(_)
                | StoreError::Persistence(_)
                | StoreError::Io(_)
                | StoreError::Json(_)
                | StoreError::Yaml(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
