// Entity services: the generic store fixed to one entity type, plus the
// lookups that type's callers need.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::index::index_key;
use crate::model::{Course, CourseEnrollment, Entity, Student};
use crate::schema::SchemaCatalog;
use crate::store::RecordStore;
use crate::RecordId;
use serde_json::Value;
use std::ops::{Deref, DerefMut};

/// Look up a record by a field the caller treats as identifying.
/// None when nothing matches, `MultipleMatches` when more than one does.
pub fn find_one<T: Entity>(
    store: &RecordStore<T>,
    field: &str,
    value: impl Into<Value>,
) -> Result<Option<T>> {
    let value = value.into();
    let mut matches = store.get_by_field(field, value.clone())?;
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        count => Err(StoreError::MultipleMatches {
            table: T::TABLE.to_string(),
            field: field.to_string(),
            value: index_key(&value).unwrap_or_else(|| "null".into()),
            count,
        }),
    }
}

macro_rules! entity_service {
    ($service:ident, $entity:ty) => {
        pub struct $service {
            store: RecordStore<$entity>,
        }

        impl $service {
            /// Read the table definitions and open the persisted document
            pub fn open(config: &StoreConfig) -> Result<Self> {
                Ok($service {
                    store: RecordStore::open(config)?,
                })
            }

            pub fn from_catalog(catalog: &SchemaCatalog, config: &StoreConfig) -> Result<Self> {
                Ok($service {
                    store: RecordStore::from_catalog(catalog, &config.data_dir)?,
                })
            }
        }

        impl Deref for $service {
            type Target = RecordStore<$entity>;

            fn deref(&self) -> &Self::Target {
                &self.store
            }
        }

        impl DerefMut for $service {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.store
            }
        }
    };
}

entity_service!(StudentService, Student);
entity_service!(CourseService, Course);
entity_service!(EnrollmentService, CourseEnrollment);

impl StudentService {
    pub fn get_by_email(&self, email: &str) -> Result<Option<Student>> {
        find_one(&self.store, "email", email)
    }

    pub fn get_by_phone(&self, phone: &str) -> Result<Option<Student>> {
        find_one(&self.store, "phone", phone)
    }

    pub fn get_by_name(&self, name: &str) -> Result<Vec<Student>> {
        self.store.get_by_field("name", name)
    }
}

impl CourseService {
    pub fn get_by_name(&self, name: &str) -> Result<Option<Course>> {
        find_one(&self.store, "name", name)
    }
}

impl EnrollmentService {
    pub fn get_by_student(&self, student_id: RecordId) -> Result<Vec<CourseEnrollment>> {
        self.store.get_by_field("student_id", student_id)
    }

    pub fn get_by_course(&self, course_id: RecordId) -> Result<Vec<CourseEnrollment>> {
        self.store.get_by_field("course_id", course_id)
    }

    /// The enrollment linking `student_id` to `course_id`, if any
    pub fn get_enrollment(
        &self,
        student_id: RecordId,
        course_id: RecordId,
    ) -> Result<Option<CourseEnrollment>> {
        Ok(self
            .get_by_student(student_id)?
            .into_iter()
            .find(|e| e.course_id == course_id))
    }

    /// Enroll a student in a course with no grade yet. A student can only be
    /// enrolled in a given course once.
    pub fn enroll_student(
        &mut self,
        student_id: RecordId,
        course_id: RecordId,
    ) -> Result<CourseEnrollment> {
        if self.get_enrollment(student_id, course_id)?.is_some() {
            return Err(StoreError::AlreadyEnrolled {
                student_id,
                course_id,
            });
        }
        self.store
            .create(CourseEnrollment::new(student_id, course_id))
    }

    pub fn set_grade(
        &mut self,
        student_id: RecordId,
        course_id: RecordId,
        grade: i64,
    ) -> Result<CourseEnrollment> {
        let mut enrollment = self
            .get_enrollment(student_id, course_id)?
            .ok_or(StoreError::NotEnrolled {
                student_id,
                course_id,
            })?;
        enrollment.grade = grade;
        self.store.update(enrollment)
    }
}

/// The three services over one data directory, sharing a single read of the
/// table definitions
pub struct Services {
    pub students: StudentService,
    pub courses: CourseService,
    pub enrollments: EnrollmentService,
}

impl Services {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let catalog = SchemaCatalog::open(&config.schema_path)?;
        Ok(Services {
            students: StudentService::from_catalog(&catalog, config)?,
            courses: CourseService::from_catalog(&catalog, config)?,
            enrollments: EnrollmentService::from_catalog(&catalog, config)?,
        })
    }
}
