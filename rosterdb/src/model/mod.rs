use crate::error::{Result, StoreError};
use crate::{FieldMap, RecordId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A record type the store can hold.
///
/// The store never looks inside an entity directly; it goes through the
/// field map produced by `to_fields` and rebuilds values with `from_fields`.
/// The defaults go through serde, so a plain `#[derive(Serialize, Deserialize)]`
/// struct only needs to name its table and expose its id.
pub trait Entity: Clone + Serialize + DeserializeOwned {
    /// Table name used for both the schema entry and the persisted document
    const TABLE: &'static str;

    /// The assigned id, 0 before creation
    fn id(&self) -> RecordId;

    fn set_id(&mut self, id: RecordId);

    fn to_fields(&self) -> Result<FieldMap> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            other => Err(StoreError::Configuration(format!(
                "{} entity must serialize to an object, got {other}",
                Self::TABLE
            ))),
        }
    }

    fn from_fields(fields: &FieldMap) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(fields.clone()))?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    #[serde(default)]
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl Student {
    pub fn new(name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        Student {
            id: 0,
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }
}

impl Entity for Student {
    const TABLE: &'static str = "students";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }
}

impl fmt::Display for Student {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Student #{}: {} <{}> {}",
            self.id, self.name, self.email, self.phone
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    #[serde(default)]
    pub id: RecordId,
    pub name: String,
}

impl Course {
    pub fn new(name: impl Into<String>) -> Self {
        Course {
            id: 0,
            name: name.into(),
        }
    }
}

impl Entity for Course {
    const TABLE: &'static str = "courses";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Course #{}: {}", self.id, self.name)
    }
}

/// Link between a student and a course, with the grade earned (0 until set)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseEnrollment {
    #[serde(default)]
    pub id: RecordId,
    pub student_id: RecordId,
    pub course_id: RecordId,
    #[serde(default)]
    pub grade: i64,
}

impl CourseEnrollment {
    pub fn new(student_id: RecordId, course_id: RecordId) -> Self {
        CourseEnrollment {
            id: 0,
            student_id,
            course_id,
            grade: 0,
        }
    }
}

impl Entity for CourseEnrollment {
    const TABLE: &'static str = "course_enrollments";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }
}

impl fmt::Display for CourseEnrollment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Enrollment #{}: student {} in course {} (grade {})",
            self.id, self.student_id, self.course_id, self.grade
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_map_round_trip() {
        let student = Student::new("Ole", "a@x.no", "91234567");
        let fields = student.to_fields().unwrap();
        assert_eq!(fields["id"], json!(0));
        assert_eq!(fields["email"], json!("a@x.no"));

        let back = Student::from_fields(&fields).unwrap();
        assert_eq!(back, student);
    }

    #[test]
    fn test_from_fields_missing_required_field() {
        let fields = json!({ "id": 1, "name": "Ole" }).as_object().cloned().unwrap();
        assert!(Student::from_fields(&fields).is_err());
    }

    #[test]
    fn test_display() {
        let mut course = Course::new("Math101");
        course.set_id(3);
        assert_eq!(course.to_string(), "Course #3: Math101");
    }
}
