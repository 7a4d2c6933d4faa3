// Read-only reports over students, courses and enrollments. Everything here
// goes through the entity services; nothing touches documents or indices.

use crate::error::{Result, StoreError};
use crate::model::{Course, Student};
use crate::service::{CourseService, EnrollmentService, StudentService};
use crate::RecordId;

/// How a report names a student
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentRef {
    Id(RecordId),
    Name(String),
}

/// How a report names a course
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseRef {
    Id(RecordId),
    Name(String),
}

impl From<RecordId> for StudentRef {
    fn from(id: RecordId) -> Self {
        StudentRef::Id(id)
    }
}

impl From<&str> for StudentRef {
    fn from(name: &str) -> Self {
        StudentRef::Name(name.to_string())
    }
}

impl From<RecordId> for CourseRef {
    fn from(id: RecordId) -> Self {
        CourseRef::Id(id)
    }
}

impl From<&str> for CourseRef {
    fn from(name: &str) -> Self {
        CourseRef::Name(name.to_string())
    }
}

/// Parse a command-line argument: digits are ids, anything else a name
impl std::str::FromStr for StudentRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(s
            .parse::<RecordId>()
            .map(StudentRef::Id)
            .unwrap_or_else(|_| StudentRef::Name(s.into())))
    }
}

impl std::str::FromStr for CourseRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(s
            .parse::<RecordId>()
            .map(CourseRef::Id)
            .unwrap_or_else(|_| CourseRef::Name(s.into())))
    }
}

/// Letter for an average grade on the 0-5 scale
pub fn letter_grade(average: f64) -> char {
    match average {
        a if a >= 4.5 => 'A',
        a if a >= 3.5 => 'B',
        a if a >= 2.5 => 'C',
        a if a >= 1.5 => 'D',
        a if a >= 0.5 => 'E',
        _ => 'F',
    }
}

pub struct StudentAnalytics<'a> {
    students: &'a StudentService,
    courses: &'a CourseService,
    enrollments: &'a EnrollmentService,
}

impl<'a> StudentAnalytics<'a> {
    pub fn new(
        students: &'a StudentService,
        courses: &'a CourseService,
        enrollments: &'a EnrollmentService,
    ) -> Self {
        StudentAnalytics {
            students,
            courses,
            enrollments,
        }
    }

    /// Mean of the student's own grades, rounded to two decimals.
    /// A student without enrollments averages 0.0.
    pub fn student_average_grade(
        &self,
        student: impl Into<StudentRef>,
    ) -> Result<Option<(Student, f64)>> {
        let Some(student) = self.resolve_student(student.into())? else {
            return Ok(None);
        };

        let grades: Vec<i64> = self
            .enrollments
            .get_by_student(student.id)?
            .into_iter()
            .map(|e| e.grade)
            .collect();

        if grades.is_empty() {
            return Ok(Some((student, 0.0)));
        }

        let average = grades.iter().sum::<i64>() as f64 / grades.len() as f64;
        let rounded = (average * 100.0).round() / 100.0;
        Ok(Some((student, rounded)))
    }

    pub fn course_enrollment_count(
        &self,
        course: impl Into<CourseRef>,
    ) -> Result<Option<(Course, usize)>> {
        let Some(course) = self.resolve_course(course.into())? else {
            return Ok(None);
        };
        let count = self.enrollments.get_by_course(course.id)?.len();
        Ok(Some((course, count)))
    }

    /// The course with the most enrollments. Ties go to the course seen first;
    /// None if no course has any enrollment.
    pub fn course_with_most_students(&self) -> Result<Option<(Course, usize)>> {
        let mut best: Option<(Course, usize)> = None;
        for course in self.courses.get_all()? {
            let count = self.enrollments.get_by_course(course.id)?.len();
            let leading = best.as_ref().map(|(_, n)| *n).unwrap_or(0);
            if count > leading {
                best = Some((course, count));
            }
        }
        Ok(best)
    }

    /// Students enrolled in a course, sorted by name
    pub fn students_in_course(
        &self,
        course: impl Into<CourseRef>,
    ) -> Result<Option<(Course, Vec<Student>)>> {
        let Some(course) = self.resolve_course(course.into())? else {
            return Ok(None);
        };

        let mut students = Vec::new();
        for enrollment in self.enrollments.get_by_course(course.id)? {
            match self.students.get_by_id(enrollment.student_id) {
                Ok(student) => students.push(student),
                Err(StoreError::NotFound { .. }) => {
                    log::warn!(
                        "Enrollment {} points at missing student {}",
                        enrollment.id,
                        enrollment.student_id
                    );
                }
                Err(e) => return Err(e),
            }
        }
        students.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Some((course, students)))
    }

    fn resolve_student(&self, student: StudentRef) -> Result<Option<Student>> {
        match student {
            StudentRef::Id(id) => optional(self.students.get_by_id(id)),
            StudentRef::Name(name) => {
                let mut matches = self.students.get_by_name(&name)?;
                match matches.len() {
                    0 => Ok(None),
                    1 => Ok(matches.pop()),
                    count => Err(StoreError::MultipleMatches {
                        table: "students".into(),
                        field: "name".into(),
                        value: name,
                        count,
                    }),
                }
            }
        }
    }

    fn resolve_course(&self, course: CourseRef) -> Result<Option<Course>> {
        match course {
            CourseRef::Id(id) => optional(self.courses.get_by_id(id)),
            CourseRef::Name(name) => self.courses.get_by_name(&name),
        }
    }
}

fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}
