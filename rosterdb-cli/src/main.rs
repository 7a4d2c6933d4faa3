use clap::{Parser, Subcommand, ValueEnum};
use rand::Rng;
use rosterdb::analytics::{letter_grade, CourseRef, StudentAnalytics, StudentRef};
use rosterdb::config::{DEFAULT_DATA_DIR, DEFAULT_SCHEMA_PATH};
use rosterdb::{Course, RecordId, Services, Student, StoreConfig, StoreError};
use serde_json::{json, Value};
use std::process;

/// rosterdb CLI - manage students, courses and enrollments from the command line
#[derive(Parser)]
#[command(name = "rosterdb", version, about)]
struct Cli {
    /// Directory holding one JSON document per table
    #[arg(long, env = "ROSTERDB_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: String,

    /// Table definitions file (JSON or YAML)
    #[arg(long, env = "ROSTERDB_SCHEMA", default_value = DEFAULT_SCHEMA_PATH)]
    schema: String,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Add a student
    AddStudent {
        name: String,
        email: String,
        phone: String,
    },

    /// List all students
    ListStudents,

    /// Add a course
    AddCourse { name: String },

    /// List all courses
    ListCourses,

    /// Enroll a student in a course
    EnrollStudent {
        student_id: RecordId,
        course_id: RecordId,
    },

    /// Set a student's grade (0-5) in a course they are enrolled in
    SetGrade {
        student_id: RecordId,
        course_id: RecordId,
        grade: i64,
    },

    /// List enrollments, optionally only those of one student
    ListEnrollments { student_id: Option<RecordId> },

    /// Show one enrollment with its student and course
    GetEnrollment { id: RecordId },

    /// Average grade of a student, by id or name
    AverageGrade { student: StudentRef },

    /// Number of students enrolled in a course, by id or name
    CourseCount { course: CourseRef },

    /// The course with the most enrolled students
    MostPopularCourse,

    /// Students enrolled in a course, by id or name
    StudentsInCourse { course: CourseRef },

    /// Fill an empty store with sample students, courses and enrollments
    Seed,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = StoreConfig::new(&cli.data_dir, &cli.schema);
    let mut services = Services::open(&config)?;

    let output = match cli.command {
        Command::AddStudent { name, email, phone } => {
            let student = services.students.create(Student::new(name, email, phone))?;
            serde_json::to_value(student)?
        }

        Command::ListStudents => serde_json::to_value(services.students.get_all()?)?,

        Command::AddCourse { name } => {
            let course = services.courses.create(Course::new(name))?;
            serde_json::to_value(course)?
        }

        Command::ListCourses => serde_json::to_value(services.courses.get_all()?)?,

        Command::EnrollStudent {
            student_id,
            course_id,
        } => {
            // Both ends must exist before linking them
            services.students.get_by_id(student_id)?;
            services.courses.get_by_id(course_id)?;
            let enrollment = services
                .enrollments
                .enroll_student(student_id, course_id)?;
            serde_json::to_value(enrollment)?
        }

        Command::SetGrade {
            student_id,
            course_id,
            grade,
        } => {
            let enrollment = services
                .enrollments
                .set_grade(student_id, course_id, grade)?;
            serde_json::to_value(enrollment)?
        }

        Command::ListEnrollments { student_id } => {
            let enrollments = match student_id {
                Some(id) => services.enrollments.get_by_student(id)?,
                None => services.enrollments.get_all()?,
            };
            let mut rows = Vec::with_capacity(enrollments.len());
            for enrollment in enrollments {
                rows.push(json!({
                    "id": enrollment.id,
                    "student": name_of(services.students.get_by_id(enrollment.student_id).map(|s| s.name))?,
                    "student_id": enrollment.student_id,
                    "course": name_of(services.courses.get_by_id(enrollment.course_id).map(|c| c.name))?,
                    "course_id": enrollment.course_id,
                    "grade": enrollment.grade,
                }));
            }
            Value::Array(rows)
        }

        Command::GetEnrollment { id } => {
            let enrollment = services.enrollments.get_by_id(id)?;
            let student = services.students.get_by_id(enrollment.student_id)?;
            let course = services.courses.get_by_id(enrollment.course_id)?;
            json!({
                "id": enrollment.id,
                "student": student,
                "course": course,
                "grade": enrollment.grade,
            })
        }

        Command::AverageGrade { student } => {
            let analytics = analytics(&services);
            match analytics.student_average_grade(student)? {
                Some((student, average)) => json!({
                    "student": student,
                    "average": average,
                    "letter": letter_grade(average).to_string(),
                }),
                None => return Err("Student not found".into()),
            }
        }

        Command::CourseCount { course } => {
            let analytics = analytics(&services);
            match analytics.course_enrollment_count(course)? {
                Some((course, count)) => json!({ "course": course, "students": count }),
                None => return Err("Course not found".into()),
            }
        }

        Command::MostPopularCourse => {
            let analytics = analytics(&services);
            match analytics.course_with_most_students()? {
                Some((course, count)) => json!({ "course": course, "students": count }),
                None => json!({ "course": null, "students": 0 }),
            }
        }

        Command::StudentsInCourse { course } => {
            let analytics = analytics(&services);
            match analytics.students_in_course(course)? {
                Some((course, students)) => json!({ "course": course, "students": students }),
                None => return Err("Course not found".into()),
            }
        }

        Command::Seed => seed(&mut services, &mut rand::thread_rng())?,
    };

    print_output(&output, &cli.format)
}

fn analytics(services: &Services) -> StudentAnalytics<'_> {
    StudentAnalytics::new(
        &services.students,
        &services.courses,
        &services.enrollments,
    )
}

/// Name of a linked record, or null if it has been deleted
fn name_of(result: rosterdb::Result<String>) -> rosterdb::Result<Value> {
    match result {
        Ok(name) => Ok(Value::String(name)),
        Err(StoreError::NotFound { .. }) => Ok(Value::Null),
        Err(e) => Err(e),
    }
}

const SEED_STUDENTS: &[(&str, &str, &str)] = &[
    ("Ole Hansen", "olehans@stud.ntnu.no", "91234567"),
    ("Ole Hansen", "olehans2@stud.ntnu.no", "91234566"),
    ("Ingrid Larsen", "ingridl@stud.ntnu.no", "92345678"),
    ("Magnus Andreassen", "magnusa@stud.ntnu.no", "93456789"),
    ("Sofia Nilsen", "sofian@stud.ntnu.no", "94567890"),
    ("Erik Johansen", "erikj@stud.ntnu.no", "95678901"),
];

const SEED_COURSES: &[&str] = &[
    "IDATA2002 - Databaser",
    "IDATA2003 - Programmering 2",
    "IMAA2024 - Matematikk 2",
];

/// Share of student and course pairs left without an enrollment
const SEED_SKIP_RATE: f64 = 0.3;

/// Create the sample data. Records that clash with existing ones are reported
/// and skipped, so seeding twice only adds what is missing. Each new student
/// is enrolled in most new courses with a random grade.
fn seed(services: &mut Services, rng: &mut impl Rng) -> rosterdb::Result<Value> {
    let mut students = Vec::new();
    let mut skipped = Vec::new();
    for (name, email, phone) in SEED_STUDENTS {
        match services.students.create(Student::new(*name, *email, *phone)) {
            Ok(student) => students.push(student),
            Err(e) if !e.is_fatal() => skipped.push(e.to_string()),
            Err(e) => return Err(e),
        }
    }

    let mut courses = Vec::new();
    for name in SEED_COURSES {
        if services.courses.get_by_name(name)?.is_some() {
            skipped.push(format!("Course {name} already exists"));
            continue;
        }
        courses.push(services.courses.create(Course::new(*name))?);
    }

    let mut enrollments = 0;
    for student in &students {
        for course in &courses {
            if rng.gen_bool(SEED_SKIP_RATE) {
                continue;
            }
            let grade: i64 = rng.gen_range(0..=5);
            services.enrollments.enroll_student(student.id, course.id)?;
            services.enrollments.set_grade(student.id, course.id, grade)?;
            enrollments += 1;
        }
    }

    log::info!(
        "Seeded {} students, {} courses and {enrollments} enrollments",
        students.len(),
        courses.len()
    );

    Ok(json!({
        "students": students.len(),
        "courses": courses.len(),
        "enrollments": enrollments,
        "skipped": skipped,
    }))
}

fn print_output(value: &Value, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Services) {
        let tmp = TempDir::new().unwrap();
        let schema_path = tmp.path().join("table_definitions.json");
        std::fs::write(
            &schema_path,
            include_str!("../../table_definitions.json"),
        )
        .unwrap();
        let config = StoreConfig::new(tmp.path().join("db"), schema_path);
        let services = Services::open(&config).unwrap();
        (tmp, services)
    }

    #[test]
    fn test_seed_enrolls_with_random_grades() {
        let (_tmp, mut services) = setup();
        let mut rng = StdRng::seed_from_u64(7);

        let summary = seed(&mut services, &mut rng).unwrap();
        assert_eq!(summary["students"], 6);
        assert_eq!(summary["courses"], 3);

        let enrollments = services.enrollments.get_all().unwrap();
        assert_eq!(summary["enrollments"], enrollments.len());
        assert!(enrollments.len() <= 18);
        assert!(enrollments.iter().all(|e| (0..=5).contains(&e.grade)));
    }

    #[test]
    fn test_seed_twice_adds_nothing() {
        let (_tmp, mut services) = setup();
        seed(&mut services, &mut StdRng::seed_from_u64(1)).unwrap();
        let enrolled = services.enrollments.count();

        let summary = seed(&mut services, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_eq!(summary["students"], 0);
        assert_eq!(summary["courses"], 0);
        assert_eq!(summary["enrollments"], 0);
        assert_eq!(summary["skipped"].as_array().unwrap().len(), 9);
        assert_eq!(services.enrollments.count(), enrolled);
        assert_eq!(services.students.count(), 6);
    }
}
